//! Code generation client

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::errors::GenerationError;
use crate::generate::backend::CompletionBackend;
use crate::generate::prompt::build_prompt;
use crate::models::artifact::GeneratedArtifact;
use crate::models::deployment::{Attachment, DeploymentMode, PriorContext};
use crate::utils::truncate_chars;

/// Turns a brief into a [`GeneratedArtifact`] with one backend call
pub struct CodeGenClient {
    backend: Arc<dyn CompletionBackend>,
}

impl CodeGenClient {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Generate the app's files. Never retries.
    pub async fn generate(
        &self,
        brief: &str,
        mode: DeploymentMode,
        prior: Option<&PriorContext>,
        attachments: &[Attachment],
    ) -> Result<GeneratedArtifact, GenerationError> {
        let prompt = build_prompt(brief, mode, prior, attachments);
        debug!(
            "Generation prompt ({} mode): {} chars",
            prompt.mode,
            prompt.user.len()
        );

        let raw = self.backend.complete(&prompt).await?;
        let artifact = parse_artifact(&raw, brief)?;

        info!(
            "Generated {} files (digest {})",
            artifact.len(),
            &artifact.digest()[..12]
        );
        Ok(artifact)
    }
}

/// Parse model output into an artifact: a JSON object of path to string content
pub fn parse_artifact(raw: &str, brief: &str) -> Result<GeneratedArtifact, GenerationError> {
    let malformed = |reason: String| GenerationError::ResponseMalformed(reason);

    let json = strip_code_fence(raw);
    let value: Value = serde_json::from_str(json).map_err(|e| {
        malformed(format!(
            "not JSON ({}): {}",
            e,
            truncate_chars(json, 120)
        ))
    })?;

    let Value::Object(entries) = value else {
        return Err(malformed("expected a JSON object of file paths".to_string()));
    };

    let mut files = BTreeMap::new();
    for (path, content) in entries {
        match content {
            Value::String(text) => {
                files.insert(path, text);
            }
            other => {
                return Err(malformed(format!(
                    "content of '{}' is {} instead of a string",
                    path,
                    json_type(&other)
                )))
            }
        }
    }

    GeneratedArtifact::from_files(files, brief).map_err(malformed)
}

/// Tolerate a single ```json fenced block around the object
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_object() {
        let artifact = parse_artifact(r#"{"index.html": "<html></html>"}"#, "brief").unwrap();
        assert_eq!(artifact.get("index.html"), Some("<html></html>"));
        assert!(artifact.get("LICENSE").is_some());
    }

    #[test]
    fn test_parse_fenced_object() {
        let raw = "```json\n{\"index.html\": \"x\"}\n```";
        assert!(parse_artifact(raw, "brief").is_ok());
    }

    #[test]
    fn test_malformed_outputs() {
        for raw in [
            "Sure! Here is your app.",
            "[\"index.html\"]",
            "{}",
            r#"{"index.html": 42}"#,
            r#"{"../escape.html": "x"}"#,
            r#"{"/abs.html": "x"}"#,
        ] {
            assert!(
                matches!(
                    parse_artifact(raw, "brief"),
                    Err(GenerationError::ResponseMalformed(_))
                ),
                "accepted: {}",
                raw
            );
        }
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("  {}  "), "{}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```json\n{\"a\":\"b\"}\n```\n"), "{\"a\":\"b\"}");
    }
}
