//! Deployment request and outcome models

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use openapi_client::models::CallbackPayload;
use openapi_server::models::{AttachmentBody, DeployRequestBody};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::ValidationError;

/// Longest repository name the hosting backend accepts
pub const MAX_APP_ID_LEN: usize = 100;

/// Application identifier, stable across revisions of the same app.
///
/// Restricted to characters valid in a repository name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);

impl AppId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let reason = if raw.is_empty() {
            Some("must not be empty")
        } else if raw.len() > MAX_APP_ID_LEN {
            Some("must be at most 100 characters")
        } else if raw == "." || raw == ".." {
            Some("must not be a relative path segment")
        } else if raw.to_ascii_lowercase().ends_with(".git") {
            Some("must not end with .git")
        } else if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            Some("may only contain ASCII letters, digits, '-', '_' and '.'")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ValidationError::InvalidAppId(raw, reason)),
            None => Ok(Self(raw)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded form; ids equal under this key name the same repository
    pub fn key(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AppId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AppId::parse(value)
    }
}

impl From<AppId> for String {
    fn from(value: AppId) -> Self {
        value.0
    }
}

/// Whether a deployment creates an app or revises an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    Initial,
    Revision,
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentMode::Initial => write!(f, "initial"),
            DeploymentMode::Revision => write!(f, "revision"),
        }
    }
}

/// What a revision builds on: the deployed files plus the caller's notes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorContext {
    pub revision: u32,
    pub files: BTreeMap<String, String>,
    pub notes: Option<String>,
}

/// Decoded attachment content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentContent {
    Text(String),
    Binary(Vec<u8>),
}

/// A file attached to the brief
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content: AttachmentContent,
}

impl Attachment {
    /// Decode a `data:[<mediatype>][;base64],<data>` URI
    pub fn from_data_uri(name: &str, uri: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidAttachment(name.to_string(), reason.to_string());

        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| invalid("not a data URI"))?;
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| invalid("missing ',' separator"))?;

        let bytes = if header.ends_with(";base64") {
            BASE64
                .decode(data.trim())
                .map_err(|e| invalid(&e.to_string()))?
        } else {
            data.as_bytes().to_vec()
        };

        let content = match String::from_utf8(bytes) {
            Ok(text) => AttachmentContent::Text(text),
            Err(e) => AttachmentContent::Binary(e.into_bytes()),
        };

        Ok(Self {
            name: name.to_string(),
            content,
        })
    }
}

/// A validated deployment request
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub app_id: AppId,
    pub brief: String,
    pub requested_mode: DeploymentMode,
    pub revision_notes: Option<String>,
    pub callback_url: Url,
    pub attachments: Vec<Attachment>,
    pub round: Option<u32>,
    pub nonce: Option<String>,
    pub email: Option<String>,
}

impl DeploymentRequest {
    /// Validate a wire body. The secret field is ignored here.
    pub fn from_body(body: DeployRequestBody) -> Result<Self, ValidationError> {
        let app_id = AppId::parse(body.app_id.ok_or(ValidationError::MissingField("appId"))?)?;

        let brief = body
            .brief
            .filter(|b| !b.trim().is_empty())
            .ok_or(ValidationError::MissingField("brief"))?;

        let raw_callback = body
            .callback_url
            .ok_or(ValidationError::MissingField("callbackUrl"))?;
        let callback_url = Url::parse(&raw_callback)
            .map_err(|e| ValidationError::InvalidCallbackUrl(raw_callback.clone(), e.to_string()))?;
        if !matches!(callback_url.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidCallbackUrl(
                raw_callback,
                "scheme must be http or https".to_string(),
            ));
        }

        // An explicit flag wins; otherwise a round past the first implies a revision
        let is_revision = body
            .is_revision
            .unwrap_or_else(|| body.round.is_some_and(|round| round >= 2));
        let requested_mode = if is_revision {
            DeploymentMode::Revision
        } else {
            DeploymentMode::Initial
        };

        let attachments = body
            .attachments
            .iter()
            .map(|AttachmentBody { name, url }| Attachment::from_data_uri(name, url))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            app_id,
            brief,
            requested_mode,
            revision_notes: body.revision_notes.filter(|n| !n.trim().is_empty()),
            callback_url,
            attachments,
            round: body.round,
            nonce: body.nonce,
            email: body.email,
        })
    }
}

/// Workflow stage, used to attribute failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Verifying,
    Resolving,
    Generating,
    Committing,
    Publishing,
    Notifying,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Verifying => "Verifying",
            Stage::Resolving => "Resolving",
            Stage::Generating => "Generating",
            Stage::Committing => "Committing",
            Stage::Publishing => "Publishing",
            Stage::Notifying => "Notifying",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one deployment request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentOutcome {
    Success {
        published_url: String,
        revision: u32,
        repo_url: String,
        commit_sha: String,
    },
    Failure {
        stage: Stage,
        kind: String,
        reason: String,
    },
}

impl DeploymentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeploymentOutcome::Success { .. })
    }

    /// Callback payload for this outcome, echoing the request's identifiers
    pub fn callback_payload(&self, request: &DeploymentRequest) -> CallbackPayload {
        let mut payload = CallbackPayload {
            status: String::new(),
            app_id: request.app_id.to_string(),
            url: None,
            reason: None,
            stage: None,
            revision: None,
            repo_url: None,
            commit_sha: None,
            round: request.round,
            nonce: request.nonce.clone(),
            email: request.email.clone(),
            timestamp: Utc::now(),
        };

        match self {
            DeploymentOutcome::Success {
                published_url,
                revision,
                repo_url,
                commit_sha,
            } => {
                payload.status = "success".to_string();
                payload.url = Some(published_url.clone());
                payload.revision = Some(*revision);
                payload.repo_url = Some(repo_url.clone());
                payload.commit_sha = Some(commit_sha.clone());
            }
            DeploymentOutcome::Failure { stage, reason, .. } => {
                payload.status = "error".to_string();
                payload.stage = Some(stage.to_string());
                payload.reason = Some(reason.clone());
            }
        }

        payload
    }
}
