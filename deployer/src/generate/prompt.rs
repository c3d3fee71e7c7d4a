//! Prompt construction
//!
//! Pure functions of their inputs: the same brief, mode, prior context and
//! attachments always produce the same prompt text.

use crate::models::deployment::{Attachment, AttachmentContent, DeploymentMode, PriorContext};
use crate::utils::truncate_chars;

/// Characters of a text attachment shown to the model
pub const ATTACHMENT_PREVIEW_CHARS: usize = 200;

pub const SYSTEM_PROMPT: &str = "\
You are an expert web developer generating minimal static web applications.
Your response MUST be a single JSON object whose keys are relative file paths and whose values are the full file contents as strings.

Requirements:
1. Output ONLY the JSON object, no prose and no markdown outside it.
2. The app must be served as static files; the entry point is 'index.html'. Use plain HTML, CSS and JavaScript, or CDN libraries when the brief needs them.
3. Include 'README.md' with a Summary, Setup (none required), Usage and Code Explanation section.
4. Include 'LICENSE' containing the standard MIT License text.
5. Paths must be relative, use '/' separators and never contain '..'.
6. Keep the code minimal and clean. Never embed secrets.";

/// A fully rendered completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub mode: DeploymentMode,
    pub system: String,
    pub user: String,
}

/// Build the prompt for a generation call
pub fn build_prompt(
    brief: &str,
    mode: DeploymentMode,
    prior: Option<&PriorContext>,
    attachments: &[Attachment],
) -> Prompt {
    let user = match (mode, prior) {
        (DeploymentMode::Revision, Some(prior)) => revision_message(brief, prior, attachments),
        _ => initial_message(brief, attachments),
    };

    Prompt {
        mode,
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

fn initial_message(brief: &str, attachments: &[Attachment]) -> String {
    format!(
        "TASK BRIEF:\n{}\n\nATTACHMENTS:\n{}\n\n\
Generate every file of the application as one JSON object mapping file paths to contents.\n",
        brief.trim(),
        format_attachments(attachments)
    )
}

fn revision_message(brief: &str, prior: &PriorContext, attachments: &[Attachment]) -> String {
    let notes = prior
        .notes
        .as_deref()
        .map(str::trim)
        .unwrap_or("None given. Update the app so it satisfies the brief.");

    let mut message = format!(
        "REVISION of an existing application (currently at revision {}).\n\n\
TASK BRIEF:\n{}\n\n\
REVISION INSTRUCTIONS:\n{}\n\n\
ATTACHMENTS:\n{}\n\n\
CURRENT FILES:\n",
        prior.revision,
        brief.trim(),
        notes,
        format_attachments(attachments)
    );

    if prior.files.is_empty() {
        message.push_str("(none could be retrieved)\n");
    }
    // BTreeMap iteration keeps file order stable
    for (path, content) in &prior.files {
        message.push_str(&format!("=== FILE: {} ===\n{}\n=== END FILE ===\n", path, content));
    }

    message.push_str(
        "\nApply the revision instructions to the current files. Return one JSON object \
mapping file paths to contents that contains every file the app should have after \
this revision, changed or not.\n",
    );
    message
}

/// Human-readable summary of attachments for the model
pub fn format_attachments(attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return "None".to_string();
    }

    attachments
        .iter()
        .map(|attachment| match &attachment.content {
            AttachmentContent::Text(text) => format!(
                "File Name: {}\nContent Type: TEXT\nContent Preview:\n---\n{}\n---",
                attachment.name,
                truncate_chars(text, ATTACHMENT_PREVIEW_CHARS)
            ),
            AttachmentContent::Binary(bytes) => format!(
                "File Name: {}\nContent Type: BINARY\nContent Preview:\n---\n(Binary content: {} bytes)\n---",
                attachment.name,
                bytes.len()
            ),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn prior() -> PriorContext {
        let mut files = BTreeMap::new();
        files.insert("index.html".to_string(), "<h1>todo</h1>".to_string());
        files.insert("LICENSE".to_string(), "MIT".to_string());
        PriorContext {
            revision: 1,
            files,
            notes: Some("add dark mode".to_string()),
        }
    }

    #[test]
    fn test_initial_prompt_is_deterministic() {
        let a = build_prompt("a todo list", DeploymentMode::Initial, None, &[]);
        let b = build_prompt("a todo list", DeploymentMode::Initial, None, &[]);
        assert_eq!(a, b);
        assert!(a.user.contains("a todo list"));
        assert!(a.user.contains("ATTACHMENTS:\nNone"));
        assert!(!a.user.contains("CURRENT FILES"));
    }

    #[test]
    fn test_revision_prompt_embeds_prior_files_in_order() {
        let prompt = build_prompt("a todo list", DeploymentMode::Revision, Some(&prior()), &[]);
        assert!(prompt.user.contains("add dark mode"));
        assert!(prompt.user.contains("=== FILE: index.html ===\n<h1>todo</h1>"));

        let license = prompt.user.find("=== FILE: LICENSE").unwrap();
        let index = prompt.user.find("=== FILE: index.html").unwrap();
        assert!(license < index);

        assert_eq!(
            prompt,
            build_prompt("a todo list", DeploymentMode::Revision, Some(&prior()), &[])
        );
    }

    #[test]
    fn test_modes_differ() {
        let initial = build_prompt("x", DeploymentMode::Initial, None, &[]);
        let revision = build_prompt("x", DeploymentMode::Revision, Some(&prior()), &[]);
        assert_ne!(initial.user, revision.user);
        assert_eq!(initial.system, revision.system);
    }

    #[test]
    fn test_attachment_previews() {
        let attachments = vec![
            Attachment {
                name: "data.csv".to_string(),
                content: AttachmentContent::Text("x".repeat(500)),
            },
            Attachment {
                name: "logo.png".to_string(),
                content: AttachmentContent::Binary(vec![0x89; 42]),
            },
        ];
        let rendered = format_attachments(&attachments);
        assert!(rendered.contains("File Name: data.csv"));
        assert!(rendered.contains(&format!("{}...", "x".repeat(200))));
        assert!(!rendered.contains(&"x".repeat(201)));
        assert!(rendered.contains("(Binary content: 42 bytes)"));
    }
}
