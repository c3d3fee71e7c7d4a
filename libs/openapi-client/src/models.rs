//! Outbound API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ================================ CALLBACK ======================================= //

/// Payload posted to the caller's evaluation callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    /// `success` or `error`
    pub status: String,
    pub app_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ============================= CHAT COMPLETIONS =================================== //

/// Chat completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

/// Chat completion response (subset of fields we read)
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

// ================================== GITHUB ======================================= //

/// Repository creation request
#[derive(Debug, Clone, Serialize)]
pub struct CreateRepoRequest {
    pub name: String,
    pub description: String,
    pub private: bool,
    pub auto_init: bool,
}

/// A GitHub repository (subset of fields)
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRepo {
    pub name: String,
    pub html_url: String,
    pub default_branch: String,
    pub owner: GitHubOwner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubOwner {
    pub login: String,
}

/// A git reference
#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    pub object: GitObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitObject {
    pub sha: String,
}

/// A git commit as returned by the Git Data API
#[derive(Debug, Clone, Deserialize)]
pub struct GitCommit {
    pub sha: String,
    pub tree: GitObject,
}

/// Tree creation request
#[derive(Debug, Clone, Serialize)]
pub struct CreateTreeRequest {
    pub base_tree: String,
    pub tree: Vec<TreeEntry>,
}

/// One entry of a tree creation request
#[derive(Debug, Clone, Serialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(flatten)]
    pub source: TreeEntrySource,
}

/// Inline content, or `sha: null` to remove the path
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TreeEntrySource {
    Content { content: String },
    Remove { sha: Option<String> },
}

impl TreeEntry {
    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644".to_string(),
            entry_type: "blob".to_string(),
            source: TreeEntrySource::Content {
                content: content.into(),
            },
        }
    }

    pub fn removal(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644".to_string(),
            entry_type: "blob".to_string(),
            source: TreeEntrySource::Remove { sha: None },
        }
    }
}

/// Commit creation request
#[derive(Debug, Clone, Serialize)]
pub struct CreateCommitRequest {
    pub message: String,
    pub tree: String,
    pub parents: Vec<String>,
}

/// Reference update request
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRefRequest {
    pub sha: String,
    pub force: bool,
}

/// Contents API response for a single file
#[derive(Debug, Clone, Deserialize)]
pub struct ContentsResponse {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub encoding: String,
}

/// Pages site creation request
#[derive(Debug, Clone, Serialize)]
pub struct CreatePagesRequest {
    pub source: PagesSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct PagesSource {
    pub branch: String,
    pub path: String,
}

/// Pages site (subset of fields)
#[derive(Debug, Clone, Deserialize)]
pub struct PagesSite {
    pub html_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}
