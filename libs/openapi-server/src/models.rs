//! Endpoint models

use serde::{Deserialize, Serialize};

/// Deployment request body as received on the wire.
///
/// Every field is optional here; validation happens in the service after the
/// secret has been checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequestBody {
    #[serde(alias = "task", alias = "app_id")]
    pub app_id: Option<String>,
    pub brief: Option<String>,
    #[serde(alias = "is_revision")]
    pub is_revision: Option<bool>,
    #[serde(alias = "revision_notes")]
    pub revision_notes: Option<String>,
    pub secret: Option<String>,
    #[serde(alias = "evaluation_url", alias = "callback_url")]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentBody>,
    pub round: Option<u32>,
    pub nonce: Option<String>,
    pub email: Option<String>,
}

/// Attachment passed as a data URI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentBody {
    pub name: String,
    pub url: String,
}

/// Successful deployment response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub status: String,
    pub url: String,
    pub revision: u32,
    pub repo_url: String,
    pub commit_sha: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub reason: String,
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}
