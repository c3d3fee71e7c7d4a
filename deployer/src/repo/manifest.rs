//! Deployment manifest stored alongside each app's files

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Written into every deployment commit; its presence marks an app as deployed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub app_id: String,
    pub revision: u32,
    /// Artifact paths written by the last deployment
    pub files: Vec<String>,
    pub digest: String,
    pub updated_at: DateTime<Utc>,
}

impl Manifest {
    pub fn parse(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|e| format!("unreadable manifest: {}", e))
    }

    pub fn render(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|e| format!("cannot render manifest: {}", e))
    }
}
