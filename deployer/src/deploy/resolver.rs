//! Revision resolution
//!
//! The repository state decides the deployment mode, not the caller's claim.

use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::RepositoryError;
use crate::models::deployment::{AppId, DeploymentMode, PriorContext};
use crate::repo::manager::RepositoryManager;

/// Effective mode of a deployment and what it builds on
#[derive(Debug, Clone)]
pub struct Resolution {
    pub mode: DeploymentMode,
    pub prior: Option<PriorContext>,
}

pub struct RevisionResolver {
    repos: Arc<RepositoryManager>,
}

impl RevisionResolver {
    pub fn new(repos: Arc<RepositoryManager>) -> Self {
        Self { repos }
    }

    pub async fn resolve(
        &self,
        app_id: &AppId,
        requested: DeploymentMode,
        revision_notes: Option<&str>,
    ) -> Result<Resolution, RepositoryError> {
        let Some(record) = self.repos.find_app(app_id).await? else {
            if requested == DeploymentMode::Revision {
                warn!("Revision requested for {} but it was never deployed; treating as initial", app_id);
            }
            return Ok(Resolution {
                mode: DeploymentMode::Initial,
                prior: None,
            });
        };

        if requested == DeploymentMode::Initial {
            warn!(
                "Initial deployment requested for {} but revision {} exists; treating as revision",
                app_id, record.revision
            );
        }

        let files = self.repos.fetch_files(&record).await?;
        info!(
            "Resolved {} as revision of r{} ({} files)",
            app_id,
            record.revision,
            files.len()
        );

        let prior = PriorContext {
            revision: record.revision,
            files,
            notes: revision_notes.map(str::to_string),
        };
        Ok(Resolution {
            mode: DeploymentMode::Revision,
            prior: Some(prior),
        })
    }
}
