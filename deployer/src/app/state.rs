//! Application state management

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::app::options::{AppOptions, HostingProvider};
use crate::authn::secret::SecretVerifier;
use crate::deploy::controller::Controller;
use crate::errors::ServiceError;
use crate::generate::backend::CompletionBackend;
use crate::generate::client::CodeGenClient;
use crate::http::callback::ReqwestCallback;
use crate::http::client::HttpClient;
use crate::http::github::{github_headers, GitHubHosting};
use crate::http::openai::OpenAiCompletions;
use crate::notify::notifier::Notifier;
use crate::notify::transport::CallbackTransport;
use crate::repo::backend::HostingBackend;
use crate::repo::manager::{RepositoryManager, RepositoryOptions};
use crate::repo::memory::InMemoryHosting;

/// Counts in-flight workflows, notifications and Pages checks
#[derive(Clone)]
pub struct WorkflowTracker {
    active: Arc<watch::Sender<usize>>,
}

impl WorkflowTracker {
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self {
            active: Arc::new(active),
        }
    }

    /// Count one unit of work until the returned guard drops
    pub fn track(&self) -> ActiveGuard {
        self.active.send_modify(|count| *count += 1);
        ActiveGuard {
            active: self.active.clone(),
        }
    }

    pub fn active(&self) -> usize {
        *self.active.borrow()
    }

    /// Wait until nothing is in flight; false if `limit` elapsed first
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let mut rx = self.active.subscribe();
        let idle = tokio::time::timeout(limit, rx.wait_for(|count| *count == 0))
            .await
            .is_ok();
        idle
    }
}

impl Default for WorkflowTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ActiveGuard {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// External collaborators the controller drives
pub struct Backends {
    pub completion: Arc<dyn CompletionBackend>,
    pub hosting: Arc<dyn HostingBackend>,
    pub callback: Arc<dyn CallbackTransport>,
}

impl Backends {
    /// Build the configured HTTP backends
    pub fn from_options(options: &AppOptions) -> Result<Self, ServiceError> {
        let generator = &options.generator;
        let mut completion_client = HttpClient::new(
            &generator.base_url,
            generator.request_timeout,
            HeaderMap::new(),
        )?;
        match &generator.api_key {
            Some(key) => completion_client = completion_client.with_token(key.clone()),
            None => warn!("No generation API key configured; generation calls will be rejected"),
        }
        let mut completion = OpenAiCompletions::new(completion_client, generator.model.clone());
        if let Some(temperature) = generator.temperature {
            completion = completion.with_temperature(temperature);
        }

        let hosting_options = &options.hosting;
        let hosting: Arc<dyn HostingBackend> = match hosting_options.provider {
            HostingProvider::GitHub => {
                let token = hosting_options.token.clone().ok_or_else(|| {
                    ServiceError::ConfigError("hosting.token (GITHUB_TOKEN) is required".to_string())
                })?;
                if hosting_options.owner.is_empty() {
                    return Err(ServiceError::ConfigError(
                        "hosting.owner (GITHUB_USERNAME) is required".to_string(),
                    ));
                }
                let client = HttpClient::new(
                    &hosting_options.api_url,
                    hosting_options.request_timeout,
                    github_headers(),
                )?
                .with_token(token);
                Arc::new(GitHubHosting::new(client, hosting_options.owner.clone()))
            }
            HostingProvider::Memory => {
                warn!("Using in-memory hosting; nothing will be published");
                let owner = if hosting_options.owner.is_empty() {
                    "local"
                } else {
                    hosting_options.owner.as_str()
                };
                Arc::new(InMemoryHosting::new(
                    owner,
                    format!("http://{}.pages.localhost", owner),
                ))
            }
        };

        Ok(Self {
            completion: Arc::new(completion),
            hosting,
            callback: Arc::new(ReqwestCallback::new(options.notifier.request_timeout)?),
        })
    }
}

/// Main application state
pub struct AppState {
    pub controller: Arc<Controller>,
    pub tracker: WorkflowTracker,
}

impl AppState {
    /// Initialize application state from configured backends
    pub fn init(options: &AppOptions) -> Result<Self, ServiceError> {
        Ok(Self::with_backends(options, Backends::from_options(options)?))
    }

    /// Initialize application state around the given backends
    pub fn with_backends(options: &AppOptions, backends: Backends) -> Self {
        info!("Initializing application state...");
        let tracker = WorkflowTracker::new();

        let repos = Arc::new(RepositoryManager::new(
            backends.hosting,
            RepositoryOptions {
                repo_prefix: options.hosting.repo_prefix.clone(),
                commit_policy: options.hosting.commit_policy,
            },
        ));
        let notifier = Arc::new(Notifier::new(
            backends.callback,
            options.notifier.retry.clone(),
        ));

        let controller = Controller::new(
            SecretVerifier::new(options.shared_secret.clone()),
            repos,
            CodeGenClient::new(backends.completion),
            notifier,
            tracker.clone(),
            options.workflow.clone(),
        );

        Self {
            controller: Arc::new(controller),
            tracker,
        }
    }

    /// Wait for in-flight workflows and notifications to finish
    pub async fn shutdown(&self, limit: Duration) -> Result<(), ServiceError> {
        info!(
            "Shutting down application state ({} in flight)...",
            self.tracker.active()
        );
        if self.tracker.wait_idle(limit).await {
            Ok(())
        } else {
            Err(ServiceError::ShutdownError(format!(
                "{} workflow tasks still running after {:?}",
                self.tracker.active(),
                limit
            )))
        }
    }
}
