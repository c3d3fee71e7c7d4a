//! Deployment workflow orchestration
//!
//! Sequences verification, resolution, generation, commit, publishing and
//! notification for one request. Requests for the same app are serialized
//! from resolving through publishing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::app::state::WorkflowTracker;
use crate::authn::secret::{Authorized, SecretVerifier};
use crate::deploy::fsm::{WorkflowFsm, WorkflowState};
use crate::deploy::locks::KeyedLocks;
use crate::deploy::resolver::RevisionResolver;
use crate::errors::{AuthError, RepositoryError, WorkflowError};
use crate::generate::client::CodeGenClient;
use crate::http::github::fetch_status;
use crate::models::deployment::{DeploymentOutcome, DeploymentRequest, Stage};
use crate::notify::notifier::{NotificationAttempt, Notifier};
use crate::repo::manager::RepositoryManager;
use crate::utils::generate_uuid;

/// Stage time limits and publishing checks
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub resolve_timeout: Duration,
    pub generate_timeout: Duration,
    pub commit_timeout: Duration,
    pub publish_timeout: Duration,

    /// Poll the published URL after publishing (logs only)
    pub verify_pages: bool,
    pub verify_attempts: u32,
    pub verify_interval: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_secs(60),
            generate_timeout: Duration::from_secs(180),
            commit_timeout: Duration::from_secs(120),
            publish_timeout: Duration::from_secs(120),
            verify_pages: false,
            verify_attempts: 10,
            verify_interval: Duration::from_secs(10),
        }
    }
}

/// Everything one workflow produced
#[derive(Debug)]
pub struct WorkflowReport {
    pub request_id: String,
    pub outcome: DeploymentOutcome,
    pub final_state: WorkflowState,

    /// Notification in flight; dropping the handle detaches it
    pub notification: JoinHandle<NotificationAttempt>,
}

pub struct Controller {
    verifier: SecretVerifier,
    resolver: RevisionResolver,
    generator: CodeGenClient,
    repos: Arc<RepositoryManager>,
    notifier: Arc<Notifier>,
    locks: KeyedLocks,
    tracker: WorkflowTracker,
    settings: WorkflowSettings,
}

impl Controller {
    pub fn new(
        verifier: SecretVerifier,
        repos: Arc<RepositoryManager>,
        generator: CodeGenClient,
        notifier: Arc<Notifier>,
        tracker: WorkflowTracker,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            verifier,
            resolver: RevisionResolver::new(repos.clone()),
            generator,
            repos,
            notifier,
            locks: KeyedLocks::new(),
            tracker,
            settings,
        }
    }

    /// Check the caller's secret. Must succeed before [`Controller::execute`].
    pub fn authorize(&self, provided: Option<&str>) -> Result<Authorized, AuthError> {
        self.verifier.authorize(provided)
    }

    pub fn tracker(&self) -> &WorkflowTracker {
        &self.tracker
    }

    /// Run the workflow for an authorized request
    pub async fn execute(&self, _authorized: Authorized, request: DeploymentRequest) -> WorkflowReport {
        let request_id = generate_uuid();
        let span = info_span!("workflow", app_id = %request.app_id, request_id = %request_id);
        self.run(request_id.clone(), request).instrument(span).await
    }

    async fn run(&self, request_id: String, request: DeploymentRequest) -> WorkflowReport {
        let _active = self.tracker.track();
        let mut fsm = WorkflowFsm::new();
        info!(
            "Deployment requested ({} mode claimed)",
            request.requested_mode
        );

        // Holding an `Authorized` proves verification already happened
        step(&mut fsm);

        let outcome = match self.deploy(&mut fsm, &request).await {
            Ok(outcome) => {
                step(&mut fsm);
                outcome
            }
            Err(err) => {
                let stage = fsm.state().stage().unwrap_or(Stage::Resolving);
                error!("{} failed: {}", stage, err);
                if let Err(e) = fsm.fail(err.kind(), err.to_string()) {
                    error!("{}", e);
                }
                DeploymentOutcome::Failure {
                    stage,
                    kind: err.kind().to_string(),
                    reason: err.to_string(),
                }
            }
        };

        let notification = self.dispatch_notification(&request, &outcome);
        if outcome.is_success() {
            step(&mut fsm);
        }

        match fsm.error() {
            Some((kind, reason)) => {
                info!("Workflow finished in state {} ({}: {})", fsm.state(), kind, reason)
            }
            None => info!("Workflow finished in state {}", fsm.state()),
        }
        WorkflowReport {
            request_id,
            outcome,
            final_state: fsm.state().clone(),
            notification,
        }
    }

    /// Resolving through Publishing, under the app's lock
    async fn deploy(
        &self,
        fsm: &mut WorkflowFsm,
        request: &DeploymentRequest,
    ) -> Result<DeploymentOutcome, WorkflowError> {
        let _guard = self.locks.acquire(&request.app_id.key()).await;

        let resolution = within(
            Stage::Resolving,
            self.settings.resolve_timeout,
            self.resolver.resolve(
                &request.app_id,
                request.requested_mode,
                request.revision_notes.as_deref(),
            ),
        )
        .await?;
        info!("Resolved deployment mode: {}", resolution.mode);
        step(fsm);

        let artifact = within(
            Stage::Generating,
            self.settings.generate_timeout,
            self.generator.generate(
                &request.brief,
                resolution.mode,
                resolution.prior.as_ref(),
                &request.attachments,
            ),
        )
        .await?;
        step(fsm);

        let (handle, commit) = within(Stage::Committing, self.settings.commit_timeout, async {
            let handle = self.repos.ensure_repository(&request.app_id).await?;
            let commit = self.repos.commit_files(&handle, &artifact).await?;
            Ok::<_, RepositoryError>((handle, commit))
        })
        .await?;
        step(fsm);

        let published_url = within(
            Stage::Publishing,
            self.settings.publish_timeout,
            self.repos.enable_pages(&handle),
        )
        .await?;

        if self.settings.verify_pages {
            self.spawn_verification(published_url.clone());
        }

        info!(
            "Published revision {} at {}",
            commit.revision, published_url
        );
        Ok(DeploymentOutcome::Success {
            published_url,
            revision: commit.revision,
            repo_url: handle.html_url,
            commit_sha: commit.sha,
        })
    }

    /// Send the outcome to the callback without blocking the caller
    fn dispatch_notification(
        &self,
        request: &DeploymentRequest,
        outcome: &DeploymentOutcome,
    ) -> JoinHandle<NotificationAttempt> {
        let payload = outcome.callback_payload(request);
        let callback_url = request.callback_url.clone();
        let notifier = self.notifier.clone();
        let active = self.tracker.track();

        tokio::spawn(
            async move {
                let _active = active;
                notifier.notify(callback_url, payload).await
            }
            .instrument(Span::current()),
        )
    }

    fn spawn_verification(&self, url: String) {
        let attempts = self.settings.verify_attempts;
        let interval = self.settings.verify_interval;
        let active = self.tracker.track();

        tokio::spawn(
            async move {
                let _active = active;
                wait_until_live(&url, attempts, interval).await;
            }
            .instrument(Span::current()),
        );
    }
}

/// Advance the FSM, logging the new state
fn step(fsm: &mut WorkflowFsm) {
    match fsm.advance() {
        Ok(()) => info!("-> {}", fsm.state()),
        Err(e) => error!("{}", e),
    }
}

/// Bound a stage by its timeout
async fn within<T, E>(
    stage: Stage,
    limit: Duration,
    future: impl Future<Output = Result<T, E>>,
) -> Result<T, WorkflowError>
where
    WorkflowError: From<E>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result.map_err(WorkflowError::from),
        Err(_) => Err(WorkflowError::Timeout {
            stage: stage.as_str(),
            secs: limit.as_secs(),
        }),
    }
}

/// Poll a freshly published site until it answers 2xx
async fn wait_until_live(url: &str, attempts: u32, interval: Duration) {
    for attempt in 1..=attempts {
        match fetch_status(url, interval).await {
            Ok(status) if (200..300).contains(&status) => {
                info!("{} is live after {} attempt(s)", url, attempt);
                return;
            }
            Ok(status) => info!("{} not live yet ({})", url, status),
            Err(e) => info!("{} not reachable yet: {}", url, e),
        }
        tokio::time::sleep(interval).await;
    }
    warn!("{} still not live after {} attempts", url, attempts);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_within_maps_timeout_to_stage() {
        let result: Result<(), WorkflowError> = within(
            Stage::Generating,
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, RepositoryError>(())
            },
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), "Timeout");
        assert_eq!(
            err,
            WorkflowError::Timeout {
                stage: "Generating",
                secs: 0
            }
        );
    }

    #[tokio::test]
    async fn test_within_passes_errors_through() {
        let result: Result<(), WorkflowError> = within(
            Stage::Committing,
            Duration::from_secs(1),
            async { Err(RepositoryError::CommitFailed("409: ref moved".to_string())) },
        )
        .await;
        assert_eq!(result.unwrap_err().kind(), "CommitFailed");
    }
}
