//! In-process fakes and a router harness for end-to-end tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use openapi_client::models::CallbackPayload;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

use pagedeploy::app::options::AppOptions;
use pagedeploy::app::state::{AppState, Backends};
use pagedeploy::errors::{GenerationError, RepositoryError};
use pagedeploy::generate::backend::CompletionBackend;
use pagedeploy::generate::prompt::Prompt;
use pagedeploy::notify::policy::RetryPolicy;
use pagedeploy::notify::transport::{CallbackTransport, DeliveryResponse};
use pagedeploy::repo::backend::{FileChange, HostingBackend, PagesCreation, RepoHandle};
use pagedeploy::repo::memory::InMemoryHosting;
use pagedeploy::server::serve::router;
use pagedeploy::server::state::ServerState;
use pagedeploy::utils::CooldownOptions;

pub const SECRET: &str = "s3cret";
pub const PAGES_BASE: &str = "https://user.github.io";
pub const CALLBACK: &str = "https://eval.example.com/notify";

pub const TODO_APP: &str = r#"{"index.html": "<!doctype html><title>Todo</title><ul id=\"todos\"></ul>"}"#;
pub const DARK_TODO_APP: &str = r#"{"index.html": "<!doctype html><title>Todo</title><body class=\"dark\"></body>", "style.css": "body.dark { background: #111; }"}"#;

/// Completion backend replaying canned replies and recording every prompt
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    fallback: String,
    delay: Duration,
    prompts: Mutex<Vec<Prompt>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn new(fallback: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, reply: Result<&str, GenerationError>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(reply.map(str::to_string));
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }

    /// Most generation calls that were running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedCompletion {
    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let scripted = self.replies.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Callback transport answering from a script, then 200
#[derive(Default)]
pub struct RecordingCallback {
    script: Mutex<VecDeque<DeliveryResponse>>,
    deliveries: Mutex<Vec<(Url, CallbackPayload)>>,
}

impl RecordingCallback {
    pub fn scripted(responses: Vec<DeliveryResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            deliveries: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }

    pub fn payloads(&self) -> Vec<CallbackPayload> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl CallbackTransport for RecordingCallback {
    async fn deliver(&self, url: &Url, payload: &CallbackPayload) -> DeliveryResponse {
        self.deliveries
            .lock()
            .unwrap()
            .push((url.clone(), payload.clone()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(DeliveryResponse::Status(200))
    }
}

/// Hosting backend failing a scripted number of mutating calls, then
/// delegating to the wrapped in-memory backend
pub struct FaultyHosting {
    inner: Arc<InMemoryHosting>,
    failing_creates: AtomicUsize,
    failing_commits: AtomicUsize,
    failing_pages: AtomicUsize,
}

impl FaultyHosting {
    pub fn new(inner: Arc<InMemoryHosting>) -> Self {
        Self {
            inner,
            failing_creates: AtomicUsize::new(0),
            failing_commits: AtomicUsize::new(0),
            failing_pages: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_create(&self) {
        self.failing_creates.fetch_add(1, Ordering::SeqCst);
    }

    pub fn fail_next_commit(&self) {
        self.failing_commits.fetch_add(1, Ordering::SeqCst);
    }

    pub fn fail_next_pages(&self) {
        self.failing_pages.fetch_add(1, Ordering::SeqCst);
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl HostingBackend for FaultyHosting {
    async fn get_repository(&self, name: &str) -> Result<Option<RepoHandle>, RepositoryError> {
        self.inner.get_repository(name).await
    }

    async fn create_repository(
        &self,
        name: &str,
        description: &str,
    ) -> Result<RepoHandle, RepositoryError> {
        if Self::take(&self.failing_creates) {
            return Err(RepositoryError::RepoCreateFailed("403: quota exceeded".to_string()));
        }
        self.inner.create_repository(name, description).await
    }

    async fn read_file(
        &self,
        repo: &RepoHandle,
        path: &str,
    ) -> Result<Option<String>, RepositoryError> {
        self.inner.read_file(repo, path).await
    }

    async fn commit(
        &self,
        repo: &RepoHandle,
        message: &str,
        changes: &[FileChange],
    ) -> Result<String, RepositoryError> {
        if Self::take(&self.failing_commits) {
            return Err(RepositoryError::CommitFailed("409: reference update failed".to_string()));
        }
        self.inner.commit(repo, message, changes).await
    }

    async fn get_pages(&self, repo: &RepoHandle) -> Result<Option<String>, RepositoryError> {
        self.inner.get_pages(repo).await
    }

    async fn create_pages(&self, repo: &RepoHandle) -> Result<PagesCreation, RepositoryError> {
        if Self::take(&self.failing_pages) {
            return Err(RepositoryError::PublishFailed("500: pages build queue down".to_string()));
        }
        self.inner.create_pages(repo).await
    }
}

/// Options with a configured secret and no waiting between callback attempts
pub fn test_options() -> AppOptions {
    let mut options = AppOptions::default();
    options.shared_secret = Some(SecretString::from(SECRET.to_string()));
    options.hosting.owner = "user".to_string();
    options.notifier.retry = RetryPolicy {
        max_attempts: 5,
        cooldown: CooldownOptions {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        },
    };
    options
}

pub struct Harness {
    pub router: Router,
    pub state: Arc<AppState>,
    pub completion: Arc<ScriptedCompletion>,
    pub hosting: Arc<InMemoryHosting>,
    pub faults: Arc<FaultyHosting>,
    pub callback: Arc<RecordingCallback>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            test_options(),
            ScriptedCompletion::new(TODO_APP),
            RecordingCallback::default(),
        )
    }

    pub fn build(
        options: AppOptions,
        completion: ScriptedCompletion,
        callback: RecordingCallback,
    ) -> Self {
        let completion = Arc::new(completion);
        let hosting = Arc::new(InMemoryHosting::new("user", PAGES_BASE));
        let faults = Arc::new(FaultyHosting::new(hosting.clone()));
        let callback = Arc::new(callback);

        let state = Arc::new(AppState::with_backends(
            &options,
            Backends {
                completion: completion.clone(),
                hosting: faults.clone(),
                callback: callback.clone(),
            },
        ));
        let router = router(Arc::new(ServerState::new(state.controller.clone())));

        Self {
            router,
            state,
            completion,
            hosting,
            faults,
            callback,
        }
    }

    /// POST a raw body to the deploy endpoint
    pub async fn post_raw(&self, body: &str, secret_header: Option<&str>) -> (StatusCode, Value) {
        let request = deploy_request(body, secret_header);
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn deploy(&self, body: Value) -> (StatusCode, Value) {
        self.post_raw(&body.to_string(), None).await
    }

    /// Wait for background notifications and Pages checks to finish
    pub async fn settle(&self) {
        assert!(
            self.state.tracker.wait_idle(Duration::from_secs(5)).await,
            "background work did not finish"
        );
    }
}

pub fn deploy_request(body: &str, secret_header: Option<&str>) -> Request<Body> {
    let mut request = Request::post("/api-endpoint").header("content-type", "application/json");
    if let Some(secret) = secret_header {
        request = request.header("x-deploy-secret", secret);
    }
    request.body(Body::from(body.to_string())).unwrap()
}

pub fn initial_request(app_id: &str) -> Value {
    serde_json::json!({
        "appId": app_id,
        "brief": "a todo list",
        "isRevision": false,
        "secret": SECRET,
        "callbackUrl": CALLBACK,
        "round": 1,
        "nonce": "n-1",
        "email": "student@example.com",
    })
}

pub fn revision_request(app_id: &str, notes: &str) -> Value {
    serde_json::json!({
        "appId": app_id,
        "brief": "a todo list",
        "isRevision": true,
        "revisionNotes": notes,
        "secret": SECRET,
        "callbackUrl": CALLBACK,
        "round": 2,
        "nonce": "n-2",
    })
}
