//! Error types for pagedeploy

use thiserror::Error;

/// Process-level error: startup, configuration, server and I/O failures
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

/// Shared-secret verification failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no secret was supplied")]
    Missing,

    #[error("secret mismatch")]
    Mismatch,

    #[error("no shared secret is configured")]
    NotConfigured,
}

/// Request validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid app id '{0}': {1}")]
    InvalidAppId(String, &'static str),

    #[error("invalid callback url '{0}': {1}")]
    InvalidCallbackUrl(String, String),

    #[error("invalid attachment '{0}': {1}")]
    InvalidAttachment(String, String),

    #[error("malformed request body: {0}")]
    MalformedBody(String),
}

/// Code generation failures. None are retried by the generator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("generation backend rejected the request: {0}")]
    BackendRejected(String),

    #[error("generation response malformed: {0}")]
    ResponseMalformed(String),
}

impl GenerationError {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::BackendUnavailable(_) => "BackendUnavailable",
            GenerationError::BackendRejected(_) => "BackendRejected",
            GenerationError::ResponseMalformed(_) => "ResponseMalformed",
        }
    }
}

/// Hosting backend failures, each carrying the upstream diagnostic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("repository lookup failed: {0}")]
    LookupFailed(String),

    #[error("repository creation failed: {0}")]
    RepoCreateFailed(String),

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("publishing failed: {0}")]
    PublishFailed(String),
}

impl RepositoryError {
    pub fn kind(&self) -> &'static str {
        match self {
            RepositoryError::LookupFailed(_) => "LookupFailed",
            RepositoryError::RepoCreateFailed(_) => "RepoCreateFailed",
            RepositoryError::CommitFailed(_) => "CommitFailed",
            RepositoryError::PublishFailed(_) => "PublishFailed",
        }
    }
}

/// Callback delivery failures. Logged only; never change a deployment outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("callback delivery exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("callback permanently rejected with status {status}")]
    PermanentlyRejected { status: u16 },
}

/// Any error that ends a workflow before it is done
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },
}

impl WorkflowError {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Generation(e) => e.kind(),
            WorkflowError::Repository(e) => e.kind(),
            WorkflowError::Timeout { .. } => "Timeout",
        }
    }
}

/// Outbound HTTP failures, classified for the adapters that map them
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl HttpError {
    /// Timeouts, connection failures and 5xx responses
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Timeout(_) | HttpError::Connect(_) => true,
            HttpError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpError::Timeout(err.to_string())
        } else if err.is_connect() {
            HttpError::Connect(err.to_string())
        } else if err.is_decode() {
            HttpError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            HttpError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            HttpError::Request(err.to_string())
        }
    }
}
