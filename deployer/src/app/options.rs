//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::deploy::controller::WorkflowSettings;
use crate::http::github::DEFAULT_API_URL;
use crate::http::openai::DEFAULT_MODEL;
use crate::notify::policy::RetryPolicy;
use crate::repo::manager::CommitPolicy;

/// Main application options
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Shared secret callers must present
    pub shared_secret: Option<SecretString>,

    /// Server configuration
    pub server: ServerOptions,

    /// Code generation backend
    pub generator: GeneratorOptions,

    /// Source-hosting backend
    pub hosting: HostingOptions,

    /// Callback delivery
    pub notifier: NotifierOptions,

    /// Stage timeouts and publishing checks
    pub workflow: WorkflowSettings,
}

/// Lifecycle options for the service
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown, including in-flight workflows
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Inbound HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Chat-completions backend options
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub temperature: Option<f32>,
    pub request_timeout: Duration,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Which hosting backend to deploy to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostingProvider {
    #[default]
    GitHub,
    /// Keep everything in process (dry runs)
    Memory,
}

/// Source-hosting backend options
#[derive(Debug, Clone)]
pub struct HostingOptions {
    pub provider: HostingProvider,
    pub api_url: String,
    pub token: Option<SecretString>,
    pub owner: String,
    pub repo_prefix: String,
    pub commit_policy: CommitPolicy,
    pub request_timeout: Duration,
}

impl Default for HostingOptions {
    fn default() -> Self {
        Self {
            provider: HostingProvider::GitHub,
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            owner: String::new(),
            repo_prefix: String::new(),
            commit_policy: CommitPolicy::Additive,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Callback delivery options
#[derive(Debug, Clone)]
pub struct NotifierOptions {
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for NotifierOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}
