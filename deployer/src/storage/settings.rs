//! Settings file management
//!
//! Settings are read once at startup from a JSON file; secrets and identity
//! may come from the environment instead, which wins over the file.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::app::options::{
    AppOptions, GeneratorOptions, HostingOptions, HostingProvider, LifecycleOptions,
    NotifierOptions, ServerOptions,
};
use crate::deploy::controller::WorkflowSettings;
use crate::errors::ServiceError;
use crate::http::github::DEFAULT_API_URL;
use crate::http::openai::DEFAULT_MODEL;
use crate::logs::{LogLevel, LogOptions};
use crate::notify::policy::RetryPolicy;
use crate::repo::manager::CommitPolicy;
use crate::utils::CooldownOptions;

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Shared secret; prefer `SHARED_SECRET` in the environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,

    pub server: ServerSettings,
    pub generator: GeneratorSettings,
    pub hosting: HostingSettings,
    pub notifier: NotifierSettings,
    pub workflow: WorkflowTimeouts,
    pub log: LogSettings,

    /// Seconds to wait for in-flight workflows on shutdown
    pub max_shutdown_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let defaults = ServerOptions::default();
        Self {
            host: defaults.host,
            port: defaults.port,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub request_timeout_secs: u64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostingSettings {
    pub provider: HostingProvider,
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub owner: String,
    pub repo_prefix: String,
    pub commit_policy: CommitPolicy,
    pub request_timeout_secs: u64,
}

impl Default for HostingSettings {
    fn default() -> Self {
        Self {
            provider: HostingProvider::GitHub,
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            owner: String::new(),
            repo_prefix: String::new(),
            commit_policy: CommitPolicy::Additive,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub request_timeout_secs: u64,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowTimeouts {
    pub resolve_timeout_secs: u64,
    pub generate_timeout_secs: u64,
    pub commit_timeout_secs: u64,
    pub publish_timeout_secs: u64,
    pub verify_pages: bool,
    pub verify_attempts: u32,
    pub verify_interval_secs: u64,
}

impl Default for WorkflowTimeouts {
    fn default() -> Self {
        let defaults = WorkflowSettings::default();
        Self {
            resolve_timeout_secs: defaults.resolve_timeout.as_secs(),
            generate_timeout_secs: defaults.generate_timeout.as_secs(),
            commit_timeout_secs: defaults.commit_timeout.as_secs(),
            publish_timeout_secs: defaults.publish_timeout.as_secs(),
            verify_pages: defaults.verify_pages,
            verify_attempts: defaults.verify_attempts,
            verify_interval_secs: defaults.verify_interval.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: LogLevel,
    pub json: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            dir: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shared_secret: None,
            server: ServerSettings::default(),
            generator: GeneratorSettings::default(),
            hosting: HostingSettings::default(),
            notifier: NotifierSettings::default(),
            workflow: WorkflowTimeouts::default(),
            log: LogSettings::default(),
            max_shutdown_delay_secs: LifecycleOptions::default().max_shutdown_delay.as_secs(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn secret(value: Option<String>) -> Option<SecretString> {
    non_empty(value).map(SecretString::from)
}

impl Settings {
    /// Apply environment overrides using the given lookup
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ServiceError> {
        if let Some(value) = non_empty(lookup("SHARED_SECRET")).or_else(|| non_empty(lookup("STUDENT_SECRET"))) {
            self.shared_secret = Some(value);
        }
        if let Some(value) = non_empty(lookup("OPENAI_API_KEY")) {
            self.generator.api_key = Some(value);
        }
        if let Some(value) = non_empty(lookup("GITHUB_TOKEN")) {
            self.hosting.token = Some(value);
        }
        if let Some(value) = non_empty(lookup("GITHUB_USERNAME")) {
            self.hosting.owner = value;
        }
        if let Some(value) = non_empty(lookup("PAGEDEPLOY_PORT")) {
            self.server.port = value.trim().parse().map_err(|_| {
                ServiceError::ConfigError(format!("PAGEDEPLOY_PORT is not a port: {}", value))
            })?;
        }
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env_vars(&mut self) -> Result<(), ServiceError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log.level,
            json_format: self.log.json,
            log_dir: self.log.dir.clone(),
            ..Default::default()
        }
    }

    /// Validate and convert to runtime options
    pub fn into_options(self) -> Result<AppOptions, ServiceError> {
        let invalid = |reason: &str| Err(ServiceError::ConfigError(reason.to_string()));

        if self.notifier.max_attempts == 0 {
            return invalid("notifier.max_attempts must be at least 1");
        }
        if !self.notifier.multiplier.is_finite() || self.notifier.multiplier < 1.0 {
            return invalid("notifier.multiplier must be a finite number of at least 1");
        }
        if self.notifier.base_delay_ms > self.notifier.max_delay_ms {
            return invalid("notifier.base_delay_ms must not exceed notifier.max_delay_ms");
        }
        let timeouts = [
            self.generator.request_timeout_secs,
            self.hosting.request_timeout_secs,
            self.notifier.request_timeout_secs,
            self.workflow.resolve_timeout_secs,
            self.workflow.generate_timeout_secs,
            self.workflow.commit_timeout_secs,
            self.workflow.publish_timeout_secs,
        ];
        if timeouts.contains(&0) {
            return invalid("timeouts must be at least one second");
        }

        Ok(AppOptions {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(self.max_shutdown_delay_secs),
            },
            shared_secret: secret(self.shared_secret),
            server: ServerOptions {
                host: self.server.host,
                port: self.server.port,
            },
            generator: GeneratorOptions {
                base_url: self.generator.base_url,
                api_key: secret(self.generator.api_key),
                model: self.generator.model,
                temperature: self.generator.temperature,
                request_timeout: Duration::from_secs(self.generator.request_timeout_secs),
            },
            hosting: HostingOptions {
                provider: self.hosting.provider,
                api_url: self.hosting.api_url,
                token: secret(self.hosting.token),
                owner: self.hosting.owner,
                repo_prefix: self.hosting.repo_prefix,
                commit_policy: self.hosting.commit_policy,
                request_timeout: Duration::from_secs(self.hosting.request_timeout_secs),
            },
            notifier: NotifierOptions {
                retry: RetryPolicy {
                    max_attempts: self.notifier.max_attempts,
                    cooldown: CooldownOptions {
                        base_delay: Duration::from_millis(self.notifier.base_delay_ms),
                        max_delay: Duration::from_millis(self.notifier.max_delay_ms),
                        multiplier: self.notifier.multiplier,
                    },
                },
                request_timeout: Duration::from_secs(self.notifier.request_timeout_secs),
            },
            workflow: WorkflowSettings {
                resolve_timeout: Duration::from_secs(self.workflow.resolve_timeout_secs),
                generate_timeout: Duration::from_secs(self.workflow.generate_timeout_secs),
                commit_timeout: Duration::from_secs(self.workflow.commit_timeout_secs),
                publish_timeout: Duration::from_secs(self.workflow.publish_timeout_secs),
                verify_pages: self.workflow.verify_pages,
                verify_attempts: self.workflow.verify_attempts,
                verify_interval: Duration::from_secs(self.workflow.verify_interval_secs),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_gives_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.notifier.max_attempts, 5);
        assert_eq!(settings.hosting.provider, HostingProvider::GitHub);
        assert_eq!(settings.hosting.commit_policy, CommitPolicy::Additive);

        let options = settings.into_options().unwrap();
        assert!(options.shared_secret.is_none());
        assert_eq!(options.notifier.retry, RetryPolicy::default());
        assert_eq!(options.workflow.generate_timeout, Duration::from_secs(180));
    }

    #[test]
    fn test_partial_sections() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "hosting": {"provider": "memory", "commit_policy": "authoritative"},
                "log": {"level": "debug"}
            }"#,
        )
        .unwrap();
        assert_eq!(settings.hosting.provider, HostingProvider::Memory);
        assert_eq!(settings.hosting.commit_policy, CommitPolicy::Authoritative);
        assert_eq!(settings.hosting.api_url, DEFAULT_API_URL);
        assert_eq!(settings.log_options().log_level, LogLevel::Debug);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("STUDENT_SECRET", "fallback"),
            ("GITHUB_TOKEN", "ghp_token"),
            ("GITHUB_USERNAME", "someone"),
            ("PAGEDEPLOY_PORT", "9000"),
            ("OPENAI_API_KEY", "  "),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings {
            shared_secret: Some("from-file".to_string()),
            ..Default::default()
        };
        settings
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.shared_secret.as_deref(), Some("fallback"));
        assert_eq!(settings.hosting.owner, "someone");
        assert_eq!(settings.server.port, 9000);
        // Blank values do not override
        assert!(settings.generator.api_key.is_none());

        let options = settings.into_options().unwrap();
        assert_eq!(
            options.hosting.token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("ghp_token".to_string())
        );
    }

    #[test]
    fn test_shared_secret_wins_over_fallback() {
        let mut settings = Settings::default();
        settings
            .apply_env(|key| match key {
                "SHARED_SECRET" => Some("primary".to_string()),
                "STUDENT_SECRET" => Some("fallback".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(settings.shared_secret.as_deref(), Some("primary"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut settings = Settings::default();
        assert!(settings
            .apply_env(|key| (key == "PAGEDEPLOY_PORT").then(|| "http".to_string()))
            .is_err());

        let mut settings = Settings::default();
        settings.notifier.max_attempts = 0;
        assert!(settings.into_options().is_err());

        let mut settings = Settings::default();
        settings.workflow.commit_timeout_secs = 0;
        assert!(settings.into_options().is_err());
    }
}
