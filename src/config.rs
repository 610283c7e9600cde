//! Agent configuration.
//!
//! Loaded from a YAML file with the same shape the agent's deployment tooling
//! writes. A missing file falls back to defaults, so the agent can start with
//! nothing but an API key from the environment.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable whose value, when set, is appended to the accepted
/// API key set.
pub const ENV_API_KEY: &str = "EXECD_API_KEY";

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_header_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 16000,
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            idle_timeout_secs: 60,
            max_header_bytes: 1 << 20,
        }
    }
}

/// Accepted credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub api_keys: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_keys: vec!["default-api-key".into()],
        }
    }
}

/// Executor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub max_concurrent_jobs: usize,
    pub default_timeout_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 10,
            default_timeout_seconds: 1800,
        }
    }
}

/// Log level for the tracing subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// Storage backend selection and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub cleanup_interval_hours: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: "memory".into(),
            cleanup_interval_hours: 24,
        }
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub executor: ExecutorConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from `path`, append the [`ENV_API_KEY`] credential
    /// when present, and validate the result. A missing file yields the
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_yaml::from_str(&data)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(key) = std::env::var(ENV_API_KEY) {
            if !key.is_empty() {
                config.security.api_keys.push(key);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("invalid port number: 0");
        }
        if self.security.api_keys.is_empty() {
            bail!("at least one API key must be configured");
        }
        if self.executor.max_concurrent_jobs == 0 {
            bail!("max_concurrent_jobs must be greater than 0");
        }
        if self.executor.default_timeout_seconds == 0 {
            bail!("default_timeout_seconds must be greater than 0");
        }
        if self.storage.kind != "memory" {
            bail!("unsupported storage type: {}", self.storage.kind);
        }
        Ok(())
    }

    /// Address the HTTP listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
