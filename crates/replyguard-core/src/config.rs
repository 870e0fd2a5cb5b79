//! Configuration — YAML config + env var overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Env vars that override individual config fields.
const ENV_TIMEOUT_SECONDS: &str = "REPLYGUARD_TIMEOUT_SECONDS";
const ENV_SCAN_INTERVAL_SECONDS: &str = "REPLYGUARD_SCAN_INTERVAL_SECONDS";
const ENV_REPLY_ENDPOINT: &str = "REPLYGUARD_REPLY_ENDPOINT";
const ENV_API_KEY: &str = "REPLYGUARD_API_KEY";
const ENV_REPLY_TIMEOUT_SECONDS: &str = "REPLYGUARD_REPLY_TIMEOUT_SECONDS";
const ENV_PORT: &str = "PORT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Silence after the last customer message before escalating
    #[serde(default = "default_timeout_threshold")]
    pub timeout_threshold_seconds: u64,

    /// Seconds between scanner passes
    #[serde(default = "default_scan_interval")]
    pub scan_interval_seconds: u64,

    /// Chat-messages endpoint of the reply generator
    #[serde(default = "default_reply_endpoint")]
    pub reply_endpoint: String,

    /// Bearer credential for the reply generator (set here or via env var)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Upper bound on a single reply generator call
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_seconds: u64,

    /// HTTP port for the ingestion server
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_timeout_threshold() -> u64 {
    30
}
fn default_scan_interval() -> u64 {
    30
}
fn default_reply_endpoint() -> String {
    "https://api.dify.ai/v1/chat-messages".into()
}
fn default_reply_timeout() -> u64 {
    30
}
fn default_port() -> u16 {
    8000
}

impl Config {
    /// Load config from a YAML file with env var overrides, then validate.
    /// A missing file is not an error: defaults plus env vars are used instead.
    pub fn load(config_path: &Path) -> Result<Self> {
        Self::load_with_env(config_path, |var| std::env::var(var).ok())
    }

    /// `load` with the environment supplied by `env`.
    fn load_with_env<F>(config_path: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config: {}", config_path.display()))?;
            serde_yaml::from_str(&content).context("Failed to parse config.yaml")?
        } else {
            info!(
                "No config at {}, using defaults and environment",
                config_path.display()
            );
            Config::default()
        };

        config.apply_env_overrides(&env)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from the default location (project_root/config.yaml)
    pub fn load_from_dir(project_root: &Path) -> Result<Self> {
        Self::load(&project_root.join("config.yaml"))
    }

    fn apply_env_overrides<F>(&mut self, env: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secs) = env_number(env, ENV_TIMEOUT_SECONDS)? {
            self.timeout_threshold_seconds = secs;
        }
        if let Some(secs) = env_number(env, ENV_SCAN_INTERVAL_SECONDS)? {
            self.scan_interval_seconds = secs;
        }
        if let Some(url) = env(ENV_REPLY_ENDPOINT) {
            self.reply_endpoint = url;
        }
        if let Some(key) = env(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(secs) = env_number(env, ENV_REPLY_TIMEOUT_SECONDS)? {
            self.reply_timeout_seconds = secs;
        }
        if let Some(port) = env_number(env, ENV_PORT)? {
            self.port = port;
        }
        Ok(())
    }

    /// Refuse to run with a disabled escalation path or a degenerate schedule.
    pub fn validate(&self) -> Result<()> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {}
            _ => anyhow::bail!(
                "Reply generator credential missing: set api_key in config.yaml or {}",
                ENV_API_KEY
            ),
        }
        if self.reply_endpoint.trim().is_empty() {
            anyhow::bail!("reply_endpoint must not be empty");
        }
        if self.timeout_threshold_seconds == 0 {
            anyhow::bail!("timeout_threshold_seconds must be greater than zero");
        }
        if self.scan_interval_seconds == 0 {
            anyhow::bail!("scan_interval_seconds must be greater than zero");
        }
        if self.reply_timeout_seconds == 0 {
            anyhow::bail!("reply_timeout_seconds must be greater than zero");
        }
        Ok(())
    }

    pub fn timeout_threshold(&self) -> Duration {
        Duration::from_secs(self.timeout_threshold_seconds)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_seconds)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_seconds)
    }
}

fn env_number<F, T>(env: &F, var: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", var, raw)),
        None => Ok(None),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_threshold_seconds: default_timeout_threshold(),
            scan_interval_seconds: default_scan_interval(),
            reply_endpoint: default_reply_endpoint(),
            api_key: None,
            reply_timeout_seconds: default_reply_timeout(),
            port: default_port(),
        }
    }
}
