//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section has defaults, so a partial file is valid. The marketplace
//! credential is never stored in the file: it is resolved from the
//! environment at startup and kept behind `secrecy`.
//!
//! Recognized environment options:
//! - `API_KEY`: marketplace credential (after `marketplace.api_key_env`)
//! - `POLL_INTERVAL`: cycle period in seconds
//! - `PORT`: status server bind port

use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::SearchQuery;

/// Fallback credential variable when the configured one is unset.
pub const API_KEY_ENV: &str = "API_KEY";
pub const POLL_INTERVAL_ENV: &str = "POLL_INTERVAL";
pub const PORT_ENV: &str = "PORT";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub marketplace: MarketplaceConfig,
    pub analysis: AnalysisConfig,
    pub status: StatusConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketplaceConfig {
    pub base_url: String,
    /// Name of the env var holding the API key. `API_KEY` is tried next.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub query: SearchQuery,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://developer-lostark.game.onstove.com".into(),
            api_key_env: "LOSTARK_API_KEY".into(),
            timeout_secs: 30,
            query: SearchQuery::default(),
        }
    }
}

impl MarketplaceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve the API key from `api_key_env`, then `API_KEY`.
    pub fn resolve_api_key(&self) -> Result<SecretString> {
        [self.api_key_env.as_str(), API_KEY_ENV]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|value| !value.trim().is_empty())
            .map(|value| SecretString::new(value.trim().to_string()))
            .with_context(|| {
                format!(
                    "No marketplace API key: set {} or {API_KEY_ENV}",
                    self.api_key_env
                )
            })
    }
}

/// Which analysis engine runs the z-score test.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisEngine {
    /// External process speaking the JSON stdout/exit-code protocol.
    #[default]
    Process,
    /// In-process z-score routine.
    Builtin,
}

/// How the serialized request reaches the analysis process.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisInput {
    /// Appended as the last command-line argument.
    #[default]
    Argument,
    /// Written to stdin, which is then closed.
    Stdin,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    pub engine: AnalysisEngine,
    pub program: String,
    pub args: Vec<String>,
    pub input: AnalysisInput,
    pub working_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub max_output_bytes: usize,
    /// Builtin engine: flag listings at or below this z-score.
    pub z_threshold: f64,
    /// Builtin engine: minimum sample size before anything is flagged.
    pub min_samples: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            engine: AnalysisEngine::Process,
            program: "python3".into(),
            args: vec!["analysis.py".into()],
            input: AnalysisInput::Argument,
            working_dir: None,
            timeout_secs: 60,
            max_output_bytes: 1024 * 1024,
            z_threshold: -1.5,
            min_samples: 5,
        }
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub port: u16,
    /// Reported verbatim by `/api/history`.
    pub db_type: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
            db_type: "none".into(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Apply `POLL_INTERVAL` and `PORT` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(POLL_INTERVAL_ENV) {
            self.scheduler.poll_interval_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("{POLL_INTERVAL_ENV} must be whole seconds, got '{raw}'"))?;
        }
        if let Some(raw) = lookup(PORT_ENV) {
            self.status.port = raw
                .trim()
                .parse()
                .with_context(|| format!("{PORT_ENV} must be a port number, got '{raw}'"))?;
        }
        Ok(())
    }

    /// Reject values that would make a cycle unbounded or never run.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.poll_interval_secs == 0 {
            bail!("scheduler.poll_interval_secs must be > 0");
        }
        if self.marketplace.timeout_secs == 0 {
            bail!("marketplace.timeout_secs must be > 0");
        }
        if self.analysis.timeout_secs == 0 {
            bail!("analysis.timeout_secs must be > 0");
        }
        if self.analysis.max_output_bytes == 0 {
            bail!("analysis.max_output_bytes must be > 0");
        }
        if self.analysis.engine == AnalysisEngine::Process && self.analysis.program.trim().is_empty() {
            bail!("analysis.program is required for the process engine");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.poll_interval_secs)
    }
}
