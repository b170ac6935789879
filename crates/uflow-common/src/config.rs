//! ---
//! uflow_section: "01-core-functionality"
//! uflow_subsection: "module"
//! uflow_type: "source"
//! uflow_scope: "code"
//! uflow_description: "Shared primitives and utilities for the core runtime."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;
use uuid::Uuid;

use crate::logging::LogFormat;

fn default_strategy() -> FetchStrategy {
    FetchStrategy::Concurrent
}

fn default_stage_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_millis(250)
}

fn default_retry_jitter() -> Duration {
    Duration::from_millis(50)
}

fn default_retry_seed() -> u64 {
    0xBAC_0FF
}

fn default_directory_latency() -> Duration {
    Duration::from_secs(2)
}

fn default_directory_seed() -> u64 {
    0x5EED_CAFE
}

fn default_directory_name() -> String {
    "User Name".to_owned()
}

fn default_directory_age() -> u32 {
    20
}

fn default_directory_premium() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the UserFlow runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "UFLOW_CONFIG";

    /// Load configuration from disk, respecting the `UFLOW_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.orchestrator.validate()?;
        self.directory.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Scheduling model used for the three identifier-dependent lookups.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Each lookup awaits the previous one.
    Sequential,
    /// Fan the dependent lookups out together and join them, failing fast.
    #[default]
    Concurrent,
}

impl FetchStrategy {
    pub fn is_concurrent(&self) -> bool {
        matches!(self, FetchStrategy::Concurrent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStrategy::Sequential => "sequential",
            FetchStrategy::Concurrent => "concurrent",
        }
    }
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FetchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(FetchStrategy::Sequential),
            "concurrent" => Ok(FetchStrategy::Concurrent),
            other => Err(format!("unknown fetch strategy: {}", other)),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_strategy")]
    pub strategy: FetchStrategy,
    #[serde(default = "default_stage_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub stage_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stage_timeout.is_zero() {
            return Err(anyhow!("orchestrator stage_timeout must be non-zero"));
        }
        Ok(())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            stage_timeout: default_stage_timeout(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_base_delay")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub base_delay: Duration,
    #[serde(default = "default_retry_jitter")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub jitter: Duration,
    #[serde(default = "default_retry_seed")]
    pub seed: u64,
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("retry max_attempts must be at least 1"));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            jitter: default_retry_jitter(),
            seed: default_retry_seed(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_directory_latency")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub latency: Duration,
    #[serde(default)]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub jitter: Option<Duration>,
    #[serde(default = "default_directory_seed")]
    pub seed: u64,
    #[serde(default)]
    pub identity: Option<Uuid>,
    #[serde(default)]
    pub random_identity: bool,
    #[serde(default = "default_directory_name")]
    pub name: String,
    #[serde(default = "default_directory_age")]
    pub age: u32,
    #[serde(default = "default_directory_premium")]
    pub premium: bool,
}

impl DirectoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("directory canned name must not be empty"));
        }
        if self.random_identity && self.identity.is_some() {
            return Err(anyhow!(
                "directory identity and random_identity are mutually exclusive"
            ));
        }
        Ok(())
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            latency: default_directory_latency(),
            jitter: None,
            seed: default_directory_seed(),
            identity: None,
            random_identity: false,
            name: default_directory_name(),
            age: default_directory_age(),
            premium: default_directory_premium(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = "".parse().expect("empty config parses");
        assert_eq!(config.orchestrator.strategy, FetchStrategy::Concurrent);
        assert_eq!(config.orchestrator.stage_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.directory.latency, Duration::from_secs(2));
        assert_eq!(config.directory.name, "User Name");
    }

    #[test]
    fn full_document_round_trips() {
        let raw = r#"
            [orchestrator]
            strategy = "sequential"
            stage_timeout = 1500

            [directory]
            latency = 40
            jitter = 5
            name = "Ada"
            age = 30
            premium = true

            [retry]
            max_attempts = 5
            base_delay = 10
            jitter = 2
        "#;
        let config: AppConfig = raw.parse().expect("full config parses");
        assert_eq!(config.orchestrator.strategy, FetchStrategy::Sequential);
        assert_eq!(
            config.orchestrator.stage_timeout,
            Duration::from_millis(1500)
        );
        assert_eq!(config.directory.jitter, Some(Duration::from_millis(5)));
        assert_eq!(config.directory.age, 30);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let raw = "[retry]\nmax_attempts = 0\n";
        assert!(raw.parse::<AppConfig>().is_err());
    }

    #[test]
    fn empty_canned_name_is_rejected() {
        let raw = "[directory]\nname = \" \"\n";
        assert!(raw.parse::<AppConfig>().is_err());
    }

    #[test]
    fn conflicting_identity_settings_are_rejected() {
        let raw = format!(
            "[directory]\nidentity = \"{}\"\nrandom_identity = true\n",
            Uuid::nil()
        );
        assert!(raw.parse::<AppConfig>().is_err());
    }

    #[test]
    fn strategy_parses_from_str() {
        assert_eq!(
            "Sequential".parse::<FetchStrategy>().unwrap(),
            FetchStrategy::Sequential
        );
        assert!("parallel".parse::<FetchStrategy>().is_err());
    }

    #[test]
    fn load_with_source_reads_candidate_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("uflow.toml");
        std::fs::write(&path, "[orchestrator]\nstrategy = \"sequential\"\n").expect("write config");
        let loaded = AppConfig::load_with_source(&[&path]).expect("config loads");
        assert_eq!(loaded.source, path);
        assert_eq!(
            loaded.config.orchestrator.strategy,
            FetchStrategy::Sequential
        );
    }
}
