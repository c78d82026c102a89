//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::services::classifier::DEFAULT_SMARTLINK_DOMAINS;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

/// What a batch tick does when the known-valid lookup fails for a GTIN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailurePolicy {
    /// Treat the failed GTIN as having no matching serials
    #[default]
    NoMatch,
    /// Abandon the tick without consuming an attempt
    SkipTick,
}

impl LookupFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupFailurePolicy::NoMatch => "no_match",
            LookupFailurePolicy::SkipTick => "skip_tick",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Capacity of the session event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            batch_interval_ms: default_batch_interval_ms(),
            max_attempts: default_max_attempts(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_sample_interval_ms() -> u64 {
    100
}

fn default_batch_interval_ms() -> u64 {
    3000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_event_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmartLinkConfig {
    #[serde(default = "default_smartlink_domains")]
    pub domains: Vec<String>,
}

impl Default for SmartLinkConfig {
    fn default() -> Self {
        Self { domains: default_smartlink_domains() }
    }
}

fn default_smartlink_domains() -> Vec<String> {
    DEFAULT_SMARTLINK_DOMAINS.iter().map(|d| d.to_string()).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
    /// TOML file holding the known-valid GTIN/serial table
    #[serde(default = "default_table_file")]
    pub table_file: String,
    #[serde(default)]
    pub on_failure: LookupFailurePolicy,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self { table_file: default_table_file(), on_failure: LookupFailurePolicy::default() }
    }
}

fn default_table_file() -> String {
    "known_valid.toml".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub smartlink: SmartLinkConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    sample_interval_ms: u64,
    batch_interval_ms: u64,
    max_attempts: NonZeroU32,
    event_capacity: usize,
    smartlink_domains: Vec<String>,
    lookup_table_file: String,
    lookup_failure_policy: LookupFailurePolicy,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_interval_ms: 100,
            batch_interval_ms: 3000,
            max_attempts: NonZeroU32::MIN.saturating_add(2),
            event_capacity: 64,
            smartlink_domains: default_smartlink_domains(),
            lookup_table_file: "known_valid.toml".to_string(),
            lookup_failure_policy: LookupFailurePolicy::NoMatch,
            metrics_interval_secs: 10,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path: CLI value, then CONFIG_FILE, then the default
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }
        env::var("CONFIG_FILE").unwrap_or_else(|_| "config/dev.toml".to_string())
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Self::from_toml(toml_config, path.display().to_string())
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> anyhow::Result<Self> {
        let Some(max_attempts) = NonZeroU32::new(toml_config.scan.max_attempts) else {
            bail!("scan.max_attempts must be at least 1");
        };
        if toml_config.scan.sample_interval_ms == 0 || toml_config.scan.batch_interval_ms == 0 {
            bail!("scan intervals must be greater than zero");
        }

        Ok(Self {
            sample_interval_ms: toml_config.scan.sample_interval_ms,
            batch_interval_ms: toml_config.scan.batch_interval_ms,
            max_attempts,
            event_capacity: toml_config.scan.event_capacity.max(1),
            smartlink_domains: toml_config.smartlink.domains,
            lookup_table_file: toml_config.lookup.table_file,
            lookup_failure_policy: toml_config.lookup.on_failure,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(cli_path: Option<&str>) -> Self {
        Self::load_from_path(&Self::resolve_config_path(cli_path))
    }

    /// Load configuration from a path, falling back to defaults on any error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn sample_interval_ms(&self) -> u64 {
        self.sample_interval_ms
    }

    pub fn batch_interval_ms(&self) -> u64 {
        self.batch_interval_ms
    }

    pub fn max_attempts(&self) -> NonZeroU32 {
        self.max_attempts
    }

    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    pub fn smartlink_domains(&self) -> &[String] {
        &self.smartlink_domains
    }

    pub fn lookup_table_file(&self) -> &str {
        &self.lookup_table_file
    }

    pub fn lookup_failure_policy(&self) -> LookupFailurePolicy {
        self.lookup_failure_policy
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to override max attempts
    pub fn with_max_attempts(mut self, max_attempts: NonZeroU32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Builder method to override both tick intervals
    pub fn with_intervals(mut self, sample: Duration, batch: Duration) -> Self {
        self.sample_interval_ms = sample.as_millis().max(1) as u64;
        self.batch_interval_ms = batch.as_millis().max(1) as u64;
        self
    }

    /// Builder method to override the lookup failure policy
    pub fn with_lookup_failure_policy(mut self, policy: LookupFailurePolicy) -> Self {
        self.lookup_failure_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sample_interval_ms(), 100);
        assert_eq!(config.batch_interval_ms(), 3000);
        assert_eq!(config.max_attempts().get(), 3);
        assert_eq!(config.smartlink_domains(), &["amazon.com", "transparency.com"]);
        assert_eq!(config.lookup_failure_policy(), LookupFailurePolicy::NoMatch);
        assert_eq!(config.lookup_table_file(), "known_valid.toml");
    }

    #[test]
    fn test_toml_defaults_match_config_defaults() {
        let parsed: TomlConfig = toml::from_str("").unwrap();
        let config = Config::from_toml(parsed, "inline".to_string()).unwrap();
        let defaults = Config::default();
        assert_eq!(config.sample_interval_ms(), defaults.sample_interval_ms());
        assert_eq!(config.batch_interval_ms(), defaults.batch_interval_ms());
        assert_eq!(config.max_attempts(), defaults.max_attempts());
        assert_eq!(config.event_capacity(), defaults.event_capacity());
        assert_eq!(config.smartlink_domains(), defaults.smartlink_domains());
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let parsed: TomlConfig = toml::from_str("[scan]\nmax_attempts = 0\n").unwrap();
        let err = Config::from_toml(parsed, "inline".to_string()).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let parsed: TomlConfig = toml::from_str("[scan]\nbatch_interval_ms = 0\n").unwrap();
        assert!(Config::from_toml(parsed, "inline".to_string()).is_err());
    }

    #[test]
    fn test_lookup_policy_parses_snake_case() {
        let parsed: TomlConfig = toml::from_str("[lookup]\non_failure = \"skip_tick\"\n").unwrap();
        assert_eq!(parsed.lookup.on_failure, LookupFailurePolicy::SkipTick);
        assert_eq!(parsed.lookup.table_file, "known_valid.toml");
    }

    #[test]
    fn test_resolve_config_path_prefers_cli_value() {
        assert_eq!(Config::resolve_config_path(Some("config/store.toml")), "config/store.toml");
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(None), "config/dev.toml");
        }
    }

    #[test]
    fn test_builders() {
        let config = Config::default()
            .with_max_attempts(NonZeroU32::new(5).unwrap())
            .with_intervals(Duration::from_millis(10), Duration::from_millis(50))
            .with_lookup_failure_policy(LookupFailurePolicy::SkipTick);
        assert_eq!(config.max_attempts().get(), 5);
        assert_eq!(config.sample_interval(), Duration::from_millis(10));
        assert_eq!(config.batch_interval(), Duration::from_millis(50));
        assert_eq!(config.lookup_failure_policy(), LookupFailurePolicy::SkipTick);
    }
}
