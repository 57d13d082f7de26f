//! Configuration module for banwatch Monitor.
//!
//! Configuration is read from a YAML file (or JSON, selected by a `.json`
//! extension). The file path comes from the `--config` flag, falling back to
//! the `BANWATCH_CONFIG` environment variable.
//!
//! # Example
//!
//! ```yaml
//! nftables_set:
//!   family: inet
//!   table: filter
//!   name: blacklist
//!   type: ipv4
//! rotation:
//!   grace_period_ms: 1000
//!   reopen_attempts: 5
//! stats:
//!   interval_secs: 3600
//! logging:
//!   level: info
//!   format: text
//! sources:
//!   - name: sshd
//!     logfile: /var/log/auth.log
//!     patterns:
//!       - 'Failed password for .* from (\S+) port'
//!     whitelist: [127.0.0.1, 10.0.0.0/8]
//!     log_level: notice
//! ```
//!
//! A source may carry its own `nftables_set`; otherwise the top-level one is
//! used. Patterns are not compiled here: an invalid pattern only disables
//! itself, see [`crate::matcher`].

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::matcher::AddressFamily;
use crate::whitelist::Whitelist;

/// Environment variable holding the configuration path.
pub const CONFIG_ENV_VAR: &str = "BANWATCH_CONFIG";

/// Default wait before re-opening a file after a possible rotation.
const DEFAULT_GRACE_PERIOD_MS: u64 = 1000;

/// Default number of re-open attempts after a possible rotation.
const DEFAULT_REOPEN_ATTEMPTS: u32 = 5;

/// Maximum allowed re-open attempts.
const MAX_REOPEN_ATTEMPTS: u32 = 60;

/// Default statistics reporting interval (in seconds).
const DEFAULT_STATS_INTERVAL_SECS: u64 = 3600;

/// nftables table families accepted by `nft`.
const NFT_FAMILIES: &[&str] = &["ip", "ip6", "inet", "arp", "bridge", "netdev"];

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Neither `--config` nor the environment variable was given.
    #[error("no configuration file given (use --config or BANWATCH_CONFIG)")]
    NoConfigPath,

    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML/JSON for this schema.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A value is present but not acceptable.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Syslog-style severity names, mapped onto tracing levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "panic")]
    Emerg,
    Alert,
    Crit,
    #[serde(alias = "error")]
    Err,
    #[serde(alias = "warn")]
    Warning,
    Notice,
    Info,
    Debug,
}

impl Severity {
    /// The most verbose tracing level enabled at this severity.
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Self::Emerg | Self::Alert | Self::Crit | Self::Err => LevelFilter::ERROR,
            Self::Warning => LevelFilter::WARN,
            Self::Notice | Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
        }
    }
}

/// nftables named set receiving addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetConfig {
    /// Table family (`inet`, `ip`, `ip6`, ...).
    #[serde(default = "default_table_family")]
    pub family: String,

    /// Table holding the set.
    pub table: String,

    /// Set name.
    pub name: String,

    /// Element type of the set, which is also the address family extracted.
    #[serde(rename = "type")]
    pub address_family: AddressFamily,
}

impl SetConfig {
    /// Label used in logs, e.g. `@blacklist`.
    pub fn target(&self) -> String {
        format!("@{}", self.name)
    }
}

fn default_table_family() -> String {
    "inet".to_string()
}

/// Behaviour after a notification that is not a plain append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Wait before re-opening the path, letting a rotation tool finish.
    pub grace_period_ms: u64,

    /// How many times the path is re-opened, one grace period apart, before
    /// giving up until the next event.
    pub reopen_attempts: u32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            reopen_attempts: DEFAULT_REOPEN_ATTEMPTS,
        }
    }
}

impl RotationConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Periodic statistics reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Seconds between reports; 0 disables periodic reporting.
    pub interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_STATS_INTERVAL_SECS,
        }
    }
}

impl StatsConfig {
    /// Reporting interval, or `None` when disabled.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

/// Output format of the process log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Process-wide logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum severity, overridden by `RUST_LOG` when set.
    pub level: Severity,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Severity::Info,
            format: LogFormat::Text,
        }
    }
}

/// One watched log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique name used in logs.
    pub name: String,

    /// Path of the log file.
    pub logfile: PathBuf,

    /// Regular expressions whose capture groups hold addresses.
    pub patterns: Vec<String>,

    /// Addresses and CIDR networks never forwarded.
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// Severity for this source's own messages; per-address debug output
    /// is only produced at `debug`.
    #[serde(default)]
    pub log_level: Option<Severity>,

    /// Set override for this source.
    #[serde(default, rename = "nftables_set")]
    pub set: Option<SetConfig>,
}

impl SourceConfig {
    /// Parses the whitelist entries.
    pub fn parse_whitelist(&self) -> Result<Whitelist, ConfigError> {
        Whitelist::parse(&self.whitelist).map_err(|e| ConfigError::InvalidValue {
            key: format!("sources.{}.whitelist", self.name),
            message: e.to_string(),
        })
    }
}

/// Configuration for banwatch Monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Default set for sources without their own.
    #[serde(default, rename = "nftables_set")]
    pub set: Option<SetConfig>,

    #[serde(default)]
    pub rotation: RotationConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Picks the configuration path from the CLI flag or the environment.
    pub fn resolve_path(cli: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = cli {
            return Ok(path);
        }
        match env::var(CONFIG_ENV_VAR) {
            Ok(val) if !val.trim().is_empty() => Ok(PathBuf::from(val)),
            _ => Err(ConfigError::NoConfigPath),
        }
    }

    /// Reads, parses and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let config = Self::parse(&content, is_json).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str, is_json: bool) -> Result<Self, String> {
        if is_json {
            serde_json::from_str(content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(content).map_err(|e| e.to_string())
        }
    }

    /// Checks everything that can be checked without touching the system.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(invalid("sources", "at least one source is required"));
        }

        if let Some(set) = &self.set {
            validate_set("nftables_set", set)?;
        }

        if self.rotation.grace_period_ms == 0 {
            return Err(invalid(
                "rotation.grace_period_ms",
                "must be greater than 0",
            ));
        }

        if !(1..=MAX_REOPEN_ATTEMPTS).contains(&self.rotation.reopen_attempts) {
            return Err(invalid(
                "rotation.reopen_attempts",
                &format!(
                    "must be between 1 and {MAX_REOPEN_ATTEMPTS}, got {}",
                    self.rotation.reopen_attempts
                ),
            ));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            let name = source.name.trim();
            if name.is_empty() {
                return Err(invalid("sources.name", "source name cannot be empty"));
            }
            if !names.insert(name) {
                return Err(invalid(
                    "sources.name",
                    &format!("duplicate source name '{name}'"),
                ));
            }
            if source.logfile.as_os_str().is_empty() {
                return Err(invalid(
                    &format!("sources.{name}.logfile"),
                    "log file path cannot be empty",
                ));
            }
            if source.patterns.is_empty() {
                return Err(invalid(
                    &format!("sources.{name}.patterns"),
                    "at least one pattern is required",
                ));
            }
            match &source.set {
                Some(set) => validate_set(&format!("sources.{name}.nftables_set"), set)?,
                None if self.set.is_none() => {
                    return Err(invalid(
                        &format!("sources.{name}.nftables_set"),
                        "no set given for the source and no top-level nftables_set",
                    ));
                }
                None => {}
            }
            source.parse_whitelist()?;
        }

        Ok(())
    }

    /// Set a source feeds: its own, or the top-level one.
    pub fn set_for<'a>(&'a self, source: &'a SourceConfig) -> Option<&'a SetConfig> {
        source.set.as_ref().or(self.set.as_ref())
    }

    /// Looks a source up by name.
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Distinct sets in use: the top-level one first, then per-source sets
    /// in source order.
    pub fn sets(&self) -> Vec<&SetConfig> {
        let mut sets: Vec<&SetConfig> = Vec::new();
        let per_source = self.sources.iter().filter_map(|s| s.set.as_ref());
        for set in self.set.iter().chain(per_source) {
            if !sets.contains(&set) {
                sets.push(set);
            }
        }
        sets
    }
}

fn validate_set(key: &str, set: &SetConfig) -> Result<(), ConfigError> {
    if set.table.trim().is_empty() {
        return Err(invalid(&format!("{key}.table"), "table name cannot be empty"));
    }
    if set.name.trim().is_empty() {
        return Err(invalid(&format!("{key}.name"), "set name cannot be empty"));
    }
    if !NFT_FAMILIES.contains(&set.family.as_str()) {
        return Err(invalid(
            &format!("{key}.family"),
            &format!(
                "unknown table family '{}', expected one of {}",
                set.family,
                NFT_FAMILIES.join(", ")
            ),
        ));
    }
    Ok(())
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
