//! Error types for banwatch Monitor.
//!
//! Each module owns a focused error enum; [`MonitorError`] gathers them for
//! callers that drive several modules at once.

use thiserror::Error;

use crate::config::ConfigError;
use crate::notifier::NotifierError;
use crate::sink::SinkError;
use crate::tailer::TailerError;

/// Errors that can occur during monitor operations.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use banwatch_monitor::config::Config;
/// use banwatch_monitor::error::Result;
///
/// fn source_count(path: &Path) -> Result<usize> {
///     let config = Config::load(path)?;
///     Ok(config.sources.len())
/// }
/// ```
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A source's tailer failed.
    #[error("tailer error: {0}")]
    Tailer(#[from] TailerError),

    /// The firewall backend failed.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Change notifications failed.
    #[error("notification error: {0}")]
    Notifier(#[from] NotifierError),

    /// No source with this name is configured.
    #[error("no source named '{0}'")]
    UnknownSource(String),

    /// No nftables set with this name is configured.
    #[error("no nftables set named '{0}' in the configuration")]
    UnknownSet(String),

    /// The configuration does not use exactly one set and none was chosen.
    #[error("choose an nftables set with --set (configured: {0})")]
    SetRequired(String),

    /// A source has no set of its own and there is no top-level set.
    #[error("no nftables set for source '{0}'")]
    NoSetForSource(String),
}

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
