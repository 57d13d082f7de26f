//! banwatch Monitor - log-driven IP blocking.
//!
//! This crate tails append-only log files, extracts IP addresses matching
//! configured patterns, and adds them to an nftables named set.
//!
//! # Overview
//!
//! Each configured source gets its own [`Tailer`]. It keeps the read offset
//! and identity of one file, reacts to change notifications from the OS, and
//! survives truncation and rotation. Lines are matched by a
//! [`PatternMatcher`]; the distinct, non-whitelisted addresses of a read
//! pass are handed to a [`Sink`].
//!
//! # Modules
//!
//! - [`address_set`]: ordered, deduplicating address container
//! - [`commands`]: scan, manual block/unblock and source supervision
//! - [`config`]: YAML/JSON configuration
//! - [`error`]: Error types for monitor operations
//! - [`file_id`]: device/inode file identity
//! - [`matcher`]: pattern matching and address validation
//! - [`notifier`]: OS change notifications as typed events
//! - [`sink`]: firewall backends
//! - [`stats`]: per-source counters and periodic reporting
//! - [`tailer`]: per-source read loop
//! - [`whitelist`]: addresses and networks that are never blocked

pub mod address_set;
pub mod commands;
pub mod config;
pub mod error;
pub mod file_id;
pub mod matcher;
pub mod notifier;
pub mod sink;
pub mod stats;
pub mod tailer;
pub mod whitelist;

pub use address_set::AddressSet;
pub use config::{Config, ConfigError, SetConfig, SourceConfig};
pub use error::{MonitorError, Result};
pub use file_id::FileId;
pub use matcher::{AddressFamily, PatternMatcher};
pub use notifier::{ChangeEvent, ChangeNotifier, NotifierError, RotationHint};
pub use sink::{DryRunSink, NftablesSink, Sink, SinkError};
pub use stats::{SourceStats, StatsEntry, StatsSnapshot};
pub use tailer::{Tailer, TailerError, TailerState};
pub use whitelist::{Whitelist, WhitelistEntry};
