//! One read pass over a source's file, without touching nftables.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{MonitorError, Result};
use crate::sink::DryRunSink;
use crate::tailer::Tailer;

/// What a scan found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub source: String,
    pub logfile: PathBuf,
    /// Set the addresses would be added to, as `@name`.
    pub set: String,
    pub addresses: Vec<IpAddr>,
    pub lines: u64,
    pub bytes: u64,
}

/// Reads the named source's file from the start and collects the addresses
/// a first pass would block.
pub fn scan(config: &Config, name: &str) -> Result<ScanReport> {
    let source = config
        .source(name)
        .ok_or_else(|| MonitorError::UnknownSource(name.to_string()))?;
    let set = config
        .set_for(source)
        .ok_or_else(|| MonitorError::NoSetForSource(name.to_string()))?;

    let sink = Arc::new(DryRunSink::new(set.target()));
    let mut tailer = Tailer::new(source, set, config.rotation.clone(), sink)?;
    tailer.open()?;
    let found = tailer.read_pass()?;
    let snapshot = tailer.stats().snapshot();

    Ok(ScanReport {
        source: tailer.name().to_string(),
        logfile: tailer.path().to_path_buf(),
        set: set.target(),
        addresses: found.addresses(),
        lines: snapshot.lines_read,
        bytes: snapshot.bytes_read,
    })
}
