//! Manual edits of a set: block or unblock a single address.

use std::net::IpAddr;

use tracing::info;

use crate::config::{Config, SetConfig};
use crate::error::{MonitorError, Result};
use crate::sink::{NftablesSink, Sink};

/// Which way a manual edit goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementAction {
    /// Add the address to the set.
    Block,
    /// Remove the address from the set.
    Unblock,
}

/// Picks the set a manual edit applies to.
///
/// `name` selects a set by its nftables name. Without a name the
/// configuration must use exactly one set.
pub fn resolve_set<'a>(config: &'a Config, name: Option<&str>) -> Result<&'a SetConfig> {
    let sets = config.sets();
    if let Some(name) = name {
        return sets
            .into_iter()
            .find(|set| set.name == name)
            .ok_or_else(|| MonitorError::UnknownSet(name.to_string()));
    }

    match sets.as_slice() {
        [set] => Ok(*set),
        [] => Err(MonitorError::SetRequired("none".to_string())),
        several => Err(MonitorError::SetRequired(
            several
                .iter()
                .map(|set| set.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )),
    }
}

/// Adds or removes one address. Returns `false` when the set cannot hold
/// the address and nothing was run.
pub async fn apply(sink: &NftablesSink, action: ElementAction, address: IpAddr) -> Result<bool> {
    let changed = match action {
        ElementAction::Block => sink.add(&[address]).await?,
        ElementAction::Unblock => sink.delete(&[address]).await?,
    };

    if changed.is_empty() {
        return Ok(false);
    }
    info!(address = %address, set = %sink.target(), action = ?action, "Set updated");
    Ok(true)
}
