//! Destinations for extracted addresses.
//!
//! A [`Sink`] receives the deduplicated addresses of one read pass and
//! performs the block action. The tailer only relies on the contract of
//! [`Sink::add`]: on success it returns the addresses that were actually
//! added; on error nothing may be assumed added.
//!
//! - [`NftablesSink`]: adds elements to an nftables named set via `nft`
//! - [`DryRunSink`]: logs what would be added and touches nothing

mod dry_run;
mod nftables;

use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;

pub use dry_run::DryRunSink;
pub use nftables::NftablesSink;

/// Errors returned by a sink.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The backend program could not be started.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend program ran and reported a failure.
    #[error("{program} failed ({status}): {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Receiver of the addresses found in a read pass.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Human readable target used in logs, e.g. `@blacklist`.
    fn target(&self) -> String;

    /// Adds the addresses and returns the ones actually added.
    async fn add(&self, addresses: &[IpAddr]) -> Result<Vec<IpAddr>, SinkError>;
}
