//! Sink that only logs.

use std::net::IpAddr;

use async_trait::async_trait;
use tracing::info;

use super::{Sink, SinkError};

/// Reports every address as added without touching the firewall.
#[derive(Debug, Clone)]
pub struct DryRunSink {
    target: String,
}

impl DryRunSink {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl Sink for DryRunSink {
    fn target(&self) -> String {
        format!("{} (dry run)", self.target)
    }

    async fn add(&self, addresses: &[IpAddr]) -> Result<Vec<IpAddr>, SinkError> {
        for address in addresses {
            info!(address = %address, set = %self.target, "Would add address");
        }
        Ok(addresses.to_vec())
    }
}
