//! nftables named-set sink.
//!
//! Elements are added with a single `nft add element` command per pass, so
//! either every element is added or none is. Removal works the same way
//! with `nft delete element`.

use std::net::IpAddr;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Sink, SinkError};
use crate::config::SetConfig;

/// Default `nft` program, looked up in `PATH`.
const NFT_PROGRAM: &str = "nft";

/// Only digits, dots, colons and lowercase hex may reach the nft parser.
fn is_safe_nft_element(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ':' || ('a'..='f').contains(&c))
}

/// Adds addresses to an existing nftables set.
#[derive(Debug, Clone)]
pub struct NftablesSink {
    set: SetConfig,
    program: String,
}

impl NftablesSink {
    #[must_use]
    pub fn new(set: SetConfig) -> Self {
        Self {
            set,
            program: NFT_PROGRAM.to_string(),
        }
    }

    /// Uses another executable in place of `nft`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Verifies that the set exists.
    pub async fn check(&self) -> Result<(), SinkError> {
        let args = [
            "list".to_string(),
            "set".to_string(),
            self.set.family.clone(),
            self.set.table.clone(),
            self.set.name.clone(),
        ];
        self.run(&args).await
    }

    /// Removes addresses from the set and returns the ones removed.
    ///
    /// Addresses the set cannot hold are skipped, as in [`Sink::add`]. An
    /// address that is not in the set makes `nft` fail the whole command.
    pub async fn delete(&self, addresses: &[IpAddr]) -> Result<Vec<IpAddr>, SinkError> {
        self.edit("delete", addresses).await
    }

    /// Runs one `nft <verb> element` command for every acceptable address.
    async fn edit(&self, verb: &str, addresses: &[IpAddr]) -> Result<Vec<IpAddr>, SinkError> {
        let elements = self.elements(addresses);
        if elements.is_empty() {
            return Ok(Vec::new());
        }

        let rendered: Vec<String> = elements.iter().map(|(_, e)| e.clone()).collect();
        self.run(&self.element_args(verb, &rendered)).await?;

        Ok(elements.into_iter().map(|(address, _)| address).collect())
    }

    /// Builds the `nft` arguments applying `verb` to `elements`.
    fn element_args(&self, verb: &str, elements: &[String]) -> Vec<String> {
        vec![
            verb.to_string(),
            "element".to_string(),
            self.set.family.clone(),
            self.set.table.clone(),
            self.set.name.clone(),
            format!("{{ {} }}", elements.join(", ")),
        ]
    }

    /// Keeps the addresses the set can hold, in nft element form.
    fn elements(&self, addresses: &[IpAddr]) -> Vec<(IpAddr, String)> {
        addresses
            .iter()
            .map(IpAddr::to_canonical)
            .filter(|address| {
                let accepted = self.set.address_family.accepts(address);
                if !accepted {
                    warn!(
                        address = %address,
                        set = %self.set.name,
                        expected = %self.set.address_family,
                        "Address does not fit set type, skipping"
                    );
                }
                accepted
            })
            .filter_map(|address| {
                let element = address.to_string();
                if is_safe_nft_element(&element) {
                    Some((address, element))
                } else {
                    warn!(element = %element, "Filtered unsafe nftables element");
                    None
                }
            })
            .collect()
    }

    async fn run(&self, args: &[String]) -> Result<(), SinkError> {
        debug!(program = %self.program, args = ?args, "Executing");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|source| SinkError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(SinkError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl Sink for NftablesSink {
    fn target(&self) -> String {
        self.set.target()
    }

    async fn add(&self, addresses: &[IpAddr]) -> Result<Vec<IpAddr>, SinkError> {
        self.edit("add", addresses).await
    }
}
