//! Addresses and networks that must never be forwarded to the sink.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use thiserror::Error;

/// A whitelist entry could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid whitelist entry '{0}': expected an IP address or CIDR network")]
pub struct WhitelistParseError(pub String);

/// A single whitelist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitelistEntry {
    /// A single address.
    Address(IpAddr),
    /// Every address inside a network.
    Network(IpNet),
}

impl WhitelistEntry {
    fn contains(&self, address: &IpAddr) -> bool {
        match self {
            Self::Address(entry) => entry == address,
            Self::Network(net) => net.contains(address),
        }
    }
}

impl FromStr for WhitelistEntry {
    type Err = WhitelistParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.contains('/') {
            trimmed
                .parse::<IpNet>()
                .map(|net| Self::Network(net.trunc()))
                .map_err(|_| WhitelistParseError(s.to_string()))
        } else {
            trimmed
                .parse::<IpAddr>()
                .map(|addr| Self::Address(addr.to_canonical()))
                .map_err(|_| WhitelistParseError(s.to_string()))
        }
    }
}

impl fmt::Display for WhitelistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(addr) => write!(f, "{addr}"),
            Self::Network(net) => write!(f, "{net}"),
        }
    }
}

/// Immutable list of whitelisted addresses.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    entries: Vec<WhitelistEntry>,
}

impl Whitelist {
    /// Parses every entry, failing on the first invalid one.
    pub fn parse<I, S>(entries: I) -> Result<Self, WhitelistParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// Returns `true` if the address is covered by any entry.
    pub fn contains(&self, address: &IpAddr) -> bool {
        let address = address.to_canonical();
        self.entries.iter().any(|entry| entry.contains(&address))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the whitelist has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
