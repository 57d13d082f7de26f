//! Address extraction from log lines.
//!
//! A [`PatternMatcher`] holds the compiled patterns of one source. For every
//! line it runs each pattern in declaration order, collects every non-empty
//! capture group of every match and validates it as an address of the
//! configured [`AddressFamily`]. Captures that are not addresses, or that are
//! of the other family, are reported and skipped; whitelisted addresses are
//! dropped. Nothing here aborts a line or a pass.
//!
//! # Example
//!
//! ```
//! use banwatch_monitor::matcher::{AddressFamily, PatternMatcher};
//! use banwatch_monitor::whitelist::Whitelist;
//!
//! let matcher = PatternMatcher::compile(
//!     "sshd",
//!     &[r"blocked (\d{1,3}(?:\.\d{1,3}){3})".to_string()],
//!     AddressFamily::Ipv4,
//!     Whitelist::default(),
//! );
//!
//! let found = matcher.match_line("2024-01-01 blocked 10.0.0.5 retrying");
//! assert_eq!(found, vec!["10.0.0.5".parse::<std::net::IpAddr>().unwrap()]);
//! ```

use std::fmt;
use std::net::IpAddr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address_set::AddressSet;
use crate::whitelist::Whitelist;

/// Placeholder substituted for the address when a match is logged, so that a
/// log fed back into the watched file cannot match again.
const REDACTED_ADDRESS: &str = "{address was here}";

/// Address family accepted by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Returns `true` if the address belongs to this family.
    ///
    /// IPv4-mapped IPv6 literals count as IPv4.
    pub fn accepts(&self, address: &IpAddr) -> bool {
        matches!(
            (self, address.to_canonical()),
            (Self::Ipv4, IpAddr::V4(_)) | (Self::Ipv6, IpAddr::V6(_))
        )
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => f.write_str("ipv4"),
            Self::Ipv6 => f.write_str("ipv6"),
        }
    }
}

/// One capture taken from a pattern match, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractedMatch<'a> {
    /// The whole text matched by the pattern.
    pub text: &'a str,
    /// Index of the capture group (1-based).
    pub index: usize,
    /// The captured text that should be an address.
    pub candidate: &'a str,
}

/// Why a capture did not produce an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The capture is not an address literal.
    NotAnAddress,
    /// The capture is an address of the other family.
    WrongFamily(IpAddr),
    /// The address is whitelisted.
    Whitelisted(IpAddr),
}

/// A pattern that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPattern {
    pub pattern: String,
    pub error: String,
}

/// Compiled patterns, address family and whitelist of one source.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    source: String,
    patterns: Vec<Regex>,
    invalid: Vec<InvalidPattern>,
    family: AddressFamily,
    whitelist: Whitelist,
    verbose: bool,
}

impl PatternMatcher {
    /// Compiles the patterns of a source.
    ///
    /// A pattern that does not compile is logged and left out; the matcher
    /// keeps working with the remaining ones.
    pub fn compile(
        source: &str,
        patterns: &[String],
        family: AddressFamily,
        whitelist: Whitelist,
    ) -> Self {
        let mut compiled = Vec::with_capacity(patterns.len());
        let mut invalid = Vec::new();

        for pattern in patterns {
            match Regex::new(pattern) {
                Ok(regex) => {
                    if regex.captures_len() < 2 {
                        warn!(
                            source,
                            pattern = %pattern,
                            "Pattern has no capture group and will never yield an address"
                        );
                    }
                    compiled.push(regex);
                }
                Err(e) => {
                    warn!(source, pattern = %pattern, error = %e, "Failed to compile pattern");
                    invalid.push(InvalidPattern {
                        pattern: pattern.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if compiled.is_empty() {
            warn!(source, "No valid pattern defined");
        }

        Self {
            source: source.to_string(),
            patterns: compiled,
            invalid,
            family,
            whitelist,
            verbose: false,
        }
    }

    /// Enables per-address debug logging.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Number of patterns that compiled.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Patterns that failed to compile.
    pub fn invalid_patterns(&self) -> &[InvalidPattern] {
        &self.invalid
    }

    /// Returns every capture of every match of every pattern on `line`.
    ///
    /// Patterns are applied in declaration order and captures in group order.
    pub fn extract<'a>(&self, line: &'a str) -> Vec<(usize, ExtractedMatch<'a>)> {
        let mut extracted = Vec::new();
        for (pattern_index, regex) in self.patterns.iter().enumerate() {
            for captures in regex.captures_iter(line) {
                let Some(whole) = captures.get(0) else {
                    continue;
                };
                for index in 1..captures.len() {
                    let Some(capture) = captures.get(index) else {
                        continue;
                    };
                    if capture.as_str().is_empty() {
                        continue;
                    }
                    extracted.push((
                        pattern_index,
                        ExtractedMatch {
                            text: whole.as_str(),
                            index,
                            candidate: capture.as_str(),
                        },
                    ));
                }
            }
        }
        extracted
    }

    /// Validates a single capture.
    pub fn validate(&self, extracted: &ExtractedMatch<'_>) -> Result<IpAddr, Rejection> {
        let address = extracted
            .candidate
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| Rejection::NotAnAddress)?;
        if !self.family.accepts(&address) {
            return Err(Rejection::WrongFamily(address));
        }
        let address = address.to_canonical();
        if self.whitelist.contains(&address) {
            return Err(Rejection::Whitelisted(address));
        }
        Ok(address)
    }

    /// Returns the distinct, non-whitelisted addresses found on `line`, in
    /// order of first appearance.
    pub fn match_line(&self, line: &str) -> Vec<IpAddr> {
        let found = AddressSet::new();

        for (pattern_index, extracted) in self.extract(line) {
            match self.validate(&extracted) {
                Ok(address) => {
                    if found.add(address) && self.verbose {
                        debug!(
                            source = %self.source,
                            address = %address,
                            matched = %extracted.text.replace(extracted.candidate, REDACTED_ADDRESS),
                            "Address matches"
                        );
                    }
                }
                Err(Rejection::NotAnAddress) => {
                    warn!(
                        source = %self.source,
                        capture = %extracted.candidate,
                        group = extracted.index,
                        pattern = %self.patterns[pattern_index].as_str(),
                        "Captured text is not a valid address"
                    );
                }
                Err(Rejection::WrongFamily(address)) => {
                    warn!(
                        source = %self.source,
                        address = %address,
                        expected = %self.family,
                        pattern = %self.patterns[pattern_index].as_str(),
                        "Captured address has the wrong family"
                    );
                }
                Err(Rejection::Whitelisted(address)) => {
                    if self.verbose {
                        debug!(source = %self.source, address = %address, "Ignoring whitelisted address");
                    }
                }
            }
        }

        found.into_addresses()
    }
}
