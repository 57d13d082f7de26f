//! Command implementations behind the CLI.
//!
//! Each command returns its result instead of printing it, so the binary
//! decides how to render it.

pub mod element;
pub mod scan;
pub mod supervise;

pub use element::{apply, resolve_set, ElementAction};
pub use scan::{scan, ScanReport};
pub use supervise::{supervise, RunOutcome};
