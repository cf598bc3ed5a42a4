//! Version Ledger Module
//!
//! The single authority for version numbers.
//!
//! ## Responsibilities
//! - Assign `highest + 1` to new content, `highest` to a replay
//! - Journal every assignment durably before acknowledging it
//! - Serialize assignment per part, never globally
//! - Track which committed version the distribution directory shows
//!
//! ## Version lifecycle
//! ```text
//!   Assign ──► (pending) ──► Commit ──► (committed) ──► Publish
//!      ▲            │
//!      └────────────┘  superseded by different content before Commit
//! ```
//! A pending assignment never becomes a gap: its number is either committed
//! or handed to the next content for the same part.

mod index;
mod locks;
mod version_ledger;

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;

pub use index::{PartIndex, PartState};
pub use locks::{PartGuard, PartLocks};
pub use version_ledger::VersionLedger;

/// One assigned version as the ledger remembers it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSlot {
    pub version: u32,
    pub checksum: Checksum,
    pub posted: String,

    /// Unix millis of the journal entry that assigned it
    pub assigned_at: u64,
}

/// Identity of submitted content, compared against the current version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub checksum: Checksum,
    pub posted: String,

    /// False when `posted` was derived from the intake time rather than read
    /// from the file; such a stamp never identifies a replay
    pub posted_declared: bool,
}

/// Outcome of `VersionLedger::next_version`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub version: u32,

    /// False for an idempotent replay of the current version
    pub is_new: bool,

    /// True when an earlier, uncommitted assignment of the same content is reused
    pub resumed: bool,
}
