//! Ledger index
//!
//! BTreeMap-based view of every part's history, rebuilt from the journal on
//! open and kept in step with it afterwards.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::{ChipError, Result};
use crate::journal::LedgerOp;

use super::VersionSlot;

/// Everything the ledger knows about one part
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartState {
    /// Project namespace fixed at first sighting
    pub project: String,

    /// Committed versions; `versions[i].version == i + 1`
    pub versions: Vec<VersionSlot>,

    /// Assigned but not yet committed
    pub pending: Option<VersionSlot>,

    /// Highest version recorded as published (0 = none)
    pub published: u32,
}

impl PartState {
    pub fn highest(&self) -> Option<&VersionSlot> {
        self.versions.last()
    }

    pub fn highest_version(&self) -> u32 {
        self.versions.len() as u32
    }

    /// The current version is committed but the distribution lags behind
    pub fn needs_publish(&self) -> bool {
        self.highest_version() > self.published
    }
}

/// In-memory index of part states (read-mostly)
pub struct PartIndex {
    parts: RwLock<BTreeMap<String, PartState>>,
}

impl PartIndex {
    pub fn new() -> Self {
        Self {
            parts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Snapshot of one part's state
    pub fn get(&self, key: &str) -> Option<PartState> {
        self.parts.read().get(key).cloned()
    }

    /// All part keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        self.parts.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.parts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.read().is_empty()
    }

    /// Parts matching a predicate, as (key, state) snapshots
    pub fn filter<F>(&self, mut predicate: F) -> Vec<(String, PartState)>
    where
        F: FnMut(&PartState) -> bool,
    {
        self.parts
            .read()
            .iter()
            .filter(|(_, state)| predicate(state))
            .map(|(key, state)| (key.clone(), state.clone()))
            .collect()
    }

    /// Apply one journal operation
    ///
    /// Rejects operations that would break the version sequence; during
    /// replay that means the journal itself is inconsistent.
    pub fn apply(&self, op: &LedgerOp, timestamp: u64) -> Result<()> {
        let mut parts = self.parts.write();

        match op {
            LedgerOp::Assign {
                part,
                project,
                version,
                checksum,
                posted,
            } => {
                let state = parts.entry(part.clone()).or_insert_with(|| PartState {
                    project: project.clone(),
                    ..PartState::default()
                });
                let expected = state.highest_version() + 1;
                if *version != expected {
                    return Err(ChipError::JournalCorruption(format!(
                        "assign of {} v{} but next version is {}",
                        part, version, expected
                    )));
                }
                state.pending = Some(VersionSlot {
                    version: *version,
                    checksum: *checksum,
                    posted: posted.clone(),
                    assigned_at: timestamp,
                });
            }

            LedgerOp::Commit { part, version } => {
                let state = parts.get_mut(part).ok_or_else(|| {
                    ChipError::JournalCorruption(format!("commit for unknown part {}", part))
                })?;
                match state.pending.take() {
                    Some(slot) if slot.version == *version => state.versions.push(slot),
                    other => {
                        state.pending = other;
                        return Err(ChipError::JournalCorruption(format!(
                            "commit of {} v{} without a matching assignment",
                            part, version
                        )));
                    }
                }
            }

            LedgerOp::Publish { part, version } => {
                let state = parts.get_mut(part).ok_or_else(|| {
                    ChipError::JournalCorruption(format!("publish for unknown part {}", part))
                })?;
                if *version == 0 || *version > state.highest_version() {
                    return Err(ChipError::JournalCorruption(format!(
                        "publish of uncommitted {} v{}",
                        part, version
                    )));
                }
                state.published = state.published.max(*version);
            }
        }

        Ok(())
    }
}

impl Default for PartIndex {
    fn default() -> Self {
        Self::new()
    }
}
