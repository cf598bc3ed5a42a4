//! Version ledger: journal + index + per-part locks.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::IdempotencePolicy;
use crate::error::{ChipError, Result};
use crate::journal::{JournalRecovery, JournalWriter, LedgerOp, RecoveryResult};

use super::{Assignment, Fingerprint, PartGuard, PartIndex, PartLocks, PartState, VersionSlot};

/// Durable, per-part serialized version authority
///
/// ## Concurrency Model
///
/// - **Mutations** (`next_version`, `commit`, `mark_published`) require a
///   `PartGuard` for the part, so each part has a single writer
/// - **Journal**: one `Mutex` held only for the duration of an append
/// - **Index**: `RwLock` inside `PartIndex`, readers never block each other
///
/// Every mutation appends to the journal first and updates the index only
/// after the append has been synced.
pub struct VersionLedger {
    path: PathBuf,
    journal: Mutex<JournalWriter>,
    index: PartIndex,
    locks: PartLocks,
    policy: IdempotencePolicy,
}

impl VersionLedger {
    /// Open or create a ledger journal at `path`
    ///
    /// On startup:
    /// 1. Recover the journal (cut a torn tail, refuse real corruption)
    /// 2. Replay every operation into the index, validating the sequence
    /// 3. Open the writer positioned after the last LSN
    pub fn open(path: &Path, policy: IdempotencePolicy) -> Result<Self> {
        let (entries, recovery) = if path.exists() {
            JournalRecovery::recover(path)?
        } else {
            (Vec::new(), RecoveryResult::default())
        };

        let index = PartIndex::new();
        for entry in &entries {
            index.apply(&entry.op, entry.timestamp)?;
        }

        if recovery.entries_recovered > 0 || recovery.was_truncated {
            tracing::info!(
                entries = recovery.entries_recovered,
                last_lsn = recovery.last_lsn,
                truncated = recovery.was_truncated,
                parts = index.len(),
                "ledger journal replayed"
            );
        }

        let journal = JournalWriter::open(path, recovery.last_lsn + 1)?;

        Ok(Self {
            path: path.to_path_buf(),
            journal: Mutex::new(journal),
            index,
            locks: PartLocks::new(),
            policy,
        })
    }

    /// Take the exclusive hold on a part
    pub fn lock(&self, key: &str) -> PartGuard<'_> {
        self.locks.lock(key)
    }

    /// Determine the version for submitted content
    ///
    /// - Matches the current version (per policy) → `(current, is_new=false)`
    /// - Matches the pending assignment's checksum → `(pending, resumed)`
    /// - Otherwise → `highest + 1`, journaled before returning
    ///
    /// `project` is only used when the part is first sighted.
    pub fn next_version(
        &self,
        guard: &PartGuard<'_>,
        project: &str,
        fingerprint: &Fingerprint,
    ) -> Result<Assignment> {
        self.check_guard(guard)?;
        let key = guard.key();
        let state = self.index.get(key).unwrap_or_default();

        if let Some(current) = state.highest() {
            if self.is_replay(current, fingerprint) {
                return Ok(Assignment {
                    version: current.version,
                    is_new: false,
                    resumed: false,
                });
            }
        }

        if let Some(pending) = &state.pending {
            if pending.checksum == fingerprint.checksum {
                return Ok(Assignment {
                    version: pending.version,
                    is_new: true,
                    resumed: true,
                });
            }
            tracing::warn!(
                part = key,
                version = pending.version,
                "superseding uncommitted assignment with different content"
            );
        }

        let version = state.highest_version() + 1;
        let project = if state.project.is_empty() {
            project.to_string()
        } else {
            state.project.clone()
        };
        self.append(LedgerOp::Assign {
            part: key.to_string(),
            project,
            version,
            checksum: fingerprint.checksum,
            posted: fingerprint.posted.clone(),
        })?;

        Ok(Assignment {
            version,
            is_new: true,
            resumed: false,
        })
    }

    /// Mark the pending assignment as durable in the archive
    pub fn commit(&self, guard: &PartGuard<'_>, version: u32) -> Result<()> {
        self.check_guard(guard)?;
        let key = guard.key();
        let state = self.index.get(key).unwrap_or_default();
        match &state.pending {
            Some(pending) if pending.version == version => {}
            _ => {
                return Err(ChipError::DuplicateVersion {
                    part: key.to_string(),
                    version,
                })
            }
        }
        self.append(LedgerOp::Commit {
            part: key.to_string(),
            version,
        })
    }

    /// Record that `version` is the one the distribution directory shows
    pub fn mark_published(&self, guard: &PartGuard<'_>, version: u32) -> Result<()> {
        self.check_guard(guard)?;
        let key = guard.key();
        let state = self.index.get(key).unwrap_or_default();
        if state.published >= version {
            return Ok(());
        }
        self.append(LedgerOp::Publish {
            part: key.to_string(),
            version,
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn state(&self, key: &str) -> Option<PartState> {
        self.index.get(key)
    }

    /// Highest committed version of a part
    pub fn current(&self, key: &str) -> Option<VersionSlot> {
        self.index.get(key).and_then(|s| s.highest().cloned())
    }

    /// Committed history of a part, oldest first
    pub fn history(&self, key: &str) -> Vec<VersionSlot> {
        self.index.get(key).map(|s| s.versions).unwrap_or_default()
    }

    pub fn parts(&self) -> Vec<String> {
        self.index.keys()
    }

    /// Parts with an assignment that was never committed
    pub fn pending_parts(&self) -> Vec<String> {
        self.index
            .filter(|s| s.pending.is_some())
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }

    /// Parts whose current version has not been recorded as published
    pub fn unpublished_parts(&self) -> Vec<String> {
        self.index
            .filter(PartState::needs_publish)
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }

    /// Check the journal on disk without modifying it
    pub fn verify(&self) -> Result<RecoveryResult> {
        JournalRecovery::verify(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> IdempotencePolicy {
        self.policy
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn is_replay(&self, current: &VersionSlot, fingerprint: &Fingerprint) -> bool {
        match self.policy {
            IdempotencePolicy::Checksum => current.checksum == fingerprint.checksum,
            IdempotencePolicy::PostedTimestamp if fingerprint.posted_declared => {
                current.posted == fingerprint.posted
            }
            IdempotencePolicy::PostedTimestamp => current.checksum == fingerprint.checksum,
        }
    }

    /// Journal first, then the index
    fn append(&self, op: LedgerOp) -> Result<()> {
        let entry = self.journal.lock().append_entry(op)?;
        tracing::trace!(
            lsn = entry.lsn,
            part = entry.op.part(),
            version = entry.op.version(),
            "journaled"
        );
        self.index.apply(&entry.op, entry.timestamp)
    }

    fn check_guard(&self, guard: &PartGuard<'_>) -> Result<()> {
        if guard.is_from(&self.locks) {
            Ok(())
        } else {
            Err(ChipError::Config(format!(
                "part guard for {} was not issued by this ledger",
                guard.key()
            )))
        }
    }
}
