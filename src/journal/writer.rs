//! Journal Writer
//!
//! Handles appending entries to the journal file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fs_util::sync_dir;

use super::{JournalEntry, LedgerOp};

/// Writes entries to the journal file
///
/// Every append is synced before it returns; the ledger relies on an
/// acknowledged assignment surviving a crash.
pub struct JournalWriter {
    path: PathBuf,
    file: File,

    /// LSN the next append will use
    next_lsn: u64,

    /// Length of the file after the last complete append
    len: u64,
}

impl JournalWriter {
    /// Open or create a journal file
    ///
    /// `next_lsn` comes from recovery: last recovered LSN + 1.
    pub fn open(path: &Path, next_lsn: u64) -> Result<Self> {
        let existed = path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if !existed {
            file.sync_all()?;
            if let Some(parent) = path.parent() {
                sync_dir(parent)?;
            }
        }
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_lsn: next_lsn.max(1),
            len,
        })
    }

    /// Append an operation, returning its LSN
    pub fn append(&mut self, op: LedgerOp) -> Result<u64> {
        self.append_entry(op).map(|entry| entry.lsn)
    }

    /// Append an operation, returning the entry as written
    pub fn append_entry(&mut self, op: LedgerOp) -> Result<JournalEntry> {
        let entry = JournalEntry::new(self.next_lsn, op);
        let frame = entry.serialize()?;

        let written = self
            .file
            .write_all(&frame)
            .and_then(|_| self.file.sync_data());
        if let Err(e) = written {
            // Drop any partial frame so later appends stay contiguous
            let _ = self.file.set_len(self.len);
            return Err(e.into());
        }

        self.len += frame.len() as u64;
        self.next_lsn += 1;
        Ok(entry)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
