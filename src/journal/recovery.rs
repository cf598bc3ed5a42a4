//! Journal Recovery
//!
//! Validates the journal after a crash and cuts off a torn tail.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::{ChipError, Result};

use super::reader::{Frame, JournalReader};
use super::JournalEntry;

/// Handles journal recovery after a crash
pub struct JournalRecovery;

/// Result of a recovery or verification pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Last valid LSN (0 for an empty journal)
    pub last_lsn: u64,

    /// Whether a partial final frame was (or would be) removed
    pub was_truncated: bool,

    /// Bytes after the last valid frame
    pub bytes_discarded: u64,
}

impl JournalRecovery {
    /// Recover entries from a journal file
    ///
    /// This will:
    /// 1. Read all valid entries, checking that LSNs are consecutive
    /// 2. Truncate a torn or damaged *final* frame (a crash mid-append)
    /// 3. Refuse with `JournalCorruption` if damage is followed by more data
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> Result<(Vec<JournalEntry>, RecoveryResult)> {
        let (entries, result, valid_len) = Self::scan(path)?;

        if result.was_truncated {
            tracing::warn!(
                path = %path.display(),
                discarded = result.bytes_discarded,
                "truncating torn journal tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        Ok((entries, result))
    }

    /// Verify integrity of a journal file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (_, result, _) = Self::scan(path)?;
        Ok(result)
    }

    fn scan(path: &Path) -> Result<(Vec<JournalEntry>, RecoveryResult, u64)> {
        let mut reader = JournalReader::open(path)?;
        let file_len = reader.file_len();
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();

        loop {
            match reader.next_frame()? {
                Frame::Entry(entry) => {
                    if entry.lsn != result.last_lsn + 1 {
                        return Err(ChipError::JournalCorruption(format!(
                            "expected lsn {} at offset {}, found {}",
                            result.last_lsn + 1,
                            reader.position(),
                            entry.lsn
                        )));
                    }
                    result.last_lsn = entry.lsn;
                    result.entries_recovered += 1;
                    entries.push(entry);
                }
                Frame::End => break,
                Frame::Torn => {
                    result.was_truncated = true;
                    break;
                }
                Frame::Damaged { frame_end, reason } => {
                    if frame_end != file_len {
                        return Err(ChipError::JournalCorruption(format!(
                            "damaged frame at offset {} followed by more data: {}",
                            reader.position(),
                            reason
                        )));
                    }
                    result.was_truncated = true;
                    break;
                }
            }
        }

        let valid_len = reader.position();
        result.bytes_discarded = file_len - valid_len;
        Ok((entries, result, valid_len))
    }
}
