//! Tests for the ledger journal
//!
//! These tests verify:
//! - Frame encoding and CRC detection
//! - Writer/reader LSN sequencing across reopen
//! - Recovery of a torn or damaged final frame
//! - Refusal to recover mid-file corruption or LSN gaps
//! - Damaged LEN fields are never mistaken for a torn tail
//! - Verify mode (stats only, file untouched)

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chipwarden::checksum::Checksum;
use chipwarden::journal::{
    JournalEntry, JournalReader, JournalRecovery, JournalWriter, LedgerOp, HEADER_SIZE,
};
use chipwarden::ChipError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_journal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ledger.log");
    (temp_dir, path)
}

fn assign(part: &str, version: u32) -> LedgerOp {
    LedgerOp::Assign {
        part: part.to_string(),
        project: "test".to_string(),
        version,
        checksum: Checksum::of(format!("{}-{}", part, version).as_bytes()),
        posted: "2025-10-30-1445".to_string(),
    }
}

/// Write Assign/Commit pairs for versions 1..=count of one part
fn write_versions(path: &Path, count: u32) {
    let mut writer = JournalWriter::open(path, 1).unwrap();
    for version in 1..=count {
        writer.append(assign("1001", version)).unwrap();
        writer
            .append(LedgerOp::Commit {
                part: "1001".to_string(),
                version,
            })
            .unwrap();
    }
}

/// Byte offsets where each frame starts
fn frame_offsets(path: &Path) -> Vec<usize> {
    let bytes = fs::read(path).unwrap();
    let mut offsets = Vec::new();
    let mut pos = 0;
    while pos + HEADER_SIZE <= bytes.len() {
        offsets.push(pos);
        let len = u32::from_le_bytes(bytes[pos + 12..pos + 16].try_into().unwrap()) as usize;
        pos += HEADER_SIZE + len;
    }
    offsets
}

fn flip_byte(path: &Path, offset: usize) {
    let mut bytes = fs::read(path).unwrap();
    bytes[offset] ^= 0xFF;
    fs::write(path, bytes).unwrap();
}

// =============================================================================
// Entry Encoding Tests
// =============================================================================

#[test]
fn test_entry_encode_decode() {
    let entry = JournalEntry::new(7, assign("1001", 3));

    let bytes = entry.serialize().unwrap();
    let decoded = JournalEntry::deserialize(&bytes).unwrap();

    assert_eq!(decoded, entry);
    assert_eq!(decoded.op.part(), "1001");
    assert_eq!(decoded.op.version(), 3);
}

#[test]
fn test_entry_crc_detects_corruption() {
    let entry = JournalEntry::new(1, LedgerOp::Publish {
        part: "1001".to_string(),
        version: 1,
    });
    let mut bytes = entry.serialize().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    let result = JournalEntry::deserialize(&bytes);
    assert!(matches!(result, Err(ChipError::JournalCorruption(_))));
}

#[test]
fn test_entry_crc_covers_lsn() {
    let entry = JournalEntry::new(1, assign("1001", 1));
    let mut bytes = entry.serialize().unwrap();
    bytes[0] = 2;

    assert!(JournalEntry::deserialize(&bytes).is_err());
}

#[test]
fn test_entry_too_short() {
    assert!(JournalEntry::deserialize(&[0u8; 4]).is_err());
}

// =============================================================================
// Writer / Reader Tests
// =============================================================================

#[test]
fn test_writer_assigns_consecutive_lsns() {
    let (_temp, path) = setup_temp_journal();
    let mut writer = JournalWriter::open(&path, 1).unwrap();

    assert_eq!(writer.append(assign("a", 1)).unwrap(), 1);
    assert_eq!(writer.append(assign("b", 1)).unwrap(), 2);
    assert_eq!(writer.current_lsn(), 3);
}

#[test]
fn test_reader_iterates_all_entries() {
    let (_temp, path) = setup_temp_journal();
    write_versions(&path, 3);

    let entries: Vec<_> = JournalReader::open(&path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(entries.len(), 6);
    assert!(matches!(entries[0].op, LedgerOp::Assign { version: 1, .. }));
    assert!(matches!(entries[5].op, LedgerOp::Commit { version: 3, .. }));
    let lsns: Vec<u64> = entries.iter().map(|e| e.lsn).collect();
    assert_eq!(lsns, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_reopen_continues_lsn() {
    let (_temp, path) = setup_temp_journal();
    write_versions(&path, 1);

    let (_, result) = JournalRecovery::recover(&path).unwrap();
    let mut writer = JournalWriter::open(&path, result.last_lsn + 1).unwrap();
    assert_eq!(writer.append(assign("1001", 2)).unwrap(), 3);

    let (entries, _) = JournalRecovery::recover(&path).unwrap();
    assert_eq!(entries.len(), 3);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, path) = setup_temp_journal();
    File::create(&path).unwrap();

    let (entries, result) = JournalRecovery::recover(&path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.last_lsn, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_clean_journal() {
    let (_temp, path) = setup_temp_journal();
    write_versions(&path, 2);

    let (entries, result) = JournalRecovery::recover(&path).unwrap();

    assert_eq!(entries.len(), 4);
    assert_eq!(result.entries_recovered, 4);
    assert_eq!(result.last_lsn, 4);
    assert!(!result.was_truncated);
    assert_eq!(result.bytes_discarded, 0);
}

#[test]
fn test_recover_truncates_torn_tail() {
    let (_temp, path) = setup_temp_journal();
    write_versions(&path, 2);
    let clean_len = fs::metadata(&path).unwrap().len();

    // Crash in the middle of the next append
    let partial = JournalEntry::new(5, assign("1001", 3)).serialize().unwrap();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&partial[..partial.len() / 2]).unwrap();
    drop(file);

    let (entries, result) = JournalRecovery::recover(&path).unwrap();

    assert_eq!(entries.len(), 4);
    assert!(result.was_truncated);
    assert_eq!(result.bytes_discarded, (partial.len() / 2) as u64);
    assert_eq!(fs::metadata(&path).unwrap().len(), clean_len);
}

#[test]
fn test_recover_truncates_short_header() {
    let (_temp, path) = setup_temp_journal();
    write_versions(&path, 1);

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[1, 2, 3]).unwrap();
    drop(file);

    let (entries, result) = JournalRecovery::recover(&path).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(result.bytes_discarded, 3);
}

#[test]
fn test_recover_truncates_damaged_final_frame() {
    let (_temp, path) = setup_temp_journal();
    write_versions(&path, 2);
    let offsets = frame_offsets(&path);
    let last = *offsets.last().unwrap();

    flip_byte(&path, last + HEADER_SIZE);

    let (entries, result) = JournalRecovery::recover(&path).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(result.last_lsn, 3);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&path).unwrap().len(), last as u64);
}

#[test]
fn test_recover_refuses_mid_file_corruption() {
    let (_temp, path) = setup_temp_journal();
    write_versions(&path, 2);
    let offsets = frame_offsets(&path);
    let len_before = fs::metadata(&path).unwrap().len();

    flip_byte(&path, offsets[1] + HEADER_SIZE);

    let result = JournalRecovery::recover(&path);
    assert!(matches!(result, Err(ChipError::JournalCorruption(_))));
    assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
}

fn set_frame_len(path: &Path, frame_offset: usize, len: u32) {
    let mut bytes = fs::read(path).unwrap();
    bytes[frame_offset + 12..frame_offset + 16].copy_from_slice(&len.to_le_bytes());
    fs::write(path, bytes).unwrap();
}

#[test]
fn test_recover_refuses_oversized_len_mid_file() {
    let (_temp, path) = setup_temp_journal();
    write_versions(&path, 3);
    let offsets = frame_offsets(&path);
    let before = fs::read(&path).unwrap();

    // High byte of frame 2's LEN
    let mut bytes = before.clone();
    bytes[offsets[1] + 15] ^= 0x10;
    fs::write(&path, &bytes).unwrap();

    let result = JournalRecovery::recover(&path);
    assert!(matches!(result, Err(ChipError::JournalCorruption(_))));
    assert_eq!(fs::read(&path).unwrap(), bytes);
}

#[test]
fn test_recover_refuses_len_past_eof_mid_file() {
    let (_temp, path) = setup_temp_journal();
    write_versions(&path, 3);
    let offsets = frame_offsets(&path);
    let file_len = fs::metadata(&path).unwrap().len() as usize;

    // Within the payload limit but pointing past the end of the file
    let len = (file_len - offsets[1] - HEADER_SIZE + 10) as u32;
    set_frame_len(&path, offsets[1], len);
    let damaged = fs::read(&path).unwrap();

    let result = JournalRecovery::recover(&path);
    assert!(matches!(result, Err(ChipError::JournalCorruption(_))));
    assert_eq!(fs::read(&path).unwrap(), damaged);
}

#[test]
fn test_verify_reports_len_past_eof_mid_file() {
    let (_temp, path) = setup_temp_journal();
    write_versions(&path, 2);
    let offsets = frame_offsets(&path);
    let file_len = fs::metadata(&path).unwrap().len() as usize;

    set_frame_len(&path, offsets[0], (file_len + 1) as u32);

    assert!(matches!(
        JournalRecovery::verify(&path),
        Err(ChipError::JournalCorruption(_))
    ));
}

#[test]
fn test_recover_refuses_lsn_gap() {
    let (_temp, path) = setup_temp_journal();
    let mut file = File::create(&path).unwrap();
    for lsn in [1, 3] {
        let bytes = JournalEntry::new(lsn, assign("1001", 1)).serialize().unwrap();
        file.write_all(&bytes).unwrap();
    }
    drop(file);

    let result = JournalRecovery::recover(&path);
    assert!(matches!(result, Err(ChipError::JournalCorruption(_))));
}

#[test]
fn test_verify_does_not_modify() {
    let (_temp, path) = setup_temp_journal();
    write_versions(&path, 1);
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0xAB; 10]).unwrap();
    drop(file);
    let len_before = fs::metadata(&path).unwrap().len();

    let result = JournalRecovery::verify(&path).unwrap();

    assert_eq!(result.entries_recovered, 2);
    assert!(result.was_truncated);
    assert_eq!(result.bytes_discarded, 10);
    assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
}
