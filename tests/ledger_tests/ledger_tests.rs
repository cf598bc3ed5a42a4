//! Tests for the version ledger
//!
//! These tests verify:
//! - Gap-free assignment starting at 1
//! - Idempotent replay under both policies
//! - Pending assignments: resume, supersede, commit rules
//! - Persistence across reopen (including a torn journal tail)
//! - Per-part serialization under concurrent callers

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use chipwarden::checksum::Checksum;
use chipwarden::ledger::{Fingerprint, VersionLedger};
use chipwarden::{ChipError, IdempotencePolicy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_ledger() -> (TempDir, PathBuf, VersionLedger) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ledger.log");
    let ledger = VersionLedger::open(&path, IdempotencePolicy::Checksum).unwrap();
    (temp_dir, path, ledger)
}

fn fingerprint(content: &str, posted: &str) -> Fingerprint {
    Fingerprint {
        checksum: Checksum::of(content.as_bytes()),
        posted: posted.to_string(),
        posted_declared: true,
    }
}

/// Assign and commit one version, returning its number
fn commit_content(ledger: &VersionLedger, part: &str, content: &str) -> u32 {
    let guard = ledger.lock(part);
    let assignment = ledger
        .next_version(&guard, "proj", &fingerprint(content, "2025-10-30-1445"))
        .unwrap();
    if assignment.is_new {
        ledger.commit(&guard, assignment.version).unwrap();
    }
    assignment.version
}

// =============================================================================
// Assignment Tests
// =============================================================================

#[test]
fn test_first_version_is_one() {
    let (_temp, _path, ledger) = setup_temp_ledger();
    let guard = ledger.lock("1001");

    let assignment = ledger
        .next_version(&guard, "proj", &fingerprint("a", "p1"))
        .unwrap();

    assert_eq!(assignment.version, 1);
    assert!(assignment.is_new);
    assert!(!assignment.resumed);
    assert_eq!(ledger.state("1001").unwrap().pending.unwrap().version, 1);
    assert!(ledger.current("1001").is_none());
}

#[test]
fn test_versions_increase_without_gaps() {
    let (_temp, _path, ledger) = setup_temp_ledger();

    let versions: Vec<u32> = ["a", "b", "c", "d"]
        .iter()
        .map(|content| commit_content(&ledger, "1001", content))
        .collect();

    assert_eq!(versions, vec![1, 2, 3, 4]);
    let history: Vec<u32> = ledger.history("1001").iter().map(|s| s.version).collect();
    assert_eq!(history, vec![1, 2, 3, 4]);
}

#[test]
fn test_parts_are_independent() {
    let (_temp, _path, ledger) = setup_temp_ledger();

    assert_eq!(commit_content(&ledger, "1001", "a"), 1);
    assert_eq!(commit_content(&ledger, "2002", "a"), 1);
    assert_eq!(commit_content(&ledger, "1001", "b"), 2);
    assert_eq!(ledger.parts(), vec!["1001".to_string(), "2002".to_string()]);
}

#[test]
fn test_project_fixed_at_first_sighting() {
    let (_temp, _path, ledger) = setup_temp_ledger();
    commit_content(&ledger, "1001", "a");

    let guard = ledger.lock("1001");
    ledger
        .next_version(&guard, "other project", &fingerprint("b", "p2"))
        .unwrap();

    assert_eq!(ledger.state("1001").unwrap().project, "proj");
}

// =============================================================================
// Idempotence Tests
// =============================================================================

#[test]
fn test_replay_of_current_version() {
    let (_temp, _path, ledger) = setup_temp_ledger();
    commit_content(&ledger, "1001", "a");

    let guard = ledger.lock("1001");
    let assignment = ledger
        .next_version(&guard, "proj", &fingerprint("a", "2025-10-30-1445"))
        .unwrap();

    assert_eq!(assignment.version, 1);
    assert!(!assignment.is_new);
    assert!(ledger.state("1001").unwrap().pending.is_none());
}

#[test]
fn test_older_content_is_a_new_version() {
    let (_temp, _path, ledger) = setup_temp_ledger();
    commit_content(&ledger, "1001", "a");
    commit_content(&ledger, "1001", "b");

    // Only the current version counts as a replay
    assert_eq!(commit_content(&ledger, "1001", "a"), 3);
}

#[test]
fn test_posted_timestamp_policy() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ledger.log");
    let ledger = VersionLedger::open(&path, IdempotencePolicy::PostedTimestamp).unwrap();

    let guard = ledger.lock("1001");
    let first = ledger
        .next_version(&guard, "proj", &fingerprint("a", "2025-10-30-1445"))
        .unwrap();
    ledger.commit(&guard, first.version).unwrap();

    let same_posted = ledger
        .next_version(&guard, "proj", &fingerprint("a with edits", "2025-10-30-1445"))
        .unwrap();
    assert!(!same_posted.is_new);

    let later = ledger
        .next_version(&guard, "proj", &fingerprint("a", "2025-10-31-0800"))
        .unwrap();
    assert!(later.is_new);
    assert_eq!(later.version, 2);
}

#[test]
fn test_posted_policy_undeclared_stamp_compares_content() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ledger.log");
    let ledger = VersionLedger::open(&path, IdempotencePolicy::PostedTimestamp).unwrap();
    let derived = |content: &str| Fingerprint {
        posted_declared: false,
        ..fingerprint(content, "2025-10-30-1445")
    };

    let guard = ledger.lock("bracket");
    let first = ledger.next_version(&guard, "proj", &derived("a")).unwrap();
    ledger.commit(&guard, first.version).unwrap();

    let replay = ledger.next_version(&guard, "proj", &derived("a")).unwrap();
    assert!(!replay.is_new);

    let changed = ledger.next_version(&guard, "proj", &derived("b")).unwrap();
    assert!(changed.is_new);
    assert_eq!(changed.version, 2);
}

// =============================================================================
// Pending Assignment Tests
// =============================================================================

#[test]
fn test_pending_resumed_for_same_content() {
    let (_temp, _path, ledger) = setup_temp_ledger();
    let guard = ledger.lock("1001");
    let fp = fingerprint("a", "p1");

    ledger.next_version(&guard, "proj", &fp).unwrap();
    let again = ledger.next_version(&guard, "proj", &fp).unwrap();

    assert_eq!(again.version, 1);
    assert!(again.is_new);
    assert!(again.resumed);
}

#[test]
fn test_pending_superseded_reuses_number() {
    let (_temp, _path, ledger) = setup_temp_ledger();
    let guard = ledger.lock("1001");

    ledger.next_version(&guard, "proj", &fingerprint("a", "p1")).unwrap();
    let superseding = ledger.next_version(&guard, "proj", &fingerprint("b", "p2")).unwrap();

    assert_eq!(superseding.version, 1);
    assert!(!superseding.resumed);
    let pending = ledger.state("1001").unwrap().pending.unwrap();
    assert_eq!(pending.checksum, Checksum::of(b"b"));
}

#[test]
fn test_commit_requires_matching_assignment() {
    let (_temp, _path, ledger) = setup_temp_ledger();
    let guard = ledger.lock("1001");

    let result = ledger.commit(&guard, 1);
    assert!(matches!(result, Err(ChipError::DuplicateVersion { version: 1, .. })));

    ledger.next_version(&guard, "proj", &fingerprint("a", "p1")).unwrap();
    ledger.commit(&guard, 1).unwrap();
    assert!(ledger.commit(&guard, 1).is_err());
}

#[test]
fn test_guard_from_other_ledger_rejected() {
    let (_temp, _path, ledger) = setup_temp_ledger();
    let (_temp2, _path2, other) = setup_temp_ledger();

    let foreign = other.lock("1001");
    let result = ledger.next_version(&foreign, "proj", &fingerprint("a", "p1"));
    assert!(matches!(result, Err(ChipError::Config(_))));
}

// =============================================================================
// Publish Tracking Tests
// =============================================================================

#[test]
fn test_mark_published() {
    let (_temp, _path, ledger) = setup_temp_ledger();
    commit_content(&ledger, "1001", "a");
    commit_content(&ledger, "2002", "a");

    assert_eq!(ledger.unpublished_parts().len(), 2);

    let guard = ledger.lock("1001");
    ledger.mark_published(&guard, 1).unwrap();
    ledger.mark_published(&guard, 1).unwrap();
    drop(guard);

    assert_eq!(ledger.unpublished_parts(), vec!["2002".to_string()]);
    assert_eq!(ledger.state("1001").unwrap().published, 1);
}

#[test]
fn test_publish_of_uncommitted_version_rejected() {
    let (_temp, _path, ledger) = setup_temp_ledger();
    let guard = ledger.lock("1001");
    ledger.next_version(&guard, "proj", &fingerprint("a", "p1")).unwrap();

    assert!(ledger.mark_published(&guard, 1).is_err());
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_state_survives_reopen() {
    let (_temp, path, ledger) = setup_temp_ledger();
    commit_content(&ledger, "1001", "a");
    commit_content(&ledger, "1001", "b");
    {
        let guard = ledger.lock("1001");
        ledger.mark_published(&guard, 2).unwrap();
        ledger.next_version(&guard, "proj", &fingerprint("c", "p3")).unwrap();
    }
    let before = ledger.state("1001").unwrap();
    drop(ledger);

    let reopened = VersionLedger::open(&path, IdempotencePolicy::Checksum).unwrap();
    let after = reopened.state("1001").unwrap();

    assert_eq!(after, before);
    assert_eq!(after.pending.as_ref().unwrap().version, 3);
    assert_eq!(reopened.pending_parts(), vec!["1001".to_string()]);
    assert_eq!(commit_content(&reopened, "1001", "c"), 3);
}

#[test]
fn test_reopen_after_torn_tail() {
    let (_temp, path, ledger) = setup_temp_ledger();
    commit_content(&ledger, "1001", "a");
    drop(ledger);

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0x01; 9]).unwrap();
    drop(file);

    let reopened = VersionLedger::open(&path, IdempotencePolicy::Checksum).unwrap();
    assert_eq!(reopened.current("1001").unwrap().version, 1);
    assert_eq!(commit_content(&reopened, "1001", "b"), 2);

    let verified = reopened.verify().unwrap();
    assert!(!verified.was_truncated);
    assert_eq!(verified.entries_recovered, 4);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_same_part_never_duplicates() {
    let (_temp, _path, ledger) = setup_temp_ledger();
    let ledger = Arc::new(ledger);
    let mut handles = vec![];

    for i in 0..8 {
        let ledger = Arc::clone(&ledger);
        handles.push(thread::spawn(move || {
            commit_content(&ledger, "1001", &format!("content-{}", i))
        }));
    }

    let versions: HashSet<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(versions, (1..=8).collect());
    assert_eq!(ledger.history("1001").len(), 8);
}

#[test]
fn test_part_lock_does_not_block_other_parts() {
    let (_temp, _path, ledger) = setup_temp_ledger();
    let _held = ledger.lock("1001");

    // A different part proceeds while 1001 is held
    assert_eq!(commit_content(&ledger, "2002", "a"), 1);
}
