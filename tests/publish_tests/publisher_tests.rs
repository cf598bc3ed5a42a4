//! Tests for the distribution publisher
//!
//! These tests verify:
//! - Canonical naming and atomic exposure
//! - Idempotent re-publish and name collisions
//! - Retention per part, leaving other parts and files alone

use std::fs;
use std::path::Path;

use chipwarden::publish::DistributionPublisher;
use chipwarden::ChipError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_publisher(retention: usize) -> (TempDir, DistributionPublisher) {
    let temp_dir = TempDir::new().unwrap();
    let publisher = DistributionPublisher::new(temp_dir.path().join("dist"), retention, "nc");
    (temp_dir, publisher)
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Publish Tests
// =============================================================================

#[test]
fn test_publish_writes_canonical_file() {
    let (_temp, publisher) = setup_publisher(2);

    let outcome = publisher
        .publish("1001", 1, "2025-10-30-1445", b"O1001\nM30\n")
        .unwrap();

    assert_eq!(
        outcome.path,
        publisher.dir().join("1001_v1_2025-10-30-1445.nc")
    );
    assert!(!outcome.already_present);
    assert!(outcome.retired.is_empty());
    assert_eq!(fs::read(&outcome.path).unwrap(), b"O1001\nM30\n".to_vec());
    assert_eq!(listing(publisher.dir()), vec!["1001_v1_2025-10-30-1445.nc"]);
}

#[test]
fn test_republish_identical_is_noop() {
    let (_temp, publisher) = setup_publisher(2);
    publisher.publish("1001", 1, "2025-10-30-1445", b"same").unwrap();

    let again = publisher.publish("1001", 1, "2025-10-30-1445", b"same").unwrap();

    assert!(again.already_present);
    assert_eq!(listing(publisher.dir()).len(), 1);
}

#[test]
fn test_name_collision() {
    let (_temp, publisher) = setup_publisher(2);
    publisher.publish("1001", 1, "2025-10-30-1445", b"original").unwrap();

    let result = publisher.publish("1001", 1, "2025-10-30-1445", b"different");

    assert!(matches!(result, Err(ChipError::NameCollision { .. })));
    let path = publisher.dir().join("1001_v1_2025-10-30-1445.nc");
    assert_eq!(fs::read(path).unwrap(), b"original".to_vec());
}

// =============================================================================
// Retention Tests
// =============================================================================

#[test]
fn test_retention_keeps_newest() {
    let (_temp, publisher) = setup_publisher(2);
    for version in 1..=4 {
        publisher
            .publish("1001", version, &format!("2025-11-0{}-0800", version), b"x")
            .unwrap();
    }

    assert_eq!(
        listing(publisher.dir()),
        vec!["1001_v3_2025-11-03-0800.nc", "1001_v4_2025-11-04-0800.nc"]
    );
}

#[test]
fn test_retention_one_reports_retired() {
    let (_temp, publisher) = setup_publisher(1);
    let first = publisher.publish("1001", 1, "p1", b"a").unwrap();
    let second = publisher.publish("1001", 2, "p2", b"b").unwrap();

    assert_eq!(second.retired, vec![first.path]);
    assert_eq!(publisher.current("1001").unwrap(), Some(second.path));
}

#[test]
fn test_retention_orders_by_version_not_name() {
    let (_temp, publisher) = setup_publisher(1);
    publisher.publish("1001", 9, "p", b"nine").unwrap();
    publisher.publish("1001", 10, "p", b"ten").unwrap();

    assert_eq!(listing(publisher.dir()), vec!["1001_v10_p.nc"]);
}

#[test]
fn test_retention_leaves_other_files_alone() {
    let (_temp, publisher) = setup_publisher(1);
    fs::create_dir_all(publisher.dir()).unwrap();
    fs::write(publisher.dir().join("README.txt"), b"operators").unwrap();
    fs::write(publisher.dir().join("1001_v1_p.gcode"), b"other ext").unwrap();

    publisher.publish("2002", 1, "p", b"other part").unwrap();
    publisher.publish("1001", 1, "p", b"a").unwrap();
    publisher.publish("1001", 2, "p", b"b").unwrap();

    assert_eq!(
        listing(publisher.dir()),
        vec!["1001_v1_p.gcode", "1001_v2_p.nc", "2002_v1_p.nc", "README.txt"]
    );
}

#[test]
fn test_entries_ignore_temp_files() {
    let (_temp, publisher) = setup_publisher(2);
    publisher.publish("1001", 1, "p", b"a").unwrap();
    fs::write(publisher.dir().join(".1001_v2_p.nc.tmp-99"), b"partial").unwrap();

    let entries = publisher.entries("1001").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0.version, 1);
}

#[test]
fn test_entries_of_missing_directory() {
    let (_temp, publisher) = setup_publisher(2);
    assert!(publisher.entries("1001").unwrap().is_empty());
    assert_eq!(publisher.current("1001").unwrap(), None);
}

#[test]
fn test_retention_never_below_one() {
    let (_temp, publisher) = setup_publisher(0);
    assert_eq!(publisher.retention(), 1);
}
