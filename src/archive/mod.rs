//! Archive Module
//!
//! Append-only history of every version ever committed.
//!
//! ## Responsibilities
//! - Store each version's content and metadata as one immutable entry file
//! - Refuse to overwrite an existing `(part, version)` address
//! - Keep a human-readable change log per part
//!
//! ## Layout
//! ```text
//! {archive_dir}/
//!   ├── ledger.log
//!   └── {project}/
//!         └── {part}/
//!               ├── v000001.cwv
//!               ├── v000002.cwv
//!               └── CHANGELOG.md
//! ```
//!
//! Entries are written once through a temp file and rename, so concurrent
//! readers need no locking.

mod changelog;
mod format;
mod reader;
mod writer;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::metadata::{MetadataRecord, UNKNOWN};
use crate::part::sanitize;

pub use changelog::{ChangeLog, CHANGELOG_FILENAME};
pub use format::{FOOTER_SIZE, FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use reader::ArchiveReader;
pub use writer::ArchiveWriter;

/// Metadata stored alongside a version's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMeta {
    /// Part key (sanitized identifier)
    pub part: String,

    /// Part identifier as posted
    pub part_label: String,

    /// Project namespace of the part
    pub project: String,

    pub version: u32,
    pub checksum: Checksum,
    pub posted: String,

    /// File name the content arrived under
    pub source_name: String,

    pub archived_at: DateTime<Utc>,
    pub metadata: MetadataRecord,
}

/// A version read back from the archive
#[derive(Debug, Clone)]
pub struct ArchivedVersion {
    pub meta: VersionMeta,
    pub content: Vec<u8>,
}

/// Where a committed version lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRef {
    pub path: PathBuf,
    pub part: String,
    pub version: u32,
    pub checksum: Checksum,
}

/// Path arithmetic for the archive tree
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
}

impl ArchiveLayout {
    const ENTRY_EXTENSION: &'static str = "cwv";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{project}/{part}`
    pub fn part_dir(&self, project: &str, part: &str) -> PathBuf {
        let project = match sanitize(project) {
            p if p.is_empty() => UNKNOWN.to_string(),
            p => p,
        };
        self.root.join(project).join(part)
    }

    /// `{root}/{project}/{part}/v000042.cwv`
    pub fn entry_path(&self, project: &str, part: &str, version: u32) -> PathBuf {
        self.part_dir(project, part)
            .join(format!("v{:06}.{}", version, Self::ENTRY_EXTENSION))
    }

    pub fn changelog_path(&self, project: &str, part: &str) -> PathBuf {
        self.part_dir(project, part).join(CHANGELOG_FILENAME)
    }

    /// "v000042.cwv" → Some(42)
    pub fn parse_entry_version(path: &Path) -> Option<u32> {
        if path.extension()?.to_str()? != Self::ENTRY_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        stem.strip_prefix('v')?.parse().ok()
    }
}
