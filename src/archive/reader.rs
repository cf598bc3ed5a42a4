//! Archive Reader
//!
//! Reads committed versions back. Entries are immutable once renamed into
//! place, so reads take no locks.

use std::fs;
use std::io::ErrorKind;

use crate::error::Result;

use super::{format, ArchiveLayout, ArchivedVersion, VersionMeta};

#[derive(Debug, Clone)]
pub struct ArchiveReader {
    layout: ArchiveLayout,
}

impl ArchiveReader {
    pub fn new(layout: ArchiveLayout) -> Self {
        Self { layout }
    }

    /// Read a version's content and metadata, verifying CRC and checksum
    pub fn read(&self, project: &str, part: &str, version: u32) -> Result<ArchivedVersion> {
        let path = self.layout.entry_path(project, part, version);
        let (meta, content) = format::read_entry(&path)?;
        Ok(ArchivedVersion { meta, content })
    }

    /// Read only a version's metadata
    pub fn read_meta(&self, project: &str, part: &str, version: u32) -> Result<VersionMeta> {
        format::read_meta(&self.layout.entry_path(project, part, version))
    }

    pub fn exists(&self, project: &str, part: &str, version: u32) -> bool {
        self.layout.entry_path(project, part, version).is_file()
    }

    /// Version numbers present on disk for a part, ascending
    pub fn list_versions(&self, project: &str, part: &str) -> Result<Vec<u32>> {
        let dir = self.layout.part_dir(project, part);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if let Some(version) = ArchiveLayout::parse_entry_version(&path) {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }
}
