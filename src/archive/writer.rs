//! Archive Writer
//!
//! Commits new versions into the archive. The only component that creates
//! files under the archive tree (besides the ledger journal).

use std::fs;

use crate::error::{ChipError, Result};
use crate::fs_util::write_atomic;

use super::{format, ArchiveLayout, ArchiveReader, ArchiveRef, ChangeLog, VersionMeta};

#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    layout: ArchiveLayout,
    reader: ArchiveReader,
}

impl ArchiveWriter {
    pub fn new(layout: ArchiveLayout) -> Self {
        let reader = ArchiveReader::new(layout.clone());
        Self { layout, reader }
    }

    /// Commit a new immutable version
    ///
    /// Steps:
    /// 1. Refuse if `(part, version)` already exists (`DuplicateVersion`)
    /// 2. Write the entry via temp file + fsync + rename
    /// 3. Append the change note for this version
    ///
    /// I/O failures surface as `ArchiveWrite`. Once step 2 has succeeded the
    /// version is durable even if step 3 fails; `ensure_change_note` can be
    /// re-run safely.
    pub fn commit(&self, meta: &VersionMeta, content: &[u8]) -> Result<ArchiveRef> {
        let wrap = |source: std::io::Error| ChipError::ArchiveWrite {
            part: meta.part.clone(),
            version: meta.version,
            source,
        };

        // Step 1: Address must be fresh
        let dir = self.layout.part_dir(&meta.project, &meta.part);
        fs::create_dir_all(&dir).map_err(wrap)?;
        let path = self.layout.entry_path(&meta.project, &meta.part, meta.version);
        if path.exists() {
            return Err(ChipError::DuplicateVersion {
                part: meta.part.clone(),
                version: meta.version,
            });
        }

        // Step 2: Durable entry
        let encoded = format::encode(meta, content)?;
        write_atomic(&path, &[&encoded.head, content, &encoded.footer]).map_err(wrap)?;

        // Step 3: Change note
        self.ensure_change_note(meta)?;

        tracing::debug!(
            part = %meta.part,
            version = meta.version,
            path = %path.display(),
            "archived version"
        );

        Ok(ArchiveRef {
            path,
            part: meta.part.clone(),
            version: meta.version,
            checksum: meta.checksum,
        })
    }

    /// Make sure the change log has a section for `meta`
    pub fn ensure_change_note(&self, meta: &VersionMeta) -> Result<()> {
        let previous = if meta.version > 1 {
            match self.reader.read_meta(&meta.project, &meta.part, meta.version - 1) {
                Ok(prev) => Some(prev),
                Err(e) => {
                    tracing::warn!(
                        part = %meta.part,
                        version = meta.version - 1,
                        error = %e,
                        "previous version unreadable; change note lists no deltas"
                    );
                    None
                }
            }
        } else {
            None
        };

        let changelog = ChangeLog::new(self.layout.changelog_path(&meta.project, &meta.part));
        changelog
            .ensure_entry(meta, previous.as_ref())
            .map_err(|source| ChipError::ArchiveWrite {
                part: meta.part.clone(),
                version: meta.version,
                source,
            })?;
        Ok(())
    }

    pub fn reader(&self) -> &ArchiveReader {
        &self.reader
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }
}
