//! Distribution Publisher

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{ChipError, Result};
use crate::fs_util::{is_temp_name, write_atomic};
use crate::part::CanonicalName;

use super::PublishOutcome;

/// Writes canonical files into the distribution directory
///
/// Callers serialize publishes per part (the engine holds the part lock), so
/// the listing used for retention cannot race with another publish of the
/// same part.
#[derive(Debug, Clone)]
pub struct DistributionPublisher {
    dir: PathBuf,
    retention: usize,
    extension: String,
}

impl DistributionPublisher {
    pub fn new(dir: impl Into<PathBuf>, retention: usize, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            retention: retention.max(1),
            extension: extension.into(),
        }
    }

    pub fn canonical_name(&self, part: &str, version: u32, posted: &str) -> CanonicalName {
        CanonicalName::new(part, version, posted, &self.extension)
    }

    /// Publish `content` as `version` of `part`
    ///
    /// Steps:
    /// 1. If the canonical name exists with the same bytes → nothing to write
    /// 2. If it exists with different bytes → `NameCollision`
    /// 3. Otherwise write a hidden temp file, fsync, rename into place
    /// 4. Apply retention (failures are logged, never returned)
    pub fn publish(
        &self,
        part: &str,
        version: u32,
        posted: &str,
        content: &[u8],
    ) -> Result<PublishOutcome> {
        let wrap = |source: std::io::Error| ChipError::Publish {
            part: part.to_string(),
            version,
            source,
        };

        fs::create_dir_all(&self.dir).map_err(wrap)?;
        let name = self.canonical_name(part, version, posted);
        let target = self.dir.join(name.file_name());

        let already_present = match fs::read(&target) {
            Ok(existing) if existing == content => true,
            Ok(_) => return Err(ChipError::NameCollision { path: target }),
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(wrap(e)),
        };

        if !already_present {
            write_atomic(&target, &[content]).map_err(wrap)?;
            tracing::info!(part, version, path = %target.display(), "published");
        }

        let retired = self.apply_retention(part);

        Ok(PublishOutcome {
            path: target,
            already_present,
            retired,
        })
    }

    /// Distribution entries of one part, newest version first
    pub fn entries(&self, part: &str) -> Result<Vec<(CanonicalName, PathBuf)>> {
        let listing = match fs::read_dir(&self.dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in listing {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if is_temp_name(file_name) {
                continue;
            }
            match CanonicalName::parse(file_name) {
                Some(name) if name.part == part && name.extension == self.extension => {
                    entries.push((name, entry.path()));
                }
                _ => {}
            }
        }

        entries.sort_by(|(a, _), (b, _)| {
            b.version
                .cmp(&a.version)
                .then_with(|| b.posted.cmp(&a.posted))
        });
        Ok(entries)
    }

    /// Newest entry of a part, if any is visible
    pub fn current(&self, part: &str) -> Result<Option<PathBuf>> {
        Ok(self.entries(part)?.into_iter().next().map(|(_, path)| path))
    }

    /// Remove all but the newest `retention` entries of a part
    ///
    /// Returns the paths actually removed. An entry that vanished in the
    /// meantime or cannot be deleted is logged and skipped.
    pub fn apply_retention(&self, part: &str) -> Vec<PathBuf> {
        let entries = match self.entries(part) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(part, error = %e, "cannot list distribution directory for retention");
                return Vec::new();
            }
        };

        let mut retired = Vec::new();
        for (name, path) in entries.into_iter().skip(self.retention) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(part, version = name.version, path = %path.display(), "retired");
                    retired.push(path);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "entry already gone");
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to retire entry");
                }
            }
        }
        retired
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> usize {
        self.retention
    }
}
