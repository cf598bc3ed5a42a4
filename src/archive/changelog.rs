//! Per-part change log (CHANGELOG.md)
//!
//! One section per version, oldest first. Fields that changed since the
//! previous version are written as `old -> new`.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::fs_util::sync_dir;
use crate::metadata::{compare, MetadataChanges};

use super::VersionMeta;

pub const CHANGELOG_FILENAME: &str = "CHANGELOG.md";

/// Accumulating change log of one part
pub struct ChangeLog {
    path: PathBuf,
}

impl ChangeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the section for `meta` unless it is already present
    ///
    /// Returns whether a section was written. The append is synced before
    /// returning.
    pub fn ensure_entry(
        &self,
        meta: &VersionMeta,
        previous: Option<&VersionMeta>,
    ) -> std::io::Result<bool> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };

        let heading_prefix = format!("## Version {} ", meta.version);
        if existing.lines().any(|line| line.starts_with(&heading_prefix)) {
            return Ok(false);
        }

        let mut text = String::new();
        if existing.is_empty() {
            let _ = write!(
                text,
                "# {} - Change Log\n\nProject: {}\n\n",
                meta.part_label, meta.project
            );
        }
        text.push_str(&render_entry(meta, previous));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        if existing.is_empty() {
            if let Some(parent) = self.path.parent() {
                sync_dir(parent)?;
            }
        }
        Ok(true)
    }
}

fn render_entry(meta: &VersionMeta, previous: Option<&VersionMeta>) -> String {
    let record = &meta.metadata;
    let changes = previous
        .map(|prev| compare(&prev.metadata, record))
        .unwrap_or_default();

    let field = |name: &str, current: String| -> String {
        match changes.get(name) {
            Some(change) => format!("{} -> {}", change.old, change.new),
            None => current,
        }
    };

    let mut text = String::new();
    let _ = writeln!(text, "## Version {} - {}", meta.version, meta.posted);
    text.push('\n');
    let _ = writeln!(text, "- **Setup:** {}", field("setup", record.setup().to_string()));
    let _ = writeln!(text, "- **Machine:** {}", field("machine", record.machine().to_string()));
    let _ = writeln!(
        text,
        "- **Operations:** {}",
        field("operations", record.operations().to_string())
    );
    let _ = writeln!(
        text,
        "- **Tools:** {}",
        field("tool_count", record.tool_count().to_string())
    );
    let _ = writeln!(text, "- **Checksum:** {}", meta.checksum.short());
    let _ = writeln!(text, "- **Source:** {}", meta.source_name);
    let _ = writeln!(text, "- **Archived:** {}", meta.archived_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if record.is_empty() {
        text.push_str("- **Note:** no metadata block; identified by file name\n");
    }
    for flagged in record.flagged_fields() {
        let _ = writeln!(text, "- **Note:** {} is not numeric", flagged);
    }
    append_warnings(&mut text, &changes);
    text.push('\n');
    text
}

fn append_warnings(text: &mut String, changes: &MetadataChanges) {
    for warning in &changes.warnings {
        let _ = writeln!(text, "- **Warning:** {}", warning);
    }
}
