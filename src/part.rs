//! Part identity and canonical file naming.
//!
//! A part is keyed by its sanitized identifier. The same sanitizing rule
//! applies to project namespaces (archive directories) so every path the
//! engine builds is filesystem-safe.

use std::fmt;
use std::path::Path;

use crate::error::{ChipError, Result};
use crate::metadata::{MetadataRecord, UNKNOWN};

/// Identity of a logical part
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartId {
    /// Sanitized identifier; the ledger key and distribution name prefix
    key: String,

    /// Identifier as posted
    label: String,

    /// Project namespace as posted
    project: String,

    source: IdentitySource,
}

/// Where a part identifier came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentitySource {
    /// `PART` field of the metadata block
    Metadata,

    /// File stem, for files without a block
    Filename,
}

impl PartId {
    /// Build an identity from a posted part identifier
    pub fn new(project: impl Into<String>, part: impl Into<String>) -> Result<Self> {
        Self::with_source(project.into(), part.into(), IdentitySource::Metadata)
    }

    /// Identify a file by its metadata, falling back to the file stem
    pub fn identify(record: &MetadataRecord, path: &Path) -> Result<Self> {
        match record.part.as_deref() {
            Some(part) => Self::new(record.project(), part),
            None => Self::from_path(path),
        }
    }

    /// Filename-based identity for unannotated files
    pub fn from_path(path: &Path) -> Result<Self> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::with_source(UNKNOWN.to_string(), stem, IdentitySource::Filename)
    }

    fn with_source(project: String, part: String, source: IdentitySource) -> Result<Self> {
        let key = sanitize(&part);
        if key.is_empty() {
            return Err(ChipError::InvalidPart(part));
        }
        Ok(Self {
            key,
            label: part.trim().to_string(),
            project: project.trim().to_string(),
            source,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn source(&self) -> IdentitySource {
        self.source
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Make an identifier safe for use as a file or directory name
///
/// "Hydraulic Manifold #2" → "hydraulic_manifold_2"
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_lowercase()
}

/// Make a posted timestamp safe for use inside a canonical name
fn sanitize_posted(posted: &str) -> String {
    let mapped: String = posted
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let trimmed = mapped.trim_matches('-');
    if trimmed.is_empty() {
        "unposted".to_string()
    } else {
        trimmed.to_string()
    }
}

// =============================================================================
// Canonical Names
// =============================================================================

/// Name of a distribution file: `<part>_v<version>_<posted>.<ext>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalName {
    pub part: String,
    pub version: u32,
    pub posted: String,
    pub extension: String,
}

impl CanonicalName {
    pub fn new(part_key: &str, version: u32, posted: &str, extension: &str) -> Self {
        Self {
            part: part_key.to_string(),
            version,
            posted: sanitize_posted(posted),
            extension: extension.to_string(),
        }
    }

    /// Parse a file name, returning None unless it is exactly canonical
    pub fn parse(file_name: &str) -> Option<Self> {
        let (stem, extension) = file_name.rsplit_once('.')?;
        let (head, posted) = stem.rsplit_once('_')?;
        let (part, version) = head.rsplit_once("_v")?;

        if part.is_empty() || version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let parsed = Self {
            part: part.to_string(),
            version: version.parse().ok()?,
            posted: posted.to_string(),
            extension: extension.to_string(),
        };

        // Reject names like "1001_v01_x.nc" that would not render back identically
        (parsed.file_name() == file_name).then_some(parsed)
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_v{}_{}.{}",
            self.part, self.version, self.posted, self.extension
        )
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}
