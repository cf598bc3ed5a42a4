//! Error types for chipwarden
//!
//! Provides a unified error type for all engine operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using ChipError
pub type Result<T> = std::result::Result<T, ChipError>;

/// Unified error type for chipwarden operations
#[derive(Debug, Error)]
pub enum ChipError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Extraction Errors
    // -------------------------------------------------------------------------
    #[error("Malformed metadata block: {reason}")]
    MalformedMetadata { reason: String },

    #[error("Invalid part identifier: {0:?}")]
    InvalidPart(String),

    // -------------------------------------------------------------------------
    // Archive Errors
    // -------------------------------------------------------------------------
    #[error("Archive write failed for {part} v{version}: {source}")]
    ArchiveWrite {
        part: String,
        version: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive corruption detected: {0}")]
    ArchiveCorruption(String),

    #[error("Version {version} of {part} already exists in the archive")]
    DuplicateVersion { part: String, version: u32 },

    // -------------------------------------------------------------------------
    // Distribution Errors
    // -------------------------------------------------------------------------
    #[error("Publish failed for {part} v{version}: {source}")]
    Publish {
        part: String,
        version: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Distribution name collision: {path} exists with different content")]
    NameCollision { path: PathBuf },

    // -------------------------------------------------------------------------
    // Journal Errors
    // -------------------------------------------------------------------------
    #[error("Journal corruption detected: {0}")]
    JournalCorruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChipError {
    /// Whether the caller may resubmit the same event later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChipError::Io(_) | ChipError::ArchiveWrite { .. } | ChipError::Publish { .. }
        )
    }

    /// Faults that mean the ledger, archive or distribution directory disagree.
    ///
    /// These should never happen while a single engine owns the directories
    /// and warrant an operator alert.
    pub fn is_consistency_fault(&self) -> bool {
        matches!(
            self,
            ChipError::DuplicateVersion { .. }
                | ChipError::NameCollision { .. }
                | ChipError::JournalCorruption(_)
                | ChipError::ArchiveCorruption(_)
        )
    }
}

impl From<bincode::Error> for ChipError {
    fn from(err: bincode::Error) -> Self {
        ChipError::Serialization(err.to_string())
    }
}
