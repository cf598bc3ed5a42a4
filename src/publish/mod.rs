//! Distribution Module
//!
//! Keeps the directory the controllers read from in step with the ledger.
//!
//! ## Responsibilities
//! - Expose each new version under its canonical name, atomically
//! - Treat a re-publish of identical bytes as a no-op
//! - Retire entries beyond the retention count, newest version first
//!
//! The publisher never touches archive history; a retired distribution entry
//! can always be re-created from the archive.

mod publisher;

use std::path::PathBuf;

pub use publisher::DistributionPublisher;

/// Result of one publish call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Canonical file now visible in the distribution directory
    pub path: PathBuf,

    /// The file already existed with identical content
    pub already_present: bool,

    /// Older entries removed by the retention pass
    pub retired: Vec<PathBuf>,
}
