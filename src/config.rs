//! Configuration for chipwarden
//!
//! Centralized configuration with sensible defaults. The engine never reads
//! configuration on its own; the binary (or an embedding service) builds a
//! `Config` and hands it to `Engine::open`.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ChipError, Result};

/// Main configuration for an engine instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Directory Configuration
    // -------------------------------------------------------------------------
    /// Directory where newly posted program files land
    pub intake_dir: PathBuf,

    /// Root of the version history
    /// Internal structure:
    ///   {archive_dir}/
    ///     ├── ledger.log                 (version ledger journal)
    ///     └── {project}/{part}/
    ///           ├── v000001.cwv          (version entries)
    ///           └── CHANGELOG.md
    pub archive_dir: PathBuf,

    /// Directory the CNC controllers read from
    pub distribution_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Policy Configuration
    // -------------------------------------------------------------------------
    /// How many distribution entries to keep visible per part
    pub retention: usize,

    /// How a resubmitted file is recognised as a replay
    pub idempotence: IdempotencePolicy,

    /// Backoff schedule for the publish step
    pub publish_retry: RetryPolicy,

    // -------------------------------------------------------------------------
    // Intake Configuration
    // -------------------------------------------------------------------------
    /// Max lines between the start and end markers of a metadata block
    pub max_block_lines: usize,

    /// File extensions picked up from the intake directory (lowercase, no dot)
    pub accepted_extensions: Vec<String>,

    /// Extension of canonical files written to the distribution directory
    pub distribution_extension: String,

    /// Delete intake files once their version is archived and published
    pub remove_processed: bool,
}

/// Replay detection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdempotencePolicy {
    /// Same content bytes as the current version is a replay
    #[default]
    Checksum,

    /// Same posted timestamp as the current version is a replay
    PostedTimestamp,
}

/// Exponential backoff schedule
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay after the first failure
    pub base_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after `attempt` failed attempts (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            intake_dir: PathBuf::from("./intake"),
            archive_dir: PathBuf::from("./parts_archive"),
            distribution_dir: PathBuf::from("./distribution"),
            retention: 2,
            idempotence: IdempotencePolicy::Checksum,
            publish_retry: RetryPolicy::default(),
            max_block_lines: 64,
            accepted_extensions: vec!["nc".to_string(), "gcode".to_string()],
            distribution_extension: "nc".to_string(),
            remove_processed: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject configurations the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.retention == 0 {
            return Err(ChipError::Config(
                "retention must keep at least one distribution entry".to_string(),
            ));
        }
        if self.publish_retry.max_attempts == 0 {
            return Err(ChipError::Config(
                "publish_retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_block_lines == 0 {
            return Err(ChipError::Config("max_block_lines must be at least 1".to_string()));
        }
        if self.distribution_extension.is_empty() || self.distribution_extension.contains('.') {
            return Err(ChipError::Config(format!(
                "invalid distribution extension {:?}",
                self.distribution_extension
            )));
        }

        let dirs = [
            ("intake_dir", &self.intake_dir),
            ("archive_dir", &self.archive_dir),
            ("distribution_dir", &self.distribution_dir),
        ];
        for (i, (name_a, a)) in dirs.iter().enumerate() {
            for (name_b, b) in &dirs[i + 1..] {
                if a == b {
                    return Err(ChipError::Config(format!(
                        "{} and {} must be different directories ({})",
                        name_a,
                        name_b,
                        a.display()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Whether a file extension is picked up by intake
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.accepted_extensions
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(ext))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the intake directory
    pub fn intake_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.intake_dir = path.into();
        self
    }

    /// Set the archive directory (root for version history and the ledger)
    pub fn archive_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.archive_dir = path.into();
        self
    }

    /// Set the distribution directory
    pub fn distribution_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.distribution_dir = path.into();
        self
    }

    /// Set how many distribution entries are kept per part
    pub fn retention(mut self, count: usize) -> Self {
        self.config.retention = count;
        self
    }

    /// Set the replay detection policy
    pub fn idempotence(mut self, policy: IdempotencePolicy) -> Self {
        self.config.idempotence = policy;
        self
    }

    /// Set the publish backoff schedule
    pub fn publish_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.publish_retry = policy;
        self
    }

    /// Set the metadata block scan window (in lines)
    pub fn max_block_lines(mut self, lines: usize) -> Self {
        self.config.max_block_lines = lines;
        self
    }

    /// Set the extensions picked up from the intake directory
    pub fn accepted_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.accepted_extensions = extensions
            .into_iter()
            .map(|ext| ext.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Set the extension of canonical distribution files
    pub fn distribution_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.distribution_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    /// Set whether processed intake files are removed
    pub fn remove_processed(mut self, remove: bool) -> Self {
        self.config.remove_processed = remove;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
