//! Engine Module
//!
//! The orchestrator that takes one intake file from arrival to distribution.
//!
//! ## Responsibilities
//! - Sequence extractor → ledger → archive → publisher per file
//! - Hold the part lock from version assignment through publish
//! - Retry the publish step with backoff (the version is already archived)
//! - Reconcile ledger, archive and distribution on startup
//!
//! ## Per-file states
//! ```text
//!   Received ──► Extracted ──► Versioned ──► Archived ──► Published ──► Done
//!                    │             │             │            │
//!                    └─────────────┴──── Failed ─┴────────────┘
//!                                  │
//!                                  └──► Done (idempotent replay)
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use chrono::Utc;
use parking_lot::RwLock;

use crate::archive::{ArchiveLayout, ArchiveWriter, ArchivedVersion, VersionMeta};
use crate::checksum::Checksum;
use crate::config::Config;
use crate::error::{ChipError, Result};
use crate::intake::IntakeEvent;
use crate::journal::RecoveryResult;
use crate::ledger::{Fingerprint, PartGuard, VersionLedger, VersionSlot};
use crate::metadata::{compare, Extractor, MetadataRecord};
use crate::notify::{Notifier, VersionNotice};
use crate::part::{sanitize, IdentitySource, PartId};
use crate::publish::{DistributionPublisher, PublishOutcome};

/// Processing stage of one intake file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Extracted,
    Versioned,
    Archived,
    Published,
    Done,

    /// Absorbing; the error is returned to the caller
    Failed,
}

/// Result descriptor of one processed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionReport {
    pub part: String,
    pub project: String,
    pub version: u32,

    /// False for an idempotent replay of the current version
    pub is_new: bool,

    pub machine: String,
    pub setup: String,
    pub posted: String,

    /// Change warnings versus the previous version
    pub warnings: Vec<String>,

    /// Current distribution file of the part, when known
    pub distribution_path: Option<PathBuf>,
}

/// What `Engine::reconcile` repaired
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Pending assignments found archived and committed
    pub rolled_forward: Vec<(String, u32)>,

    /// Committed versions published from the archive
    pub republished: Vec<(String, u32)>,

    /// Parts that could not be repaired
    pub failed: Vec<(String, String)>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.rolled_forward.is_empty() && self.republished.is_empty() && self.failed.is_empty()
    }
}

/// The versioned archive engine
///
/// ## Concurrency Model
///
/// - Files for **different parts** are processed fully in parallel
/// - Files for the **same part** are serialized by the ledger's part lock,
///   held from settle/assign through archive, commit and publish
/// - Notifiers run after the lock is released
///
/// `Engine` is `Sync`; share it by reference (scoped threads) or `Arc`.
pub struct Engine {
    config: Config,
    extractor: Extractor,
    ledger: VersionLedger,
    archive: ArchiveWriter,
    publisher: DistributionPublisher,
    notifiers: RwLock<Vec<Box<dyn Notifier>>>,
}

impl Engine {
    const LEDGER_FILENAME: &'static str = "ledger.log";
    const POSTED_FORMAT: &'static str = "%Y-%m-%d-%H%M";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config and create the three directories
    /// 2. Open the ledger (journal recovery + replay)
    /// 3. Reconcile pending and unpublished versions
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Directories
        config.validate()?;
        fs::create_dir_all(&config.intake_dir)?;
        fs::create_dir_all(&config.archive_dir)?;
        fs::create_dir_all(&config.distribution_dir)?;

        // Step 2: Ledger
        let ledger_path = config.archive_dir.join(Self::LEDGER_FILENAME);
        let ledger = VersionLedger::open(&ledger_path, config.idempotence)?;

        let archive = ArchiveWriter::new(ArchiveLayout::new(&config.archive_dir));
        let publisher = DistributionPublisher::new(
            &config.distribution_dir,
            config.retention,
            &config.distribution_extension,
        );

        let engine = Self {
            extractor: Extractor::new(config.max_block_lines),
            config,
            ledger,
            archive,
            publisher,
            notifiers: RwLock::new(Vec::new()),
        };

        // Step 3: Reconcile
        let report = engine.reconcile();
        if !report.is_clean() {
            tracing::info!(
                rolled_forward = report.rolled_forward.len(),
                republished = report.republished.len(),
                failed = report.failed.len(),
                "reconciled on open"
            );
        }

        Ok(engine)
    }

    /// Register a consumer of new-version notices
    pub fn add_notifier(&self, notifier: Box<dyn Notifier>) {
        self.notifiers.write().push(notifier);
    }

    /// Process one intake event end to end
    ///
    /// Returns the report for a new version or an idempotent replay. Errors
    /// are logged, passed to `notify_failure`, and returned.
    pub fn process(&self, event: &IntakeEvent) -> Result<VersionReport> {
        match self.run(event) {
            Ok(report) => Ok(report),
            Err(e) => {
                stage(&event.path, Stage::Failed);
                self.report_failure(&event.path, &e);
                Err(e)
            }
        }
    }

    /// Log a failed file and tell the notifiers
    pub fn report_failure(&self, path: &Path, error: &ChipError) {
        if error.is_consistency_fault() {
            tracing::error!(
                path = %path.display(),
                error = %error,
                "consistency fault; operator attention required"
            );
        } else if error.is_retryable() {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "processing failed; file left for retry"
            );
        } else {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "file rejected; left for inspection"
            );
        }

        for notifier in self.notifiers.read().iter() {
            if let Err(e) = notifier.notify_failure(path, error) {
                tracing::warn!(error = %e, "failure notifier error ignored");
            }
        }
    }

    fn run(&self, event: &IntakeEvent) -> Result<VersionReport> {
        let source = event.path.display();
        stage(&event.path, Stage::Received);

        // Received → Extracted
        let text = String::from_utf8_lossy(&event.content);
        let record = self.extractor.extract(&text)?;
        let part = PartId::identify(&record, &event.path)?;
        if part.source() == IdentitySource::Filename {
            tracing::info!(
                path = %source,
                part = part.key(),
                "no PART field; identified by file name"
            );
        }
        let posted = record
            .posted
            .clone()
            .unwrap_or_else(|| event.received_at.format(Self::POSTED_FORMAT).to_string());
        let fingerprint = Fingerprint {
            checksum: Checksum::of(&event.content),
            posted,
            posted_declared: record.posted.is_some(),
        };
        stage(&event.path, Stage::Extracted);

        // Extracted → Versioned
        let guard = self.ledger.lock(part.key());
        self.settle_pending(&guard)?;
        let assignment = self.ledger.next_version(&guard, part.project(), &fingerprint)?;
        stage(&event.path, Stage::Versioned);

        if !assignment.is_new {
            return self.replay(&guard, &record, assignment.version);
        }

        let state = self.ledger.state(part.key()).ok_or_else(|| {
            ChipError::JournalCorruption(format!("assigned part {} missing from index", part))
        })?;
        let slot = state.pending.as_ref().ok_or_else(|| {
            ChipError::JournalCorruption(format!("part {} has no pending assignment", part))
        })?;
        let version = slot.version;
        let posted = slot.posted.clone();
        let project = state.project.clone();
        if assignment.resumed {
            tracing::info!(part = part.key(), version, "resuming uncommitted version");
        }

        let warnings = self.change_warnings(&project, part.key(), version, &record);

        // Versioned → Archived
        let meta = VersionMeta {
            part: part.key().to_string(),
            part_label: part.label().to_string(),
            project: project.clone(),
            version,
            checksum: fingerprint.checksum,
            posted: posted.clone(),
            source_name: event.source_name(),
            archived_at: Utc::now(),
            metadata: record.clone(),
        };
        self.archive_or_roll_forward(&meta, &event.content)?;
        self.ledger.commit(&guard, version)?;
        stage(&event.path, Stage::Archived);

        // Archived → Published
        let outcome = self.publish_with_retry(part.key(), version, &posted, &event.content)?;
        self.ledger.mark_published(&guard, version)?;
        stage(&event.path, Stage::Published);
        drop(guard);

        // Published → Done
        let report = VersionReport {
            part: part.key().to_string(),
            project,
            version,
            is_new: true,
            machine: record.machine().to_string(),
            setup: record.setup().to_string(),
            posted,
            warnings,
            distribution_path: Some(outcome.path),
        };
        tracing::info!(
            part = %report.part,
            version = report.version,
            machine = %report.machine,
            setup = %report.setup,
            "new version published"
        );
        self.notify(&report);
        stage(&event.path, Stage::Done);

        Ok(report)
    }

    /// Idempotent replay: nothing is archived, the publish is re-attempted
    /// only when the distribution lags behind the current version
    fn replay(
        &self,
        guard: &PartGuard<'_>,
        record: &MetadataRecord,
        version: u32,
    ) -> Result<VersionReport> {
        let key = guard.key();
        let state = self.ledger.state(key).unwrap_or_default();
        let posted = state
            .highest()
            .map(|slot| slot.posted.clone())
            .unwrap_or_default();

        let distribution_path = if state.needs_publish() {
            tracing::info!(
                part = key,
                version,
                "replay of unpublished version; publishing from archive"
            );
            Some(self.republish_current(guard)?.path)
        } else {
            tracing::debug!(part = key, version, "idempotent replay");
            self.publisher.current(key).ok().flatten()
        };

        Ok(VersionReport {
            part: key.to_string(),
            project: state.project,
            version,
            is_new: false,
            machine: record.machine().to_string(),
            setup: record.setup().to_string(),
            posted,
            warnings: Vec::new(),
            distribution_path,
        })
    }

    /// Write the archive entry, accepting an identical entry left behind by
    /// an interrupted earlier attempt
    fn archive_or_roll_forward(&self, meta: &VersionMeta, content: &[u8]) -> Result<()> {
        match self.archive.commit(meta, content) {
            Ok(_) => Ok(()),
            Err(ChipError::DuplicateVersion { part, version }) => {
                let existing = self.archive.reader().read_meta(&meta.project, &part, version)?;
                if existing.checksum != meta.checksum {
                    tracing::error!(
                        part = %part,
                        version,
                        archived = %existing.checksum.short(),
                        submitted = %meta.checksum.short(),
                        "archive already holds different content for this version"
                    );
                    return Err(ChipError::DuplicateVersion { part, version });
                }
                tracing::warn!(
                    part = %part,
                    version,
                    "archive entry already present; rolling forward"
                );
                self.archive.ensure_change_note(&existing)
            }
            Err(e) => Err(e),
        }
    }

    /// Commit a pending assignment whose archive entry already exists
    ///
    /// Returns the version rolled forward, if any.
    fn settle_pending(&self, guard: &PartGuard<'_>) -> Result<Option<u32>> {
        let key = guard.key();
        let Some(state) = self.ledger.state(key) else {
            return Ok(None);
        };
        let Some(pending) = state.pending else {
            return Ok(None);
        };
        let reader = self.archive.reader();
        if !reader.exists(&state.project, key, pending.version) {
            return Ok(None);
        }

        let meta = reader.read_meta(&state.project, key, pending.version)?;
        if meta.checksum != pending.checksum {
            tracing::error!(
                part = key,
                version = pending.version,
                "archive entry does not match the pending assignment"
            );
            return Ok(None);
        }

        self.archive.ensure_change_note(&meta)?;
        self.ledger.commit(guard, pending.version)?;
        tracing::info!(part = key, version = pending.version, "rolled forward archived version");
        Ok(Some(pending.version))
    }

    /// Publish the part's current version from the archive
    fn republish_current(&self, guard: &PartGuard<'_>) -> Result<PublishOutcome> {
        let key = guard.key();
        let state = self
            .ledger
            .state(key)
            .ok_or_else(|| ChipError::InvalidPart(key.to_string()))?;
        let version = state.highest_version();
        let archived = self.archive.reader().read(&state.project, key, version)?;
        let outcome =
            self.publish_with_retry(key, version, &archived.meta.posted, &archived.content)?;
        self.ledger.mark_published(guard, version)?;
        Ok(outcome)
    }

    fn publish_with_retry(
        &self,
        part: &str,
        version: u32,
        posted: &str,
        content: &[u8],
    ) -> Result<PublishOutcome> {
        let policy = self.config.publish_retry;
        let mut attempt = 1;
        loop {
            match self.publisher.publish(part, version, posted, content) {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        part,
                        version,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "publish failed; retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn change_warnings(
        &self,
        project: &str,
        part: &str,
        version: u32,
        record: &MetadataRecord,
    ) -> Vec<String> {
        if version <= 1 {
            return Vec::new();
        }
        match self.archive.reader().read_meta(project, part, version - 1) {
            Ok(previous) => compare(&previous.metadata, record).warnings,
            Err(e) => {
                tracing::warn!(
                    part,
                    version = version - 1,
                    error = %e,
                    "previous version unreadable"
                );
                Vec::new()
            }
        }
    }

    fn notify(&self, report: &VersionReport) {
        let notice = VersionNotice {
            part: report.part.clone(),
            project: report.project.clone(),
            version: report.version,
            machine: report.machine.clone(),
            setup: report.setup.clone(),
            posted: report.posted.clone(),
            warnings: report.warnings.clone(),
        };
        for notifier in self.notifiers.read().iter() {
            if let Err(e) = notifier.notify(&notice) {
                tracing::warn!(
                    part = %notice.part,
                    version = notice.version,
                    error = %e,
                    "notifier error ignored"
                );
            }
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Repair state left by an interrupted run
    ///
    /// 1. Pending assignments already archived with the same checksum are
    ///    committed
    /// 2. Committed versions never recorded as published are published from
    ///    the archive
    ///
    /// Failures are logged and reported; they never stop the pass.
    pub fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for key in self.ledger.pending_parts() {
            let guard = self.ledger.lock(&key);
            match self.settle_pending(&guard) {
                Ok(Some(version)) => report.rolled_forward.push((key.clone(), version)),
                Ok(None) => {
                    tracing::debug!(part = %key, "pending assignment left for the next submission")
                }
                Err(e) => {
                    tracing::warn!(part = %key, error = %e, "failed to settle pending version");
                    report.failed.push((key.clone(), e.to_string()));
                }
            }
        }

        for key in self.ledger.unpublished_parts() {
            let guard = self.ledger.lock(&key);
            // Re-check under the lock
            if !self.ledger.state(&key).is_some_and(|s| s.needs_publish()) {
                continue;
            }
            match self.republish_current(&guard) {
                Ok(_) => {
                    let version = self.ledger.state(&key).map_or(0, |s| s.published);
                    report.republished.push((key.clone(), version));
                }
                Err(e) => {
                    tracing::warn!(part = %key, error = %e, "failed to republish current version");
                    report.failed.push((key.clone(), e.to_string()));
                }
            }
        }

        report
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Committed history of a part, oldest first
    ///
    /// `part` may be given as posted or already sanitized.
    pub fn history(&self, part: &str) -> Vec<VersionSlot> {
        self.ledger.history(&sanitize(part))
    }

    /// Highest committed version of a part
    pub fn current(&self, part: &str) -> Option<VersionSlot> {
        self.ledger.current(&sanitize(part))
    }

    /// Read a committed version back from the archive
    pub fn read_version(&self, part: &str, version: u32) -> Result<ArchivedVersion> {
        let key = sanitize(part);
        let state = self
            .ledger
            .state(&key)
            .ok_or_else(|| ChipError::InvalidPart(part.to_string()))?;
        self.archive.reader().read(&state.project, &key, version)
    }

    /// Check the ledger journal on disk
    pub fn verify_journal(&self) -> Result<RecoveryResult> {
        self.ledger.verify()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    pub fn publisher(&self) -> &DistributionPublisher {
        &self.publisher
    }

    pub fn archive(&self) -> &ArchiveWriter {
        &self.archive
    }
}

fn stage(path: &Path, stage: Stage) {
    tracing::debug!(path = %path.display(), ?stage, "stage");
}
