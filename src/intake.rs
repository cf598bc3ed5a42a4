//! Intake boundary
//!
//! The engine does not watch directories itself. A watcher (or the CLI)
//! builds an `IntakeEvent` per file and hands it to `Engine::process`. For a
//! startup backlog, `scan_intake` + `process_backlog` drain the intake
//! directory with a fixed pool of worker threads.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use crossbeam::channel;

use crate::config::Config;
use crate::engine::{Engine, VersionReport};
use crate::error::Result;
use crate::fs_util::is_temp_name;

/// One file handed to the engine
#[derive(Debug, Clone)]
pub struct IntakeEvent {
    pub path: PathBuf,
    pub content: Bytes,

    /// When the file was observed; the default posted timestamp
    pub received_at: DateTime<Utc>,
}

impl IntakeEvent {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Bytes>, received_at: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            received_at,
        }
    }

    /// Read a file from disk, stamped with the current time
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read(path)?;
        Ok(Self::new(path, content, Utc::now()))
    }

    /// File name the content arrived under
    pub fn source_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Accepted files in the intake directory, oldest modification first
pub fn scan_intake(config: &Config) -> Result<Vec<PathBuf>> {
    let listing = match fs::read_dir(&config.intake_dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in listing {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name();
        if name.to_str().map_or(true, is_temp_name) {
            continue;
        }
        let accepted = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| config.accepts_extension(ext));
        if !accepted {
            tracing::trace!(path = %path.display(), "skipping non-program file");
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((modified, path));
    }

    files.sort();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Read and process one intake file
///
/// The file is removed afterwards when `remove_processed` is set and the
/// outcome was a new version or a replay. Failed files stay in place.
pub fn process_file(engine: &Engine, path: &Path) -> Result<VersionReport> {
    let event = match IntakeEvent::from_path(path) {
        Ok(event) => event,
        Err(e) => {
            engine.report_failure(path, &e);
            return Err(e);
        }
    };
    let report = engine.process(&event)?;

    if engine.config().remove_processed {
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "intake file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove intake file")
            }
        }
    }
    Ok(report)
}

/// Process a batch of files on `workers` threads
///
/// Files for different parts proceed in parallel; the engine serializes
/// files of the same part. Results come back in input order.
pub fn process_backlog(
    engine: &Engine,
    paths: Vec<PathBuf>,
    workers: usize,
) -> Vec<(PathBuf, Result<VersionReport>)> {
    let total = paths.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, total);

    let (job_tx, job_rx) = channel::unbounded::<(usize, PathBuf)>();
    let (result_tx, result_rx) = channel::unbounded();
    for job in paths.into_iter().enumerate() {
        // Receiver is alive until the scope below ends
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let scoped = crossbeam::thread::scope(|scope| {
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move |_| {
                for (index, path) in job_rx.iter() {
                    tracing::trace!(worker, path = %path.display(), "backlog job");
                    let result = process_file(engine, &path);
                    let _ = result_tx.send((index, path, result));
                }
            });
        }
    });
    drop(result_tx);

    if scoped.is_err() {
        tracing::error!("backlog worker panicked; results are incomplete");
    }

    let mut results: Vec<_> = result_rx.iter().collect();
    results.sort_by_key(|(index, _, _)| *index);
    tracing::info!(files = total, processed = results.len(), workers, "backlog drained");
    results
        .into_iter()
        .map(|(_, path, result)| (path, result))
        .collect()
}
