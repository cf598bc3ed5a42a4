//! Notification boundary
//!
//! The engine hands a `VersionNotice` to every registered notifier once a new
//! version is archived and published. Notifier errors are logged by the
//! engine and never undo or delay the version.

use std::io::ErrorKind;
use std::path::Path;

use crossbeam::channel::{Sender, TrySendError};

use crate::error::{ChipError, Result};

/// A new version reached the distribution directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionNotice {
    pub part: String,
    pub project: String,
    pub version: u32,
    pub machine: String,
    pub setup: String,
    pub posted: String,

    /// Change warnings versus the previous version
    pub warnings: Vec<String>,
}

/// Consumer of engine results (chat, alerting, dashboards)
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &VersionNotice) -> Result<()>;

    /// Called when an intake file could not be processed
    fn notify_failure(&self, _path: &Path, _error: &ChipError) -> Result<()> {
        Ok(())
    }
}

/// Writes notices to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &VersionNotice) -> Result<()> {
        tracing::info!(
            part = %notice.part,
            project = %notice.project,
            version = notice.version,
            machine = %notice.machine,
            setup = %notice.setup,
            posted = %notice.posted,
            "new version available"
        );
        for warning in &notice.warnings {
            tracing::warn!(part = %notice.part, version = notice.version, "{}", warning);
        }
        Ok(())
    }

    fn notify_failure(&self, path: &Path, error: &ChipError) -> Result<()> {
        tracing::error!(path = %path.display(), error = %error, "intake file not processed");
        Ok(())
    }
}

/// Forwards notices into a bounded channel without ever blocking
///
/// A full or disconnected channel is reported as an error to the engine,
/// which logs it and carries on.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: Sender<VersionNotice>,
}

impl ChannelNotifier {
    pub fn new(sender: Sender<VersionNotice>) -> Self {
        Self { sender }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: &VersionNotice) -> Result<()> {
        self.sender.try_send(notice.clone()).map_err(|e| {
            let (kind, reason) = match e {
                TrySendError::Full(_) => (ErrorKind::WouldBlock, "notification channel full"),
                TrySendError::Disconnected(_) => {
                    (ErrorKind::BrokenPipe, "notification channel disconnected")
                }
            };
            ChipError::Io(std::io::Error::new(kind, reason))
        })
    }
}
