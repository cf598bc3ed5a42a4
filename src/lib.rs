//! # Chip Warden
//!
//! A versioned archive engine for CNC program files:
//! - Metadata extraction from an embedded comment block
//! - Durable, per-part version numbering (journaled ledger)
//! - Immutable archive history with a per-part change log
//! - Atomic publishing into the directory the controllers read from
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Intake (watcher / CLI / backlog)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ IntakeEvent
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                                │
//! │                (per-part lock, state machine)                │
//! └──────┬──────────────┬──────────────┬──────────────┬─────────┘
//!        │              │              │              │
//!        ▼              ▼              ▼              ▼
//!  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌─────────────┐
//!  │ Extractor │  │  Ledger   │  │  Archive  │  │  Publisher  │
//!  │  (pure)   │  │ (journal) │  │ (append)  │  │  (rename)   │
//!  └───────────┘  └───────────┘  └───────────┘  └──────┬──────┘
//!                                                      │
//!                                                      ▼
//!                                               ┌─────────────┐
//!                                               │  Notifiers  │
//!                                               └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod checksum;
mod fs_util;
pub mod metadata;
pub mod part;
pub mod journal;
pub mod ledger;
pub mod archive;
pub mod publish;
pub mod notify;
pub mod intake;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ChipError, Result};
pub use config::{Config, IdempotencePolicy, RetryPolicy};
pub use engine::{Engine, ReconcileReport, Stage, VersionReport};
pub use intake::IntakeEvent;
pub use metadata::{Extractor, MetadataRecord};
pub use notify::{ChannelNotifier, LogNotifier, Notifier, VersionNotice};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of chipwarden
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
