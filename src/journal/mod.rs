//! Ledger Journal Module
//!
//! Append-only log that makes every version assignment durable.
//!
//! ## Responsibilities
//! - Append ledger operations, synced before the call returns
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering
//! - Crash recovery: torn tails are cut, anything worse is refused
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The journal is never checkpointed or truncated behind the last valid
//! frame; replaying it rebuilds the ledger index.

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{JournalEntry, LedgerOp, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use reader::{JournalIterator, JournalReader};
pub use recovery::{JournalRecovery, RecoveryResult};
pub use writer::JournalWriter;
