//! Journal Entry definitions
//!
//! Defines the ledger operations and their on-disk frame.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::error::{ChipError, Result};

/// Frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest payload a frame may carry (1 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

/// A single entry in the journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Log Sequence Number - monotonically increasing, starting at 1
    pub lsn: u64,

    /// Timestamp (unix millis) when the entry was created
    pub timestamp: u64,

    /// The ledger operation
    pub op: LedgerOp,
}

/// Operations recorded by the version ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerOp {
    /// A version number was handed out for this content
    Assign {
        part: String,
        project: String,
        version: u32,
        checksum: Checksum,
        posted: String,
    },

    /// The assigned version is durable in the archive
    Commit { part: String, version: u32 },

    /// The version is visible in the distribution directory
    Publish { part: String, version: u32 },
}

impl LedgerOp {
    pub fn part(&self) -> &str {
        match self {
            LedgerOp::Assign { part, .. }
            | LedgerOp::Commit { part, .. }
            | LedgerOp::Publish { part, .. } => part,
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            LedgerOp::Assign { version, .. }
            | LedgerOp::Commit { version, .. }
            | LedgerOp::Publish { version, .. } => *version,
        }
    }
}

impl JournalEntry {
    pub fn new(lsn: u64, op: LedgerOp) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self { lsn, timestamp, op }
    }

    /// Encode as a complete frame: header + payload
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&(self.timestamp, &self.op))?;
        if payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(ChipError::Serialization(format!(
                "journal payload of {} bytes exceeds {}",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }
        let len = payload.len() as u32;
        let crc = frame_crc(self.lsn, len, &payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&self.lsn.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decode a complete frame, verifying its CRC
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ChipError::JournalCorruption(format!(
                "frame of {} bytes is shorter than the header",
                bytes.len()
            )));
        }
        let header = FrameHeader::parse(&bytes[..HEADER_SIZE]);
        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != header.len as usize {
            return Err(ChipError::JournalCorruption(format!(
                "frame declares {} payload bytes, found {}",
                header.len,
                payload.len()
            )));
        }
        Self::from_parts(&header, payload)
    }

    pub(crate) fn from_parts(header: &FrameHeader, payload: &[u8]) -> Result<Self> {
        let actual = frame_crc(header.lsn, header.len, payload);
        if actual != header.crc {
            return Err(ChipError::JournalCorruption(format!(
                "CRC mismatch at lsn {}: expected {:08x}, got {:08x}",
                header.lsn, header.crc, actual
            )));
        }
        let (timestamp, op): (u64, LedgerOp) = bincode::deserialize(payload)
            .map_err(|e| ChipError::JournalCorruption(format!("undecodable payload: {}", e)))?;
        Ok(Self {
            lsn: header.lsn,
            timestamp,
            op,
        })
    }
}

/// Parsed frame header
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader {
    pub lsn: u64,
    pub crc: u32,
    pub len: u32,
}

impl FrameHeader {
    /// `bytes` must hold at least HEADER_SIZE bytes
    pub fn parse(bytes: &[u8]) -> Self {
        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&bytes[0..8]);
        crc.copy_from_slice(&bytes[8..12]);
        len.copy_from_slice(&bytes[12..16]);
        Self {
            lsn: u64::from_le_bytes(lsn),
            crc: u32::from_le_bytes(crc),
            len: u32::from_le_bytes(len),
        }
    }
}

/// CRC covers LSN + Len + payload
fn frame_crc(lsn: u64, len: u32, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(&len.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}
