//! Archive entry file format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Header (24 bytes)                                               │
//! │   Magic: "CWAV" (4) | Format: u16 (2) | Reserved (2)            │
//! │   MetaLen: u32 (4) | ContentLen: u64 (8) | Version: u32 (4)     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Meta Block (MetaLen bytes, bincode VersionMeta)                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Content Block (ContentLen bytes, the program file verbatim)      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Footer (8 bytes)                                                │
//! │   CRC32 over meta + content (4) | Padding (4)                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::checksum::Checksum;
use crate::error::{ChipError, Result};

use super::VersionMeta;

/// Magic bytes identifying an archive entry
pub const MAGIC: &[u8; 4] = b"CWAV";

/// Current entry format version
pub const FORMAT_VERSION: u16 = 1;

/// Magic (4) + Format (2) + Reserved (2) + MetaLen (4) + ContentLen (8) + Version (4)
pub const HEADER_SIZE: usize = 24;

/// CRC (4) + Padding (4)
pub const FOOTER_SIZE: usize = 8;

/// Largest metadata block accepted on read (64 KB)
const MAX_META_SIZE: u32 = 64 * 1024;

/// Encoded header+meta and footer; the content goes between them unchanged
pub(crate) struct EncodedEntry {
    pub head: Vec<u8>,
    pub footer: [u8; FOOTER_SIZE],
}

pub(crate) fn encode(meta: &VersionMeta, content: &[u8]) -> Result<EncodedEntry> {
    let meta_bytes = bincode::serialize(meta)?;

    let mut head = Vec::with_capacity(HEADER_SIZE + meta_bytes.len());
    head.extend_from_slice(MAGIC);
    head.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    head.extend_from_slice(&[0u8; 2]);
    head.extend_from_slice(&(meta_bytes.len() as u32).to_le_bytes());
    head.extend_from_slice(&(content.len() as u64).to_le_bytes());
    head.extend_from_slice(&meta.version.to_le_bytes());
    head.extend_from_slice(&meta_bytes);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&meta_bytes);
    hasher.update(content);

    let mut footer = [0u8; FOOTER_SIZE];
    footer[..4].copy_from_slice(&hasher.finalize().to_le_bytes());

    Ok(EncodedEntry { head, footer })
}

struct Header {
    meta_len: u32,
    content_len: u64,
    version: u32,
}

fn parse_header(path: &Path, bytes: &[u8; HEADER_SIZE]) -> Result<Header> {
    if &bytes[0..4] != MAGIC {
        return Err(ChipError::ArchiveCorruption(format!(
            "{}: invalid magic {:?}",
            path.display(),
            &bytes[0..4]
        )));
    }
    let format = u16::from_le_bytes([bytes[4], bytes[5]]);
    if format != FORMAT_VERSION {
        return Err(ChipError::ArchiveCorruption(format!(
            "{}: unsupported entry format {}",
            path.display(),
            format
        )));
    }

    let mut meta_len = [0u8; 4];
    let mut content_len = [0u8; 8];
    let mut version = [0u8; 4];
    meta_len.copy_from_slice(&bytes[8..12]);
    content_len.copy_from_slice(&bytes[12..20]);
    version.copy_from_slice(&bytes[20..24]);

    let header = Header {
        meta_len: u32::from_le_bytes(meta_len),
        content_len: u64::from_le_bytes(content_len),
        version: u32::from_le_bytes(version),
    };
    if header.meta_len > MAX_META_SIZE {
        return Err(ChipError::ArchiveCorruption(format!(
            "{}: metadata block of {} bytes",
            path.display(),
            header.meta_len
        )));
    }
    Ok(header)
}

fn decode_meta(path: &Path, header: &Header, meta_bytes: &[u8]) -> Result<VersionMeta> {
    let meta: VersionMeta = bincode::deserialize(meta_bytes).map_err(|e| {
        ChipError::ArchiveCorruption(format!("{}: undecodable metadata: {}", path.display(), e))
    })?;
    if meta.version != header.version {
        return Err(ChipError::ArchiveCorruption(format!(
            "{}: header says v{}, metadata says v{}",
            path.display(),
            header.version,
            meta.version
        )));
    }
    Ok(meta)
}

/// Read and fully validate an entry file
pub(crate) fn read_entry(path: &Path) -> Result<(VersionMeta, Vec<u8>)> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(ChipError::ArchiveCorruption(format!(
            "{}: {} bytes is too short",
            path.display(),
            bytes.len()
        )));
    }

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes.copy_from_slice(&bytes[..HEADER_SIZE]);
    let header = parse_header(path, &header_bytes)?;

    let expected_len = HEADER_SIZE as u64
        + header.meta_len as u64
        + header.content_len
        + FOOTER_SIZE as u64;
    if bytes.len() as u64 != expected_len {
        return Err(ChipError::ArchiveCorruption(format!(
            "{}: expected {} bytes, found {}",
            path.display(),
            expected_len,
            bytes.len()
        )));
    }

    let meta_end = HEADER_SIZE + header.meta_len as usize;
    let content_end = bytes.len() - FOOTER_SIZE;
    let meta_bytes = &bytes[HEADER_SIZE..meta_end];
    let content = &bytes[meta_end..content_end];

    let mut stored_crc = [0u8; 4];
    stored_crc.copy_from_slice(&bytes[content_end..content_end + 4]);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(meta_bytes);
    hasher.update(content);
    if hasher.finalize() != u32::from_le_bytes(stored_crc) {
        return Err(ChipError::ArchiveCorruption(format!(
            "{}: CRC mismatch",
            path.display()
        )));
    }

    let meta = decode_meta(path, &header, meta_bytes)?;
    if Checksum::of(content) != meta.checksum {
        return Err(ChipError::ArchiveCorruption(format!(
            "{}: content does not match recorded checksum",
            path.display()
        )));
    }

    Ok((meta, content.to_vec()))
}

/// Read only the header and metadata block (content is not verified)
pub(crate) fn read_meta(path: &Path) -> Result<VersionMeta> {
    let mut file = File::open(path)?;

    let mut header_bytes = [0u8; HEADER_SIZE];
    file.read_exact(&mut header_bytes)?;
    let header = parse_header(path, &header_bytes)?;

    let mut meta_bytes = vec![0u8; header.meta_len as usize];
    file.read_exact(&mut meta_bytes)?;
    decode_meta(path, &header, &meta_bytes)
}
