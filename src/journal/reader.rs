//! Journal Reader
//!
//! Handles reading frames from the journal file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{ChipError, Result};

use super::entry::FrameHeader;
use super::{JournalEntry, HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// What the next bytes of the journal turned out to be
#[derive(Debug)]
pub(crate) enum Frame {
    /// A complete, CRC-valid entry
    Entry(JournalEntry),

    /// Clean end of file
    End,

    /// The file ends inside a frame (crash mid-append)
    Torn,

    /// A complete frame that fails validation; `frame_end` is where it stops
    Damaged { frame_end: u64, reason: String },
}

/// Reads entries from the journal file
pub struct JournalReader {
    reader: BufReader<File>,

    /// Offset just past the last complete frame
    position: u64,

    file_len: u64,
}

impl JournalReader {
    /// Open a journal file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next entry
    ///
    /// Returns `Ok(None)` at a clean end of file. Torn or damaged frames are
    /// reported as `JournalCorruption`; use `JournalRecovery` to repair them.
    pub fn next_entry(&mut self) -> Result<Option<JournalEntry>> {
        match self.next_frame()? {
            Frame::Entry(entry) => Ok(Some(entry)),
            Frame::End => Ok(None),
            Frame::Torn => Err(ChipError::JournalCorruption(format!(
                "torn frame at offset {}",
                self.position
            ))),
            Frame::Damaged { reason, .. } => Err(ChipError::JournalCorruption(format!(
                "damaged frame at offset {}: {}",
                self.position, reason
            ))),
        }
    }

    /// Offset just past the last complete frame read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Length of the file when it was opened
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Iterate over all entries, stopping after the first error
    pub fn entries(self) -> JournalIterator {
        JournalIterator {
            reader: self,
            done: false,
        }
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame> {
        // Step 1: Header
        let mut header_bytes = [0u8; HEADER_SIZE];
        let n = self.read_full(&mut header_bytes)?;
        if n == 0 {
            return Ok(Frame::End);
        }
        if n < HEADER_SIZE {
            return Ok(Frame::Torn);
        }
        let header = FrameHeader::parse(&header_bytes);
        let frame_end = self.position + HEADER_SIZE as u64 + header.len as u64;

        // The writer never emits an oversized payload
        if header.len > MAX_PAYLOAD_SIZE {
            return Ok(Frame::Damaged {
                frame_end,
                reason: format!("payload length {} exceeds limit", header.len),
            });
        }
        if frame_end > self.file_len {
            return self.classify_short_frame(&header);
        }

        // Step 2: Payload
        let mut payload = vec![0u8; header.len as usize];
        if self.read_full(&mut payload)? < payload.len() {
            return Ok(Frame::Torn);
        }

        // Step 3: Validate
        match JournalEntry::from_parts(&header, &payload) {
            Ok(entry) => {
                self.position = frame_end;
                Ok(Frame::Entry(entry))
            }
            Err(e) => Ok(Frame::Damaged {
                frame_end,
                reason: e.to_string(),
            }),
        }
    }

    /// A frame whose declared length runs past the end of the file
    ///
    /// It is a torn tail only if the remaining bytes hold no valid successor
    /// frame. Otherwise the LEN field is damaged and the frame is reported as
    /// ending where its successor begins.
    fn classify_short_frame(&mut self, header: &FrameHeader) -> Result<Frame> {
        let remaining = self.file_len - self.position - HEADER_SIZE as u64;
        let mut rest = vec![0u8; remaining as usize];
        let read = self.read_full(&mut rest)?;
        rest.truncate(read);

        match find_successor(&rest, header.lsn + 1) {
            Some(offset) => Ok(Frame::Damaged {
                frame_end: self.position + (HEADER_SIZE + offset) as u64,
                reason: format!(
                    "payload length {} runs past end of file but lsn {} follows",
                    header.len,
                    header.lsn + 1
                ),
            }),
            None => Ok(Frame::Torn),
        }
    }

    /// Fill `buf` as far as the file allows, returning the bytes read
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

/// Offset of the first CRC-valid frame carrying `lsn` within `bytes`
fn find_successor(bytes: &[u8], lsn: u64) -> Option<usize> {
    let mut offset = 0;
    while offset + HEADER_SIZE <= bytes.len() {
        let header = FrameHeader::parse(&bytes[offset..offset + HEADER_SIZE]);
        let payload_start = offset + HEADER_SIZE;
        let payload_end = payload_start + header.len as usize;
        if header.lsn == lsn
            && header.len <= MAX_PAYLOAD_SIZE
            && payload_end <= bytes.len()
            && JournalEntry::from_parts(&header, &bytes[payload_start..payload_end]).is_ok()
        {
            return Some(offset);
        }
        offset += 1;
    }
    None
}

/// Iterator over journal entries
pub struct JournalIterator {
    reader: JournalReader,
    done: bool,
}

impl Iterator for JournalIterator {
    type Item = Result<JournalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
