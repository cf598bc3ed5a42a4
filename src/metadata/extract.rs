//! Metadata Extractor
//!
//! Pulls the marker-delimited block out of program text. Extraction is pure:
//! the same text always yields the same record.

use crate::error::{ChipError, Result};

use super::{Count, MetadataRecord};

/// Line marker opening a metadata block
pub const START_MARKER: &str = "CHIP-WARDEN-START";

/// Line marker closing a metadata block
pub const END_MARKER: &str = "CHIP-WARDEN-END";

/// Scans program text for a metadata block
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    /// Max lines the end marker may sit below the start marker
    max_block_lines: usize,
}

impl Extractor {
    pub fn new(max_block_lines: usize) -> Self {
        Self { max_block_lines }
    }

    /// Extract the metadata record from program text
    ///
    /// Returns:
    /// - `Ok(record)` with fields from the block
    /// - `Ok(empty record)` when no start marker exists (unannotated file)
    /// - `Err(MalformedMetadata)` when the block never closes within the window
    pub fn extract(&self, text: &str) -> Result<MetadataRecord> {
        let mut record = MetadataRecord::default();
        let mut lines = text.lines().enumerate();

        // Step 1: Find the start marker, noting the program number on the way
        let mut start = None;
        for (n, raw) in lines.by_ref() {
            let line = raw.trim();
            if record.program_number.is_none() {
                record.program_number = program_number(line);
            }
            if line.contains(START_MARKER) {
                start = Some(n);
                break;
            }
        }

        let Some(start) = start else {
            return Ok(record);
        };

        // Step 2: Collect fields until the end marker
        let mut closed = false;
        for (n, raw) in lines.by_ref() {
            if n - start > self.max_block_lines {
                break;
            }
            let line = raw.trim();
            if line.contains(END_MARKER) {
                closed = true;
                break;
            }
            if let Some((key, value)) = parse_field(line) {
                apply_field(&mut record, &key, value);
            }
        }

        if !closed {
            return Err(ChipError::MalformedMetadata {
                reason: format!(
                    "{} on line {} has no {} within {} lines",
                    START_MARKER,
                    start + 1,
                    END_MARKER,
                    self.max_block_lines
                ),
            });
        }

        // Step 3: Program number may follow the block
        if record.program_number.is_none() {
            record.program_number = lines.find_map(|(_, raw)| program_number(raw.trim()));
        }

        Ok(record)
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(64)
    }
}

// =============================================================================
// Line Parsing
// =============================================================================

/// `O1001 (NAME)` → `Some("1001")`
fn program_number(line: &str) -> Option<String> {
    let rest = line.strip_prefix('O')?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Parse one block line into a normalized key and cleaned value
///
/// Accepts `(KEY: value)`, `; KEY: value`, `KEY: value` and `KEY value`.
fn parse_field(line: &str) -> Option<(String, &str)> {
    let text = comment_text(line)?.trim();

    let key_len = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(text.len());
    if key_len == 0 {
        return None;
    }
    let (key, rest) = text.split_at(key_len);

    // Key must be followed by a colon or whitespace
    let rest_trimmed = rest.trim_start();
    let value = match rest_trimmed.strip_prefix(':') {
        Some(value) => value,
        None if rest_trimmed.len() < rest.len() => rest_trimmed,
        None => return None,
    };

    let value = clean_value(value);
    if value.is_empty() {
        return None;
    }

    Some((key.to_ascii_uppercase().replace('-', "_"), value))
}

/// Inner text of a G-code comment, or the line itself
fn comment_text(line: &str) -> Option<&str> {
    if let Some(open) = line.find('(') {
        let inner = &line[open + 1..];
        return Some(match inner.rfind(')') {
            Some(close) => &inner[..close],
            None => inner,
        });
    }
    if let Some(rest) = line.strip_prefix(';') {
        return Some(rest);
    }
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

const QUOTES: [char; 2] = ['"', '\''];

/// Trim whitespace and one enclosing pair of quotes
///
/// Brackets are part of the value: `(SETUP: (A))` yields `(A)`.
pub(crate) fn clean_value(value: &str) -> &str {
    let value = value.trim();
    QUOTES
        .iter()
        .find_map(|quote| {
            value
                .strip_prefix(*quote)
                .and_then(|inner| inner.strip_suffix(*quote))
        })
        .map_or(value, str::trim)
}

fn apply_field(record: &mut MetadataRecord, key: &str, value: &str) {
    match key {
        "PROJECT" => record.project = Some(value.to_string()),
        "PART" | "PART_NUMBER" => record.part = Some(value.to_string()),
        "POSTED" => record.posted = Some(value.to_string()),
        "OPERATIONS" | "OPS" => record.operations = Some(Count::parse(value)),
        "TOOL_COUNT" | "TOOLS" => record.tool_count = Some(Count::parse(value)),
        "MACHINE" => record.machine = Some(value.to_string()),
        "SETUP" => record.setup = Some(value.to_string()),
        other => tracing::trace!(key = other, "ignoring unrecognized metadata field"),
    }
}
