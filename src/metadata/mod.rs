//! Metadata Module
//!
//! Structured view of the comment block that the post processor embeds in
//! each program file.
//!
//! ## Block Format
//! ```text
//! O1001 (HYDRAULIC MANIFOLD)
//! (CHIP-WARDEN-START)
//! (PROJECT: HYDRAULIC MANIFOLD)
//! (PART: 1001)
//! (POSTED: 2025-10-30-1445)
//! (OPERATIONS: 3)
//! (TOOL-COUNT: 5)
//! (MACHINE: PUMA)
//! (SETUP: OP1-ROUGH-FACE)
//! (CHIP-WARDEN-END)
//! ```
//!
//! Only `PART` is required for tracked versioning. Every other field has a
//! documented default, applied by the accessor rather than stored.

mod diff;
mod extract;

use serde::{Deserialize, Serialize};

pub use diff::{compare, FieldChange, MetadataChanges};
pub use extract::{Extractor, END_MARKER, START_MARKER};

/// Default for project, machine and setup when the block omits them
pub const UNKNOWN: &str = "unknown";

/// A count field that is parsed permissively
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Count {
    /// Parsed as a non-negative integer
    Parsed(u32),

    /// Kept verbatim because it was not numeric
    Raw(String),
}

impl Count {
    /// Parse a count, keeping the raw text when it is not numeric
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<u32>() {
            Ok(n) => Count::Parsed(n),
            Err(_) => Count::Raw(raw.trim().to_string()),
        }
    }

    /// The numeric value, if the field parsed
    pub fn value(&self) -> Option<u32> {
        match self {
            Count::Parsed(n) => Some(*n),
            Count::Raw(_) => None,
        }
    }

    pub fn is_flagged(&self) -> bool {
        matches!(self, Count::Raw(_))
    }
}

impl std::fmt::Display for Count {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Count::Parsed(n) => write!(f, "{}", n),
            Count::Raw(raw) => write!(f, "{}", raw),
        }
    }
}

/// Parsed metadata for one program file
///
/// Immutable once extracted. An empty record means the file carried no
/// block at all (a legacy or hand-written program).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub project: Option<String>,
    pub part: Option<String>,
    pub posted: Option<String>,
    pub operations: Option<Count>,
    pub tool_count: Option<Count>,
    pub machine: Option<String>,
    pub setup: Option<String>,

    /// Program number from the first `O<digits>` line, if any
    pub program_number: Option<String>,
}

impl MetadataRecord {
    /// True when no block field was found
    pub fn is_empty(&self) -> bool {
        self.project.is_none()
            && self.part.is_none()
            && self.posted.is_none()
            && self.operations.is_none()
            && self.tool_count.is_none()
            && self.machine.is_none()
            && self.setup.is_none()
    }

    pub fn project(&self) -> &str {
        self.project.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn machine(&self) -> &str {
        self.machine.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn setup(&self) -> &str {
        self.setup.as_deref().unwrap_or(UNKNOWN)
    }

    /// Operation count, 0 when absent or not numeric
    pub fn operations(&self) -> u32 {
        self.operations.as_ref().and_then(Count::value).unwrap_or(0)
    }

    /// Tool count, 0 when absent or not numeric
    pub fn tool_count(&self) -> u32 {
        self.tool_count.as_ref().and_then(Count::value).unwrap_or(0)
    }

    /// Fields whose values were kept raw because they did not parse
    pub fn flagged_fields(&self) -> Vec<&'static str> {
        let mut flagged = Vec::new();
        if self.operations.as_ref().is_some_and(Count::is_flagged) {
            flagged.push("OPERATIONS");
        }
        if self.tool_count.as_ref().is_some_and(Count::is_flagged) {
            flagged.push("TOOL-COUNT");
        }
        flagged
    }

    /// Render the record as a metadata block (one G-code comment per field)
    pub fn to_block(&self) -> String {
        let mut block = String::new();
        block.push_str(&format!("({})\n", START_MARKER));

        let text_fields = [
            ("PROJECT", self.project.as_deref()),
            ("PART", self.part.as_deref()),
            ("POSTED", self.posted.as_deref()),
        ];
        for (key, value) in text_fields {
            if let Some(value) = value {
                block.push_str(&format!("({}: {})\n", key, render_value(value)));
            }
        }
        if let Some(ops) = &self.operations {
            block.push_str(&format!("(OPERATIONS: {})\n", ops));
        }
        if let Some(tools) = &self.tool_count {
            block.push_str(&format!("(TOOL-COUNT: {})\n", tools));
        }
        for (key, value) in [("MACHINE", self.machine.as_deref()), ("SETUP", self.setup.as_deref())] {
            if let Some(value) = value {
                block.push_str(&format!("({}: {})\n", key, render_value(value)));
            }
        }

        block.push_str(&format!("({})\n", END_MARKER));
        block
    }
}

/// Quote a value that extraction would otherwise unwrap
fn render_value(value: &str) -> String {
    if extract::clean_value(value) == value {
        value.to_string()
    } else {
        format!("\"{}\"", value)
    }
}
