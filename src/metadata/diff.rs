//! Metadata comparison between consecutive versions of a part.

use super::MetadataRecord;

/// Tool count delta at which a change is worth a warning
const TOOL_COUNT_WARN_DELTA: u32 = 2;

/// One field that differs between two versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: String,
    pub new: String,
}

/// Differences between a part's previous and new metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataChanges {
    pub changes: Vec<FieldChange>,

    /// Operator-facing warnings (machine switched, tooling jumped)
    pub warnings: Vec<String>,
}

impl MetadataChanges {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|change| change.field == field)
    }
}

/// Compare two records field by field
pub fn compare(old: &MetadataRecord, new: &MetadataRecord) -> MetadataChanges {
    let mut result = MetadataChanges::default();

    if old.tool_count() != new.tool_count() {
        let (before, after) = (old.tool_count(), new.tool_count());
        if before.abs_diff(after) >= TOOL_COUNT_WARN_DELTA {
            result
                .warnings
                .push(format!("Tool count changed significantly: {} -> {}", before, after));
        }
        result.changes.push(FieldChange {
            field: "tool_count",
            old: before.to_string(),
            new: after.to_string(),
        });
    }

    if old.operations() != new.operations() {
        result.warnings.push(format!(
            "Operation count changed: {} -> {}",
            old.operations(),
            new.operations()
        ));
        result.changes.push(FieldChange {
            field: "operations",
            old: old.operations().to_string(),
            new: new.operations().to_string(),
        });
    }

    if old.machine() != new.machine() {
        result.warnings.push(format!(
            "MACHINE CHANGED: {} -> {} - verify correct machine",
            old.machine(),
            new.machine()
        ));
        result.changes.push(FieldChange {
            field: "machine",
            old: old.machine().to_string(),
            new: new.machine().to_string(),
        });
    }

    if old.setup() != new.setup() {
        result.changes.push(FieldChange {
            field: "setup",
            old: old.setup().to_string(),
            new: new.setup().to_string(),
        });
    }

    result
}
