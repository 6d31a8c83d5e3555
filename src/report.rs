//! Scan reporting: counters and matched bindings from one exhaustive scan.
//!
//! [`ScanReport`] is what [`LeakDetector::scan`](crate::detect::LeakDetector::scan)
//! returns instead of a bare verdict: how many entries were walked, how many
//! were skipped and why, and every binding whose value type matched the
//! suspect group. Serializable so scan results can be shipped out of the
//! diagnosed process as JSON.

use serde::{Deserialize, Serialize};

use crate::value::short_type_name;

/// One leaking binding found during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakMatch {
    /// Fully qualified type name of the composite key whose table held the
    /// value
    pub key_type: String,
    /// Parameter name the value was bound under
    pub param: String,
    /// Fully qualified type name of the retained value
    pub value_type: String,
}

/// Outcome of one exhaustive scan for a suspect group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// The suspect group this scan matched against
    pub suspect_group: String,
    /// Cache entries enumerated
    pub entries_seen: usize,
    /// Entries whose key belonged to the recognized composite family
    pub composite_keys: usize,
    /// Entries skipped because their key type lacked the marker
    pub foreign_keys: usize,
    /// Marker-matching entries skipped for not holding the expected shape
    pub malformed_entries: usize,
    /// Parameter bindings walked, absent ones included
    pub params_inspected: usize,
    /// Bindings skipped because nothing was bound
    pub absent_params: usize,
    /// Every binding whose value type matched the group
    pub matches: Vec<LeakMatch>,
}

impl ScanReport {
    pub(crate) fn new(suspect_group: &str) -> Self {
        Self {
            suspect_group: suspect_group.to_string(),
            ..Default::default()
        }
    }

    /// The verdict: did any retained value belong to the suspect group?
    pub fn leaked(&self) -> bool {
        !self.matches.is_empty()
    }

    /// Serialize the report as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Format a human-readable multi-line report.
    pub fn format_report(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "Leak scan for suspect group `{}`",
            self.suspect_group
        ));
        lines.push("=".repeat(48));
        lines.push(format!("  Entries enumerated:    {}", self.entries_seen));
        lines.push(format!("  Composite keys:        {}", self.composite_keys));
        lines.push(format!("  Foreign keys skipped:  {}", self.foreign_keys));
        lines.push(format!("  Malformed entries:     {}", self.malformed_entries));
        lines.push(format!("  Bindings inspected:    {}", self.params_inspected));
        lines.push(format!("  Absent bindings:       {}", self.absent_params));
        lines.push(String::new());
        if self.matches.is_empty() {
            lines.push("No retained values matched the suspect group.".to_string());
        } else {
            lines.push(format!("{} retained value(s) matched:", self.matches.len()));
            for found in &self.matches {
                lines.push(format!(
                    "  `{}` bound as `{}` in {}",
                    found.value_type,
                    found.param,
                    short_type_name(&found.key_type)
                ));
            }
        }
        lines.join("\n")
    }
}
