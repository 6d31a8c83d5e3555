//! Probe failure taxonomy.
//!
//! The variants split along the line the scan loop cares about: descriptor
//! failures ([`ProbeError::FieldNotFound`]) and traversal failures
//! ([`ProbeError::ShapeMismatch`]) invalidate the whole query and propagate,
//! while single-entry anomalies ([`ProbeError::MalformedEntry`]) are counted
//! and skipped without aborting the scan.

use std::fmt;

/// Errors raised while introspecting a collaborator's internals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The registry knows no field with this name on the target type.
    FieldNotFound {
        /// Fully qualified name of the type the field was expected on
        owner: String,
        /// The requested field name
        field: String,
        /// Field names the registry does know for the type, sorted. Empty
        /// when the type itself is unregistered.
        known_fields: Vec<String>,
    },
    /// The handle-to-entry-table traversal broke: the collaborator's internal
    /// layout no longer matches the configured hop path.
    ShapeMismatch {
        /// The hop path that was being traversed
        path: String,
        /// Which hop failed and how
        detail: String,
    },
    /// One cache entry's key did not have the expected composite-key shape.
    /// Local to that entry; scans skip it and keep going.
    MalformedEntry {
        /// Fully qualified type name of the entry's key
        key_type: String,
        /// What was wrong with the entry
        detail: String,
    },
}

impl ProbeError {
    /// Whether this failure invalidates the whole scan, as opposed to one
    /// entry of it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProbeError::MalformedEntry { .. })
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::FieldNotFound {
                owner,
                field,
                known_fields,
            } => {
                write!(f, "no field `{field}` registered on {owner}")?;
                if !known_fields.is_empty() {
                    write!(f, " (known fields: {})", known_fields.join(", "))?;
                }
                Ok(())
            }
            ProbeError::ShapeMismatch { path, detail } => {
                write!(f, "cache layout mismatch along `{path}`: {detail}")
            }
            ProbeError::MalformedEntry { key_type, detail } => {
                write!(f, "malformed cache entry keyed by {key_type}: {detail}")
            }
        }
    }
}

impl std::error::Error for ProbeError {}
