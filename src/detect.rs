//! Leak detector: verdicts over introspected cache entries.
//!
//! The detector recognizes one composite-key family by a marker substring in
//! the key's runtime type name, reads that key's internal parameter-value
//! table through the accessor factory, and reports whether any bound value's
//! type belongs to the caller's suspect group.
//!
//! Group matching is case-insensitive substring containment over fully
//! qualified type names. That is an approximation: two unrelated modules
//! sharing a name fragment will false-positive, which is acceptable for a
//! diagnostic that flags candidates for a human to confirm. The marker match
//! is case-sensitive, since it names one specific type family.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::accessor::AccessorFactory;
use crate::error::ProbeError;
use crate::introspect::{CacheEntry, CacheIntrospector, DEFAULT_ENTRY_PATH};
use crate::report::{LeakMatch, ScanReport};
use crate::value::{EntrySource, RuntimeValue};

/// Marker substring identifying the recognized composite-key type family.
pub const QUERY_PLAN_KEY_MARKER: &str = "QueryPlanKey";

/// Name of the composite key's internal parameter-value table field.
pub const PARAM_TABLE_FIELD: &str = "parameter_values";

/// Soft-contract knobs for a probe run.
///
/// The hop path, the marker, and the field name all depend on the
/// collaborator version being diagnosed. When an upgrade shifts the layout,
/// the probe is reconfigured here rather than rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Hop path from the cache handle to its entry table
    pub entry_path: Vec<String>,
    /// Case-sensitive marker identifying composite keys by type name
    pub key_marker: String,
    /// Field holding the key's parameter-value table
    pub param_field: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            entry_path: DEFAULT_ENTRY_PATH.iter().map(|s| s.to_string()).collect(),
            key_marker: QUERY_PLAN_KEY_MARKER.to_string(),
            param_field: PARAM_TABLE_FIELD.to_string(),
        }
    }
}

impl ProbeConfig {
    /// Replace the composite-key marker.
    pub fn with_key_marker(mut self, marker: impl Into<String>) -> Self {
        self.key_marker = marker.into();
        self
    }

    /// Replace the parameter-table field name.
    pub fn with_param_field(mut self, field: impl Into<String>) -> Self {
        self.param_field = field.into();
        self
    }

    /// Replace the entry hop path.
    pub fn with_entry_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entry_path = path.into_iter().map(Into::into).collect();
        self
    }
}

/// Scans a cache for retained values belonging to a suspect group.
pub struct LeakDetector {
    factory: Arc<AccessorFactory>,
    introspector: CacheIntrospector,
    config: ProbeConfig,
}

impl LeakDetector {
    /// Detector with the default [`ProbeConfig`].
    pub fn new(factory: Arc<AccessorFactory>) -> Self {
        Self::with_config(factory, ProbeConfig::default())
    }

    /// Detector with an explicit configuration.
    pub fn with_config(factory: Arc<AccessorFactory>, config: ProbeConfig) -> Self {
        let introspector = CacheIntrospector::new(factory.clone())
            .with_entry_path(config.entry_path.iter().cloned());
        Self {
            factory,
            introspector,
            config,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Whether any live cache entry retains a value whose type belongs to
    /// `suspect_group`.
    ///
    /// Stops at the first match. A broken handle traversal propagates as
    /// [`ProbeError::ShapeMismatch`]; individual malformed entries are
    /// skipped.
    pub fn detect(
        &self,
        handle: &dyn RuntimeValue,
        suspect_group: &str,
    ) -> Result<bool, ProbeError> {
        let needle = suspect_group.to_lowercase();
        let entries = self.introspector.entries_of(handle)?;

        for entry in &entries {
            let table = match self.composite_params(entry) {
                Ok(Some(table)) => table,
                Ok(None) => continue,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(error = %err, "skipping malformed cache entry");
                    continue;
                }
            };
            let bindings = match self.named_bindings(entry.key.type_fullname(), table) {
                Ok(bindings) => bindings,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(error = %err, "skipping malformed cache entry");
                    continue;
                }
            };
            for (_, value) in bindings {
                let Some(value) = value else { continue };
                if type_name_matches(value.type_fullname(), &needle) {
                    debug!(
                        key_type = entry.key.type_fullname(),
                        value_type = value.type_fullname(),
                        group = suspect_group,
                        "retained suspect value found"
                    );
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Exhaustive variant of [`detect`](Self::detect): walks every entry and
    /// every binding, returning counters and all matched bindings.
    pub fn scan(
        &self,
        handle: &dyn RuntimeValue,
        suspect_group: &str,
    ) -> Result<ScanReport, ProbeError> {
        let needle = suspect_group.to_lowercase();
        let mut report = ScanReport::new(suspect_group);
        let entries = self.introspector.entries_of(handle)?;
        report.entries_seen = entries.len();

        for entry in &entries {
            let key_type = entry.key.type_fullname();
            let table = match self.composite_params(entry) {
                Ok(Some(table)) => table,
                Ok(None) => {
                    report.foreign_keys += 1;
                    continue;
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(error = %err, "skipping malformed cache entry");
                    report.malformed_entries += 1;
                    continue;
                }
            };
            report.composite_keys += 1;
            let bindings = match self.named_bindings(key_type, table) {
                Ok(bindings) => bindings,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(error = %err, "skipping malformed cache entry");
                    report.malformed_entries += 1;
                    continue;
                }
            };
            for (name, value) in bindings {
                report.params_inspected += 1;
                let Some(value) = value else {
                    report.absent_params += 1;
                    continue;
                };
                if type_name_matches(value.type_fullname(), &needle) {
                    report.matches.push(LeakMatch {
                        key_type: key_type.to_string(),
                        param: name.clone(),
                        value_type: value.type_fullname().to_string(),
                    });
                }
            }
        }

        debug!(
            group = suspect_group,
            entries = report.entries_seen,
            matches = report.matches.len(),
            "leak scan complete"
        );
        Ok(report)
    }

    /// Extract the parameter table of a composite-keyed entry.
    ///
    /// `Ok(None)` means the key is outside the recognized family and the
    /// entry is not the probe's business. `Err(MalformedEntry)` means the key
    /// looked composite but its shape did not hold.
    fn composite_params<'a>(
        &self,
        entry: &CacheEntry<'a>,
    ) -> Result<Option<&'a dyn EntrySource>, ProbeError> {
        let key_type = entry.key.type_fullname();
        if !key_type.contains(&self.config.key_marker) {
            trace!(key_type = key_type, "key outside the composite family");
            return Ok(None);
        }

        let accessor = self
            .factory
            .accessor_for(entry.key, &self.config.param_field)
            .map_err(|err| ProbeError::MalformedEntry {
                key_type: key_type.to_string(),
                detail: format!("no parameter table: {err}"),
            })?;
        let table_value = accessor
            .read(entry.key)
            .ok_or_else(|| ProbeError::MalformedEntry {
                key_type: key_type.to_string(),
                detail: "parameter table read failed".to_string(),
            })?;
        let table = self
            .factory
            .registry()
            .as_entry_source(table_value)
            .ok_or_else(|| ProbeError::MalformedEntry {
                key_type: key_type.to_string(),
                detail: format!(
                    "field `{}` of type {} is not a name/value table",
                    self.config.param_field,
                    table_value.type_fullname()
                ),
            })?;
        Ok(Some(table))
    }

    /// Collect a parameter table's bindings, insisting that every parameter
    /// name is text.
    fn named_bindings<'a>(
        &self,
        key_type: &str,
        table: &'a dyn EntrySource,
    ) -> Result<Vec<(&'a String, Option<&'a dyn RuntimeValue>)>, ProbeError> {
        table
            .pairs()
            .map(|(name, value)| {
                name.as_any()
                    .downcast_ref::<String>()
                    .map(|text| (text, value))
                    .ok_or_else(|| ProbeError::MalformedEntry {
                        key_type: key_type.to_string(),
                        detail: format!(
                            "parameter name of type {} is not text",
                            name.type_fullname()
                        ),
                    })
            })
            .collect()
    }
}

/// Case-insensitive containment of an already-lowercased needle in a fully
/// qualified type name.
fn type_name_matches(type_fullname: &str, needle_lower: &str) -> bool {
    type_fullname.to_lowercase().contains(needle_lower)
}
