//! Cache introspector: from an opaque handle to its live entry table.
//!
//! A cache's public contract is try-get-by-key; enumeration is exactly what
//! it does not offer. The introspector walks a configured hop path of
//! internal fields (default: `coherent_state` then `entries`) using accessors
//! from the factory, then views the terminal value through its registered
//! [`EntrySource`](crate::value::EntrySource) adapter.
//!
//! Layout drift fails loudly as [`ProbeError::ShapeMismatch`]. Quietly
//! returning an empty table would silently corrupt every verdict built on
//! top of the enumeration.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::accessor::AccessorFactory;
use crate::error::ProbeError;
use crate::value::{EntrySource, RuntimeValue};

/// Hop path from a cache handle to its internal entry table, matching the
/// collaborator layout this probe was written against.
pub const DEFAULT_ENTRY_PATH: &[&str] = &["coherent_state", "entries"];

/// One row of a cache's internal table.
///
/// Both sides are borrows into collaborator-owned memory. `value` is `None`
/// for a slot that currently holds no materialized value.
#[derive(Clone, Copy)]
pub struct CacheEntry<'a> {
    /// The cache key object.
    pub key: &'a dyn RuntimeValue,
    /// The retained value, if the slot holds one.
    pub value: Option<&'a dyn RuntimeValue>,
}

impl fmt::Debug for CacheEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key_type", &self.key.type_fullname())
            .field("value_type", &self.value.map(|v| v.type_fullname()))
            .finish()
    }
}

/// Read-only walker over a cache's internal storage.
pub struct CacheIntrospector {
    factory: Arc<AccessorFactory>,
    entry_path: Vec<String>,
}

impl CacheIntrospector {
    /// Introspector using [`DEFAULT_ENTRY_PATH`].
    pub fn new(factory: Arc<AccessorFactory>) -> Self {
        Self {
            factory,
            entry_path: DEFAULT_ENTRY_PATH.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Override the hop path for a collaborator with a different internal
    /// layout.
    pub fn with_entry_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entry_path = path.into_iter().map(Into::into).collect();
        self
    }

    /// The configured hop path.
    pub fn entry_path(&self) -> &[String] {
        &self.entry_path
    }

    /// Enumerate the cache's entry table as borrowed key/value rows, in the
    /// table's own iteration order.
    pub fn entries_of<'a>(
        &self,
        handle: &'a dyn RuntimeValue,
    ) -> Result<Vec<CacheEntry<'a>>, ProbeError> {
        let table = self.resolve_table(handle)?;
        let entries: Vec<CacheEntry<'a>> = table
            .pairs()
            .map(|(key, value)| CacheEntry { key, value })
            .collect();
        debug!(
            handle_type = handle.type_fullname(),
            entries = entries.len(),
            "enumerated cache entry table"
        );
        Ok(entries)
    }

    /// Enumerate only the keys of the cache's entry table.
    pub fn keys_of<'a>(
        &self,
        handle: &'a dyn RuntimeValue,
    ) -> Result<Vec<&'a dyn RuntimeValue>, ProbeError> {
        Ok(self
            .entries_of(handle)?
            .into_iter()
            .map(|entry| entry.key)
            .collect())
    }

    /// Enumerate the keys whose runtime type is `T`, already downcast.
    pub fn keys_of_type<'a, T: Any>(
        &self,
        handle: &'a dyn RuntimeValue,
    ) -> Result<Vec<&'a T>, ProbeError> {
        Ok(self
            .entries_of(handle)?
            .into_iter()
            .filter_map(|entry| entry.key.as_any().downcast_ref::<T>())
            .collect())
    }

    /// Walk the hop path from `handle` and view the terminal value as an
    /// entry table.
    fn resolve_table<'a>(
        &self,
        handle: &'a dyn RuntimeValue,
    ) -> Result<&'a dyn EntrySource, ProbeError> {
        let path_display = self.entry_path.join(".");
        let mut current: &'a dyn RuntimeValue = handle;

        for hop in &self.entry_path {
            let accessor = self.factory.accessor_for(current, hop).map_err(|err| {
                warn!(path = %path_display, hop = %hop, error = %err, "cache traversal failed");
                ProbeError::ShapeMismatch {
                    path: path_display.clone(),
                    detail: format!("at hop `{hop}`: {err}"),
                }
            })?;
            current = accessor
                .read(current)
                .ok_or_else(|| ProbeError::ShapeMismatch {
                    path: path_display.clone(),
                    detail: format!("hop `{}` read failed on {}", hop, current.type_fullname()),
                })?;
        }

        self.factory
            .registry()
            .as_entry_source(current)
            .ok_or_else(|| {
                warn!(
                    path = %path_display,
                    terminal_type = current.type_fullname(),
                    "terminal value is not an enumerable entry table"
                );
                ProbeError::ShapeMismatch {
                    path: path_display,
                    detail: format!(
                        "terminal value {} has no registered entry view",
                        current.type_fullname()
                    ),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use crate::testkit::{self, MemoryCache, QueryPlanKey};

    fn introspector() -> CacheIntrospector {
        let registry = Arc::new(TypeRegistry::new());
        testkit::register_reference_shapes(&registry);
        CacheIntrospector::new(Arc::new(AccessorFactory::new(registry)))
    }

    fn cache_with_two_entries() -> MemoryCache {
        let mut cache = MemoryCache::new();
        cache.insert(
            QueryPlanKey::new("SELECT 1").bind("limit", Box::new(10u32)),
            Box::new(String::from("plan-a")),
        );
        cache.insert("raw-key".to_string(), Box::new(99u64));
        cache
    }

    #[test]
    fn entries_of_enumerates_every_live_row() {
        let cache = cache_with_two_entries();
        let entries = introspector().entries_of(&cache).unwrap();

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| entry.value.is_some()));
    }

    #[test]
    fn empty_cache_enumerates_to_an_empty_table() {
        let cache = MemoryCache::new();
        let entries = introspector().entries_of(&cache).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn keys_of_type_filters_and_downcasts() {
        let cache = cache_with_two_entries();
        let introspector = introspector();

        let plan_keys = introspector.keys_of_type::<QueryPlanKey>(&cache).unwrap();
        assert_eq!(plan_keys.len(), 1);
        assert_eq!(plan_keys[0].statement(), "SELECT 1");

        let string_keys = introspector.keys_of_type::<String>(&cache).unwrap();
        assert_eq!(string_keys, [&"raw-key".to_string()]);

        assert_eq!(introspector.keys_of(&cache).unwrap().len(), 2);
    }

    #[test]
    fn renamed_internal_field_is_a_shape_mismatch() {
        let introspector = introspector().with_entry_path(["coherent_state", "entries_v2"]);
        assert_eq!(introspector.entry_path().join("."), "coherent_state.entries_v2");

        let cache = cache_with_two_entries();
        let err = introspector.entries_of(&cache).unwrap_err();
        match err {
            ProbeError::ShapeMismatch { path, detail } => {
                assert_eq!(path, "coherent_state.entries_v2");
                assert!(detail.contains("entries_v2"));
            }
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn unknown_handle_type_fails_on_the_first_hop() {
        let introspector = introspector();
        let foreign = String::from("not a cache");
        assert!(matches!(
            introspector.entries_of(&foreign),
            Err(ProbeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn terminal_value_without_entry_view_is_a_shape_mismatch() {
        let registry = Arc::new(TypeRegistry::new());
        testkit::register_reference_shapes(&registry);
        let introspector = CacheIntrospector::new(Arc::new(AccessorFactory::new(registry)))
            .with_entry_path(["coherent_state"]);

        let cache = MemoryCache::new();
        let err = introspector.entries_of(&cache).unwrap_err();
        assert!(matches!(err, ProbeError::ShapeMismatch { .. }));
        assert!(err.to_string().contains("no registered entry view"));
    }

    #[test]
    fn custom_entry_path_reaches_a_relocated_table() {
        let registry = Arc::new(TypeRegistry::new());
        testkit::register_reference_shapes(&registry);

        // A handle that exposes the plan key's parameter table directly.
        let introspector = CacheIntrospector::new(Arc::new(AccessorFactory::new(registry)))
            .with_entry_path(["parameter_values"]);
        let key = QueryPlanKey::new("SELECT 2").bind("id", Box::new(7i64));

        let entries = introspector.entries_of(&key).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].key.as_any().downcast_ref::<String>(),
            Some(&"id".to_string())
        );
    }
}
