//! Reference collaborator: a small in-process cache with the internal layout
//! the probe is written against.
//!
//! The probe's tests and demos need a cache to inspect, and this module is
//! that cache. It is deliberately shaped like the collaborator the probe
//! targets: a handle wrapping a coherent-state object wrapping a
//! heterogeneous entry table, a try-get-by-key public API with no
//! enumeration, and a `QueryPlanKey` composite-key family whose captured
//! parameter bindings are opaque to the table.
//!
//! Nothing in the probe's core depends on this module. Production callers
//! register their real collaborator's shape with
//! [`TypeRegistry`](crate::registry::TypeRegistry) instead of calling
//! [`register_reference_shapes`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::registry::TypeRegistry;
use crate::value::{EntrySource, RuntimeValue, SourcePair};

/// A heterogeneous cache key: any `Eq + Hash` value qualifies.
pub trait CacheKey: RuntimeValue {
    /// Equality across erased keys. `false` when the runtime types differ.
    fn eq_dyn(&self, other: &dyn CacheKey) -> bool;

    /// Hash through an erased hasher, runtime type included.
    fn hash_dyn(&self, state: &mut dyn Hasher);

    /// View the key as an opaque runtime value.
    fn as_value(&self) -> &dyn RuntimeValue;
}

impl<T> CacheKey for T
where
    T: Any + Eq + Hash,
{
    fn eq_dyn(&self, other: &dyn CacheKey) -> bool {
        other
            .as_value()
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }

    fn hash_dyn(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }

    fn as_value(&self) -> &dyn RuntimeValue {
        self
    }
}

impl PartialEq for dyn CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.eq_dyn(other)
    }
}

impl Eq for dyn CacheKey {}

impl Hash for dyn CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_dyn(state);
    }
}

/// The cache's real storage: erased keys to erased values.
#[derive(Default)]
pub struct EntryTable {
    slots: HashMap<Box<dyn CacheKey>, Box<dyn RuntimeValue>>,
}

impl EntrySource for EntryTable {
    fn pair_count(&self) -> usize {
        self.slots.len()
    }

    fn pairs(&self) -> Box<dyn Iterator<Item = SourcePair<'_>> + '_> {
        // Deref through the box so each pair carries the key's own runtime
        // type, not Box<dyn CacheKey>.
        Box::new(
            self.slots
                .iter()
                .map(|(key, value)| ((**key).as_value(), Some(&**value))),
        )
    }
}

/// The coherent inner state a cache handle wraps.
#[derive(Default)]
pub struct CoherentState {
    entries: EntryTable,
}

/// The in-process cache collaborator.
///
/// Public surface: insert and try-get. There is deliberately no enumeration;
/// that gap is the reason the probe exists.
#[derive(Default)]
pub struct MemoryCache {
    coherent_state: CoherentState,
}

impl MemoryCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value stored under `key`.
    pub fn insert<K: CacheKey>(&mut self, key: K, value: Box<dyn RuntimeValue>) {
        self.coherent_state
            .entries
            .slots
            .insert(Box::new(key), value);
    }

    /// Look up the value stored under `key`.
    pub fn get(&self, key: &dyn CacheKey) -> Option<&dyn RuntimeValue> {
        self.coherent_state
            .entries
            .slots
            .get(key)
            .map(|value| &**value)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.coherent_state.entries.slots.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.coherent_state.entries.slots.is_empty()
    }
}

/// Composite cache key for compiled query plans: a statement fingerprint
/// plus the parameter bindings captured when the plan was cached.
///
/// Identity is the statement alone. The captured bindings never participate
/// in equality or hashing, so the table has no reason to ever look at them
/// again: exactly the retention hazard the probe hunts for.
pub struct QueryPlanKey {
    statement: String,
    parameter_values: HashMap<String, Option<Box<dyn RuntimeValue>>>,
}

impl QueryPlanKey {
    /// Key for `statement` with no captured bindings.
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            parameter_values: HashMap::new(),
        }
    }

    /// Capture a parameter binding.
    pub fn bind(mut self, name: impl Into<String>, value: Box<dyn RuntimeValue>) -> Self {
        self.parameter_values.insert(name.into(), Some(value));
        self
    }

    /// Capture a parameter name bound to nothing.
    pub fn bind_absent(mut self, name: impl Into<String>) -> Self {
        self.parameter_values.insert(name.into(), None);
        self
    }

    /// The statement fingerprint.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Number of captured bindings, absent ones included.
    pub fn binding_count(&self) -> usize {
        self.parameter_values.len()
    }
}

impl fmt::Debug for QueryPlanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPlanKey")
            .field("statement", &self.statement)
            .field("bindings", &self.parameter_values.len())
            .finish()
    }
}

impl PartialEq for QueryPlanKey {
    fn eq(&self, other: &Self) -> bool {
        self.statement == other.statement
    }
}

impl Eq for QueryPlanKey {}

impl Hash for QueryPlanKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.statement.hash(state);
    }
}

/// A previous generation of the plan-key family: same marker in the type
/// name, no parameter table. Scans must skip these without failing.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct LegacyQueryPlanKey {
    statement: String,
}

impl LegacyQueryPlanKey {
    /// Key for `statement`.
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
        }
    }
}

/// Install the reference collaborator's internal layout into a registry.
///
/// This is the soft contract in one place: the hop fields the introspector
/// traverses, the entry-table view, and the plan key's parameter table.
pub fn register_reference_shapes(registry: &TypeRegistry) {
    registry.register_field::<MemoryCache, CoherentState>("coherent_state", |cache| {
        &cache.coherent_state
    });
    registry.register_field::<CoherentState, EntryTable>("entries", |state| &state.entries);
    registry.register_entry_source::<EntryTable>();

    registry.register_field::<QueryPlanKey, HashMap<String, Option<Box<dyn RuntimeValue>>>>(
        "parameter_values",
        |key| &key.parameter_values,
    );
    registry.register_entry_source::<HashMap<String, Option<Box<dyn RuntimeValue>>>>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heterogeneous_keys_round_trip() {
        let mut cache = MemoryCache::new();
        cache.insert("name".to_string(), Box::new(1u32));
        cache.insert(42u64, Box::new(String::from("answer")));
        cache.insert(QueryPlanKey::new("SELECT 1"), Box::new(3.5f64));

        assert_eq!(cache.len(), 3);
        let found = cache.get(&"name".to_string()).unwrap();
        assert_eq!(found.as_any().downcast_ref::<u32>(), Some(&1));
        let found = cache.get(&42u64).unwrap();
        assert!(found.as_any().is::<String>());
        assert!(cache.get(&QueryPlanKey::new("SELECT 1")).is_some());
    }

    #[test]
    fn lookup_distinguishes_key_runtime_types() {
        let mut cache = MemoryCache::new();
        cache.insert(1u32, Box::new(String::from("u32-slot")));

        assert!(cache.get(&1u32).is_some());
        assert!(cache.get(&1u64).is_none());
        assert!(cache.get(&"1".to_string()).is_none());
    }

    #[test]
    fn plan_key_identity_ignores_bindings() {
        let bare = QueryPlanKey::new("SELECT x");
        let bound = QueryPlanKey::new("SELECT x").bind("id", Box::new(9u32));
        assert_eq!(bare, bound);

        let mut cache = MemoryCache::new();
        cache.insert(bare, Box::new(1u8));
        cache.insert(bound, Box::new(2u8));
        assert_eq!(cache.len(), 1);

        let found = cache.get(&QueryPlanKey::new("SELECT x")).unwrap();
        assert_eq!(found.as_any().downcast_ref::<u8>(), Some(&2));
    }

    #[test]
    fn entry_table_pairs_expose_concrete_key_types() {
        let mut cache = MemoryCache::new();
        cache.insert(QueryPlanKey::new("SELECT 1"), Box::new(0u8));

        let table = &cache.coherent_state.entries;
        let (key, value) = table.pairs().next().unwrap();
        assert!(key.type_fullname().ends_with("testkit::QueryPlanKey"));
        assert!(!key.type_fullname().contains("Box"));
        assert!(value.is_some());
    }

    #[test]
    fn empty_cache_reports_empty() {
        let cache = MemoryCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.len(), 0);
        assert!(cache.get(&"anything".to_string()).is_none());
    }

    #[test]
    fn bindings_count_absent_and_present_alike() {
        let key = QueryPlanKey::new("SELECT y")
            .bind("a", Box::new(1u8))
            .bind_absent("b");
        assert_eq!(key.binding_count(), 2);
        assert_eq!(key.statement(), "SELECT y");
    }

    #[test]
    fn reference_shapes_register_the_documented_layout() {
        let registry = TypeRegistry::new();
        register_reference_shapes(&registry);

        assert!(registry.is_registered(TypeId::of::<MemoryCache>()));
        assert_eq!(
            registry.known_fields(TypeId::of::<CoherentState>()),
            ["entries"]
        );
        assert_eq!(
            registry.known_fields(TypeId::of::<QueryPlanKey>()),
            ["parameter_values"]
        );
    }
}
