//! Type registry: the probe's reflection metadata.
//!
//! Rust keeps no ambient field metadata at runtime, so the code that
//! statically knows a collaborator's internals declares them here once:
//! plain `fn(&T) -> &F` projections erased behind `TypeId`-keyed slots, plus
//! [`EntrySource`] view adapters for table types. Scan-time lookups are
//! read-locked map probes; registration is thread-safe and last-write-wins.
//!
//! The registry is also where collaborator-layout fragility is absorbed: when
//! an upgrade renames an internal field, the registration site is the single
//! place to fix, and every accessor built afterwards picks the fix up.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::value::{EntrySource, RuntimeValue};

/// Erased field projection: reads one field from an opaque owner. `None`
/// means the owner's runtime type is not the declaring type.
pub(crate) type ErasedGetter =
    Arc<dyn for<'a> Fn(&'a dyn RuntimeValue) -> Option<&'a dyn RuntimeValue> + Send + Sync>;

/// Erased view adapter: presents an opaque value as an enumerable table.
pub(crate) type ErasedSourceCast =
    Arc<dyn for<'a> Fn(&'a dyn RuntimeValue) -> Option<&'a dyn EntrySource> + Send + Sync>;

/// One registered field of one type.
#[derive(Clone)]
pub(crate) struct FieldSlot {
    pub(crate) getter: ErasedGetter,
    /// Fully qualified name of the field's value type, for diagnostics.
    pub(crate) value_type: &'static str,
}

/// Everything registered for one concrete type.
struct TypeEntry {
    fullname: &'static str,
    fields: HashMap<String, FieldSlot>,
    source_cast: Option<ErasedSourceCast>,
}

impl TypeEntry {
    fn new(fullname: &'static str) -> Self {
        Self {
            fullname,
            fields: HashMap::new(),
            source_cast: None,
        }
    }
}

/// Process-shared registry of introspectable types.
///
/// Constructed explicitly and handed (usually as `Arc<TypeRegistry>`) to the
/// [`AccessorFactory`](crate::accessor::AccessorFactory). Nothing in the
/// probe reaches for global state, so two registries with different shape
/// metadata can coexist in one process.
#[derive(Default)]
pub struct TypeRegistry {
    inner: RwLock<HashMap<TypeId, TypeEntry>>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Register a non-public field of `T` under `name`.
    ///
    /// `project` must be a plain field projection with no computation behind
    /// it; accessors built from it are assumed to cost a native field load.
    /// Re-registering the same `(type, name)` replaces the projection.
    pub fn register_field<T, F>(&self, name: &'static str, project: fn(&T) -> &F)
    where
        T: Any,
        F: Any,
    {
        let getter: ErasedGetter = Arc::new(move |owner: &dyn RuntimeValue| {
            owner
                .as_any()
                .downcast_ref::<T>()
                .map(|typed| project(typed) as &dyn RuntimeValue)
        });
        let slot = FieldSlot {
            getter,
            value_type: std::any::type_name::<F>(),
        };
        let mut inner = self.inner.write();
        inner
            .entry(TypeId::of::<T>())
            .or_insert_with(|| TypeEntry::new(std::any::type_name::<T>()))
            .fields
            .insert(name.to_string(), slot);
    }

    /// Register `T`'s [`EntrySource`] view so opaque values of this type can
    /// be enumerated as key/value pairs.
    pub fn register_entry_source<T>(&self)
    where
        T: Any + EntrySource,
    {
        let cast: ErasedSourceCast = Arc::new(|value: &dyn RuntimeValue| {
            value
                .as_any()
                .downcast_ref::<T>()
                .map(|typed| typed as &dyn EntrySource)
        });
        let mut inner = self.inner.write();
        inner
            .entry(TypeId::of::<T>())
            .or_insert_with(|| TypeEntry::new(std::any::type_name::<T>()))
            .source_cast = Some(cast);
    }

    /// Look up the registered slot for `(owner, field)`.
    pub(crate) fn field_slot(&self, owner: TypeId, field: &str) -> Option<FieldSlot> {
        let inner = self.inner.read();
        inner
            .get(&owner)
            .and_then(|entry| entry.fields.get(field))
            .cloned()
    }

    /// View an opaque value through its registered [`EntrySource`] adapter,
    /// if its runtime type has one.
    pub fn as_entry_source<'a>(&self, value: &'a dyn RuntimeValue) -> Option<&'a dyn EntrySource> {
        let cast = {
            let inner = self.inner.read();
            inner
                .get(&value.as_any().type_id())
                .and_then(|entry| entry.source_cast.clone())
        };
        cast.and_then(|cast| cast(value))
    }

    /// Field names registered for the given type, sorted. Empty when the type
    /// is unknown.
    pub fn known_fields(&self, owner: TypeId) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<String> = inner
            .get(&owner)
            .map(|entry| entry.fields.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Fully qualified names of every registered type, sorted.
    pub fn registered_types(&self) -> Vec<&'static str> {
        let inner = self.inner.read();
        let mut names: Vec<&'static str> = inner.values().map(|entry| entry.fullname).collect();
        names.sort();
        names
    }

    /// Whether any metadata is registered for the given type.
    pub fn is_registered(&self, owner: TypeId) -> bool {
        self.inner.read().contains_key(&owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Outer {
        inner: Inner,
        label: String,
    }

    struct Inner {
        depth: u8,
    }

    fn sample() -> Outer {
        Outer {
            inner: Inner { depth: 3 },
            label: "probe".to_string(),
        }
    }

    #[test]
    fn registered_projection_reads_through_erasure() {
        let registry = TypeRegistry::new();
        registry.register_field::<Outer, Inner>("inner", |outer| &outer.inner);

        let outer = sample();
        let slot = registry
            .field_slot(TypeId::of::<Outer>(), "inner")
            .unwrap();
        let value = (slot.getter)(&outer).unwrap();
        assert_eq!(
            value.as_any().downcast_ref::<Inner>().map(|i| i.depth),
            Some(3)
        );
        assert!(slot.value_type.ends_with("tests::Inner"));
    }

    #[test]
    fn getter_rejects_foreign_instances() {
        let registry = TypeRegistry::new();
        registry.register_field::<Outer, Inner>("inner", |outer| &outer.inner);

        let slot = registry
            .field_slot(TypeId::of::<Outer>(), "inner")
            .unwrap();
        let not_an_outer = String::from("decoy");
        assert!((slot.getter)(&not_an_outer).is_none());
    }

    #[test]
    fn unknown_fields_and_types_resolve_to_none() {
        let registry = TypeRegistry::new();
        registry.register_field::<Outer, Inner>("inner", |outer| &outer.inner);

        assert!(registry.field_slot(TypeId::of::<Outer>(), "missing").is_none());
        assert!(registry.field_slot(TypeId::of::<Inner>(), "inner").is_none());
        assert!(!registry.is_registered(TypeId::of::<Inner>()));
        assert!(registry.known_fields(TypeId::of::<Inner>()).is_empty());
    }

    #[test]
    fn known_fields_come_back_sorted() {
        let registry = TypeRegistry::new();
        registry.register_field::<Outer, String>("label", |outer| &outer.label);
        registry.register_field::<Outer, Inner>("inner", |outer| &outer.inner);

        assert_eq!(registry.known_fields(TypeId::of::<Outer>()), ["inner", "label"]);
    }

    #[test]
    fn reregistration_replaces_the_projection() {
        let registry = TypeRegistry::new();
        registry.register_field::<Outer, String>("field", |outer| &outer.label);
        registry.register_field::<Outer, Inner>("field", |outer| &outer.inner);

        let outer = sample();
        let slot = registry.field_slot(TypeId::of::<Outer>(), "field").unwrap();
        let value = (slot.getter)(&outer).unwrap();
        assert!(value.as_any().is::<Inner>());
        assert_eq!(registry.known_fields(TypeId::of::<Outer>()).len(), 1);
    }

    #[test]
    fn entry_source_view_resolves_for_registered_tables() {
        let registry = TypeRegistry::new();
        registry.register_entry_source::<HashMap<String, Box<dyn RuntimeValue>>>();

        let mut table: HashMap<String, Box<dyn RuntimeValue>> = HashMap::new();
        table.insert("k".to_string(), Box::new(9u16));

        let source = registry.as_entry_source(&table).unwrap();
        assert_eq!(source.pair_count(), 1);

        let plain = String::from("not a table");
        assert!(registry.as_entry_source(&plain).is_none());
    }

    #[test]
    fn registered_types_lists_both_kinds_of_registration() {
        let registry = TypeRegistry::new();
        registry.register_field::<Outer, Inner>("inner", |outer| &outer.inner);
        registry.register_entry_source::<HashMap<String, Box<dyn RuntimeValue>>>();

        let types = registry.registered_types();
        assert_eq!(types.len(), 2);
        assert!(types.iter().any(|name| name.ends_with("tests::Outer")));
    }
}
