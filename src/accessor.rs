//! Accessor factory: build-once, read-forever field access.
//!
//! [`AccessorFactory`] turns a [`FieldDescriptor`] into a [`FieldAccessor`]
//! by resolving the registered projection for the descriptor's declaring
//! type. Built accessors are memoized per descriptor for the life of the
//! factory, so a scan's hot path pays one dynamic call per field read and
//! never a registry probe.
//!
//! Failed builds are not cached. A descriptor that names an unregistered
//! field fails with [`ProbeError::FieldNotFound`] every time, and succeeds
//! once the registration appears.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::error::ProbeError;
use crate::registry::{ErasedGetter, TypeRegistry};
use crate::value::RuntimeValue;

/// Identifies one non-public field: declaring type plus field name.
///
/// Two descriptors are the same accessor-cache slot exactly when both the
/// `TypeId` and the field name agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    owner: TypeId,
    owner_type: &'static str,
    field: String,
}

impl FieldDescriptor {
    /// Descriptor for a field of the statically known type `T`.
    pub fn of<T: Any>(field: &str) -> Self {
        Self {
            owner: TypeId::of::<T>(),
            owner_type: std::any::type_name::<T>(),
            field: field.to_string(),
        }
    }

    /// Descriptor for a field of `instance`'s runtime type.
    pub fn of_instance(instance: &dyn RuntimeValue, field: &str) -> Self {
        Self {
            owner: instance.as_any().type_id(),
            owner_type: instance.type_fullname(),
            field: field.to_string(),
        }
    }

    /// `TypeId` of the declaring type.
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    /// Fully qualified name of the declaring type.
    pub fn owner_type(&self) -> &'static str {
        self.owner_type
    }

    /// The field name.
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner_type, self.field)
    }
}

/// A reusable reader for one field of one type.
///
/// Cheap to clone; clones share the underlying projection. [`read`] returns
/// `None` when the instance's runtime type is not the declaring type. That is
/// a caller bug rather than a data condition, and the layer that owns the
/// layout expectation (the introspector) surfaces it as a shape mismatch.
///
/// [`read`]: FieldAccessor::read
#[derive(Clone)]
pub struct FieldAccessor {
    descriptor: FieldDescriptor,
    getter: ErasedGetter,
}

impl FieldAccessor {
    /// Read the field from an opaque instance.
    pub fn read<'a>(&self, instance: &'a dyn RuntimeValue) -> Option<&'a dyn RuntimeValue> {
        (self.getter)(instance)
    }

    /// The descriptor this accessor was built from.
    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }
}

impl fmt::Debug for FieldAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Compile-time-typed wrapper over a [`FieldAccessor`].
///
/// The owner type is pinned by the signature, so the wrong-instance misuse
/// the erased accessor can only catch at runtime is unrepresentable here.
pub struct TypedAccessor<O, V> {
    inner: FieldAccessor,
    _types: PhantomData<fn(&O) -> &V>,
}

impl<O: Any, V: Any> TypedAccessor<O, V> {
    fn new(inner: FieldAccessor) -> Self {
        Self {
            inner,
            _types: PhantomData,
        }
    }

    /// Read the field. `None` only when the registered field's value type is
    /// not `V`.
    pub fn read<'a>(&self, owner: &'a O) -> Option<&'a V> {
        self.inner
            .read(owner)
            .and_then(|value| value.as_any().downcast_ref::<V>())
    }

    /// The underlying erased accessor.
    pub fn erased(&self) -> &FieldAccessor {
        &self.inner
    }
}

/// Builds and memoizes field accessors against an injected [`TypeRegistry`].
///
/// Thread-safe. Concurrent first builds of the same descriptor may race, but
/// every build resolves the same registered projection, so whichever insert
/// wins leaves a functionally identical accessor in the cache.
pub struct AccessorFactory {
    registry: Arc<TypeRegistry>,
    built: RwLock<HashMap<FieldDescriptor, FieldAccessor>>,
}

impl AccessorFactory {
    /// Create a factory over the given registry.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            built: RwLock::new(HashMap::new()),
        }
    }

    /// The registry this factory resolves against.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Build the accessor for `descriptor`, or return the memoized one.
    pub fn accessor(&self, descriptor: &FieldDescriptor) -> Result<FieldAccessor, ProbeError> {
        if let Some(found) = self.built.read().get(descriptor) {
            return Ok(found.clone());
        }

        let slot = self
            .registry
            .field_slot(descriptor.owner(), descriptor.field())
            .ok_or_else(|| ProbeError::FieldNotFound {
                owner: descriptor.owner_type().to_string(),
                field: descriptor.field().to_string(),
                known_fields: self.registry.known_fields(descriptor.owner()),
            })?;
        trace!(
            descriptor = %descriptor,
            value_type = slot.value_type,
            "built field accessor"
        );

        let accessor = FieldAccessor {
            descriptor: descriptor.clone(),
            getter: slot.getter,
        };
        let mut built = self.built.write();
        let kept = built.entry(descriptor.clone()).or_insert(accessor);
        Ok(kept.clone())
    }

    /// Build the accessor for a field of `instance`'s runtime type.
    pub fn accessor_for(
        &self,
        instance: &dyn RuntimeValue,
        field: &str,
    ) -> Result<FieldAccessor, ProbeError> {
        self.accessor(&FieldDescriptor::of_instance(instance, field))
    }

    /// Build a compile-time-typed accessor for a field of `O`.
    pub fn typed<O: Any, V: Any>(&self, field: &str) -> Result<TypedAccessor<O, V>, ProbeError> {
        let accessor = self.accessor(&FieldDescriptor::of::<O>(field))?;
        Ok(TypedAccessor::new(accessor))
    }

    /// Number of distinct accessors built so far.
    pub fn built_count(&self) -> usize {
        self.built.read().len()
    }
}
