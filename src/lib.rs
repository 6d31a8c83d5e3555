//! Runtime leak probe for in-process caches.
//!
//! A cache that keys compiled artifacts by composite keys can quietly retain
//! every object captured inside those keys. This crate diagnoses that from
//! inside the process: it enumerates a cache's internal entry table through
//! registered field projections, recognizes composite keys by a marker in
//! their runtime type name, and reports whether any captured binding belongs
//! to a suspect group of types.
//!
//! - **Field access**: [`TypeRegistry`] plus [`AccessorFactory`] give cached,
//!   build-once access to registered non-public fields
//! - **Introspection**: [`CacheIntrospector`] walks a handle's internals to
//!   the live entry table and fails loudly on layout drift
//! - **Detection**: [`LeakDetector`] delivers the verdict, or a full
//!   [`ScanReport`] with counters and every matched binding
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use leak_probe::{AccessorFactory, LeakDetector, TypeRegistry};
//! use leak_probe::testkit::{self, MemoryCache, QueryPlanKey};
//!
//! let registry = Arc::new(TypeRegistry::new());
//! testkit::register_reference_shapes(&registry);
//! let detector = LeakDetector::new(Arc::new(AccessorFactory::new(registry)));
//!
//! let mut cache = MemoryCache::new();
//! cache.insert(
//!     QueryPlanKey::new("SELECT g FROM gizmos").bind("ids", Box::new(gizmos)),
//!     Box::new(compiled_plan),
//! );
//!
//! if detector.detect(&cache, "widgets")? {
//!     println!("{}", detector.scan(&cache, "widgets")?.format_report());
//! }
//! ```

pub mod accessor;
pub mod detect;
pub mod error;
pub mod introspect;
pub mod registry;
pub mod report;
pub mod testkit;
pub mod value;

// Re-export the main types
pub use accessor::{AccessorFactory, FieldAccessor, FieldDescriptor, TypedAccessor};
pub use detect::{LeakDetector, ProbeConfig, PARAM_TABLE_FIELD, QUERY_PLAN_KEY_MARKER};
pub use error::ProbeError;
pub use introspect::{CacheEntry, CacheIntrospector, DEFAULT_ENTRY_PATH};
pub use registry::TypeRegistry;
pub use report::{LeakMatch, ScanReport};
pub use value::{EntrySource, RuntimeValue, SourcePair};
