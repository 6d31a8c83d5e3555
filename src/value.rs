//! Opaque runtime values and structural table views.
//!
//! Everything the probe touches inside a collaborator is loosely typed: the
//! cache handle, the keys, the retained values, the parameter bindings. The
//! probe has no compile-time knowledge of any of them. [`RuntimeValue`] is the
//! common currency for those objects: every `T: Any` automatically reports
//! its fully qualified type name, which is the identity the leak detector
//! matches groups against.
//!
//! [`EntrySource`] is the structural view the introspector needs at the end
//! of its hop path: "this opaque value enumerates as key/value pairs". It is
//! the cast target for tables whose concrete type is nobody's business, the
//! role a well-known dictionary interface plays in runtimes with ambient
//! reflection.

use std::any::Any;
use std::collections::HashMap;

/// An opaque value with a runtime-reportable type identity.
///
/// Blanket-implemented for every `T: Any`, so any concrete value can be
/// passed as `&dyn RuntimeValue` with no per-type ceremony. The reported name
/// comes from [`std::any::type_name`] and has the fully qualified
/// `crate::module::Type` shape the detector's group matching relies on.
///
/// When holding a `Box<dyn RuntimeValue>`, call these methods through
/// `&**boxed`: the box itself is also `Any`, and methods invoked on it
/// directly describe the box, not its contents.
pub trait RuntimeValue: Any {
    /// Fully qualified type name of the concrete value.
    fn type_fullname(&self) -> &'static str;

    /// Bridge to [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> RuntimeValue for T {
    fn type_fullname(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One pair yielded by an [`EntrySource`]: an opaque key and an optionally
/// absent opaque value.
pub type SourcePair<'a> = (&'a dyn RuntimeValue, Option<&'a dyn RuntimeValue>);

/// Structural view over an opaque key/value table.
///
/// The introspector never names a concrete table type. A collaborator's table
/// becomes enumerable by registering this view for it via
/// [`TypeRegistry::register_entry_source`](crate::registry::TypeRegistry::register_entry_source).
/// An absent (`None`) value models a slot or binding that currently holds
/// nothing.
pub trait EntrySource {
    /// Number of pairs currently held.
    fn pair_count(&self) -> usize;

    /// Iterate the pairs in the table's own order. The order is unspecified
    /// but stable while the table is not mutated.
    fn pairs(&self) -> Box<dyn Iterator<Item = SourcePair<'_>> + '_>;
}

impl EntrySource for HashMap<String, Box<dyn RuntimeValue>> {
    fn pair_count(&self) -> usize {
        self.len()
    }

    fn pairs(&self) -> Box<dyn Iterator<Item = SourcePair<'_>> + '_> {
        Box::new(
            self.iter()
                .map(|(name, value)| (name as &dyn RuntimeValue, Some(&**value))),
        )
    }
}

impl EntrySource for HashMap<String, Option<Box<dyn RuntimeValue>>> {
    fn pair_count(&self) -> usize {
        self.len()
    }

    fn pairs(&self) -> Box<dyn Iterator<Item = SourcePair<'_>> + '_> {
        Box::new(
            self.iter()
                .map(|(name, value)| (name as &dyn RuntimeValue, value.as_deref())),
        )
    }
}

/// Shorten a fully qualified `crate::module::Type` path to its final segment
/// for display. Generic arguments are left untouched.
pub fn short_type_name(full: &str) -> String {
    let (base, args) = match full.find('<') {
        Some(idx) => (&full[..idx], &full[idx..]),
        None => (full, ""),
    };
    let short = base.rsplit("::").next().unwrap_or(base);
    format!("{short}{args}")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample {
        id: u32,
    }

    #[test]
    fn blanket_impl_reports_fully_qualified_name() {
        let sample = Sample { id: 7 };
        let value: &dyn RuntimeValue = &sample;
        assert!(value.type_fullname().ends_with("tests::Sample"));
        assert_eq!(
            value.as_any().downcast_ref::<Sample>().map(|s| s.id),
            Some(7)
        );
    }

    #[test]
    fn boxed_value_derefs_to_inner_identity() {
        let boxed: Box<dyn RuntimeValue> = Box::new(String::from("hello"));
        let inner: &dyn RuntimeValue = &*boxed;
        assert_eq!(inner.type_fullname(), "alloc::string::String");
    }

    #[test]
    fn map_with_mandatory_values_enumerates_all_pairs() {
        let mut map: HashMap<String, Box<dyn RuntimeValue>> = HashMap::new();
        map.insert("a".to_string(), Box::new(1u32));
        map.insert("b".to_string(), Box::new(String::from("x")));

        let source: &dyn EntrySource = &map;
        assert_eq!(source.pair_count(), 2);
        let mut names: Vec<&String> = source
            .pairs()
            .filter_map(|(name, _)| name.as_any().downcast_ref::<String>())
            .collect();
        names.sort();
        assert_eq!(names, [&"a".to_string(), &"b".to_string()]);
        assert!(source.pairs().all(|(_, value)| value.is_some()));
    }

    #[test]
    fn map_with_optional_values_preserves_absence() {
        let mut map: HashMap<String, Option<Box<dyn RuntimeValue>>> = HashMap::new();
        map.insert("bound".to_string(), Some(Box::new(42u64)));
        map.insert("absent".to_string(), None);

        let source: &dyn EntrySource = &map;
        assert_eq!(source.pair_count(), 2);
        let absent = source
            .pairs()
            .filter(|(_, value)| value.is_none())
            .count();
        assert_eq!(absent, 1);
    }

    #[test]
    fn short_names_strip_module_paths() {
        assert_eq!(short_type_name("alloc::string::String"), "String");
        assert_eq!(short_type_name("Bare"), "Bare");
        assert_eq!(
            short_type_name("std::vec::Vec<alloc::string::String>"),
            "Vec<alloc::string::String>"
        );
    }
}
