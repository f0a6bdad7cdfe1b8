//! Decoder configuration.

use crate::type_name::{TypeName, DEFAULT_MAX_TYPE_NAME_DEPTH};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maps a decoded type name to a key meaningful to the caller.
///
/// The key returned for a class's type name is stored on its metadata and
/// surfaces as [`ClassRecord::resolved_type`](crate::ClassRecord::resolved_type).
/// Returning `None` leaves the class unresolved; decoding continues either way.
pub trait TypeResolver: Send + Sync {
    /// Resolve a parsed, assembly-qualified type name
    fn resolve(&self, type_name: &TypeName) -> Option<String>;
}

impl<F> TypeResolver for F
where
    F: Fn(&TypeName) -> Option<String> + Send + Sync,
{
    fn resolve(&self, type_name: &TypeName) -> Option<String> {
        self(type_name)
    }
}

/// Resolver backed by a fixed table of type names.
///
/// Entries are matched against the assembly-qualified name first and the
/// full name (without assembly) second.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    entries: HashMap<String, String>,
}

impl TypeMap {
    /// Creates an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry mapping `type_name` to `key`
    pub fn with(mut self, type_name: impl Into<String>, key: impl Into<String>) -> Self {
        self.insert(type_name, key);
        self
    }

    /// Adds an entry in place
    pub fn insert(&mut self, type_name: impl Into<String>, key: impl Into<String>) {
        self.entries.insert(type_name.into(), key.into());
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TypeResolver for TypeMap {
    fn resolve(&self, type_name: &TypeName) -> Option<String> {
        self.entries
            .get(&type_name.assembly_qualified_name())
            .or_else(|| self.entries.get(&type_name.full_name()))
            .cloned()
    }
}

/// Configuration for a decode
#[derive(Clone)]
pub struct DecodeOptions {
    /// Maximum nesting of generic arguments and decorators in a type name
    pub max_type_name_depth: usize,
    /// Optional mapping from decoded type names to caller keys
    pub type_resolver: Option<Arc<dyn TypeResolver>>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_type_name_depth: DEFAULT_MAX_TYPE_NAME_DEPTH,
            type_resolver: None,
        }
    }
}

impl fmt::Debug for DecodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeOptions")
            .field("max_type_name_depth", &self.max_type_name_depth)
            .field("type_resolver", &self.type_resolver.as_ref().map(|_| ".."))
            .finish()
    }
}

impl DecodeOptions {
    /// Creates options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum type name nesting depth
    pub fn max_type_name_depth(mut self, depth: usize) -> Self {
        self.max_type_name_depth = depth;
        self
    }

    /// Sets the type resolver
    pub fn type_resolver(mut self, resolver: impl TypeResolver + 'static) -> Self {
        self.type_resolver = Some(Arc::new(resolver));
        self
    }
}
