//! Extensible record visiting traits.
//!
//! This module provides the [`RecordWriter`] trait for customizing what
//! happens to each node of a decoded object graph.

use crate::record::{LibraryRecord, PrimitiveValue, RecordId, SerializationRecord};
use std::fmt::{self, Result};

/// Position of a node relative to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot<'a> {
    /// The payload root
    Root,
    /// A class member
    Member(&'a str),
    /// An array element, by row-major index
    Element(usize),
}

impl fmt::Display for Slot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Root => f.write_str("root"),
            Slot::Member(name) => f.write_str(name),
            Slot::Element(index) => write!(f, "[{index}]"),
        }
    }
}

/// Trait for visiting the nodes of a decoded payload.
///
/// [`walk`](super::walk) calls these methods in depth-first order. `depth` is
/// the distance from the root. Every method defaults to doing nothing.
///
/// # Example
///
/// ```
/// use nrbf_core::report::{RecordWriter, Slot};
/// use nrbf_core::SerializationRecord;
///
/// #[derive(Default)]
/// struct TypeCollector {
///     names: Vec<String>,
/// }
///
/// impl RecordWriter for TypeCollector {
///     fn write_record(&mut self, _depth: usize, _slot: Slot<'_>, record: &SerializationRecord) -> std::fmt::Result {
///         if let Some(name) = record.type_name() {
///             self.names.push(name.to_string());
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait RecordWriter {
    /// Write a library declaration; called for every library before the walk
    fn write_library(&mut self, library: &LibraryRecord) -> Result {
        let _ = library;
        Ok(())
    }

    /// Write a record on its first visit
    fn write_record(&mut self, depth: usize, slot: Slot<'_>, record: &SerializationRecord) -> Result {
        let _ = (depth, slot, record);
        Ok(())
    }

    /// Write a reference to a record that was already visited
    fn write_back_reference(&mut self, depth: usize, slot: Slot<'_>, id: RecordId) -> Result {
        let _ = (depth, slot, id);
        Ok(())
    }

    /// Write an inline primitive value
    fn write_primitive(&mut self, depth: usize, slot: Slot<'_>, value: &PrimitiveValue) -> Result {
        let _ = (depth, slot, value);
        Ok(())
    }

    /// Write `count` consecutive nulls, the first at `slot`
    fn write_nulls(&mut self, depth: usize, slot: Slot<'_>, count: u32) -> Result {
        let _ = (depth, slot, count);
        Ok(())
    }
}

/// A no-op writer that discards all output
pub struct NullWriter;

impl RecordWriter for NullWriter {}

/// A writer that collects statistics about the object graph
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatsWriter {
    /// Number of libraries
    pub library_count: usize,
    /// Number of class instances
    pub class_count: usize,
    /// Number of arrays
    pub array_count: usize,
    /// Number of string objects
    pub string_count: usize,
    /// Number of boxed primitives
    pub boxed_count: usize,
    /// Number of inline primitive values
    pub primitive_count: usize,
    /// Number of null slots
    pub null_count: u64,
    /// Number of references to already visited records
    pub back_reference_count: usize,
    /// Deepest node below the root
    pub max_depth: usize,
}

impl StatsWriter {
    fn visit(&mut self, depth: usize) {
        self.max_depth = self.max_depth.max(depth);
    }
}

impl RecordWriter for StatsWriter {
    fn write_library(&mut self, _library: &LibraryRecord) -> Result {
        self.library_count += 1;
        Ok(())
    }

    fn write_record(&mut self, depth: usize, _slot: Slot<'_>, record: &SerializationRecord) -> Result {
        self.visit(depth);
        match record {
            SerializationRecord::Library(_) => self.library_count += 1,
            SerializationRecord::Class(_) => self.class_count += 1,
            SerializationRecord::Array(_) => self.array_count += 1,
            SerializationRecord::String(_) => self.string_count += 1,
            SerializationRecord::Primitive(_) => self.boxed_count += 1,
        }
        Ok(())
    }

    fn write_back_reference(&mut self, depth: usize, _slot: Slot<'_>, _id: RecordId) -> Result {
        self.visit(depth);
        self.back_reference_count += 1;
        Ok(())
    }

    fn write_primitive(&mut self, depth: usize, _slot: Slot<'_>, _value: &PrimitiveValue) -> Result {
        self.visit(depth);
        self.primitive_count += 1;
        Ok(())
    }

    fn write_nulls(&mut self, depth: usize, _slot: Slot<'_>, count: u32) -> Result {
        self.visit(depth);
        self.null_count += u64::from(count);
        Ok(())
    }
}
