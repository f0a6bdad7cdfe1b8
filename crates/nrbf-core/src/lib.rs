//! # nrbf-core
//!
//! A safe decoder for the .NET Remoting Binary Format (NRBF), the wire format
//! written by the legacy `BinaryFormatter`.
//!
//! This crate provides the core functionality for:
//! - Validating the stream header and sniffing payloads by their first bytes
//! - Decoding the record stream into an identity map of classes, arrays,
//!   strings and boxed primitives
//! - Walking the decoded object graph for reporting
//!
//! Decoding never instantiates anything: class records only carry their type
//! name, member names, declared types and values. Untrusted input is bounded
//! by the format's own limits (array sizes, ranks, type name depth), and the
//! decoder keeps an explicit work stack instead of recursing, so nesting depth
//! cannot exhaust the call stack.
//!
//! ## Architecture
//!
//! - [`reader`]: Little-endian primitives and length-prefixed strings
//! - [`record`]: The record model
//! - [`type_name`]: Assembly-qualified type name parsing
//! - [`decoder`]: The decode loop, options and the resulting [`Payload`]
//! - [`report`]: Graph traversal and text rendering
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use nrbf_core::{decode_file, DecodeOptions, SerializationRecord};
//!
//! let payload = decode_file("./session.bin", &DecodeOptions::default())?;
//!
//! if let SerializationRecord::Class(class) = payload.root() {
//!     println!("root is {}", class.type_name());
//!     for (name, _, value) in class.members() {
//!         println!("  {name} = {value:?}");
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`TypeResolver`]: Map decoded type names to caller-defined keys
//! - [`RecordWriter`]: Customize how graph nodes are reported
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod decoder;
pub mod error;
pub mod reader;
pub mod record;
pub mod record_map;
pub mod report;
pub mod type_name;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
pub use decoder::{
    decode, decode_class, decode_file, starts_with_payload_header,
    stream_starts_with_payload_header, ClassPayload, DecodeOptions, DecodeStats, Payload, TypeMap,
    TypeResolver,
};
pub use error::{Error, Result};
pub use record::{
    ArrayRecord, ArrayShape, ClassMetadata, ClassRecord, MemberType, PrimitiveType, PrimitiveValue,
    RecordId, RecordType, RecordValue, SerializationRecord,
};
pub use record_map::RecordMap;
pub use report::{render_tree, NullWriter, RecordWriter, StatsWriter};
pub use type_name::TypeName;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
