//! The record model.
//!
//! A payload is a flat stream of self-describing records. Records that carry an
//! identity (classes, strings, arrays, libraries) live in the
//! [`RecordMap`](crate::RecordMap); everything else (primitives, nulls, member
//! references) only ever fills a slot of such a record as a [`RecordValue`].
//!
//! Record kinds form a closed set fixed by the format, so they are modeled as
//! enums and matched exhaustively everywhere.

mod array;
mod class;
mod member_type;
mod primitive;

use crate::error::{Error, Result};
use crate::reader::BinaryReader;
use crate::type_name::TypeName;
use std::fmt;
use std::io::Read;

pub use array::{ArrayRecord, ArrayShape, BinaryArrayType, ElementRun, Elements, MAX_ARRAY_LENGTH};
pub use class::{ClassMetadata, ClassRecord};
pub use member_type::{BinaryType, MemberType};
pub use primitive::{
    DateTime, DateTimeKind, Decimal, PrimitiveType, PrimitiveValue, PrimitiveVec,
    MAX_DATE_TIME_TICKS,
};

pub(crate) use array::{decode_array_single, decode_binary_array};
pub(crate) use class::{decode_class_metadata, ClassKind};
pub(crate) use member_type::SlotContext;

/// Assembly name implied for system classes
pub const SYSTEM_LIBRARY_NAME: &str = "mscorlib";

/// Producer-assigned identity of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub i32);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read an object identity, which must be non-zero
pub(crate) fn read_record_id<R: Read>(reader: &mut BinaryReader<R>) -> Result<RecordId> {
    let offset = reader.offset();
    let id = reader.read_i32()?;
    if id == 0 {
        return Err(Error::format_violation(offset, "record id must be non-zero"));
    }
    Ok(RecordId(id))
}

/// Record kinds, tagged by their wire discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    /// Stream header
    SerializedStreamHeader = 0,
    /// Class instance reusing the metadata of an earlier class record
    ClassWithId = 1,
    /// Legacy system class without member types
    SystemClassWithMembers = 2,
    /// Legacy class without member types
    ClassWithMembers = 3,
    /// System class with member types
    SystemClassWithMembersAndTypes = 4,
    /// Class with member types and a library
    ClassWithMembersAndTypes = 5,
    /// String value
    BinaryObjectString = 6,
    /// General array
    BinaryArray = 7,
    /// Primitive value with its kind
    MemberPrimitiveTyped = 8,
    /// Reference to another record's identity
    MemberReference = 9,
    /// A single null
    ObjectNull = 10,
    /// End of stream
    MessageEnd = 11,
    /// Library (assembly) declaration
    BinaryLibrary = 12,
    /// Run of nulls with a one-byte count
    ObjectNullMultiple256 = 13,
    /// Run of nulls with a four-byte count
    ObjectNullMultiple = 14,
    /// Single-dimension array of a primitive kind
    ArraySinglePrimitive = 15,
    /// Single-dimension array of objects
    ArraySingleObject = 16,
    /// Single-dimension array of strings
    ArraySingleString = 17,
    /// Remote method call
    MethodCall = 21,
    /// Remote method return
    MethodReturn = 22,
}

impl RecordType {
    /// Maps a tag byte to a record kind
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::SerializedStreamHeader,
            1 => Self::ClassWithId,
            2 => Self::SystemClassWithMembers,
            3 => Self::ClassWithMembers,
            4 => Self::SystemClassWithMembersAndTypes,
            5 => Self::ClassWithMembersAndTypes,
            6 => Self::BinaryObjectString,
            7 => Self::BinaryArray,
            8 => Self::MemberPrimitiveTyped,
            9 => Self::MemberReference,
            10 => Self::ObjectNull,
            11 => Self::MessageEnd,
            12 => Self::BinaryLibrary,
            13 => Self::ObjectNullMultiple256,
            14 => Self::ObjectNullMultiple,
            15 => Self::ArraySinglePrimitive,
            16 => Self::ArraySingleObject,
            17 => Self::ArraySingleString,
            21 => Self::MethodCall,
            22 => Self::MethodReturn,
            _ => return None,
        })
    }

    /// Returns true for recognized kinds this decoder refuses to handle
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::SystemClassWithMembers
                | Self::ClassWithMembers
                | Self::MethodCall
                | Self::MethodReturn
        )
    }
}

/// Set of record kinds legal at a point in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowedRecordTypes(u32);

impl AllowedRecordTypes {
    /// No record kinds
    pub const NONE: Self = Self(0);
    /// `ClassWithId`
    pub const CLASS_WITH_ID: Self = Self::of(RecordType::ClassWithId);
    /// `SystemClassWithMembersAndTypes`
    pub const SYSTEM_CLASS_WITH_MEMBERS_AND_TYPES: Self =
        Self::of(RecordType::SystemClassWithMembersAndTypes);
    /// `ClassWithMembersAndTypes`
    pub const CLASS_WITH_MEMBERS_AND_TYPES: Self = Self::of(RecordType::ClassWithMembersAndTypes);
    /// `BinaryObjectString`
    pub const BINARY_OBJECT_STRING: Self = Self::of(RecordType::BinaryObjectString);
    /// `BinaryArray`
    pub const BINARY_ARRAY: Self = Self::of(RecordType::BinaryArray);
    /// `MemberPrimitiveTyped`
    pub const MEMBER_PRIMITIVE_TYPED: Self = Self::of(RecordType::MemberPrimitiveTyped);
    /// `MemberReference`
    pub const MEMBER_REFERENCE: Self = Self::of(RecordType::MemberReference);
    /// `ObjectNull`
    pub const OBJECT_NULL: Self = Self::of(RecordType::ObjectNull);
    /// `MessageEnd`
    pub const MESSAGE_END: Self = Self::of(RecordType::MessageEnd);
    /// `BinaryLibrary`
    pub const BINARY_LIBRARY: Self = Self::of(RecordType::BinaryLibrary);
    /// `ArraySinglePrimitive`
    pub const ARRAY_SINGLE_PRIMITIVE: Self = Self::of(RecordType::ArraySinglePrimitive);
    /// `ArraySingleObject`
    pub const ARRAY_SINGLE_OBJECT: Self = Self::of(RecordType::ArraySingleObject);
    /// `ArraySingleString`
    pub const ARRAY_SINGLE_STRING: Self = Self::of(RecordType::ArraySingleString);

    /// Every null encoding
    pub const NULLS: Self = Self::OBJECT_NULL
        .union(Self::of(RecordType::ObjectNullMultiple256))
        .union(Self::of(RecordType::ObjectNullMultiple));

    /// Every class record kind
    pub const CLASSES: Self = Self::CLASS_WITH_ID
        .union(Self::SYSTEM_CLASS_WITH_MEMBERS_AND_TYPES)
        .union(Self::CLASS_WITH_MEMBERS_AND_TYPES);

    /// Every array record kind
    pub const ARRAYS: Self = Self::BINARY_ARRAY
        .union(Self::ARRAY_SINGLE_PRIMITIVE)
        .union(Self::ARRAY_SINGLE_OBJECT)
        .union(Self::ARRAY_SINGLE_STRING);

    /// Every record kind that introduces an identity-bearing object
    pub const ANY_OBJECT: Self = Self::CLASSES
        .union(Self::ARRAYS)
        .union(Self::BINARY_OBJECT_STRING);

    /// Records legal between top-level objects
    pub const TOP_LEVEL: Self = Self::ANY_OBJECT
        .union(Self::BINARY_LIBRARY)
        .union(Self::MESSAGE_END);

    const fn of(record_type: RecordType) -> Self {
        Self(1 << record_type as u8)
    }

    /// Union of two sets
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if `record_type` is in the set
    pub const fn contains(&self, record_type: RecordType) -> bool {
        self.0 & (1 << record_type as u8) != 0
    }
}

/// The stream header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Identity of the root object
    pub root_id: RecordId,
    /// Header identity, carried but unused
    pub header_id: i32,
    /// Format major version, always 1
    pub major_version: i32,
    /// Format minor version, always 0
    pub minor_version: i32,
}

/// A library (assembly) declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRecord {
    /// Library identity
    pub id: RecordId,
    /// Assembly name as written by the producer
    pub name: String,
}

/// A string object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringRecord {
    /// String identity
    pub id: RecordId,
    /// The value
    pub value: String,
}

/// A boxed primitive: a system class wrapping a single primitive value
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveRecord {
    /// Identity of the boxing class record
    pub id: RecordId,
    /// Kind of class record that carried the value
    pub record_type: RecordType,
    /// The value
    pub value: PrimitiveValue,
}

/// A value filling one member or element slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordValue {
    /// Null reference
    Null,
    /// Inline primitive value
    Primitive(PrimitiveValue),
    /// Another record, looked up through the record map
    Record(RecordId),
}

impl RecordValue {
    /// Returns true for a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Referenced identity, if any
    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            Self::Record(id) => Some(*id),
            _ => None,
        }
    }

    /// Inline primitive, if any
    pub fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Self::Primitive(value) => Some(value),
            _ => None,
        }
    }
}

/// A record held by the record map
#[derive(Debug, Clone, PartialEq)]
pub enum SerializationRecord {
    /// Library declaration
    Library(LibraryRecord),
    /// Class instance
    Class(ClassRecord),
    /// String object
    String(StringRecord),
    /// Array of any shape
    Array(ArrayRecord),
    /// Boxed primitive
    Primitive(PrimitiveRecord),
}

impl SerializationRecord {
    /// Identity of the record
    pub fn id(&self) -> RecordId {
        match self {
            Self::Library(r) => r.id,
            Self::Class(r) => r.id(),
            Self::String(r) => r.id,
            Self::Array(r) => r.id(),
            Self::Primitive(r) => r.id,
        }
    }

    /// Wire kind the record was decoded from
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Library(_) => RecordType::BinaryLibrary,
            Self::Class(r) => r.record_type(),
            Self::String(_) => RecordType::BinaryObjectString,
            Self::Array(r) => r.record_type(),
            Self::Primitive(r) => r.record_type,
        }
    }

    /// Short human-readable kind name
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Library(_) => "library",
            Self::Class(_) => "class",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Primitive(_) => "primitive",
        }
    }

    /// Declared type name, for classes and class-typed arrays
    pub fn type_name(&self) -> Option<&TypeName> {
        match self {
            Self::Class(r) => Some(r.type_name()),
            Self::Array(r) => r.element_type().type_name(),
            _ => None,
        }
    }

    /// Class view
    pub fn as_class(&self) -> Option<&ClassRecord> {
        match self {
            Self::Class(r) => Some(r),
            _ => None,
        }
    }

    /// Array view
    pub fn as_array(&self) -> Option<&ArrayRecord> {
        match self {
            Self::Array(r) => Some(r),
            _ => None,
        }
    }

    /// String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(r) => Some(&r.value),
            _ => None,
        }
    }

    /// Boxed primitive value
    pub fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Self::Primitive(r) => Some(&r.value),
            _ => None,
        }
    }

    /// Library view
    pub fn as_library(&self) -> Option<&LibraryRecord> {
        match self {
            Self::Library(r) => Some(r),
            _ => None,
        }
    }

    /// Request for the first slot still waiting for a value, if any
    pub(crate) fn first_slot(&self) -> Option<SlotRequest> {
        match self {
            Self::Class(r) => r.next_slot(),
            Self::Array(r) => r.next_slot(),
            Self::Library(_) | Self::String(_) | Self::Primitive(_) => None,
        }
    }
}

/// What kind of record a member reference must land on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReferenceTarget {
    /// Any non-library record
    Any,
    /// A string record
    String,
    /// An array record
    Array,
    /// A class, boxed primitive or array record
    Class,
}

/// Constraint describing how the next value of an open record is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotRequest {
    /// Record kinds accepted, when the value is framed as a record
    pub(crate) allowed: AllowedRecordTypes,
    /// Bare primitive kind, when the value is read without framing
    pub(crate) primitive: Option<PrimitiveType>,
    /// Expected target of a member reference
    pub(crate) target: ReferenceTarget,
}

impl SlotRequest {
    pub(crate) fn primitive(kind: PrimitiveType) -> Self {
        Self {
            allowed: AllowedRecordTypes::NONE,
            primitive: Some(kind),
            target: ReferenceTarget::Any,
        }
    }

    pub(crate) fn records(allowed: AllowedRecordTypes, target: ReferenceTarget) -> Self {
        Self {
            allowed,
            primitive: None,
            target,
        }
    }
}

/// A decoded value handed to the record waiting for it
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SlotValue {
    /// One value
    Value(RecordValue),
    /// A run of nulls
    Nulls(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_tags() {
        assert_eq!(RecordType::from_tag(0), Some(RecordType::SerializedStreamHeader));
        assert_eq!(RecordType::from_tag(17), Some(RecordType::ArraySingleString));
        assert_eq!(RecordType::from_tag(18), None);
        assert_eq!(RecordType::from_tag(21), Some(RecordType::MethodCall));
        assert_eq!(RecordType::from_tag(0xFF), None);
    }

    #[test]
    fn test_unsupported_kinds() {
        let unsupported: Vec<_> = (0..=22u8)
            .filter_map(RecordType::from_tag)
            .filter(RecordType::is_unsupported)
            .collect();
        assert_eq!(
            unsupported,
            vec![
                RecordType::SystemClassWithMembers,
                RecordType::ClassWithMembers,
                RecordType::MethodCall,
                RecordType::MethodReturn,
            ]
        );
    }

    #[test]
    fn test_allowed_sets() {
        let top = AllowedRecordTypes::TOP_LEVEL;
        assert!(top.contains(RecordType::MessageEnd));
        assert!(top.contains(RecordType::BinaryLibrary));
        assert!(top.contains(RecordType::ArraySingleString));
        assert!(!top.contains(RecordType::MemberReference));
        assert!(!top.contains(RecordType::ObjectNull));
        assert!(!top.contains(RecordType::SystemClassWithMembers));
        assert!(AllowedRecordTypes::NULLS.contains(RecordType::ObjectNullMultiple256));
        assert!(!AllowedRecordTypes::NONE.contains(RecordType::SerializedStreamHeader));
    }
}
