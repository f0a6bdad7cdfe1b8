//! Declared types of member and element slots.
//!
//! Class and array records declare the type of every slot before any value is
//! decoded: first one binary-type byte per slot, then the additional info each
//! binary type needs, in slot order.

use super::primitive::PrimitiveType;
use super::{AllowedRecordTypes, RecordId, ReferenceTarget, SlotRequest};
use crate::decoder::DecodeOptions;
use crate::error::{Error, Result};
use crate::reader::BinaryReader;
use crate::record_map::RecordMap;
use crate::type_name::TypeName;
use std::io::Read;

/// Upper bound on slots reserved ahead of reading them
pub(crate) const PREALLOCATE_LIMIT: usize = 1024;

/// How a slot's declared type is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinaryType {
    /// Primitive, followed by its kind
    Primitive = 0,
    /// String
    String = 1,
    /// Any object
    Object = 2,
    /// System class, followed by its type name
    SystemClass = 3,
    /// User class, followed by its type name and library id
    Class = 4,
    /// Array of objects
    ObjectArray = 5,
    /// Array of strings
    StringArray = 6,
    /// Array of a primitive kind, followed by the kind
    PrimitiveArray = 7,
}

impl BinaryType {
    /// Maps a wire discriminator to a binary type
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Primitive,
            1 => Self::String,
            2 => Self::Object,
            3 => Self::SystemClass,
            4 => Self::Class,
            5 => Self::ObjectArray,
            6 => Self::StringArray,
            7 => Self::PrimitiveArray,
            _ => return None,
        })
    }

    fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self> {
        let offset = reader.offset();
        let tag = reader.read_u8()?;
        Self::from_tag(tag)
            .ok_or_else(|| Error::invalid_value(offset, format!("invalid binary type {tag}")))
    }
}

/// The fully decoded declared type of a slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberType {
    /// Bare primitive of the given kind
    Primitive(PrimitiveType),
    /// String
    String,
    /// Any object
    Object,
    /// Class from the system library
    SystemClass(TypeName),
    /// Class from a declared library
    Class {
        /// Parsed type name, qualified with the library's name
        type_name: TypeName,
        /// Declaring library
        library_id: RecordId,
    },
    /// Array of objects
    ObjectArray,
    /// Array of strings
    StringArray,
    /// Array of a primitive kind
    PrimitiveArray(PrimitiveType),
}

/// Whether a slot belongs to a class member or an array element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotContext {
    /// Class member: nulls arrive one at a time
    Member,
    /// Array element: null runs are allowed
    Element,
}

impl MemberType {
    /// Binary type tag this member type was encoded with
    pub fn binary_type(&self) -> BinaryType {
        match self {
            Self::Primitive(_) => BinaryType::Primitive,
            Self::String => BinaryType::String,
            Self::Object => BinaryType::Object,
            Self::SystemClass(_) => BinaryType::SystemClass,
            Self::Class { .. } => BinaryType::Class,
            Self::ObjectArray => BinaryType::ObjectArray,
            Self::StringArray => BinaryType::StringArray,
            Self::PrimitiveArray(_) => BinaryType::PrimitiveArray,
        }
    }

    /// Type name, for class-typed slots
    pub fn type_name(&self) -> Option<&TypeName> {
        match self {
            Self::SystemClass(name) | Self::Class { type_name: name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns true if values of this type are themselves arrays
    pub fn is_array(&self) -> bool {
        match self {
            Self::ObjectArray | Self::StringArray | Self::PrimitiveArray(_) => true,
            Self::SystemClass(name) | Self::Class { type_name: name, .. } => name.is_array(),
            Self::Primitive(_) | Self::String | Self::Object => false,
        }
    }

    /// How the next value for a slot of this type is encoded
    pub(crate) fn slot_request(&self, context: SlotContext) -> SlotRequest {
        let nulls = match context {
            SlotContext::Member => AllowedRecordTypes::OBJECT_NULL,
            SlotContext::Element => AllowedRecordTypes::NULLS,
        };
        let base = nulls
            .union(AllowedRecordTypes::MEMBER_REFERENCE)
            .union(AllowedRecordTypes::BINARY_LIBRARY);

        match self {
            Self::Primitive(kind) => SlotRequest::primitive(*kind),
            Self::String => SlotRequest::records(
                base.union(AllowedRecordTypes::BINARY_OBJECT_STRING),
                ReferenceTarget::String,
            ),
            Self::Object => SlotRequest::records(
                base.union(AllowedRecordTypes::ANY_OBJECT)
                    .union(AllowedRecordTypes::MEMBER_PRIMITIVE_TYPED),
                ReferenceTarget::Any,
            ),
            Self::SystemClass(name) | Self::Class { type_name: name, .. } if name.is_array() => {
                SlotRequest::records(base.union(AllowedRecordTypes::ARRAYS), ReferenceTarget::Array)
            }
            // Interface-typed fields hold any value implementing them
            Self::SystemClass(_) => SlotRequest::records(
                base.union(AllowedRecordTypes::ANY_OBJECT)
                    .union(AllowedRecordTypes::MEMBER_PRIMITIVE_TYPED),
                ReferenceTarget::Any,
            ),
            Self::Class { .. } => SlotRequest::records(
                base.union(AllowedRecordTypes::CLASSES)
                    .union(AllowedRecordTypes::ARRAYS),
                ReferenceTarget::Class,
            ),
            Self::ObjectArray => SlotRequest::records(
                base.union(AllowedRecordTypes::ARRAY_SINGLE_OBJECT)
                    .union(AllowedRecordTypes::BINARY_ARRAY),
                ReferenceTarget::Array,
            ),
            Self::StringArray => SlotRequest::records(
                base.union(AllowedRecordTypes::ARRAY_SINGLE_STRING)
                    .union(AllowedRecordTypes::BINARY_ARRAY),
                ReferenceTarget::Array,
            ),
            Self::PrimitiveArray(_) => SlotRequest::records(
                base.union(AllowedRecordTypes::ARRAY_SINGLE_PRIMITIVE)
                    .union(AllowedRecordTypes::BINARY_ARRAY),
                ReferenceTarget::Array,
            ),
        }
    }
}

/// Read the additional info that follows a binary type tag
fn read_additional_info<R: Read>(
    reader: &mut BinaryReader<R>,
    binary_type: BinaryType,
    options: &DecodeOptions,
    records: &RecordMap,
) -> Result<MemberType> {
    Ok(match binary_type {
        BinaryType::Primitive => MemberType::Primitive(PrimitiveType::read(reader)?),
        BinaryType::PrimitiveArray => MemberType::PrimitiveArray(PrimitiveType::read(reader)?),
        BinaryType::String => MemberType::String,
        BinaryType::Object => MemberType::Object,
        BinaryType::ObjectArray => MemberType::ObjectArray,
        BinaryType::StringArray => MemberType::StringArray,
        BinaryType::SystemClass => {
            let name = reader.read_string()?;
            MemberType::SystemClass(
                TypeName::parse(&name, options.max_type_name_depth)?
                    .with_default_assembly(super::SYSTEM_LIBRARY_NAME),
            )
        }
        BinaryType::Class => {
            let name = reader.read_string()?;
            let offset = reader.offset();
            let library_id = RecordId(reader.read_i32()?);
            let library = records.library(library_id).ok_or_else(|| {
                Error::format_violation(offset, format!("class '{name}' names unknown library {library_id}"))
            })?;
            MemberType::Class {
                type_name: TypeName::parse(&name, options.max_type_name_depth)?
                    .with_default_assembly(&library.name),
                library_id,
            }
        }
    })
}

/// Decode `count` member types: all binary type tags, then all additional info
pub(crate) fn decode_member_types<R: Read>(
    reader: &mut BinaryReader<R>,
    count: usize,
    options: &DecodeOptions,
    records: &RecordMap,
) -> Result<Vec<MemberType>> {
    let mut binary_types = Vec::with_capacity(count.min(PREALLOCATE_LIMIT));
    for _ in 0..count {
        binary_types.push(BinaryType::read(reader)?);
    }

    binary_types
        .into_iter()
        .map(|binary_type| read_additional_info(reader, binary_type, options, records))
        .collect()
}

/// Decode the single element type of an array
pub(crate) fn decode_member_type<R: Read>(
    reader: &mut BinaryReader<R>,
    options: &DecodeOptions,
    records: &RecordMap,
) -> Result<MemberType> {
    let binary_type = BinaryType::read(reader)?;
    read_additional_info(reader, binary_type, options, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{LibraryRecord, RecordType, SerializationRecord};
    use pretty_assertions::assert_eq;

    fn records_with_library() -> RecordMap {
        let mut records = RecordMap::new();
        records
            .insert(
                SerializationRecord::Library(LibraryRecord {
                    id: RecordId(2),
                    name: "MyApp, Version=1.0.0.0".to_string(),
                }),
                0,
            )
            .unwrap();
        records
    }

    #[test]
    fn test_decode_member_types_tags_then_info() {
        let mut data = vec![0u8, 1, 3, 4, 7, 2];
        data.push(8); // Primitive: Int32
        data.extend_from_slice(&[0x0D]);
        data.extend_from_slice(b"System.Object");
        data.extend_from_slice(&[0x0A]);
        data.extend_from_slice(b"MyApp.User");
        data.extend_from_slice(&2i32.to_le_bytes());
        data.push(2); // PrimitiveArray: Byte

        let records = records_with_library();
        let types = decode_member_types(
            &mut BinaryReader::new(data.as_slice()),
            6,
            &DecodeOptions::default(),
            &records,
        )
        .unwrap();

        assert_eq!(types[0], MemberType::Primitive(PrimitiveType::Int32));
        assert_eq!(types[1], MemberType::String);
        assert_eq!(
            types[2].type_name().unwrap().assembly_qualified_name(),
            "System.Object, mscorlib"
        );
        assert_eq!(
            types[3].type_name().unwrap().assembly_name(),
            Some("MyApp, Version=1.0.0.0")
        );
        assert_eq!(types[4], MemberType::PrimitiveArray(PrimitiveType::Byte));
        assert_eq!(types[5], MemberType::Object);
    }

    #[test]
    fn test_class_with_unknown_library() {
        let mut data = vec![4u8, 0x01, b'A'];
        data.extend_from_slice(&9i32.to_le_bytes());
        let result = decode_member_type(
            &mut BinaryReader::new(data.as_slice()),
            &DecodeOptions::default(),
            &RecordMap::new(),
        );
        assert!(matches!(result, Err(Error::FormatViolation { .. })));
    }

    #[test]
    fn test_invalid_binary_type_and_primitive() {
        let options = DecodeOptions::default();
        let records = RecordMap::new();
        assert!(matches!(
            decode_member_type(&mut BinaryReader::new(&[8u8][..]), &options, &records),
            Err(Error::InvalidValue { .. })
        ));
        assert!(matches!(
            decode_member_type(&mut BinaryReader::new(&[0u8, 18][..]), &options, &records),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_slot_requests() {
        let string = MemberType::String.slot_request(SlotContext::Member);
        assert!(string.allowed.contains(RecordType::BinaryObjectString));
        assert!(string.allowed.contains(RecordType::ObjectNull));
        assert!(!string.allowed.contains(RecordType::ObjectNullMultiple));
        assert!(!string.allowed.contains(RecordType::ClassWithId));
        assert_eq!(string.target, ReferenceTarget::String);

        let element = MemberType::Object.slot_request(SlotContext::Element);
        assert!(element.allowed.contains(RecordType::ObjectNullMultiple));
        assert!(element.allowed.contains(RecordType::MemberPrimitiveTyped));

        let primitive = MemberType::Primitive(PrimitiveType::Int64).slot_request(SlotContext::Member);
        assert_eq!(primitive.primitive, Some(PrimitiveType::Int64));

        let array_class = MemberType::SystemClass(TypeName::parse("System.Int32[,]", 4).unwrap())
            .slot_request(SlotContext::Member);
        assert!(array_class.allowed.contains(RecordType::BinaryArray));
        assert!(!array_class.allowed.contains(RecordType::ClassWithId));
    }

    #[test]
    fn test_interface_slots_accept_any_value() {
        let system = MemberType::SystemClass(TypeName::parse("System.IComparable", 4).unwrap())
            .slot_request(SlotContext::Member);
        assert!(system.allowed.contains(RecordType::BinaryObjectString));
        assert!(system.allowed.contains(RecordType::MemberPrimitiveTyped));
        assert!(system.allowed.contains(RecordType::ArraySingleObject));
        assert!(system.allowed.contains(RecordType::ClassWithMembersAndTypes));
        assert_eq!(system.target, ReferenceTarget::Any);

        let user = MemberType::Class {
            type_name: TypeName::parse("MyApp.IShape", 4).unwrap(),
            library_id: RecordId(2),
        }
        .slot_request(SlotContext::Element);
        assert!(user.allowed.contains(RecordType::ClassWithId));
        assert!(user.allowed.contains(RecordType::BinaryArray));
        assert!(user.allowed.contains(RecordType::ObjectNullMultiple));
        assert!(!user.allowed.contains(RecordType::BinaryObjectString));
        assert!(!user.allowed.contains(RecordType::MemberPrimitiveTyped));
        assert_eq!(user.target, ReferenceTarget::Class);
    }
}
