//! Class records and their shared metadata.

use super::member_type::{decode_member_types, PREALLOCATE_LIMIT};
use super::primitive::{DateTime, PrimitiveType, PrimitiveValue};
use super::{
    read_record_id, MemberType, RecordId, RecordType, RecordValue, SlotContext, SlotRequest,
    SlotValue, SYSTEM_LIBRARY_NAME,
};
use crate::decoder::DecodeOptions;
use crate::error::{Error, Result};
use crate::reader::BinaryReader;
use crate::record_map::RecordMap;
use crate::type_name::TypeName;
use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;

/// Which class-with-types record is being decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClassKind {
    /// `SystemClassWithMembersAndTypes`: implicit system library
    System,
    /// `ClassWithMembersAndTypes`: trailing library id
    User,
}

/// Type name, member names and member types of a class.
///
/// Shared between the record that declared it and every `ClassWithId` record
/// reusing it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetadata {
    type_name: TypeName,
    member_names: Vec<String>,
    member_types: Vec<MemberType>,
    library_id: Option<RecordId>,
    resolved_type: Option<String>,
}

impl ClassMetadata {
    /// Parsed type name, qualified with its assembly
    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    /// Member names in declaration order
    pub fn member_names(&self) -> &[String] {
        &self.member_names
    }

    /// Member types in declaration order
    pub fn member_types(&self) -> &[MemberType] {
        &self.member_types
    }

    /// Declaring library, `None` for system classes
    pub fn library_id(&self) -> Option<RecordId> {
        self.library_id
    }

    /// Identity the configured type resolver assigned to this type
    pub fn resolved_type(&self) -> Option<&str> {
        self.resolved_type.as_deref()
    }
}

/// Decode the body of a class-with-types record up to (not including) its values
pub(crate) fn decode_class_metadata<R: Read>(
    reader: &mut BinaryReader<R>,
    kind: ClassKind,
    options: &DecodeOptions,
    records: &RecordMap,
) -> Result<(RecordId, ClassMetadata)> {
    let id = read_record_id(reader)?;
    let name = reader.read_string()?;

    let count_offset = reader.offset();
    let member_count = reader.read_i32()?;
    let member_count = usize::try_from(member_count).map_err(|_| {
        Error::invalid_value(count_offset, format!("negative member count {member_count}"))
    })?;

    let mut member_names = Vec::with_capacity(member_count.min(PREALLOCATE_LIMIT));
    let mut seen = HashSet::with_capacity(member_count.min(PREALLOCATE_LIMIT));
    for _ in 0..member_count {
        let offset = reader.offset();
        let member = reader.read_string()?;
        if !seen.insert(member.clone()) {
            return Err(Error::format_violation(
                offset,
                format!("class '{name}' declares member '{member}' twice"),
            ));
        }
        member_names.push(member);
    }

    let member_types = decode_member_types(reader, member_count, options, records)?;
    let type_name = TypeName::parse(&name, options.max_type_name_depth)?;

    let (type_name, library_id) = match kind {
        ClassKind::System => (type_name.with_default_assembly(SYSTEM_LIBRARY_NAME), None),
        ClassKind::User => {
            let offset = reader.offset();
            let library_id = RecordId(reader.read_i32()?);
            let library = records.library(library_id).ok_or_else(|| {
                Error::format_violation(offset, format!("class '{name}' names unknown library {library_id}"))
            })?;
            (type_name.with_default_assembly(&library.name), Some(library_id))
        }
    };

    let resolved_type = options
        .type_resolver
        .as_ref()
        .and_then(|resolver| resolver.resolve(&type_name));

    Ok((
        id,
        ClassMetadata {
            type_name,
            member_names,
            member_types,
            library_id,
            resolved_type,
        },
    ))
}

/// A class instance: metadata plus member values filled in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct ClassRecord {
    id: RecordId,
    record_type: RecordType,
    metadata: Arc<ClassMetadata>,
    values: Vec<RecordValue>,
}

impl ClassRecord {
    pub(crate) fn new(id: RecordId, record_type: RecordType, metadata: Arc<ClassMetadata>) -> Self {
        let values = Vec::with_capacity(metadata.member_names.len());
        Self {
            id,
            record_type,
            metadata,
            values,
        }
    }

    /// Identity of the instance
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Wire kind the instance was decoded from
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Shared metadata
    pub fn metadata(&self) -> &Arc<ClassMetadata> {
        &self.metadata
    }

    /// Parsed type name
    pub fn type_name(&self) -> &TypeName {
        &self.metadata.type_name
    }

    /// Declaring library, `None` for system classes
    pub fn library_id(&self) -> Option<RecordId> {
        self.metadata.library_id
    }

    /// Identity the configured type resolver assigned to this type
    pub fn resolved_type(&self) -> Option<&str> {
        self.metadata.resolved_type()
    }

    /// Number of declared members
    pub fn member_count(&self) -> usize {
        self.metadata.member_names.len()
    }

    /// Member names in declaration order
    pub fn member_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.metadata.member_names.iter().map(String::as_str)
    }

    /// Value of the named member
    pub fn value(&self, member: &str) -> Option<&RecordValue> {
        let index = self.metadata.member_names.iter().position(|m| m == member)?;
        self.values.get(index)
    }

    /// Value of the member at `index`
    pub fn value_at(&self, index: usize) -> Option<&RecordValue> {
        self.values.get(index)
    }

    /// Name, declared type and value of each member
    pub fn members(&self) -> impl Iterator<Item = (&str, &MemberType, &RecordValue)> + '_ {
        self.metadata
            .member_names
            .iter()
            .zip(&self.metadata.member_types)
            .zip(&self.values)
            .map(|((name, member_type), value)| (name.as_str(), member_type, value))
    }

    /// Returns true once every member has a value
    pub fn is_complete(&self) -> bool {
        self.values.len() == self.member_count()
    }

    pub(crate) fn next_slot(&self) -> Option<SlotRequest> {
        self.metadata
            .member_types
            .get(self.values.len())
            .map(|member_type| member_type.slot_request(SlotContext::Member))
    }

    /// Fill the next member and report how the one after it is encoded
    pub(crate) fn handle_next(&mut self, value: SlotValue, offset: u64) -> Result<Option<SlotRequest>> {
        if self.is_complete() {
            return Err(Error::format_violation(
                offset,
                format!("class {} received a value after its last member", self.id),
            ));
        }
        let value = match value {
            SlotValue::Value(value) => value,
            SlotValue::Nulls(1) => RecordValue::Null,
            SlotValue::Nulls(count) => {
                return Err(Error::format_violation(
                    offset,
                    format!("null run of {count} inside class {}", self.id),
                ))
            }
        };
        self.values.push(value);
        Ok(self.next_slot())
    }

    /// The wrapped value, if this is a completed boxed primitive.
    ///
    /// Boxed primitives arrive as system classes named after the primitive type
    /// with a single member holding the raw value.
    pub(crate) fn boxed_primitive(&self) -> Option<PrimitiveValue> {
        let type_name = self.type_name();
        if self.library_id().is_some()
            || self.member_count() != 1
            || !self.is_complete()
            || type_name.is_constructed_generic()
            || !type_name.decorators().is_empty()
        {
            return None;
        }

        let (member, member_type, value) = self.members().next()?;
        let MemberType::Primitive(kind) = member_type else {
            return None;
        };
        let value = *value.as_primitive()?;

        match (type_name.name(), member, kind) {
            ("System.DateTime", "dateData", PrimitiveType::UInt64) => match value {
                PrimitiveValue::UInt64(raw) => DateTime::from_raw(raw, 0).ok().map(PrimitiveValue::DateTime),
                _ => None,
            },
            ("System.TimeSpan", "_ticks", PrimitiveType::Int64) => match value {
                PrimitiveValue::Int64(ticks) => Some(PrimitiveValue::TimeSpan(ticks)),
                _ => None,
            },
            (name, "m_value", kind)
                if !matches!(kind, PrimitiveType::DateTime | PrimitiveType::TimeSpan | PrimitiveType::Decimal)
                    && name == kind.system_type_name() =>
            {
                Some(value)
            }
            _ => None,
        }
    }
}
