//! Reading single records off the stream.

use super::Decoder;
use crate::error::{Error, Result};
use crate::record::{
    decode_array_single, decode_binary_array, decode_class_metadata, read_record_id,
    AllowedRecordTypes, ClassKind, ClassRecord, HeaderRecord, LibraryRecord, PrimitiveType,
    PrimitiveValue, RecordId, RecordType, SerializationRecord, StringRecord,
};
use std::io::Read;
use std::sync::Arc;
use tracing::trace;

/// Outcome of reading one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Decoded {
    /// `MessageEnd`
    End,
    /// An identity-bearing record, registered at this arena position
    Record(usize),
    /// `MemberPrimitiveTyped`
    Primitive(PrimitiveValue),
    /// `MemberReference`
    Reference(RecordId),
    /// `ObjectNull` or a null run
    Nulls(u32),
}

impl<R: Read> Decoder<'_, R> {
    /// Read and validate the stream header
    pub(super) fn read_header(&mut self) -> Result<HeaderRecord> {
        let offset = self.reader.offset();
        let tag = self.reader.read_u8()?;
        if tag != RecordType::SerializedStreamHeader as u8 {
            return Err(Error::format_violation(
                offset,
                format!("expected stream header, found record tag {tag}"),
            ));
        }

        let header = HeaderRecord {
            root_id: RecordId(self.reader.read_i32()?),
            header_id: self.reader.read_i32()?,
            major_version: self.reader.read_i32()?,
            minor_version: self.reader.read_i32()?,
        };
        if header.major_version != 1 || header.minor_version != 0 {
            return Err(Error::format_violation(
                offset,
                format!(
                    "unsupported format version {}.{}",
                    header.major_version, header.minor_version
                ),
            ));
        }

        self.stats.records += 1;
        Ok(header)
    }

    /// Read the next record that is not a library declaration.
    ///
    /// Libraries are registered and skipped whenever `allowed` admits them.
    pub(super) fn read_record(&mut self, allowed: AllowedRecordTypes) -> Result<Decoded> {
        loop {
            let offset = self.reader.offset();
            let tag = self.reader.read_u8()?;
            let record_type = RecordType::from_tag(tag).ok_or_else(|| {
                Error::format_violation(offset, format!("unknown record tag {tag}"))
            })?;

            if !allowed.contains(record_type) {
                if record_type.is_unsupported() {
                    return Err(Error::UnsupportedRecord { offset, record_type });
                }
                return Err(Error::format_violation(
                    offset,
                    format!("{record_type:?} record is not allowed here"),
                ));
            }

            self.stats.records += 1;
            trace!("{:?} at offset {}", record_type, offset);

            let record = match record_type {
                RecordType::MessageEnd => return Ok(Decoded::End),
                RecordType::ObjectNull => return Ok(Decoded::Nulls(1)),
                RecordType::ObjectNullMultiple256 => {
                    let count = self.reader.read_u8()?;
                    if count == 0 {
                        return Err(Error::invalid_value(offset, "empty null run"));
                    }
                    return Ok(Decoded::Nulls(u32::from(count)));
                }
                RecordType::ObjectNullMultiple => {
                    let count = self.reader.read_i32()?;
                    let count = u32::try_from(count)
                        .ok()
                        .filter(|count| *count > 0)
                        .ok_or_else(|| Error::invalid_value(offset, format!("invalid null run of {count}")))?;
                    return Ok(Decoded::Nulls(count));
                }
                RecordType::MemberReference => {
                    return Ok(Decoded::Reference(read_record_id(&mut self.reader)?));
                }
                RecordType::MemberPrimitiveTyped => {
                    let kind = PrimitiveType::read(&mut self.reader)?;
                    return Ok(Decoded::Primitive(PrimitiveValue::read(&mut self.reader, kind)?));
                }
                RecordType::BinaryLibrary => {
                    let id = read_record_id(&mut self.reader)?;
                    let name = self.reader.read_string()?;
                    trace!("library {} '{}'", id, name);
                    self.records
                        .insert(SerializationRecord::Library(LibraryRecord { id, name }), offset)?;
                    continue;
                }
                RecordType::BinaryObjectString => {
                    let id = read_record_id(&mut self.reader)?;
                    let value = self.reader.read_string()?;
                    SerializationRecord::String(StringRecord { id, value })
                }
                RecordType::ClassWithId => {
                    let id = read_record_id(&mut self.reader)?;
                    let metadata_offset = self.reader.offset();
                    let metadata_id = RecordId(self.reader.read_i32()?);
                    let metadata = self.metadata.get(&metadata_id).ok_or_else(|| {
                        Error::format_violation(
                            metadata_offset,
                            format!("class {id} reuses metadata of unknown class {metadata_id}"),
                        )
                    })?;
                    SerializationRecord::Class(ClassRecord::new(id, record_type, Arc::clone(metadata)))
                }
                RecordType::SystemClassWithMembersAndTypes | RecordType::ClassWithMembersAndTypes => {
                    let kind = if record_type == RecordType::ClassWithMembersAndTypes {
                        ClassKind::User
                    } else {
                        ClassKind::System
                    };
                    let (id, metadata) =
                        decode_class_metadata(&mut self.reader, kind, self.options, &self.records)?;
                    let metadata = Arc::new(metadata);
                    self.metadata.insert(id, Arc::clone(&metadata));
                    SerializationRecord::Class(ClassRecord::new(id, record_type, metadata))
                }
                RecordType::BinaryArray => SerializationRecord::Array(decode_binary_array(
                    &mut self.reader,
                    self.options,
                    &self.records,
                )?),
                RecordType::ArraySinglePrimitive
                | RecordType::ArraySingleObject
                | RecordType::ArraySingleString => {
                    SerializationRecord::Array(decode_array_single(&mut self.reader, record_type)?)
                }
                RecordType::SystemClassWithMembers
                | RecordType::ClassWithMembers
                | RecordType::MethodCall
                | RecordType::MethodReturn => {
                    return Err(Error::UnsupportedRecord { offset, record_type });
                }
                RecordType::SerializedStreamHeader => {
                    return Err(Error::format_violation(offset, "stream header repeated"));
                }
            };

            return self.records.insert(record, offset).map(Decoded::Record);
        }
    }
}
