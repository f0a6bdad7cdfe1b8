//! Payload decoding.
//!
//! ## Overview
//!
//! A payload is a header, a flat sequence of records and an end marker. Records
//! nest logically (a class member may be an array whose elements are classes)
//! but the decoder never recurses: every open record contributes at most one
//! [`PendingSlot`] to an explicit work stack, so the stack tracks structural
//! nesting and nothing else. Huge flat arrays and null runs keep it at a small
//! constant depth.
//!
//! ## Process
//!
//! 1. Read and validate the header.
//! 2. Pop the pending slot on top of the stack (or read a top-level record when
//!    the stack is empty) and read the value that fills it.
//! 3. Hand the value to the parent record; if the parent still expects
//!    values, push its continuation, then push the first slot of the value if
//!    it opened a new record.
//! 4. At the end marker, check member references and resolve the root.

mod config;
mod dispatch;

pub use config::{DecodeOptions, TypeMap, TypeResolver};

use crate::error::{Error, Result};
use crate::reader::BinaryReader;
use crate::record::{
    AllowedRecordTypes, ClassMetadata, ClassRecord, HeaderRecord, PrimitiveRecord, PrimitiveValue,
    RecordId, RecordValue, ReferenceTarget, SerializationRecord, SlotRequest, SlotValue,
};
use crate::record_map::RecordMap;
use dispatch::Decoded;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Bytes inspected by the header sniffing functions
const HEADER_SNIFF_LEN: usize = 17;

/// Statistics gathered while decoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Records read, including the header, libraries, nulls and references
    pub records: usize,
    /// Deepest the work stack grew
    pub max_stack_depth: usize,
}

/// A slot of an open record waiting for its value
#[derive(Debug, Clone, Copy)]
struct PendingSlot {
    /// Arena position of the record owning the slot
    parent: usize,
    request: SlotRequest,
}

/// A member reference awaiting validation
#[derive(Debug, Clone, Copy)]
struct PendingReference {
    id: RecordId,
    target: ReferenceTarget,
    offset: u64,
}

/// Decode session state; one per payload
pub(crate) struct Decoder<'a, R> {
    reader: BinaryReader<R>,
    options: &'a DecodeOptions,
    records: RecordMap,
    metadata: HashMap<RecordId, Arc<ClassMetadata>>,
    references: Vec<PendingReference>,
    stats: DecodeStats,
}

impl<'a, R: Read> Decoder<'a, R> {
    fn new(reader: R, options: &'a DecodeOptions) -> Self {
        Self {
            reader: BinaryReader::new(reader),
            options,
            records: RecordMap::new(),
            metadata: HashMap::new(),
            references: Vec::new(),
            stats: DecodeStats::default(),
        }
    }

    fn run(mut self) -> Result<Payload> {
        let header = self.read_header()?;
        debug!("Decoding payload with root {}", header.root_id);

        let mut stack: Vec<PendingSlot> = Vec::new();
        loop {
            let Some(slot) = stack.pop() else {
                match self.read_record(AllowedRecordTypes::TOP_LEVEL)? {
                    Decoded::End => break,
                    Decoded::Record(position) => {
                        self.open(position, &mut stack);
                        continue;
                    }
                    other => {
                        return Err(Error::format_violation(
                            self.reader.offset(),
                            format!("unexpected top-level value {other:?}"),
                        ))
                    }
                }
            };

            let offset = self.reader.offset();
            let mut opened = None;
            let value = match slot.request.primitive {
                Some(kind) => {
                    SlotValue::Value(RecordValue::Primitive(PrimitiveValue::read(&mut self.reader, kind)?))
                }
                None => match self.read_record(slot.request.allowed)? {
                    Decoded::End => {
                        return Err(Error::format_violation(offset, "end of payload inside an open record"))
                    }
                    Decoded::Nulls(count) => SlotValue::Nulls(count),
                    Decoded::Primitive(value) => SlotValue::Value(RecordValue::Primitive(value)),
                    Decoded::Reference(id) => {
                        self.references.push(PendingReference {
                            id,
                            target: slot.request.target,
                            offset,
                        });
                        SlotValue::Value(RecordValue::Record(id))
                    }
                    Decoded::Record(position) => {
                        opened = Some(position);
                        SlotValue::Value(RecordValue::Record(self.records.at(position).id()))
                    }
                },
            };

            let next = match self.records.at_mut(slot.parent) {
                SerializationRecord::Class(class) => class.handle_next(value, offset)?,
                SerializationRecord::Array(array) => array.handle_next(value, offset)?,
                other => {
                    return Err(Error::format_violation(
                        offset,
                        format!("{} record {} takes no values", other.kind_name(), other.id()),
                    ))
                }
            };
            match next {
                Some(request) => self.push(&mut stack, PendingSlot { parent: slot.parent, request }),
                None => self.close(slot.parent),
            }

            if let Some(position) = opened {
                self.open(position, &mut stack);
            }
        }

        self.check_references()?;

        let root = self
            .records
            .index_of(header.root_id)
            .ok_or(Error::MissingRoot {
                root_id: header.root_id.0,
            })?;
        if let SerializationRecord::Library(_) = self.records.at(root) {
            return Err(Error::format_violation(
                self.reader.offset(),
                format!("root {} is a library", header.root_id),
            ));
        }

        debug!(
            "Decoded {} records ({} in map), max stack depth {}",
            self.stats.records,
            self.records.len(),
            self.stats.max_stack_depth
        );

        Ok(Payload {
            header,
            records: self.records,
            root,
            stats: self.stats,
        })
    }

    fn push(&mut self, stack: &mut Vec<PendingSlot>, slot: PendingSlot) {
        stack.push(slot);
        self.stats.max_stack_depth = self.stats.max_stack_depth.max(stack.len());
    }

    /// Queue the first slot of a freshly registered record
    fn open(&mut self, position: usize, stack: &mut Vec<PendingSlot>) {
        match self.records.at(position).first_slot() {
            Some(request) => self.push(stack, PendingSlot { parent: position, request }),
            None => self.close(position),
        }
    }

    /// Record at `position` has all its values
    fn close(&mut self, position: usize) {
        let SerializationRecord::Class(class) = self.records.at(position) else {
            return;
        };
        let Some(value) = class.boxed_primitive() else {
            return;
        };
        debug!("Class {} is a boxed {:?}", class.id(), value.primitive_type());
        let boxed = SerializationRecord::Primitive(PrimitiveRecord {
            id: class.id(),
            record_type: class.record_type(),
            value,
        });
        *self.records.at_mut(position) = boxed;
    }

    fn check_references(&self) -> Result<()> {
        for reference in &self.references {
            let record = self.records.get(reference.id).ok_or_else(|| {
                Error::format_violation(
                    reference.offset,
                    format!("reference to undefined record {}", reference.id),
                )
            })?;

            let matches = match (reference.target, record) {
                (_, SerializationRecord::Library(_)) => false,
                (ReferenceTarget::Any, _) => true,
                (ReferenceTarget::String, SerializationRecord::String(_)) => true,
                (ReferenceTarget::Array, SerializationRecord::Array(_)) => true,
                (
                    ReferenceTarget::Class,
                    SerializationRecord::Class(_)
                    | SerializationRecord::Primitive(_)
                    | SerializationRecord::Array(_),
                ) => true,
                _ => false,
            };
            if !matches {
                return Err(Error::format_violation(
                    reference.offset,
                    format!(
                        "reference to {} {} does not fit a {:?} slot",
                        record.kind_name(),
                        reference.id,
                        reference.target
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// A fully decoded payload
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    header: HeaderRecord,
    records: RecordMap,
    root: usize,
    stats: DecodeStats,
}

impl Payload {
    /// The root record
    pub fn root(&self) -> &SerializationRecord {
        self.records.at(self.root)
    }

    /// Every decoded record
    pub fn records(&self) -> &RecordMap {
        &self.records
    }

    /// The stream header
    pub fn header(&self) -> &HeaderRecord {
        &self.header
    }

    /// Decode statistics
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Look up a record by identity
    pub fn get(&self, id: RecordId) -> Option<&SerializationRecord> {
        self.records.get(id)
    }

    /// Record a slot value points at, if it is a reference
    pub fn resolve(&self, value: &RecordValue) -> Option<&SerializationRecord> {
        self.records.resolve(value)
    }

    /// Consume the payload, keeping only its records
    pub fn into_records(self) -> RecordMap {
        self.records
    }
}

/// A payload whose root is known to be a class record
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPayload {
    payload: Payload,
}

impl ClassPayload {
    /// The root class
    pub fn root(&self) -> &ClassRecord {
        self.payload
            .root()
            .as_class()
            .expect("root kind checked on construction")
    }

    /// The underlying payload
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consume into the underlying payload
    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

/// Decode a payload from a reader
pub fn decode<R: Read>(reader: R, options: &DecodeOptions) -> Result<Payload> {
    Decoder::new(reader, options).run()
}

/// Decode a payload whose root must be a class record
pub fn decode_class<R: Read>(reader: R, options: &DecodeOptions) -> Result<ClassPayload> {
    let payload = decode(reader, options)?;
    match payload.root() {
        SerializationRecord::Class(_) => Ok(ClassPayload { payload }),
        other => Err(Error::UnexpectedRootKind {
            expected: "class",
            found: other.kind_name(),
        }),
    }
}

/// Decode a payload from a file
pub fn decode_file<P: AsRef<Path>>(path: P, options: &DecodeOptions) -> Result<Payload> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
    decode(BufReader::new(file), options)
}

/// Returns true if `data` begins with a version 1.0 stream header
pub fn starts_with_payload_header(data: &[u8]) -> bool {
    data.len() >= HEADER_SNIFF_LEN && data[0] == 0 && data[9..HEADER_SNIFF_LEN] == [1, 0, 0, 0, 0, 0, 0, 0]
}

/// Returns true if the stream begins with a version 1.0 stream header.
///
/// The stream position is restored whatever the outcome.
pub fn stream_starts_with_payload_header<S: Read + Seek>(stream: &mut S) -> Result<bool> {
    let start = stream.stream_position()?;

    let mut buf = [0u8; HEADER_SNIFF_LEN];
    let mut filled = 0;
    let read = loop {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break Ok(()),
            Ok(n) => {
                filled += n;
                if filled == buf.len() {
                    break Ok(());
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => break Err(e),
        }
    };

    stream.seek(SeekFrom::Start(start))?;
    read?;
    Ok(starts_with_payload_header(&buf[..filled]))
}
