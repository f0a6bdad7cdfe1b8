//! Array records.
//!
//! ## Shapes
//!
//! - Single: one dimension, zero-based
//! - Rectangular: 2 to 32 dimensions, elements stored in row-major order
//! - Jagged: one dimension whose elements are themselves arrays
//!
//! Element counts are validated with widened arithmetic against
//! [`MAX_ARRAY_LENGTH`] before any storage is reserved. Primitive elements are
//! read as one packed vector; every other element kind is pulled slot by slot
//! by the decoder's work loop.

use super::member_type::decode_member_type;
use super::primitive::{PrimitiveType, PrimitiveVec};
use super::{
    read_record_id, MemberType, RecordId, RecordType, RecordValue, SlotContext, SlotRequest,
    SlotValue,
};
use crate::decoder::DecodeOptions;
use crate::error::{Error, Result};
use crate::reader::BinaryReader;
use crate::record_map::RecordMap;
use crate::type_name::MAX_ARRAY_RANK;
use std::io::Read;
use tracing::trace;

/// Largest number of elements an array may declare
pub const MAX_ARRAY_LENGTH: u64 = 2_147_483_591;

/// Array kind discriminator of a `BinaryArray` record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinaryArrayType {
    /// One dimension
    Single = 0,
    /// Array of arrays
    Jagged = 1,
    /// Multiple dimensions
    Rectangular = 2,
    /// One dimension with lower bounds
    SingleOffset = 3,
    /// Array of arrays with lower bounds
    JaggedOffset = 4,
    /// Multiple dimensions with lower bounds
    RectangularOffset = 5,
}

impl BinaryArrayType {
    /// Maps a wire discriminator to an array kind
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Single,
            1 => Self::Jagged,
            2 => Self::Rectangular,
            3 => Self::SingleOffset,
            4 => Self::JaggedOffset,
            5 => Self::RectangularOffset,
            _ => return None,
        })
    }

    /// Returns true if the kind carries per-dimension lower bounds
    pub fn has_lower_bounds(&self) -> bool {
        matches!(self, Self::SingleOffset | Self::JaggedOffset | Self::RectangularOffset)
    }

    fn is_rectangular(&self) -> bool {
        matches!(self, Self::Rectangular | Self::RectangularOffset)
    }

    fn is_jagged(&self) -> bool {
        matches!(self, Self::Jagged | Self::JaggedOffset)
    }
}

/// Logical shape of a decoded array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayShape {
    /// One zero-based dimension
    Single,
    /// Two or more dimensions
    Rectangular,
    /// One dimension of arrays
    Jagged,
}

/// A stretch of elements in a record-valued array
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementRun {
    /// One non-null element
    Value(RecordValue),
    /// Consecutive nulls
    Nulls(u32),
}

#[derive(Debug, Clone, PartialEq)]
enum ArrayData {
    Primitive(PrimitiveVec),
    Slots {
        runs: Vec<ElementRun>,
        remaining: usize,
    },
}

/// An array of any shape
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayRecord {
    id: RecordId,
    record_type: RecordType,
    shape: ArrayShape,
    lengths: Vec<usize>,
    element_type: MemberType,
    data: ArrayData,
}

impl ArrayRecord {
    fn new<R: Read>(
        reader: &mut BinaryReader<R>,
        id: RecordId,
        record_type: RecordType,
        shape: ArrayShape,
        lengths: Vec<usize>,
        element_type: MemberType,
    ) -> Result<Self> {
        let total = lengths.iter().product::<usize>();
        let data = match element_type {
            MemberType::Primitive(kind) => ArrayData::Primitive(PrimitiveVec::read(reader, kind, total)?),
            _ => ArrayData::Slots {
                runs: Vec::new(),
                remaining: total,
            },
        };
        Ok(Self {
            id,
            record_type,
            shape,
            lengths,
            element_type,
            data,
        })
    }

    /// Identity of the array
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Wire kind the array is equivalent to
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Logical shape
    pub fn shape(&self) -> ArrayShape {
        self.shape
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.lengths.len()
    }

    /// Length of each dimension
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.lengths.iter().product()
    }

    /// Returns true if the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Declared element type
    pub fn element_type(&self) -> &MemberType {
        &self.element_type
    }

    /// Packed values, for primitive arrays
    pub fn primitive_values(&self) -> Option<&PrimitiveVec> {
        match &self.data {
            ArrayData::Primitive(values) => Some(values),
            ArrayData::Slots { .. } => None,
        }
    }

    /// Element runs with nulls kept compressed, for record-valued arrays
    pub fn runs(&self) -> &[ElementRun] {
        match &self.data {
            ArrayData::Primitive(_) => &[],
            ArrayData::Slots { runs, .. } => runs,
        }
    }

    /// Every element in storage order, null runs expanded
    pub fn elements(&self) -> Elements<'_> {
        Elements {
            array: self,
            index: 0,
            run: 0,
            nulls_left: 0,
        }
    }

    /// Returns true once every element has a value
    pub fn is_complete(&self) -> bool {
        match &self.data {
            ArrayData::Primitive(_) => true,
            ArrayData::Slots { remaining, .. } => *remaining == 0,
        }
    }

    pub(crate) fn next_slot(&self) -> Option<SlotRequest> {
        match &self.data {
            ArrayData::Slots { remaining, .. } if *remaining > 0 => {
                Some(self.element_type.slot_request(SlotContext::Element))
            }
            _ => None,
        }
    }

    /// Fill the next element (or run of elements) and report how the next one is encoded
    pub(crate) fn handle_next(&mut self, value: SlotValue, offset: u64) -> Result<Option<SlotRequest>> {
        let id = self.id;
        let ArrayData::Slots { runs, remaining } = &mut self.data else {
            return Err(Error::format_violation(offset, format!("primitive array {id} takes no records")));
        };

        let nulls = match value {
            SlotValue::Value(RecordValue::Null) => 1,
            SlotValue::Nulls(count) => count,
            SlotValue::Value(value) => {
                if *remaining == 0 {
                    return Err(Error::format_violation(offset, format!("array {id} is already complete")));
                }
                runs.push(ElementRun::Value(value));
                *remaining -= 1;
                return Ok(self.next_slot());
            }
        };

        if nulls as usize > *remaining {
            return Err(Error::format_violation(
                offset,
                format!("null run of {nulls} exceeds the {remaining} elements array {id} still expects"),
            ));
        }
        match runs.last_mut() {
            Some(ElementRun::Nulls(run)) => *run += nulls,
            _ => runs.push(ElementRun::Nulls(nulls)),
        }
        *remaining -= nulls as usize;
        Ok(self.next_slot())
    }
}

/// Iterator over the elements of an [`ArrayRecord`]
#[derive(Debug, Clone)]
pub struct Elements<'a> {
    array: &'a ArrayRecord,
    index: usize,
    run: usize,
    nulls_left: u32,
}

impl Iterator for Elements<'_> {
    type Item = RecordValue;

    fn next(&mut self) -> Option<RecordValue> {
        match &self.array.data {
            ArrayData::Primitive(values) => {
                let value = values.get(self.index)?;
                self.index += 1;
                Some(RecordValue::Primitive(value))
            }
            ArrayData::Slots { runs, .. } => loop {
                if self.nulls_left > 0 {
                    self.nulls_left -= 1;
                    return Some(RecordValue::Null);
                }
                let run = runs.get(self.run)?;
                self.run += 1;
                match run {
                    ElementRun::Value(value) => return Some(*value),
                    ElementRun::Nulls(count) => self.nulls_left = *count,
                }
            },
        }
    }
}

/// Read one dimension length or element count
fn read_length<R: Read>(reader: &mut BinaryReader<R>) -> Result<u64> {
    let offset = reader.offset();
    let length = reader.read_i32()?;
    let length = u64::try_from(length)
        .map_err(|_| Error::invalid_value(offset, format!("negative array length {length}")))?;
    if length > MAX_ARRAY_LENGTH {
        return Err(Error::ArrayTooLarge {
            elements: length,
            max: MAX_ARRAY_LENGTH,
        });
    }
    Ok(length)
}

/// Decode an `ArraySinglePrimitive`, `ArraySingleObject` or `ArraySingleString` body
pub(crate) fn decode_array_single<R: Read>(
    reader: &mut BinaryReader<R>,
    record_type: RecordType,
) -> Result<ArrayRecord> {
    let id = read_record_id(reader)?;
    let length = read_length(reader)? as usize;

    let element_type = match record_type {
        RecordType::ArraySinglePrimitive => MemberType::Primitive(PrimitiveType::read(reader)?),
        RecordType::ArraySingleObject => MemberType::Object,
        RecordType::ArraySingleString => MemberType::String,
        other => {
            return Err(Error::format_violation(
                reader.offset(),
                format!("{other:?} is not a single-dimension array record"),
            ))
        }
    };

    ArrayRecord::new(reader, id, record_type, ArrayShape::Single, vec![length], element_type)
}

/// Decode a `BinaryArray` body.
///
/// The same tag encodes single, jagged and rectangular arrays; the logical
/// shape is chosen from the declared kind and the element type:
///
/// | kind        | element                      | shape       |
/// |-------------|------------------------------|-------------|
/// | Single      | array type                   | Jagged      |
/// | Single      | anything else                | Single      |
/// | Jagged      | array type or `Object`       | Jagged      |
/// | Jagged      | anything else                | rejected    |
/// | Rectangular | anything                     | Rectangular |
///
/// Single arrays of primitives, objects and strings are reported with the
/// record type of their dedicated single-array record.
pub(crate) fn decode_binary_array<R: Read>(
    reader: &mut BinaryReader<R>,
    options: &DecodeOptions,
    records: &RecordMap,
) -> Result<ArrayRecord> {
    let id = read_record_id(reader)?;

    let kind_offset = reader.offset();
    let kind_tag = reader.read_u8()?;
    let array_type = BinaryArrayType::from_tag(kind_tag)
        .ok_or_else(|| Error::invalid_value(kind_offset, format!("invalid array kind {kind_tag}")))?;

    let rank_offset = reader.offset();
    let rank = reader.read_i32()?;
    if !(1..=MAX_ARRAY_RANK as i32).contains(&rank) {
        return Err(Error::invalid_value(
            rank_offset,
            format!("array rank {rank} outside 1..={MAX_ARRAY_RANK}"),
        ));
    }
    if array_type.is_rectangular() != (rank > 1) {
        return Err(Error::format_violation(
            rank_offset,
            format!("{array_type:?} array cannot have rank {rank}"),
        ));
    }

    let mut lengths = Vec::with_capacity(rank as usize);
    let mut total: u64 = 1;
    for _ in 0..rank {
        let length = read_length(reader)?;
        total = total.saturating_mul(length);
        if total > MAX_ARRAY_LENGTH {
            return Err(Error::ArrayTooLarge {
                elements: total,
                max: MAX_ARRAY_LENGTH,
            });
        }
        lengths.push(length as usize);
    }

    if array_type.has_lower_bounds() {
        for _ in 0..rank {
            let offset = reader.offset();
            let bound = reader.read_i32()?;
            if bound != 0 {
                return Err(Error::format_violation(
                    offset,
                    format!("array {id} declares unsupported lower bound {bound}"),
                ));
            }
        }
    }

    let element_offset = reader.offset();
    let element_type = decode_member_type(reader, options, records)?;

    let shape = if array_type.is_rectangular() {
        ArrayShape::Rectangular
    } else if element_type.is_array() {
        ArrayShape::Jagged
    } else if !array_type.is_jagged() {
        ArrayShape::Single
    } else if element_type == MemberType::Object {
        ArrayShape::Jagged
    } else {
        return Err(Error::format_violation(
            element_offset,
            format!("jagged array {id} has non-array element type {:?}", element_type.binary_type()),
        ));
    };

    let record_type = match (shape, &element_type) {
        (ArrayShape::Single, MemberType::Primitive(_)) => RecordType::ArraySinglePrimitive,
        (ArrayShape::Single, MemberType::Object) => RecordType::ArraySingleObject,
        (ArrayShape::Single, MemberType::String) => RecordType::ArraySingleString,
        _ => RecordType::BinaryArray,
    };

    trace!(
        "array {} kind={:?} shape={:?} lengths={:?} total={}",
        id,
        array_type,
        shape,
        lengths,
        total
    );

    ArrayRecord::new(reader, id, record_type, shape, lengths, element_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PrimitiveValue;
    use pretty_assertions::assert_eq;

    fn binary_array(kind: u8, lengths: &[i32], tail: &[u8]) -> Vec<u8> {
        let mut data = 1i32.to_le_bytes().to_vec();
        data.push(kind);
        data.extend_from_slice(&(lengths.len() as i32).to_le_bytes());
        for length in lengths {
            data.extend_from_slice(&length.to_le_bytes());
        }
        data.extend_from_slice(tail);
        data
    }

    fn decode(data: &[u8]) -> Result<ArrayRecord> {
        decode_binary_array(
            &mut BinaryReader::new(data),
            &DecodeOptions::default(),
            &RecordMap::new(),
        )
    }

    #[test]
    fn test_rank_bounds() {
        for rank in [0i32, 33, -1] {
            let mut data = 1i32.to_le_bytes().to_vec();
            data.push(2);
            data.extend_from_slice(&rank.to_le_bytes());
            assert!(matches!(decode(&data), Err(Error::InvalidValue { .. })), "rank {rank}");
        }
    }

    #[test]
    fn test_rank_kind_mismatch() {
        assert!(matches!(
            decode(&binary_array(0, &[2, 2], &[])),
            Err(Error::FormatViolation { .. })
        ));
        assert!(matches!(
            decode(&binary_array(2, &[2], &[])),
            Err(Error::FormatViolation { .. })
        ));
        assert!(matches!(
            decode(&binary_array(1, &[2, 2], &[])),
            Err(Error::FormatViolation { .. })
        ));
    }

    #[test]
    fn test_overflowing_dimensions() {
        // Lengths are rejected before any element type is read
        let data = binary_array(2, &[2, 2_000_000_000, 2_000_000_000], &[]);
        assert!(matches!(
            decode(&data),
            Err(Error::ArrayTooLarge { elements: 4_000_000_000, .. })
        ));
    }

    #[test]
    fn test_negative_length() {
        assert!(matches!(
            decode(&binary_array(0, &[-1], &[])),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_nonzero_lower_bound() {
        let mut tail = 1i32.to_le_bytes().to_vec();
        tail.push(2);
        assert!(matches!(
            decode(&binary_array(3, &[4], &tail)),
            Err(Error::FormatViolation { .. })
        ));

        let mut tail = 0i32.to_le_bytes().to_vec();
        tail.extend_from_slice(&[0, 8]);
        tail.extend_from_slice(&[0u8; 16]);
        let array = decode(&binary_array(3, &[4], &tail)).unwrap();
        assert_eq!(array.record_type(), RecordType::ArraySinglePrimitive);
    }

    #[test]
    fn test_rectangular_primitive_fast_path() {
        let mut tail = vec![0u8, 9];
        for v in 0..6i64 {
            tail.extend_from_slice(&v.to_le_bytes());
        }
        let array = decode(&binary_array(2, &[2, 3], &tail)).unwrap();
        assert_eq!(array.shape(), ArrayShape::Rectangular);
        assert_eq!(array.lengths(), &[2, 3]);
        assert_eq!(array.len(), 6);
        assert!(array.is_complete());
        assert_eq!(array.next_slot(), None);
        assert_eq!(
            array.elements().nth(4),
            Some(RecordValue::Primitive(PrimitiveValue::Int64(4)))
        );
    }

    #[test]
    fn test_jagged_requires_array_elements() {
        assert!(matches!(
            decode(&binary_array(1, &[2], &[1])),
            Err(Error::FormatViolation { .. })
        ));
        assert_eq!(
            decode(&binary_array(1, &[2], &[7, 8])).unwrap().shape(),
            ArrayShape::Jagged
        );
        assert_eq!(
            decode(&binary_array(1, &[2], &[2])).unwrap().shape(),
            ArrayShape::Jagged
        );
        // Older writers tag arrays of arrays as single
        assert_eq!(
            decode(&binary_array(0, &[2], &[5])).unwrap().shape(),
            ArrayShape::Jagged
        );
    }

    #[test]
    fn test_null_run_accounting() {
        let mut array = decode(&binary_array(0, &[5], &[2])).unwrap();
        assert_eq!(array.record_type(), RecordType::ArraySingleObject);

        assert!(matches!(
            array.handle_next(SlotValue::Nulls(6), 0),
            Err(Error::FormatViolation { .. })
        ));
        assert!(array.handle_next(SlotValue::Nulls(2), 0).unwrap().is_some());
        array
            .handle_next(SlotValue::Value(RecordValue::Record(RecordId(9))), 0)
            .unwrap();
        assert_eq!(array.handle_next(SlotValue::Nulls(2), 0).unwrap(), None);
        assert!(array.is_complete());

        assert_eq!(
            array.runs(),
            &[
                ElementRun::Nulls(2),
                ElementRun::Value(RecordValue::Record(RecordId(9))),
                ElementRun::Nulls(2),
            ]
        );
        let elements: Vec<_> = array.elements().collect();
        assert_eq!(elements.len(), 5);
        assert_eq!(elements[2], RecordValue::Record(RecordId(9)));
        assert!(elements[4].is_null());
    }

    #[test]
    fn test_consecutive_nulls_merge() {
        let mut array = decode(&binary_array(0, &[4], &[1])).unwrap();
        array.handle_next(SlotValue::Value(RecordValue::Null), 0).unwrap();
        array.handle_next(SlotValue::Nulls(3), 0).unwrap();
        assert_eq!(array.runs(), &[ElementRun::Nulls(4)]);
    }

    #[test]
    fn test_single_primitive_record() {
        let mut data = 3i32.to_le_bytes().to_vec();
        data.extend_from_slice(&2i32.to_le_bytes());
        data.push(1);
        data.extend_from_slice(&[1, 0]);
        let array = decode_array_single(
            &mut BinaryReader::new(data.as_slice()),
            RecordType::ArraySinglePrimitive,
        )
        .unwrap();
        assert_eq!(array.id(), RecordId(3));
        assert_eq!(
            array.primitive_values(),
            Some(&PrimitiveVec::Boolean(vec![true, false]))
        );
    }

    #[test]
    fn test_single_length_too_large() {
        let mut data = 3i32.to_le_bytes().to_vec();
        data.extend_from_slice(&i32::MAX.to_le_bytes());
        assert!(matches!(
            decode_array_single(&mut BinaryReader::new(data.as_slice()), RecordType::ArraySingleObject),
            Err(Error::ArrayTooLarge { .. })
        ));
    }
}
