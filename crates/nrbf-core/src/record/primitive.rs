//! Primitive kinds and their wire encodings.
//!
//! Primitive values appear in three places: bare member values of classes,
//! `MemberPrimitiveTyped` records, and packed primitive arrays. All three share
//! the per-kind encodings implemented here.

use crate::error::{Error, Result};
use crate::reader::BinaryReader;
use bytes::Bytes;
use std::fmt;
use std::io::Read;

/// Largest tick count a date/time can carry (9999-12-31T23:59:59.9999999)
pub const MAX_DATE_TIME_TICKS: i64 = 3_155_378_975_999_999_999;

/// Bytes decoded per chunk for packed arrays
const CHUNK_BYTES: usize = 64 * 1024;

/// Primitive kinds, tagged by their wire discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveType {
    /// `bool`, one byte
    Boolean = 1,
    /// `u8`
    Byte = 2,
    /// UTF-8 encoded character
    Char = 3,
    /// Decimal transported as its invariant textual form
    Decimal = 5,
    /// IEEE 754 double
    Double = 6,
    /// `i16`
    Int16 = 7,
    /// `i32`
    Int32 = 8,
    /// `i64`
    Int64 = 9,
    /// `i8`
    SByte = 10,
    /// IEEE 754 single
    Single = 11,
    /// Signed 100ns ticks
    TimeSpan = 12,
    /// Ticks plus a two-bit kind
    DateTime = 13,
    /// `u16`
    UInt16 = 14,
    /// `u32`
    UInt32 = 15,
    /// `u64`
    UInt64 = 16,
}

impl PrimitiveType {
    /// Maps a wire discriminator to a primitive kind.
    ///
    /// `Null` (17), `String` (18) and the unused 4 are not value kinds.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => Self::Boolean,
            2 => Self::Byte,
            3 => Self::Char,
            5 => Self::Decimal,
            6 => Self::Double,
            7 => Self::Int16,
            8 => Self::Int32,
            9 => Self::Int64,
            10 => Self::SByte,
            11 => Self::Single,
            12 => Self::TimeSpan,
            13 => Self::DateTime,
            14 => Self::UInt16,
            15 => Self::UInt32,
            16 => Self::UInt64,
            _ => return None,
        })
    }

    /// Read a primitive kind discriminator
    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self> {
        let offset = reader.offset();
        let tag = reader.read_u8()?;
        Self::from_tag(tag)
            .ok_or_else(|| Error::invalid_value(offset, format!("invalid primitive type {tag}")))
    }

    /// Name of the system type boxing this primitive
    pub fn system_type_name(&self) -> &'static str {
        match self {
            Self::Boolean => "System.Boolean",
            Self::Byte => "System.Byte",
            Self::Char => "System.Char",
            Self::Decimal => "System.Decimal",
            Self::Double => "System.Double",
            Self::Int16 => "System.Int16",
            Self::Int32 => "System.Int32",
            Self::Int64 => "System.Int64",
            Self::SByte => "System.SByte",
            Self::Single => "System.Single",
            Self::TimeSpan => "System.TimeSpan",
            Self::DateTime => "System.DateTime",
            Self::UInt16 => "System.UInt16",
            Self::UInt32 => "System.UInt32",
            Self::UInt64 => "System.UInt64",
        }
    }

    /// Fixed encoded width, or `None` for variable-width kinds
    fn fixed_width(&self) -> Option<usize> {
        match self {
            Self::Boolean | Self::Byte | Self::SByte => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Single => Some(4),
            Self::Int64 | Self::UInt64 | Self::Double | Self::TimeSpan | Self::DateTime => Some(8),
            Self::Char | Self::Decimal => None,
        }
    }
}

/// How a [`DateTime`] relates to a time zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateTimeKind {
    /// No zone information
    Unspecified,
    /// Coordinated universal time
    Utc,
    /// Local time of the producer
    Local,
}

/// A date/time as ticks (100ns since 0001-01-01) plus its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateTime {
    /// Tick count
    pub ticks: i64,
    /// Zone interpretation
    pub kind: DateTimeKind,
}

impl DateTime {
    const TICKS_MASK: u64 = 0x3FFF_FFFF_FFFF_FFFF;

    /// Decodes the packed 64-bit form: two kind bits above 62 tick bits
    pub fn from_raw(raw: u64, offset: u64) -> Result<Self> {
        let ticks = (raw & Self::TICKS_MASK) as i64;
        let kind = match raw >> 62 {
            0 => DateTimeKind::Unspecified,
            1 => DateTimeKind::Utc,
            _ => DateTimeKind::Local,
        };

        // Local values carry producer-side offset adjustments in the tick bits
        if kind != DateTimeKind::Local && ticks > MAX_DATE_TIME_TICKS {
            return Err(Error::invalid_value(offset, format!("date/time ticks {ticks} out of range")));
        }

        Ok(Self { ticks, kind })
    }
}

/// A 96-bit scaled decimal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    /// Sign
    pub negative: bool,
    /// Number of digits after the decimal point (0..=28)
    pub scale: u8,
    /// Unscaled magnitude, below 2^96
    pub mantissa: u128,
}

impl Decimal {
    /// Largest representable magnitude
    pub const MAX_MANTISSA: u128 = (1u128 << 96) - 1;
    /// Largest scale
    pub const MAX_SCALE: u8 = 28;

    /// Parses the invariant textual form (`-123.4500`)
    pub fn parse(text: &str, offset: u64) -> Result<Self> {
        let invalid = || Error::invalid_value(offset, format!("invalid decimal '{text}'"));

        let trimmed = text.trim();
        let (negative, digits) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if frac_part.len() > Self::MAX_SCALE as usize {
            return Err(invalid());
        }

        let mut mantissa: u128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            if !b.is_ascii_digit() {
                return Err(invalid());
            }
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add((b - b'0') as u128))
                .filter(|m| *m <= Self::MAX_MANTISSA)
                .ok_or_else(invalid)?;
        }

        Ok(Self {
            negative: negative && mantissa != 0,
            scale: frac_part.len() as u8,
            mantissa,
        })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.to_string();
        let scale = self.scale as usize;
        if self.negative {
            f.write_str("-")?;
        }
        if scale == 0 {
            return f.write_str(&digits);
        }
        if digits.len() > scale {
            let (i, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{i}.{frac}")
        } else {
            write!(f, "0.{}{}", "0".repeat(scale - digits.len()), digits)
        }
    }
}

/// A single decoded primitive value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimitiveValue {
    /// `bool`
    Boolean(bool),
    /// `u8`
    Byte(u8),
    /// Character
    Char(char),
    /// Decimal
    Decimal(Decimal),
    /// `f64`
    Double(f64),
    /// `i16`
    Int16(i16),
    /// `i32`
    Int32(i32),
    /// `i64`
    Int64(i64),
    /// `i8`
    SByte(i8),
    /// `f32`
    Single(f32),
    /// Ticks
    TimeSpan(i64),
    /// Date/time
    DateTime(DateTime),
    /// `u16`
    UInt16(u16),
    /// `u32`
    UInt32(u32),
    /// `u64`
    UInt64(u64),
}

impl PrimitiveValue {
    /// Read one value of the given kind, without any record framing
    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>, kind: PrimitiveType) -> Result<Self> {
        let offset = reader.offset();
        Ok(match kind {
            PrimitiveType::Boolean => Self::Boolean(reader.read_bool()?),
            PrimitiveType::Byte => Self::Byte(reader.read_u8()?),
            PrimitiveType::Char => Self::Char(reader.read_char()?),
            PrimitiveType::Decimal => Self::Decimal(Decimal::parse(&reader.read_string()?, offset)?),
            PrimitiveType::Double => Self::Double(reader.read_f64()?),
            PrimitiveType::Int16 => Self::Int16(reader.read_i16()?),
            PrimitiveType::Int32 => Self::Int32(reader.read_i32()?),
            PrimitiveType::Int64 => Self::Int64(reader.read_i64()?),
            PrimitiveType::SByte => Self::SByte(reader.read_i8()?),
            PrimitiveType::Single => Self::Single(reader.read_f32()?),
            PrimitiveType::TimeSpan => Self::TimeSpan(reader.read_i64()?),
            PrimitiveType::DateTime => Self::DateTime(DateTime::from_raw(reader.read_u64()?, offset)?),
            PrimitiveType::UInt16 => Self::UInt16(reader.read_u16()?),
            PrimitiveType::UInt32 => Self::UInt32(reader.read_u32()?),
            PrimitiveType::UInt64 => Self::UInt64(reader.read_u64()?),
        })
    }

    /// The kind of this value
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Self::Boolean(_) => PrimitiveType::Boolean,
            Self::Byte(_) => PrimitiveType::Byte,
            Self::Char(_) => PrimitiveType::Char,
            Self::Decimal(_) => PrimitiveType::Decimal,
            Self::Double(_) => PrimitiveType::Double,
            Self::Int16(_) => PrimitiveType::Int16,
            Self::Int32(_) => PrimitiveType::Int32,
            Self::Int64(_) => PrimitiveType::Int64,
            Self::SByte(_) => PrimitiveType::SByte,
            Self::Single(_) => PrimitiveType::Single,
            Self::TimeSpan(_) => PrimitiveType::TimeSpan,
            Self::DateTime(_) => PrimitiveType::DateTime,
            Self::UInt16(_) => PrimitiveType::UInt16,
            Self::UInt32(_) => PrimitiveType::UInt32,
            Self::UInt64(_) => PrimitiveType::UInt64,
        }
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}u8"),
            Self::Char(v) => write!(f, "{v:?}"),
            Self::Decimal(v) => write!(f, "{v}m"),
            Self::Double(v) => write!(f, "{v}f64"),
            Self::Int16(v) => write!(f, "{v}i16"),
            Self::Int32(v) => write!(f, "{v}i32"),
            Self::Int64(v) => write!(f, "{v}i64"),
            Self::SByte(v) => write!(f, "{v}i8"),
            Self::Single(v) => write!(f, "{v}f32"),
            Self::TimeSpan(v) => write!(f, "timespan({v})"),
            Self::DateTime(v) => write!(f, "datetime({}, {:?})", v.ticks, v.kind),
            Self::UInt16(v) => write!(f, "{v}u16"),
            Self::UInt32(v) => write!(f, "{v}u32"),
            Self::UInt64(v) => write!(f, "{v}u64"),
        }
    }
}

/// Packed values of a primitive array, one vector per kind
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveVec {
    /// Booleans
    Boolean(Vec<bool>),
    /// Raw bytes
    Byte(Bytes),
    /// Characters
    Char(Vec<char>),
    /// Decimals
    Decimal(Vec<Decimal>),
    /// Doubles
    Double(Vec<f64>),
    /// `i16`s
    Int16(Vec<i16>),
    /// `i32`s
    Int32(Vec<i32>),
    /// `i64`s
    Int64(Vec<i64>),
    /// `i8`s
    SByte(Vec<i8>),
    /// Singles
    Single(Vec<f32>),
    /// Tick counts
    TimeSpan(Vec<i64>),
    /// Date/times
    DateTime(Vec<DateTime>),
    /// `u16`s
    UInt16(Vec<u16>),
    /// `u32`s
    UInt32(Vec<u32>),
    /// `u64`s
    UInt64(Vec<u64>),
}

impl PrimitiveVec {
    /// Read `count` tightly packed values.
    ///
    /// Fixed-width kinds are decoded chunk by chunk so the backing storage
    /// grows with the bytes actually present, not with the declared count.
    pub(crate) fn read<R: Read>(
        reader: &mut BinaryReader<R>,
        kind: PrimitiveType,
        count: usize,
    ) -> Result<Self> {
        if let Some(width) = kind.fixed_width() {
            count.checked_mul(width).ok_or_else(|| {
                Error::invalid_value(reader.offset(), format!("{count} elements overflow byte length"))
            })?;
        }

        Ok(match kind {
            PrimitiveType::Byte => Self::Byte(Bytes::from(reader.read_bytes(count)?)),
            PrimitiveType::Boolean => Self::Boolean(read_fixed(reader, count, |[b]: [u8; 1]| b != 0)?),
            PrimitiveType::SByte => Self::SByte(read_fixed(reader, count, i8::from_le_bytes)?),
            PrimitiveType::Int16 => Self::Int16(read_fixed(reader, count, i16::from_le_bytes)?),
            PrimitiveType::UInt16 => Self::UInt16(read_fixed(reader, count, u16::from_le_bytes)?),
            PrimitiveType::Int32 => Self::Int32(read_fixed(reader, count, i32::from_le_bytes)?),
            PrimitiveType::UInt32 => Self::UInt32(read_fixed(reader, count, u32::from_le_bytes)?),
            PrimitiveType::Single => Self::Single(read_fixed(reader, count, f32::from_le_bytes)?),
            PrimitiveType::Int64 => Self::Int64(read_fixed(reader, count, i64::from_le_bytes)?),
            PrimitiveType::UInt64 => Self::UInt64(read_fixed(reader, count, u64::from_le_bytes)?),
            PrimitiveType::Double => Self::Double(read_fixed(reader, count, f64::from_le_bytes)?),
            PrimitiveType::TimeSpan => Self::TimeSpan(read_fixed(reader, count, i64::from_le_bytes)?),
            PrimitiveType::DateTime => {
                let offset = reader.offset();
                let raw = read_fixed(reader, count, u64::from_le_bytes)?;
                Self::DateTime(
                    raw.into_iter()
                        .enumerate()
                        .map(|(i, r)| DateTime::from_raw(r, offset + 8 * i as u64))
                        .collect::<Result<_>>()?,
                )
            }
            PrimitiveType::Char => {
                let mut values = Vec::with_capacity(count.min(CHUNK_BYTES));
                for _ in 0..count {
                    values.push(reader.read_char()?);
                }
                Self::Char(values)
            }
            PrimitiveType::Decimal => {
                let mut values = Vec::with_capacity(count.min(CHUNK_BYTES / 16));
                for _ in 0..count {
                    let offset = reader.offset();
                    values.push(Decimal::parse(&reader.read_string()?, offset)?);
                }
                Self::Decimal(values)
            }
        })
    }

    /// Number of values
    pub fn len(&self) -> usize {
        match self {
            Self::Boolean(v) => v.len(),
            Self::Byte(v) => v.len(),
            Self::Char(v) => v.len(),
            Self::Decimal(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::SByte(v) => v.len(),
            Self::Single(v) => v.len(),
            Self::TimeSpan(v) => v.len(),
            Self::DateTime(v) => v.len(),
            Self::UInt16(v) => v.len(),
            Self::UInt32(v) => v.len(),
            Self::UInt64(v) => v.len(),
        }
    }

    /// Returns true if there are no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index`
    pub fn get(&self, index: usize) -> Option<PrimitiveValue> {
        Some(match self {
            Self::Boolean(v) => PrimitiveValue::Boolean(*v.get(index)?),
            Self::Byte(v) => PrimitiveValue::Byte(*v.get(index)?),
            Self::Char(v) => PrimitiveValue::Char(*v.get(index)?),
            Self::Decimal(v) => PrimitiveValue::Decimal(*v.get(index)?),
            Self::Double(v) => PrimitiveValue::Double(*v.get(index)?),
            Self::Int16(v) => PrimitiveValue::Int16(*v.get(index)?),
            Self::Int32(v) => PrimitiveValue::Int32(*v.get(index)?),
            Self::Int64(v) => PrimitiveValue::Int64(*v.get(index)?),
            Self::SByte(v) => PrimitiveValue::SByte(*v.get(index)?),
            Self::Single(v) => PrimitiveValue::Single(*v.get(index)?),
            Self::TimeSpan(v) => PrimitiveValue::TimeSpan(*v.get(index)?),
            Self::DateTime(v) => PrimitiveValue::DateTime(*v.get(index)?),
            Self::UInt16(v) => PrimitiveValue::UInt16(*v.get(index)?),
            Self::UInt32(v) => PrimitiveValue::UInt32(*v.get(index)?),
            Self::UInt64(v) => PrimitiveValue::UInt64(*v.get(index)?),
        })
    }
}

fn read_fixed<R, T, F, const N: usize>(
    reader: &mut BinaryReader<R>,
    count: usize,
    convert: F,
) -> Result<Vec<T>>
where
    R: Read,
    F: Fn([u8; N]) -> T,
{
    let per_chunk = CHUNK_BYTES / N;
    let mut values = Vec::with_capacity(count.min(per_chunk));
    let mut remaining = count;

    while remaining > 0 {
        let n = remaining.min(per_chunk);
        let bytes = reader.read_bytes(n * N)?;
        for chunk in bytes.chunks_exact(N) {
            let mut raw = [0u8; N];
            raw.copy_from_slice(chunk);
            values.push(convert(raw));
        }
        remaining -= n;
    }

    Ok(values)
}
