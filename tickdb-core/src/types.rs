//! Core types for TickDB

use crate::{Result, TickError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Time offset in nanoseconds relative to the series reference epoch
pub type TimeOffset = u64;

/// Interned tag code, 1-based; 0 denotes "no tag"
pub type TagCode = u64;

/// Type of a single tick field, one per layout character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Raw byte (`b`)
    Byte,
    /// Secondary time offset (`t`)
    Time,
    /// Interned string code (`s`)
    Tag,
    /// 32-bit decimal price (`p`)
    Price,
    /// 64-bit decimal quantity (`q`)
    Quantity,
    /// 32-bit binary float (`f`)
    Float,
    /// 64-bit binary float (`d`)
    Double,
    /// Non-negative 64-bit size (`z`)
    Size,
    /// Monotonic 64-bit counter (`c`)
    Count,
}

impl FieldType {
    /// Parse a layout character
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'b' => Some(FieldType::Byte),
            b't' => Some(FieldType::Time),
            b's' => Some(FieldType::Tag),
            b'p' => Some(FieldType::Price),
            b'q' => Some(FieldType::Quantity),
            b'f' => Some(FieldType::Float),
            b'd' => Some(FieldType::Double),
            b'z' => Some(FieldType::Size),
            b'c' => Some(FieldType::Count),
            _ => None,
        }
    }

    /// Layout character of this field type
    pub fn code(self) -> u8 {
        match self {
            FieldType::Byte => b'b',
            FieldType::Time => b't',
            FieldType::Tag => b's',
            FieldType::Price => b'p',
            FieldType::Quantity => b'q',
            FieldType::Float => b'f',
            FieldType::Double => b'd',
            FieldType::Size => b'z',
            FieldType::Count => b'c',
        }
    }

    /// Width of the field within a row, in bytes
    pub fn width(self) -> usize {
        match self {
            FieldType::Byte => 1,
            FieldType::Price | FieldType::Float => 4,
            FieldType::Time
            | FieldType::Tag
            | FieldType::Quantity
            | FieldType::Double
            | FieldType::Size
            | FieldType::Count => 8,
        }
    }

    /// Required alignment of the field within a row
    pub fn align(self) -> usize {
        self.width()
    }
}

/// Per-series field layout, fixed for the lifetime of the series
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layout {
    fields: Vec<FieldType>,
}

impl Layout {
    /// Parse a layout string such as `"spq"`
    pub fn parse(s: &str) -> Result<Self> {
        let fields = s
            .bytes()
            .map(|c| {
                FieldType::from_code(c).ok_or_else(|| {
                    TickError::InvalidLayout(format!(
                        "unsupported field code {:?} in {:?}",
                        c as char, s
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }

    /// Field types in order
    pub fn fields(&self) -> &[FieldType] {
        &self.fields
    }

    /// Number of fields (excluding the implicit time offset)
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the layout has no fields besides the time offset
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromStr for Layout {
    type Err = TickError;

    fn from_str(s: &str) -> Result<Self> {
        Layout::parse(s)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in &self.fields {
            write!(f, "{}", field.code() as char)?;
        }
        Ok(())
    }
}

/// 32-bit decimal price, kept as its raw bit pattern.
///
/// Decimal arithmetic lives outside this crate; the engine only needs the
/// bit reinterpretation in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Px(u32);

impl Px {
    /// Missing value marker (negative zero)
    pub const MISSING: Px = Px(0x8000_0000);

    pub const fn from_bits(bits: u32) -> Self {
        Px(bits)
    }

    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Binary float stand-in for callers without a decimal library
    pub fn from_f32(v: f32) -> Self {
        Px(v.to_bits())
    }

    pub fn to_f32(self) -> f32 {
        f32::from_bits(self.0)
    }

    pub fn is_missing(self) -> bool {
        self == Self::MISSING
    }
}

/// 64-bit decimal quantity, kept as its raw bit pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Qx(u64);

impl Qx {
    /// Missing value marker (negative zero)
    pub const MISSING: Qx = Qx(0x8000_0000_0000_0000);

    pub const fn from_bits(bits: u64) -> Self {
        Qx(bits)
    }

    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Binary float stand-in for callers without a decimal library
    pub fn from_f64(v: f64) -> Self {
        Qx(v.to_bits())
    }

    pub fn to_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    pub fn is_missing(self) -> bool {
        self == Self::MISSING
    }
}

/// A single field value of a tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Byte(u8),
    Time(TimeOffset),
    Tag(TagCode),
    Price(Px),
    Quantity(Qx),
    Float(f32),
    Double(f64),
    Size(u64),
    Count(u64),
}

impl FieldValue {
    /// Field type this value belongs to
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Byte(_) => FieldType::Byte,
            FieldValue::Time(_) => FieldType::Time,
            FieldValue::Tag(_) => FieldType::Tag,
            FieldValue::Price(_) => FieldType::Price,
            FieldValue::Quantity(_) => FieldType::Quantity,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Double(_) => FieldType::Double,
            FieldValue::Size(_) => FieldType::Size,
            FieldValue::Count(_) => FieldType::Count,
        }
    }

    /// Raw bits of the value, zero-extended to 64 bits
    pub fn to_bits(&self) -> u64 {
        match *self {
            FieldValue::Byte(v) => v as u64,
            FieldValue::Price(v) => v.to_bits() as u64,
            FieldValue::Float(v) => v.to_bits() as u64,
            FieldValue::Quantity(v) => v.to_bits(),
            FieldValue::Double(v) => v.to_bits(),
            FieldValue::Time(v)
            | FieldValue::Tag(v)
            | FieldValue::Size(v)
            | FieldValue::Count(v) => v,
        }
    }

    /// Rebuild a value of type `ty` from raw bits
    pub fn from_bits(ty: FieldType, bits: u64) -> Self {
        match ty {
            FieldType::Byte => FieldValue::Byte(bits as u8),
            FieldType::Time => FieldValue::Time(bits),
            FieldType::Tag => FieldValue::Tag(bits),
            FieldType::Price => FieldValue::Price(Px::from_bits(bits as u32)),
            FieldType::Quantity => FieldValue::Quantity(Qx::from_bits(bits)),
            FieldType::Float => FieldValue::Float(f32::from_bits(bits as u32)),
            FieldType::Double => FieldValue::Double(f64::from_bits(bits)),
            FieldType::Size => FieldValue::Size(bits),
            FieldType::Count => FieldValue::Count(bits),
        }
    }
}

impl From<Px> for FieldValue {
    fn from(v: Px) -> Self {
        FieldValue::Price(v)
    }
}

impl From<Qx> for FieldValue {
    fn from(v: Qx) -> Self {
        FieldValue::Quantity(v)
    }
}

/// A tick: time offset plus layout-defined fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub time: TimeOffset,
    pub fields: Vec<FieldValue>,
}

impl Tick {
    pub fn new(time: TimeOffset, fields: Vec<FieldValue>) -> Self {
        Self { time, fields }
    }
}

/// Inclusive time range `[from, till]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: TimeOffset,
    pub till: TimeOffset,
}

impl TimeRange {
    pub fn new(from: TimeOffset, till: TimeOffset) -> Self {
        Self { from, till }
    }

    /// Check if a time offset is within the range
    pub fn contains(&self, t: TimeOffset) -> bool {
        t >= self.from && t <= self.till
    }

    /// Check if two ranges overlap
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.from <= other.till && self.till >= other.from
    }
}

/// Half-open byte range `[beg, end)` relative to the first blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub beg: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(beg: u64, end: u64) -> Self {
        Self { beg, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.beg
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.beg
    }
}
