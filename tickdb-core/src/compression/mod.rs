//! Column compression
//!
//! Every column of a blob is coded by the codec its field type selects:
//!
//! - time offsets and counters: delta against the average delta, zig-zag, PFOR
//! - prices, quantities and floats: XOR-delta with sign-bit rotation, PFOR
//! - tags: XOR-delta, PFOR
//! - sizes: plain PFOR
//! - bytes: stored raw

pub mod bitpack;
pub mod decimal;
pub mod pfor;
pub mod tag;
pub mod time;

mod bitstream;

use crate::transpose::{Column, ColumnTail};
use crate::types::FieldType;
use crate::{Result, TickError};

/// Values per codec super-block
pub const SUPER_BLOCK: usize = 8192;

/// Codec applied to a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Raw,
    Time,
    Decimal32,
    Decimal64,
    Tag,
    Size,
}

impl Codec {
    pub fn for_field(ty: FieldType) -> Self {
        match ty {
            FieldType::Byte => Codec::Raw,
            FieldType::Time | FieldType::Count => Codec::Time,
            FieldType::Tag => Codec::Tag,
            FieldType::Price | FieldType::Float => Codec::Decimal32,
            FieldType::Quantity | FieldType::Double => Codec::Decimal64,
            FieldType::Size => Codec::Size,
        }
    }
}

/// Encode the time offset column
pub fn encode_times(out: &mut Vec<u8>, times: &[u64]) -> usize {
    time::encode(out, times)
}

/// Decode `n` time offsets, appending to `times`
pub fn decode_times(times: &mut Vec<u64>, n: usize, input: &[u8]) -> Result<usize> {
    let at = times.len();
    times.resize(at + n, 0);
    time::decode(&mut times[at..], input)
}

/// Encode one field column, returns bytes written
pub fn encode_column(out: &mut Vec<u8>, ty: FieldType, column: &Column) -> Result<usize> {
    let written = match (Codec::for_field(ty), column) {
        (Codec::Raw, Column::Bytes(v)) => {
            out.extend_from_slice(v);
            v.len()
        }
        (Codec::Decimal32, Column::Words(v)) => decimal::encode32(out, v),
        (Codec::Decimal64, Column::Longs(v)) => decimal::encode64(out, v),
        (Codec::Time, Column::Longs(v)) => time::encode(out, v),
        (Codec::Tag, Column::Longs(v)) => tag::encode(out, v),
        (Codec::Size, Column::Longs(v)) => pfor::encode(out, v),
        (codec, _) => {
            return Err(TickError::FieldMismatch(format!(
                "column storage does not fit {:?} codec for {:?}",
                codec, ty
            )))
        }
    };
    Ok(written)
}

/// Decode `n` values of a field column, appending to `column`.
///
/// Returns bytes consumed.
pub fn decode_column(column: &mut Column, ty: FieldType, n: usize, input: &[u8]) -> Result<usize> {
    let codec = Codec::for_field(ty);
    match (codec, column.grow(n)) {
        (Codec::Raw, ColumnTail::Bytes(out)) => {
            if input.len() < n {
                return Err(TickError::truncated("byte column", n, input.len()));
            }
            out.copy_from_slice(&input[..n]);
            Ok(n)
        }
        (Codec::Decimal32, ColumnTail::Words(out)) => decimal::decode32(out, input),
        (Codec::Decimal64, ColumnTail::Longs(out)) => decimal::decode64(out, input),
        (Codec::Time, ColumnTail::Longs(out)) => time::decode(out, input),
        (Codec::Tag, ColumnTail::Longs(out)) => tag::decode(out, input),
        (Codec::Size, ColumnTail::Longs(out)) => pfor::decode(out, input),
        _ => Err(TickError::FieldMismatch(format!(
            "column storage does not fit {:?} codec for {:?}",
            codec, ty
        ))),
    }
}

/// Compression statistics for one encoded block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionStats {
    /// Rows in the block
    pub rows: usize,
    /// Row-major size before compression
    pub raw_bytes: usize,
    /// Encoded size
    pub encoded_bytes: usize,
}

impl CompressionStats {
    /// Get compression ratio
    pub fn compression_ratio(&self) -> f64 {
        if self.encoded_bytes == 0 {
            return 0.0;
        }
        self.raw_bytes as f64 / self.encoded_bytes as f64
    }

    /// Get bytes per tick
    pub fn bytes_per_tick(&self) -> f64 {
        if self.rows == 0 {
            return 0.0;
        }
        self.encoded_bytes as f64 / self.rows as f64
    }
}
