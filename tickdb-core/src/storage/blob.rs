//! Blob framing
//!
//! A blob is one compressed WAL block:
//!
//! ```text
//! ((size << 24) | (rows - 1)):u64 BE
//! len:u64 BE  time column
//! len:u64 BE  field column          (one per layout field)
//! ((size << 24) | crc24):u64 BE
//! ```
//!
//! `size` counts the whole blob including both framing words; `crc24` is the
//! low 24 bits of the CRC32 over everything between them.

use crate::compression::{self, CompressionStats};
use crate::transpose::Columns;
use crate::types::TimeRange;
use crate::{Result, TickError};
use bytes::{Buf, BufMut};

/// Bytes taken by the two framing words
pub const BLOB_OVERHEAD: usize = 16;

const LOW_BITS: u32 = 24;
const LOW_MASK: u64 = (1 << LOW_BITS) - 1;

/// Largest number of rows a blob can frame
pub const MAX_ROWS: usize = 1 << LOW_BITS;

/// Decoded leading framing word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobHeader {
    /// Total blob size in bytes
    pub size: u64,
    /// Number of rows
    pub rows: usize,
}

impl BlobHeader {
    /// Parse the leading framing word
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(TickError::truncated("blob header", 8, data.len()));
        }
        let word = (&data[..8]).get_u64();
        let header = Self {
            size: word >> LOW_BITS,
            rows: (word & LOW_MASK) as usize + 1,
        };
        if header.size < BLOB_OVERHEAD as u64 {
            return Err(TickError::Corruption(format!(
                "blob claims {} bytes, less than its framing",
                header.size
            )));
        }
        Ok(header)
    }
}

fn crc24(data: &[u8]) -> u32 {
    crc32fast::hash(data) & LOW_MASK as u32
}

fn put_column<F>(buf: &mut Vec<u8>, encode: F) -> Result<usize>
where
    F: FnOnce(&mut Vec<u8>) -> Result<usize>,
{
    let at = buf.len();
    buf.put_u64(0);
    let len = encode(buf)?;
    buf[at..at + 8].copy_from_slice(&(len as u64).to_be_bytes());
    Ok(len)
}

/// Encode all rows of `cols` into one blob
pub fn encode(cols: &Columns) -> Result<(Vec<u8>, CompressionStats)> {
    let rows = cols.len();
    if rows == 0 || rows > MAX_ROWS {
        return Err(TickError::FieldMismatch(format!(
            "cannot frame {} rows in a blob",
            rows
        )));
    }

    let mut buf = Vec::with_capacity(rows * 8);
    buf.put_u64(0);
    put_column(&mut buf, |out| Ok(compression::encode_times(out, cols.times())))?;
    for (f, &ty) in cols.layout().fields().iter().enumerate() {
        put_column(&mut buf, |out| compression::encode_column(out, ty, cols.column(f)))?;
    }

    let size = (buf.len() + 8) as u64;
    let crc = crc24(&buf[8..]);
    buf.put_u64((size << LOW_BITS) | crc as u64);
    buf[..8].copy_from_slice(&((size << LOW_BITS) | (rows as u64 - 1)).to_be_bytes());

    let raw_row: usize = 8 + cols.layout().fields().iter().map(|f| f.width()).sum::<usize>();
    let stats = CompressionStats {
        rows,
        raw_bytes: rows * raw_row,
        encoded_bytes: buf.len(),
    };
    Ok((buf, stats))
}

/// Check framing and checksum of exactly one blob, returns its header
pub fn verify(data: &[u8]) -> Result<BlobHeader> {
    let header = BlobHeader::parse(data)?;
    if header.size != data.len() as u64 {
        return Err(TickError::Corruption(format!(
            "blob claims {} bytes, {} available",
            header.size,
            data.len()
        )));
    }
    let trailer = (&data[data.len() - 8..]).get_u64();
    if trailer >> LOW_BITS != header.size {
        return Err(TickError::Corruption(format!(
            "blob trailer size {} does not match header size {}",
            trailer >> LOW_BITS,
            header.size
        )));
    }
    let expected = (trailer & LOW_MASK) as u32;
    let actual = crc24(&data[8..data.len() - 8]);
    if expected != actual {
        return Err(TickError::ChecksumMismatch { expected, actual });
    }
    Ok(header)
}

struct ColumnCursor<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> ColumnCursor<'a> {
    fn next_column(&mut self) -> Result<&'a [u8]> {
        let rest = &self.body[self.pos..];
        if rest.len() < 8 {
            return Err(TickError::truncated("column length", 8, rest.len()));
        }
        let len = (&rest[..8]).get_u64() as usize;
        if rest.len() - 8 < len {
            return Err(TickError::truncated("column", len, rest.len() - 8));
        }
        self.pos += 8 + len;
        Ok(&rest[8..8 + len])
    }
}

fn check_consumed(what: &str, consumed: usize, len: usize) -> Result<()> {
    if consumed != len {
        return Err(TickError::Corruption(format!(
            "{} column decoded {} of {} bytes",
            what, consumed, len
        )));
    }
    Ok(())
}

/// Decode one blob, appending its rows to `cols`; returns the row count.
///
/// On error `cols` is left as it was.
pub fn decode(data: &[u8], cols: &mut Columns) -> Result<usize> {
    let before = cols.len();
    let result = decode_into(data, cols);
    if result.is_err() {
        cols.truncate(before);
    }
    result
}

fn decode_into(data: &[u8], cols: &mut Columns) -> Result<usize> {
    let header = verify(data)?;
    let n = header.rows;
    let mut cursor = ColumnCursor {
        body: &data[8..data.len() - 8],
        pos: 0,
    };

    let column = cursor.next_column()?;
    let consumed = compression::decode_times(cols.times_mut(), n, column)?;
    check_consumed("time", consumed, column.len())?;

    let layout = cols.layout().clone();
    for (f, &ty) in layout.fields().iter().enumerate() {
        let column = cursor.next_column()?;
        let consumed = compression::decode_column(cols.column_mut(f), ty, n, column)?;
        check_consumed(&format!("{:?}", ty), consumed, column.len())?;
    }

    if cursor.pos != cursor.body.len() {
        return Err(TickError::Corruption(format!(
            "{} stray bytes after last column",
            cursor.body.len() - cursor.pos
        )));
    }
    Ok(n)
}

/// Time range and row count of one blob, decoding only the time column
pub fn time_bounds(data: &[u8]) -> Result<(TimeRange, usize)> {
    let header = verify(data)?;
    let mut cursor = ColumnCursor {
        body: &data[8..data.len() - 8],
        pos: 0,
    };
    let column = cursor.next_column()?;
    let mut times = Vec::with_capacity(header.rows);
    compression::decode_times(&mut times, header.rows, column)?;

    match (times.first(), times.last()) {
        (Some(&from), Some(&till)) => Ok((TimeRange::new(from, till), header.rows)),
        _ => Err(TickError::Corruption("blob without rows".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldValue, Layout, Px, Qx, Tick};

    fn sample(n: u64) -> Columns {
        let layout = Layout::parse("spq").unwrap();
        let mut cols = Columns::new(&layout);
        for i in 0..n {
            cols.push(&Tick::new(
                1_000 + i * 7,
                vec![
                    FieldValue::Tag(1 + i % 2),
                    Px::from_f32(1.0 + i as f32 / 8.0).into(),
                    Qx::from_f64(100.0).into(),
                ],
            ))
            .unwrap();
        }
        cols
    }

    #[test]
    fn test_blob_roundtrip() {
        let cols = sample(1000);
        let (blob, stats) = encode(&cols).unwrap();
        assert_eq!(stats.encoded_bytes, blob.len());
        assert_eq!(stats.raw_bytes, 1000 * 28);
        assert!(stats.compression_ratio() > 1.0);

        let header = BlobHeader::parse(&blob).unwrap();
        assert_eq!(header.size, blob.len() as u64);
        assert_eq!(header.rows, 1000);

        let mut back = Columns::new(cols.layout());
        assert_eq!(decode(&blob, &mut back).unwrap(), 1000);
        assert_eq!(back, cols);

        let (range, rows) = time_bounds(&blob).unwrap();
        assert_eq!(range, TimeRange::new(1_000, 1_000 + 999 * 7));
        assert_eq!(rows, 1000);
    }

    #[test]
    fn test_checksum_mismatch() {
        let (mut blob, _) = encode(&sample(10)).unwrap();
        blob[20] ^= 0xff;
        let mut back = Columns::new(&Layout::parse("spq").unwrap());
        let err = decode(&blob, &mut back).unwrap_err();
        assert!(matches!(err, TickError::ChecksumMismatch { .. }));
        assert!(back.is_empty());
    }

    #[test]
    fn test_size_mismatch() {
        let (blob, _) = encode(&sample(10)).unwrap();
        assert!(verify(&blob[..blob.len() - 1]).unwrap_err().is_corruption());

        let mut longer = blob.clone();
        longer.extend_from_slice(&[0; 8]);
        assert!(verify(&longer).unwrap_err().is_corruption());
    }

    #[test]
    fn test_empty_blob_refused() {
        let cols = Columns::new(&Layout::parse("p").unwrap());
        assert!(encode(&cols).is_err());
    }
}
