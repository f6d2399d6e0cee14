//! Fixed-width integer packing
//!
//! Values are laid out as one contiguous LSB-first bitstream, so `n` values
//! of width `w` occupy exactly `ceil(n * w / 8)` bytes. Width 0 writes
//! nothing and unpacks zeros.

use super::bitstream::{BitReader, BitWriter};
use crate::{Result, TickError};

/// Maximum supported width
pub const MAX_WIDTH: u32 = 64;

/// Number of bytes `n` values of `width` bits pack into
#[inline]
pub fn packed_len(n: usize, width: u32) -> usize {
    (n * width as usize + 7) / 8
}

/// Number of bits needed to represent `v` (0 for 0)
#[inline]
pub fn bit_width(v: u64) -> u32 {
    u64::BITS - v.leading_zeros()
}

/// Append `values` packed at `width` bits to `out`.
///
/// Bits above `width` are dropped. Returns the number of bytes written.
pub fn pack(out: &mut Vec<u8>, values: &[u64], width: u32) -> usize {
    debug_assert!(width <= MAX_WIDTH);
    match width {
        0 => 0,
        64 => {
            out.reserve(values.len() * 8);
            for v in values {
                out.extend_from_slice(&v.to_le_bytes());
            }
            values.len() * 8
        }
        _ => {
            out.reserve(packed_len(values.len(), width));
            let mut writer = BitWriter::new(out);
            for &v in values {
                writer.write_bits(v, width);
            }
            writer.finish()
        }
    }
}

/// Fill `out` with values packed at `width` bits from `input`.
///
/// Returns the number of bytes consumed.
pub fn unpack(out: &mut [u64], input: &[u8], width: u32) -> Result<usize> {
    if width > MAX_WIDTH {
        return Err(TickError::Corruption(format!(
            "bit width {} out of range",
            width
        )));
    }
    let need = packed_len(out.len(), width);
    if input.len() < need {
        return Err(TickError::truncated("packed integers", need, input.len()));
    }

    match width {
        0 => out.fill(0),
        64 => {
            for (v, chunk) in out.iter_mut().zip(input.chunks_exact(8)) {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                *v = u64::from_le_bytes(word);
            }
        }
        _ => {
            let mut reader = BitReader::new(&input[..need]);
            for v in out.iter_mut() {
                *v = reader
                    .read_bits(width)
                    .ok_or_else(|| TickError::Corruption("Unexpected end of packed bits".into()))?;
            }
        }
    }
    Ok(need)
}
