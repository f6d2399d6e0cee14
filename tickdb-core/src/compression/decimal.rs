//! Price and quantity codec
//!
//! Decimal (and binary float) bit patterns of neighbouring ticks share most
//! of their high bits, so consecutive values are XOR-ed. Sign flips leave the
//! top bit set in the XOR, which would force full-width packing; rotation
//! sub-blocks where that happens often are rotated left by one bit and
//! flagged in a 64-bit map preceding the PFOR stream.
//!
//! ```text
//! rotmap:u64 LE   pfor(xor deltas)
//! ```

use super::{pfor, SUPER_BLOCK};
use crate::Result;

/// Values per rotation sub-block, 64 sub-blocks per super-block
pub const ROTATION_BLOCK: usize = SUPER_BLOCK / 64;

#[inline]
fn rotl(v: u64, width: u32) -> u64 {
    let mask = u64::MAX >> (64 - width);
    ((v << 1) | (v >> (width - 1))) & mask
}

#[inline]
fn rotr(v: u64, width: u32) -> u64 {
    let mask = u64::MAX >> (64 - width);
    ((v >> 1) | (v << (width - 1))) & mask
}

/// Sub-blocks where more than 1/8 of the values have the sign bit set
fn rotation_map(deltas: &[u64], width: u32) -> u64 {
    let mut map = 0u64;
    for (b, block) in deltas.chunks(ROTATION_BLOCK).enumerate() {
        let signs = block.iter().filter(|&&v| v >> (width - 1) & 1 == 1).count();
        if signs * 8 > block.len() {
            map |= 1 << b;
        }
    }
    map
}

fn encode_chunk(out: &mut Vec<u8>, values: &[u64], width: u32) {
    let mut deltas = Vec::with_capacity(values.len());
    let mut prev = 0u64;
    for &v in values {
        deltas.push(v ^ prev);
        prev = v;
    }

    let map = rotation_map(&deltas, width);
    for (b, block) in deltas.chunks_mut(ROTATION_BLOCK).enumerate() {
        if map >> b & 1 == 1 {
            block.iter_mut().for_each(|v| *v = rotl(*v, width));
        }
    }

    out.extend_from_slice(&map.to_le_bytes());
    pfor::encode(out, &deltas);
}

fn decode_chunk(out: &mut [u64], input: &[u8], width: u32) -> Result<usize> {
    if input.len() < 8 {
        return Err(crate::TickError::truncated("rotation map", 8, input.len()));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&input[..8]);
    let map = u64::from_le_bytes(raw);

    let consumed = 8 + pfor::decode(out, &input[8..])?;

    for (b, block) in out.chunks_mut(ROTATION_BLOCK).enumerate() {
        if map >> b & 1 == 1 {
            block.iter_mut().for_each(|v| *v = rotr(*v, width));
        }
    }
    let mut acc = 0u64;
    for v in out.iter_mut() {
        acc ^= *v;
        *v = acc;
    }
    Ok(consumed)
}

fn encode_wide(out: &mut Vec<u8>, values: &[u64], width: u32) -> usize {
    let start = out.len();
    for chunk in values.chunks(SUPER_BLOCK) {
        encode_chunk(out, chunk, width);
    }
    out.len() - start
}

fn decode_wide(out: &mut [u64], input: &[u8], width: u32) -> Result<usize> {
    let mut pos = 0;
    for chunk in out.chunks_mut(SUPER_BLOCK) {
        pos += decode_chunk(chunk, &input[pos..], width)?;
    }
    Ok(pos)
}

/// Encode 32-bit patterns (prices, floats), returns bytes written
pub fn encode32(out: &mut Vec<u8>, values: &[u32]) -> usize {
    let wide: Vec<u64> = values.iter().map(|&v| v as u64).collect();
    encode_wide(out, &wide, 32)
}

/// Decode `out.len()` 32-bit patterns, returns bytes consumed
pub fn decode32(out: &mut [u32], input: &[u8]) -> Result<usize> {
    let mut wide = vec![0u64; out.len()];
    let consumed = decode_wide(&mut wide, input, 32)?;
    for (o, w) in out.iter_mut().zip(wide) {
        *o = u32::try_from(w).map_err(|_| {
            crate::TickError::Corruption(format!("32-bit column holds {:#x}", w))
        })?;
    }
    Ok(consumed)
}

/// Encode 64-bit patterns (quantities, doubles), returns bytes written
pub fn encode64(out: &mut Vec<u8>, values: &[u64]) -> usize {
    encode_wide(out, values, 64)
}

/// Decode `out.len()` 64-bit patterns, returns bytes consumed
pub fn decode64(out: &mut [u64], input: &[u8]) -> Result<usize> {
    decode_wide(out, input, 64)
}
