//! Patched frame-of-reference coding
//!
//! Values are coded in blocks of up to [`BLOCK_SIZE`]. Each block picks a
//! base width `b`; values wider than `b` become exceptions whose high bits
//! are stored separately, located by a 128-bit position bitmap.
//!
//! ```text
//! block := hdr:u8 (b << 1)                      low bits
//!        | hdr:u8 (b << 1 | 1) bx:u8            low bits  bitmap:2 x u64 LE  high bits
//! ```

use super::bitpack::{bit_width, pack, packed_len, unpack};
use crate::{Result, TickError};

/// Number of values per block
pub const BLOCK_SIZE: usize = 128;

/// Bytes added by an exception section besides the high bits themselves
const EXCEPTION_OVERHEAD: isize = 1 + 16;

/// Choose the base width `b` and exception width `bx` for a block
pub fn choose_width(values: &[u64]) -> (u32, u32) {
    let n = values.len();
    let mut histogram = [0usize; 65];
    let mut or = 0u64;
    for &v in values {
        or |= v;
        histogram[bit_width(v) as usize] += 1;
    }

    let b_max = bit_width(or);
    let mut best = b_max;
    let mut best_cost = packed_len(n, b_max) as isize - EXCEPTION_OVERHEAD;
    // values needing more than `i` bits
    let mut wider = histogram[b_max as usize];

    for i in (0..b_max).rev() {
        let cost = (packed_len(n, i) + packed_len(wider, b_max - i)) as isize;
        wider += histogram[i as usize];
        if cost < best_cost {
            best = i;
            best_cost = cost;
        }
    }
    (best, b_max - best)
}

/// Encode one block of at most [`BLOCK_SIZE`] values, returns bytes written
pub fn encode_block(out: &mut Vec<u8>, values: &[u64]) -> usize {
    debug_assert!(values.len() <= BLOCK_SIZE);
    let start = out.len();
    let (b, bx) = choose_width(values);

    if bx == 0 {
        out.push((b << 1) as u8);
        pack(out, values, b);
        return out.len() - start;
    }

    out.push((b << 1 | 1) as u8);
    out.push(bx as u8);
    pack(out, values, b);

    let mut bitmap = [0u64; 2];
    let mut high = Vec::with_capacity(values.len());
    for (i, &v) in values.iter().enumerate() {
        let h = v >> b;
        if h != 0 {
            bitmap[i / 64] |= 1 << (i % 64);
            high.push(h);
        }
    }
    out.extend_from_slice(&bitmap[0].to_le_bytes());
    out.extend_from_slice(&bitmap[1].to_le_bytes());
    pack(out, &high, bx);

    out.len() - start
}

/// Decode one block filling `out`, returns bytes consumed
pub fn decode_block(out: &mut [u64], input: &[u8]) -> Result<usize> {
    debug_assert!(out.len() <= BLOCK_SIZE);
    let header = *input
        .first()
        .ok_or_else(|| TickError::truncated("pfor block header", 1, 0))?;
    let b = (header >> 1) as u32;
    let patched = header & 1 == 1;

    let mut pos = 1;
    let mut bx = 0;
    if patched {
        bx = *input
            .get(1)
            .ok_or_else(|| TickError::truncated("pfor block header", 2, input.len()))?
            as u32;
        pos = 2;
    }
    // a patch shifts high bits above the low width, so b < 64 and bx > 0
    if b + bx > 64 || (patched && (b >= 64 || bx == 0)) {
        return Err(TickError::Corruption(format!(
            "pfor widths out of range: b={} bx={}",
            b, bx
        )));
    }

    pos += unpack(out, &input[pos..], b)?;
    if !patched {
        return Ok(pos);
    }

    if input.len() < pos + 16 {
        return Err(TickError::truncated("pfor exception bitmap", pos + 16, input.len()));
    }
    let mut bitmap = [0u64; 2];
    for (k, word) in bitmap.iter_mut().enumerate() {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&input[pos + 8 * k..pos + 8 * k + 8]);
        *word = u64::from_le_bytes(raw);
    }
    pos += 16;

    let count = (bitmap[0].count_ones() + bitmap[1].count_ones()) as usize;
    let mut high = vec![0u64; count];
    pos += unpack(&mut high, &input[pos..], bx)?;

    let mut high = high.into_iter();
    for (k, &word) in bitmap.iter().enumerate() {
        let mut bits = word;
        while bits != 0 {
            let i = k * 64 + bits.trailing_zeros() as usize;
            bits &= bits - 1;
            let slot = out.get_mut(i).ok_or_else(|| {
                TickError::Corruption(format!("pfor exception at {} past block end", i))
            })?;
            // count matches the bitmap popcount
            if let Some(h) = high.next() {
                *slot |= h << b;
            }
        }
    }
    Ok(pos)
}

/// Encode any number of values as consecutive blocks
pub fn encode(out: &mut Vec<u8>, values: &[u64]) -> usize {
    values
        .chunks(BLOCK_SIZE)
        .map(|block| encode_block(out, block))
        .sum()
}

/// Decode `out.len()` values, returns bytes consumed
pub fn decode(out: &mut [u64], input: &[u8]) -> Result<usize> {
    let mut pos = 0;
    for block in out.chunks_mut(BLOCK_SIZE) {
        pos += decode_block(block, &input[pos..])?;
    }
    Ok(pos)
}
