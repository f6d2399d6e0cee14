//! Time offset codec
//!
//! Deltas are centred on their geometric mean, zig-zag coded and handed to
//! PFOR. A zero delta is stored as the sentinel `1`, so bursts of ticks with
//! identical stamps cost one bit each. Each super-block of
//! [`SUPER_BLOCK`](super::SUPER_BLOCK) values carries its own preamble:
//!
//! ```text
//! (avg << 1 | sh):u64 BE   pfor(encoded deltas)
//! ```
//!
//! `sh` is set when shifting every residual left by one is needed to keep
//! residuals away from the sentinel.

use super::{pfor, SUPER_BLOCK};
use crate::{Result, TickError};

const AVG_MASK: u64 = u64::MAX >> 1;

#[inline]
fn zigzag(x: i64) -> u64 {
    ((x << 1) ^ (x >> 63)) as u64
}

#[inline]
fn unzigzag(z: u64) -> i64 {
    ((z >> 1) as i64) ^ -((z & 1) as i64)
}

/// Geometric mean of the nonzero deltas after the first
fn average_delta(deltas: &[u64]) -> u64 {
    let mut sum = 0.0f64;
    let mut nonzero = 0usize;
    for &d in deltas.iter().skip(1) {
        sum += (d.max(1) as f64).log10();
        nonzero += usize::from(d != 0);
    }
    if nonzero == 0 {
        return 0;
    }
    (10f64.powf(sum / nonzero as f64).round() as u64) & AVG_MASK
}

/// Pick `(avg, sh)` such that no nonzero delta encodes to the sentinel
fn choose_shift(deltas: &[u64], mut avg: u64) -> (u64, u32) {
    loop {
        let collides = deltas
            .iter()
            .any(|&d| d != 0 && d == avg.wrapping_sub(1));
        if !collides {
            return (avg, 0);
        }
        let fits = deltas
            .iter()
            .all(|&d| d == 0 || zigzag(d.wrapping_sub(avg) as i64) >> 63 == 0);
        if fits {
            return (avg, 1);
        }
        avg = avg.wrapping_add(1) & AVG_MASK;
    }
}

fn encode_chunk(out: &mut Vec<u8>, values: &[u64]) {
    let mut deltas = Vec::with_capacity(values.len());
    let mut prev = 0u64;
    for (i, &v) in values.iter().enumerate() {
        deltas.push(if i == 0 { v } else { v.wrapping_sub(prev) });
        prev = v;
    }

    let (avg, sh) = choose_shift(&deltas, average_delta(&deltas));
    for d in deltas.iter_mut() {
        *d = if *d == 0 {
            1
        } else {
            zigzag(d.wrapping_sub(avg) as i64) << sh
        };
    }

    out.extend_from_slice(&((avg << 1) | sh as u64).to_be_bytes());
    pfor::encode(out, &deltas);
}

fn decode_chunk(out: &mut [u64], input: &[u8]) -> Result<usize> {
    if input.len() < 8 {
        return Err(TickError::truncated("time preamble", 8, input.len()));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&input[..8]);
    let preamble = u64::from_be_bytes(raw);
    let avg = preamble >> 1;
    let sh = (preamble & 1) as u32;

    let consumed = 8 + pfor::decode(out, &input[8..])?;

    let mut sum = 0u64;
    for v in out.iter_mut() {
        let delta = if *v == 1 {
            0
        } else {
            avg.wrapping_add(unzigzag(*v >> sh) as u64)
        };
        sum = sum.wrapping_add(delta);
        *v = sum;
    }
    Ok(consumed)
}

/// Encode time offsets, returns bytes written
pub fn encode(out: &mut Vec<u8>, values: &[u64]) -> usize {
    let start = out.len();
    for chunk in values.chunks(SUPER_BLOCK) {
        encode_chunk(out, chunk);
    }
    out.len() - start
}

/// Decode `out.len()` time offsets, returns bytes consumed
pub fn decode(out: &mut [u64], input: &[u8]) -> Result<usize> {
    let mut pos = 0;
    for chunk in out.chunks_mut(SUPER_BLOCK) {
        pos += decode_chunk(chunk, &input[pos..])?;
    }
    Ok(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(values: &[u64]) -> Vec<u8> {
        let mut buf = Vec::new();
        let written = encode(&mut buf, values);
        assert_eq!(written, buf.len());
        let mut back = vec![0u64; values.len()];
        assert_eq!(decode(&mut back, &buf).unwrap(), buf.len());
        assert_eq!(back, values);
        buf
    }

    #[test]
    fn test_zigzag() {
        for x in [0i64, 1, -1, 2, -2, i64::MAX, i64::MIN] {
            assert_eq!(unzigzag(zigzag(x)), x);
        }
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
    }

    #[test]
    fn test_regular_spacing_compresses() {
        let values: Vec<u64> = (0..8192u64).map(|i| 1_000_000_000 + i * 250_000).collect();
        let buf = roundtrip(&values);
        // first delta is the raw stamp, the rest are exact hits on the average
        assert!(buf.len() < 8 + 300, "encoded {} bytes", buf.len());

        let avg = u64::from_be_bytes(buf[..8].try_into().unwrap()) >> 1;
        assert_eq!(avg, 250_000);
    }

    #[test]
    fn test_repeated_stamps() {
        let values = vec![42u64; 1000];
        roundtrip(&values);
    }

    #[test]
    fn test_residual_minus_one_does_not_alias_zero() {
        // deltas 10, 9, 0 with an average of 10 would put a residual of -1
        // on the zero sentinel
        let mut values = vec![0u64];
        for i in 0..100u64 {
            let last = *values.last().unwrap();
            values.push(last + if i % 3 == 1 { 9 } else if i % 3 == 2 { 0 } else { 10 });
        }
        roundtrip(&values);

        assert_eq!(choose_shift(&[5, 10, 9, 0], 10), (10, 1));
        assert_eq!(choose_shift(&[5, 10, 8, 0], 10), (10, 0));
        // shifting would lose the top bit, so the average moves instead
        assert_eq!(choose_shift(&[9, 10 + (1 << 62)], 10), (11, 0));
        roundtrip(&[9, 18, 28 + (1 << 62)]);
    }

    #[test]
    fn test_extreme_values() {
        roundtrip(&[u64::MAX]);
        roundtrip(&[0, u64::MAX]);
        roundtrip(&[u64::MAX - 1, u64::MAX, u64::MAX]);
        roundtrip(&[]);
    }

    #[test]
    fn test_multiple_super_blocks() {
        let values: Vec<u64> = (0..20_000u64).map(|i| i * 3 + (i % 7)).collect();
        roundtrip(&values);
    }

    proptest! {
        #[test]
        fn prop_time_roundtrip_sorted(mut values in prop::collection::vec(any::<u64>(), 0..600)) {
            values.sort_unstable();
            let mut buf = Vec::new();
            encode(&mut buf, &values);
            let mut back = vec![0u64; values.len()];
            decode(&mut back, &buf).unwrap();
            prop_assert_eq!(back, values);
        }

        #[test]
        fn prop_time_roundtrip_small_steps(steps in prop::collection::vec(0u64..50, 1..2000)) {
            let values: Vec<u64> = steps
                .iter()
                .scan(1_600_000_000u64, |t, s| { *t += s; Some(*t) })
                .collect();
            let mut buf = Vec::new();
            encode(&mut buf, &values);
            let mut back = vec![0u64; values.len()];
            decode(&mut back, &buf).unwrap();
            prop_assert_eq!(back, values);
        }
    }
}
