//! Tag code codec: XOR-delta followed by PFOR

use super::pfor;
use crate::Result;

/// Encode tag codes, returns bytes written
pub fn encode(out: &mut Vec<u8>, values: &[u64]) -> usize {
    let mut prev = 0u64;
    let deltas: Vec<u64> = values
        .iter()
        .map(|&v| {
            let d = v ^ prev;
            prev = v;
            d
        })
        .collect();
    pfor::encode(out, &deltas)
}

/// Decode `out.len()` tag codes, returns bytes consumed
pub fn decode(out: &mut [u64], input: &[u8]) -> Result<usize> {
    let consumed = pfor::decode(out, input)?;
    let mut acc = 0u64;
    for v in out.iter_mut() {
        acc ^= *v;
        *v = acc;
    }
    Ok(consumed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_few_distinct_tags() {
        let values: Vec<u64> = (0..5000u64).map(|i| 1 + (i / 7) % 3).collect();
        let mut buf = Vec::new();
        let written = encode(&mut buf, &values);
        // deltas fit in two bits
        assert!(written < 5000 / 3);

        let mut back = vec![0u64; values.len()];
        assert_eq!(decode(&mut back, &buf).unwrap(), written);
        assert_eq!(back, values);
    }

    #[test]
    fn test_constant_tag() {
        let values = vec![9u64; 300];
        let mut buf = Vec::new();
        encode(&mut buf, &values);
        let mut back = vec![0u64; 300];
        decode(&mut back, &buf).unwrap();
        assert_eq!(back, values);
    }
}
