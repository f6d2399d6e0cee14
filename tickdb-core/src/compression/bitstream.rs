//! Bit-level I/O, least significant bit first

/// Bit writer appending to a caller-owned buffer
#[derive(Debug)]
pub(crate) struct BitWriter<'a> {
    buffer: &'a mut Vec<u8>,
    start: usize,
    acc: u128,
    fill: u32,
}

impl<'a> BitWriter<'a> {
    /// Create a new BitWriter appending to `buffer`
    pub fn new(buffer: &'a mut Vec<u8>) -> Self {
        let start = buffer.len();
        Self {
            buffer,
            start,
            acc: 0,
            fill: 0,
        }
    }

    /// Write a single bit
    #[cfg(test)]
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(bit as u64, 1);
    }

    /// Write the low `num_bits` bits of `value`
    #[inline]
    pub fn write_bits(&mut self, value: u64, num_bits: u32) {
        debug_assert!(num_bits <= 64);
        if num_bits == 0 {
            return;
        }
        let masked = (value as u128) & ((1u128 << num_bits) - 1);
        self.acc |= masked << self.fill;
        self.fill += num_bits;

        while self.fill >= 8 {
            self.buffer.push(self.acc as u8);
            self.acc >>= 8;
            self.fill -= 8;
        }
    }

    /// Flush the partial byte, returns the number of bytes appended
    pub fn finish(self) -> usize {
        if self.fill > 0 {
            self.buffer.push(self.acc as u8);
        }
        self.buffer.len() - self.start
    }

    /// Bytes appended so far, counting a partial byte
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.buffer.len() - self.start + usize::from(self.fill > 0)
    }

    /// Check if nothing has been written
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bit reader over a borrowed slice
#[derive(Debug)]
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    bit_position: usize,
}

impl<'a> BitReader<'a> {
    /// Create a new BitReader
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_position: 0,
        }
    }

    /// Read a single bit
    #[cfg(test)]
    #[inline]
    pub fn read_bit(&mut self) -> Option<bool> {
        self.read_bits(1).map(|b| b == 1)
    }

    /// Read `num_bits` bits as a u64
    #[inline]
    pub fn read_bits(&mut self, num_bits: u32) -> Option<u64> {
        debug_assert!(num_bits <= 64);
        if num_bits == 0 {
            return Some(0);
        }
        let end = self.bit_position + num_bits as usize;
        if end > self.data.len() * 8 {
            return None;
        }

        let first = self.bit_position / 8;
        let shift = self.bit_position % 8;
        let last = (end + 7) / 8;

        let mut acc = 0u128;
        for (i, &byte) in self.data[first..last].iter().enumerate() {
            acc |= (byte as u128) << (8 * i);
        }
        self.bit_position = end;

        Some(((acc >> shift) & ((1u128 << num_bits) - 1)) as u64)
    }

    /// Check if there are more bits to read
    #[cfg(test)]
    pub fn has_more(&self) -> bool {
        self.bit_position < self.data.len() * 8
    }

    /// Current position in bits
    #[cfg(test)]
    pub fn position(&self) -> usize {
        self.bit_position
    }

    /// Bytes touched so far, counting a partial byte
    #[cfg(test)]
    pub fn bytes_consumed(&self) -> usize {
        (self.bit_position + 7) / 8
    }
}
