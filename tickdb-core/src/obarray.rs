//! String interning for tag columns
//!
//! Strings map to dense 1-based codes in insertion order; code 0 stands for
//! the empty string. Interned text is kept in one buffer of nul-terminated
//! strings, which doubles as the on-disk representation. Lookup is open
//! addressing over xxh3 hashes with linear probing.

use crate::types::TagCode;
use crate::{Result, TickError};
use xxhash_rust::xxh3::xxh3_64;

/// Minimum number of hash slots
const MIN_SLOTS: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    /// 0 marks a free slot
    code: TagCode,
    hash: u64,
}

/// Append-only string <-> code table
#[derive(Debug, Clone)]
pub struct Obarray {
    strings: Vec<u8>,
    /// Start of string `code - 1` in `strings`
    offsets: Vec<usize>,
    slots: Vec<Slot>,
}

impl Default for Obarray {
    fn default() -> Self {
        Self::new()
    }
}

impl Obarray {
    pub fn new() -> Self {
        Self {
            strings: Vec::new(),
            offsets: Vec::new(),
            slots: vec![Slot::default(); MIN_SLOTS],
        }
    }

    /// Number of interned strings
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Intern `s`, returning its stable code.
    ///
    /// Text after an embedded nul is ignored.
    pub fn intern(&mut self, s: &str) -> TagCode {
        let s = s.split('\0').next().unwrap_or_default();
        if s.is_empty() {
            return 0;
        }
        let hash = xxh3_64(s.as_bytes());
        match self.find_slot(s, hash) {
            Ok(code) => code,
            Err(mut slot) => {
                if (self.len() + 1) * 2 > self.slots.len() {
                    self.grow();
                    slot = match self.find_slot(s, hash) {
                        Ok(code) => return code,
                        Err(slot) => slot,
                    };
                }
                let code = self.push_string(s);
                self.slots[slot] = Slot { code, hash };
                code
            }
        }
    }

    /// Code of `s` if interned, truncating at a nul like [`intern`](Self::intern)
    pub fn lookup(&self, s: &str) -> Option<TagCode> {
        let s = s.split('\0').next().unwrap_or_default();
        if s.is_empty() {
            return Some(0);
        }
        self.find_slot(s, xxh3_64(s.as_bytes())).ok()
    }

    /// String for `code`; code 0 yields the empty string
    pub fn name(&self, code: TagCode) -> Option<&str> {
        if code == 0 {
            return Some("");
        }
        let i = usize::try_from(code).ok()?.checked_sub(1)?;
        let beg = *self.offsets.get(i)?;
        let end = self.offsets.get(i + 1).copied().unwrap_or(self.strings.len());
        // strip the terminating nul
        std::str::from_utf8(&self.strings[beg..end - 1]).ok()
    }

    /// Iterate `(code, string)` in code order
    pub fn iter(&self) -> impl Iterator<Item = (TagCode, &str)> + '_ {
        (1..=self.len() as TagCode).filter_map(move |code| Some((code, self.name(code)?)))
    }

    /// Serialized form: every string nul-terminated, in code order
    pub fn to_bytes(&self) -> Vec<u8> {
        self.strings.clone()
    }

    /// Rebuild from [`to_bytes`](Self::to_bytes) output
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if let Some(&last) = bytes.last() {
            if last != 0 {
                return Err(TickError::Corruption(
                    "obarray not nul-terminated".into(),
                ));
            }
        }
        let mut ob = Self::new();
        for raw in bytes.split(|&b| b == 0).filter(|r| !r.is_empty()) {
            let s = std::str::from_utf8(raw)
                .map_err(|e| TickError::Corruption(format!("obarray string: {}", e)))?;
            let expected = ob.len() as TagCode + 1;
            if ob.intern(s) != expected {
                return Err(TickError::Corruption(format!(
                    "obarray string {:?} interned twice",
                    s
                )));
            }
        }
        Ok(ob)
    }

    /// `Ok(code)` if present, else `Err(free slot)`
    fn find_slot(&self, s: &str, hash: u64) -> std::result::Result<TagCode, usize> {
        let mask = self.slots.len() - 1;
        let mut i = hash as usize & mask;
        loop {
            let slot = self.slots[i];
            if slot.code == 0 {
                return Err(i);
            }
            if slot.hash == hash && self.name(slot.code) == Some(s) {
                return Ok(slot.code);
            }
            i = (i + 1) & mask;
        }
    }

    fn grow(&mut self) {
        let size = self.slots.len() * 2;
        let mut slots = vec![Slot::default(); size];
        let mask = size - 1;
        for slot in self.slots.iter().filter(|s| s.code != 0) {
            let mut i = slot.hash as usize & mask;
            while slots[i].code != 0 {
                i = (i + 1) & mask;
            }
            slots[i] = *slot;
        }
        self.slots = slots;
    }

    fn push_string(&mut self, s: &str) -> TagCode {
        self.offsets.push(self.strings.len());
        self.strings.extend_from_slice(s.as_bytes());
        self.strings.push(0);
        self.offsets.len() as TagCode
    }
}
