//! Series file header and meta chunks
//!
//! ```text
//! header : "cots" "v1" endian:u16 flags:u64 BE meta_offset:u64 BE
//!          next_section:u64 BE layout 0x00
//! meta   : ((len << 8) | type):u64 BE payload, repeated
//! ```
//!
//! Offsets count from the end of the header. Blobs occupy
//! `0..meta_offset`, meta chunks `meta_offset..next_section`, and an
//! embedded index file, if any, starts at `next_section`.

use crate::types::Layout;
use crate::{Result, TickError};
use bytes::{Buf, BufMut, BytesMut};
use tracing::debug;

/// File magic
pub const MAGIC: &[u8; 4] = b"cots";

/// File format version
pub const VERSION: &[u8; 2] = b"v1";

/// Endian marker as written by this host
pub const ENDIAN: u16 = 0x3c3e;

/// Flag bits holding `log2(block_size) - 9`
const BLOCK_SIZE_MASK: u64 = 0xf;

/// Fixed part of the header before the layout string
const FIXED_SIZE: usize = 4 + 2 + 2 + 8 + 8 + 8;

/// Series file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Format flags
    pub flags: u64,
    /// End of the blob area
    pub meta_offset: u64,
    /// End of the meta area
    pub next_section: u64,
    /// Field layout
    pub layout: Layout,
}

impl FileHeader {
    /// Header for an empty file
    pub fn new(layout: &Layout, block_size: usize) -> Self {
        let shift = block_size.trailing_zeros() as u64;
        Self {
            flags: shift.saturating_sub(9) & BLOCK_SIZE_MASK,
            meta_offset: 0,
            next_section: 0,
            layout: layout.clone(),
        }
    }

    /// WAL block size recorded in the flags
    pub fn block_size(&self) -> usize {
        1 << ((self.flags & BLOCK_SIZE_MASK) + 9)
    }

    /// Size of the serialized header
    pub fn encoded_len(&self) -> usize {
        FIXED_SIZE + self.layout.len() + 1
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(MAGIC);
        buf.put_slice(VERSION);
        buf.put_u16_ne(ENDIAN);
        buf.put_u64(self.flags);
        buf.put_u64(self.meta_offset);
        buf.put_u64(self.next_section);
        buf.put_slice(self.layout.to_string().as_bytes());
        buf.put_u8(0);
        buf.to_vec()
    }

    /// Deserialize from the start of a file, validating magic, version and
    /// byte order
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < FIXED_SIZE {
            return Err(TickError::InvalidFormat(format!(
                "File too short for a header: {} bytes",
                data.len()
            )));
        }
        let mut cursor = std::io::Cursor::new(data);

        let mut magic = [0u8; 4];
        cursor.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(TickError::InvalidFormat("Invalid file magic".into()));
        }
        let mut version = [0u8; 2];
        cursor.copy_to_slice(&mut version);
        if &version != VERSION {
            return Err(TickError::InvalidFormat(format!(
                "Unsupported format version {:?}",
                String::from_utf8_lossy(&version)
            )));
        }
        let endian = cursor.get_u16_ne();
        if endian != ENDIAN {
            return Err(TickError::InvalidFormat(format!(
                "File written with foreign byte order (marker {:#06x})",
                endian
            )));
        }

        let flags = cursor.get_u64();
        let meta_offset = cursor.get_u64();
        let next_section = cursor.get_u64();
        if next_section < meta_offset {
            return Err(TickError::Corruption(format!(
                "meta area ends at {} before it starts at {}",
                next_section, meta_offset
            )));
        }

        let rest = &data[FIXED_SIZE..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| TickError::InvalidFormat("Unterminated layout in header".into()))?;
        let layout = std::str::from_utf8(&rest[..nul])
            .map_err(|e| TickError::InvalidFormat(format!("Layout not ASCII: {}", e)))?;

        Ok(Self {
            flags,
            meta_offset,
            next_section,
            layout: Layout::parse(layout)?,
        })
    }
}

/// Meta chunk types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MetaChunkType {
    /// Field names, nul-terminated
    Fields = b'F',
    /// Obarray strings, nul-terminated
    Obarray = b'O',
}

impl TryFrom<u8> for MetaChunkType {
    type Error = TickError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            b'F' => Ok(MetaChunkType::Fields),
            b'O' => Ok(MetaChunkType::Obarray),
            _ => Err(TickError::InvalidFormat(format!(
                "Invalid meta chunk type: {:#04x}",
                value
            ))),
        }
    }
}

/// Contents of the meta area
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    /// Field names, time field first
    pub fields: Vec<String>,
    /// Serialized obarray
    pub obarray: Vec<u8>,
}

impl Meta {
    /// Serialize all non-empty chunks
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        if !self.fields.is_empty() {
            let len: usize = self.fields.iter().map(|f| f.len() + 1).sum();
            put_chunk_word(&mut buf, len, MetaChunkType::Fields);
            for name in &self.fields {
                buf.put_slice(name.as_bytes());
                buf.put_u8(0);
            }
        }
        if !self.obarray.is_empty() {
            put_chunk_word(&mut buf, self.obarray.len(), MetaChunkType::Obarray);
            buf.put_slice(&self.obarray);
        }
        buf.to_vec()
    }

    /// Parse the meta area; unknown chunk types are skipped
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut meta = Meta::default();
        let mut cursor = std::io::Cursor::new(data);

        while cursor.has_remaining() {
            if cursor.remaining() < 8 {
                return Err(TickError::truncated("meta chunk word", 8, cursor.remaining()));
            }
            let word = cursor.get_u64();
            let len = (word >> 8) as usize;
            if cursor.remaining() < len {
                return Err(TickError::truncated("meta chunk", len, cursor.remaining()));
            }
            let at = cursor.position() as usize;
            let payload = &data[at..at + len];
            cursor.advance(len);

            match MetaChunkType::try_from(word as u8) {
                Ok(MetaChunkType::Fields) => {
                    meta.fields = payload
                        .split(|&b| b == 0)
                        .filter(|n| !n.is_empty())
                        .map(|n| String::from_utf8_lossy(n).into_owned())
                        .collect();
                }
                Ok(MetaChunkType::Obarray) => meta.obarray = payload.to_vec(),
                Err(e) => debug!("Skipping meta chunk: {}", e),
            }
        }
        Ok(meta)
    }
}

fn put_chunk_word(buf: &mut BytesMut, len: usize, ty: MetaChunkType) {
    buf.put_u64(((len as u64) << 8) | ty as u64);
}
