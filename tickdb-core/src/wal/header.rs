//! Shadow file header

use crate::{Result, TickError};
use bytes::{Buf, BufMut, BytesMut};

/// Magic bytes shared with series files
pub const MAGIC: &[u8; 4] = b"cots";

/// Shadow WAL format version
pub const VERSION: &[u8; 2] = b"w0";

/// Endian marker as written by this host
pub const ENDIAN: u16 = 0x3c3e;

/// Shadow header, followed by `block_size` rows of `row_size` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowHeader {
    /// Capacity in rows
    pub block_size: u64,
    /// Bytes per row
    pub row_size: u64,
    /// Number of committed rows
    pub rowi: u64,
}

impl ShadowHeader {
    /// Header size in bytes
    pub const SIZE: usize = 32;

    /// Byte offset of `rowi` within the header
    pub const ROWI_OFFSET: usize = 24;

    /// Serialize the header
    ///
    /// Format:
    /// - 4 bytes: magic `cots`
    /// - 2 bytes: version `w0`
    /// - 2 bytes: endian marker
    /// - 8 bytes: block size
    /// - 8 bytes: row size
    /// - 8 bytes: committed rows
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_slice(MAGIC);
        buf.put_slice(VERSION);
        buf.put_u16_ne(ENDIAN);
        buf.put_u64_ne(self.block_size);
        buf.put_u64_ne(self.row_size);
        buf.put_u64_ne(self.rowi);
        buf.to_vec()
    }

    /// Deserialize and validate a header
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(TickError::truncated("shadow header", Self::SIZE, data.len()));
        }
        let mut cursor = std::io::Cursor::new(data);

        let mut magic = [0u8; 4];
        cursor.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(TickError::InvalidFormat("Invalid shadow magic".into()));
        }
        let mut version = [0u8; 2];
        cursor.copy_to_slice(&mut version);
        if &version != VERSION {
            return Err(TickError::InvalidFormat(format!(
                "Unsupported shadow version {:?}",
                String::from_utf8_lossy(&version)
            )));
        }
        if cursor.get_u16_ne() != ENDIAN {
            return Err(TickError::InvalidFormat(
                "Shadow written with foreign byte order".into(),
            ));
        }

        let header = Self {
            block_size: cursor.get_u64_ne(),
            row_size: cursor.get_u64_ne(),
            rowi: cursor.get_u64_ne(),
        };
        if header.rowi > header.block_size {
            return Err(TickError::Corruption(format!(
                "shadow claims {} rows in a block of {}",
                header.rowi, header.block_size
            )));
        }
        Ok(header)
    }

    /// Total file size implied by the header
    pub fn file_size(&self) -> u64 {
        Self::SIZE as u64 + self.block_size * self.row_size
    }
}
