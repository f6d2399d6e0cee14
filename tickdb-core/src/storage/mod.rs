//! Storage engine - series files, blobs and the recursive index

mod blob;
mod format;
mod index;
mod series;
mod store;

pub use blob::{BlobHeader, BLOB_OVERHEAD};
pub use format::{FileHeader, Meta, MetaChunkType};
pub use index::{Index, IndexEntry};
pub use series::{Series, SeriesStats};
pub use store::{FileStore, MemStore, Store};

use crate::wal::WalConfig;
use crate::{config, Result, TickError};
use serde::{Deserialize, Serialize};

/// How a series file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    /// Appends allowed, a shadow WAL is kept next to the file
    ReadWrite,
    /// Mapped for reading, writes are refused
    ReadOnly,
}

/// Series configuration
#[derive(Debug, Clone)]
pub struct SeriesConfig {
    /// WAL capacity in rows, a power of two
    pub block_size: usize,
    /// WAL configuration
    pub wal: WalConfig,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            block_size: config::DEFAULT_BLOCK_SIZE,
            wal: WalConfig::default(),
        }
    }
}

impl SeriesConfig {
    /// Configuration with a specific block size
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            block_size,
            ..Default::default()
        }
    }

    /// Check the block size is a power of two within bounds
    pub fn validate(&self) -> Result<()> {
        let z = self.block_size;
        if !z.is_power_of_two() || z < config::MIN_BLOCK_SIZE || z > config::MAX_BLOCK_SIZE {
            return Err(TickError::InvalidFormat(format!(
                "block size {} is not a power of two in {}..={}",
                z,
                config::MIN_BLOCK_SIZE,
                config::MAX_BLOCK_SIZE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_validation() {
        assert!(SeriesConfig::default().validate().is_ok());
        assert!(SeriesConfig::with_block_size(512).validate().is_ok());
        assert!(SeriesConfig::with_block_size(1 << 24).validate().is_ok());
        assert!(SeriesConfig::with_block_size(256).validate().is_err());
        assert!(SeriesConfig::with_block_size(1000).validate().is_err());
        assert!(SeriesConfig::with_block_size(1 << 25).validate().is_err());
    }
}
