//! Error types for TickDB

use thiserror::Error;

/// Result type alias for TickDB operations
pub type Result<T> = std::result::Result<T, TickError>;

/// TickDB error types
#[derive(Error, Debug)]
pub enum TickError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Tick older than the last committed time offset
    #[error("Tick out of order: time {time} is before last committed time {last}")]
    OutOfOrder { time: u64, last: u64 },

    /// Tick fields do not match the series layout
    #[error("Field mismatch: {0}")]
    FieldMismatch(String),

    /// Layout string contains an unsupported field code
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    /// Invalid file format (magic, version, endianness)
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Layout stored in a file differs from the series layout
    #[error("Layout mismatch: series has {expected:?}, file has {actual:?}")]
    LayoutMismatch { expected: String, actual: String },

    /// Data corruption detected while decoding
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Checksum mismatch on a blob trailer
    #[error("Checksum mismatch: expected {expected:#08x}, got {actual:#08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Scratch buffer or mapping could not be provisioned
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Write attempted on a read-only series
    #[error("Series is read-only")]
    ReadOnly,
}

impl TickError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, TickError::Io(_) | TickError::ResourceExhausted(_))
    }

    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            TickError::Corruption(_) | TickError::ChecksumMismatch { .. }
        )
    }

    pub(crate) fn truncated(what: &str, need: usize, have: usize) -> Self {
        TickError::Corruption(format!(
            "{} truncated: need {} bytes, have {}",
            what, need, have
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let io = TickError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.is_retryable());
        assert!(!io.is_corruption());

        let crc = TickError::ChecksumMismatch {
            expected: 1,
            actual: 2,
        };
        assert!(crc.is_corruption());
        assert!(!crc.is_retryable());

        let ooo = TickError::OutOfOrder { time: 1, last: 2 };
        assert!(!ooo.is_retryable());
        assert!(ooo.to_string().contains("before last committed"));
    }
}
