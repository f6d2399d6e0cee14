//! Write-Ahead Log (WAL) implementation
//!
//! The WAL is a fixed-capacity buffer of rows that collects ticks until a
//! full block can be compressed into a blob. When the series is attached to
//! a file, the rows live in a memory-mapped shadow file next to it so that
//! unflushed ticks survive a crash and are replayed on the next attach.

mod buffer;
mod header;
mod shadow;

pub use buffer::Wal;
pub use header::ShadowHeader;
pub use shadow::Shadow;

/// WAL sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Sync after every committed row (safest, slowest)
    Immediate,
    /// Sync after N committed rows
    EveryN(usize),
    /// Sync on interval (trades durability for performance)
    Interval { millis: u64 },
    /// Never sync (OS decides, fastest, least safe)
    None,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::None
    }
}

/// WAL configuration
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Keep rows in a shadow file while attached
    pub shadow: bool,
    /// Sync policy for the shadow file
    pub sync_policy: SyncPolicy,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            shadow: true,
            sync_policy: SyncPolicy::default(),
        }
    }
}
