//! TickDB Core - Embedded Columnar Tick Storage
//!
//! An append-mostly storage engine for high-frequency ticks: a monotonic
//! time offset plus a fixed, per-series set of typed fields.
//!
//! # Architecture
//!
//! - **WAL**: fixed-capacity row buffer, optionally shadowed by a mapped file
//! - **Transposer**: row-major WAL records to per-column arrays and back
//! - **Compression**: per-column transforms on top of patched frame-of-reference coding
//! - **Storage**: blobs of compressed columns, header and meta chunks in a single file
//! - **Index**: a nested series recording time and byte ranges per blob
//! - **Obarray**: string interning for tag columns
//!
//! ```no_run
//! use tickdb_core::storage::{OpenMode, Series, SeriesConfig};
//! use tickdb_core::{FieldValue, Layout, Px, Qx};
//!
//! # fn main() -> tickdb_core::Result<()> {
//! let layout = Layout::parse("pq")?;
//! let mut series = Series::new(layout, SeriesConfig::default())?;
//! series.attach("ticks.cots", OpenMode::ReadWrite)?;
//! series.push(1_000, &[Px::from_f32(1.5).into(), Qx::from_f64(100.0).into()])?;
//! series.detach()?;
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod obarray;
pub mod storage;
pub mod transpose;
pub mod wal;

mod error;
mod types;

pub use error::{Result, TickError};
pub use types::*;

/// TickDB version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Default WAL capacity in rows
    pub const DEFAULT_BLOCK_SIZE: usize = 8192;

    /// Smallest WAL capacity
    pub const MIN_BLOCK_SIZE: usize = 512;

    /// Largest WAL capacity
    pub const MAX_BLOCK_SIZE: usize = 1 << 24;

    /// WAL capacity of index series
    pub const INDEX_BLOCK_SIZE: usize = 512;

    /// Layout of index series: byte offset, row count
    pub const INDEX_LAYOUT: &str = "cz";

    /// Minimum blobs before an index series indexes itself
    pub const INDEX_NEST_THRESHOLD: usize = 2;

    /// Suffix of the shadow WAL file
    pub const SHADOW_SUFFIX: &str = ".wal";
}
