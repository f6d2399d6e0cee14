//! Fixed-capacity row buffer

use super::{Shadow, SyncPolicy, WalConfig};
use crate::transpose::{columnify, Columns, RowShape};
use crate::types::{FieldValue, TimeOffset};
use crate::{Result, TickError};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

enum Rows {
    Memory(Vec<u8>),
    Shadow(Shadow),
}

impl Rows {
    fn bytes(&self) -> &[u8] {
        match self {
            Rows::Memory(v) => v,
            Rows::Shadow(s) => s.rows(),
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Rows::Memory(v) => v,
            Rows::Shadow(s) => s.rows_mut(),
        }
    }
}

/// Row buffer collecting one block of ticks.
///
/// Row `rowi` is the pending row: [`bang`](Wal::bang) writes it,
/// [`advance`](Wal::advance) commits it. Rows `0..rowi` are committed.
pub struct Wal {
    shape: RowShape,
    block_size: usize,
    rowi: usize,
    rows: Rows,
    last_time: Option<TimeOffset>,
    config: WalConfig,
    writes_since_sync: usize,
    last_sync: Instant,
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("layout", &self.shape.layout().to_string())
            .field("block_size", &self.block_size)
            .field("rowi", &self.rowi)
            .field("shadowed", &self.is_shadowed())
            .finish()
    }
}

impl Wal {
    /// Create a memory-backed WAL
    pub fn new(shape: RowShape, block_size: usize, config: WalConfig) -> Self {
        let rows = Rows::Memory(vec![0u8; block_size * shape.row_size()]);
        Self {
            shape,
            block_size,
            rowi: 0,
            rows,
            last_time: None,
            config,
            writes_since_sync: 0,
            last_sync: Instant::now(),
        }
    }

    pub fn shape(&self) -> &RowShape {
        &self.shape
    }

    /// Capacity in rows
    pub fn capacity(&self) -> usize {
        self.block_size
    }

    /// Number of committed rows
    pub fn len(&self) -> usize {
        self.rowi
    }

    pub fn is_empty(&self) -> bool {
        self.rowi == 0
    }

    pub fn is_full(&self) -> bool {
        self.rowi == self.block_size
    }

    pub fn is_shadowed(&self) -> bool {
        matches!(self.rows, Rows::Shadow(_))
    }

    /// Time of the newest committed tick, in the WAL or already flushed
    pub fn last_time(&self) -> Option<TimeOffset> {
        self.last_time
    }

    pub(crate) fn set_last_time(&mut self, time: Option<TimeOffset>) {
        self.last_time = time;
    }

    /// Committed rows, row-major
    pub fn rows(&self) -> &[u8] {
        &self.rows.bytes()[..self.rowi * self.shape.row_size()]
    }

    /// Time offset of committed row `i`
    pub fn time_at(&self, i: usize) -> Option<TimeOffset> {
        if i >= self.rowi {
            return None;
        }
        let rz = self.shape.row_size();
        Some(self.shape.row_time(&self.rows.bytes()[i * rz..(i + 1) * rz]))
    }

    /// Write the pending row without committing it
    pub fn bang(&mut self, time: TimeOffset, fields: &[FieldValue]) -> Result<()> {
        if let Some(last) = self.last_time {
            if time < last {
                return Err(TickError::OutOfOrder { time, last });
            }
        }
        if self.is_full() {
            return Err(TickError::ResourceExhausted(format!(
                "WAL holds {} unflushed rows",
                self.rowi
            )));
        }
        let rz = self.shape.row_size();
        let at = self.rowi * rz;
        let row = &mut self.rows.bytes_mut()[at..at + rz];
        self.shape.write_row(row, time, fields)
    }

    /// Commit the pending row, returns whether the WAL is now full
    pub fn advance(&mut self) -> Result<bool> {
        if self.is_full() {
            return Ok(true);
        }
        let rz = self.shape.row_size();
        let at = self.rowi * rz;
        let time = self.shape.row_time(&self.rows.bytes()[at..at + rz]);
        if let Some(last) = self.last_time {
            if time < last {
                return Err(TickError::OutOfOrder { time, last });
            }
        }
        self.last_time = Some(time);
        self.rowi += 1;
        self.writes_since_sync += 1;

        if let Rows::Shadow(shadow) = &mut self.rows {
            shadow.set_rowi(self.rowi);
        }
        if self.should_sync() {
            self.sync()?;
        }
        Ok(self.is_full())
    }

    /// Append committed rows to `cols`
    pub fn columnify(&self, cols: &mut Columns) -> usize {
        columnify(&self.shape, self.rows(), cols)
    }

    /// Start a new block after a flush, carrying the last row over as the
    /// pending row
    pub fn reset(&mut self) {
        let rz = self.shape.row_size();
        if self.rowi > 0 {
            let last = (self.rowi - 1) * rz;
            self.rows.bytes_mut().copy_within(last..last + rz, 0);
        }
        self.rowi = 0;
        if let Rows::Shadow(shadow) = &mut self.rows {
            shadow.set_rowi(0);
        }
    }

    /// Drop committed rows older than `time`, returns how many were dropped.
    ///
    /// Rows are time ordered, so the dropped rows are a prefix.
    pub(crate) fn discard_before(&mut self, time: TimeOffset) -> Result<usize> {
        let stale = (0..self.rowi)
            .find(|&i| self.time_at(i).is_some_and(|t| t >= time))
            .unwrap_or(self.rowi);
        self.last_time = self.last_time.max(Some(time));
        self.discard(stale)?;
        Ok(stale)
    }

    /// Drop the first `n` committed rows and sync the shadow
    pub(crate) fn discard(&mut self, n: usize) -> Result<()> {
        let n = n.min(self.rowi);
        if n == 0 {
            return Ok(());
        }
        let rz = self.shape.row_size();
        self.rows
            .bytes_mut()
            .copy_within(n * rz..self.rowi * rz, 0);
        self.rowi -= n;
        if let Rows::Shadow(shadow) = &mut self.rows {
            shadow.set_rowi(self.rowi);
        }
        self.sync()
    }

    /// Move rows into the shadow file of `series`.
    ///
    /// Committed rows of a valid shadow are recovered only when the buffer
    /// holds no committed rows itself. Returns the number recovered. On
    /// error the rows stay in memory.
    pub fn attach_shadow(&mut self, series: &Path) -> Result<usize> {
        if self.is_shadowed() || !self.config.shadow {
            return Ok(0);
        }
        let (mut shadow, found) =
            match Shadow::open(series, self.block_size, self.shape.row_size()) {
                Ok(opened) => opened,
                Err(e) => {
                    warn!("Shadow WAL unavailable for {:?}, keeping rows in memory: {}", series, e);
                    return Err(e);
                }
            };

        let recovered = if self.rowi == 0 { found } else { 0 };
        if found > 0 && recovered == 0 {
            warn!("Overwriting {} shadow rows of {:?} with buffered rows", found, series);
        }
        if recovered == 0 {
            let own = self.rows.bytes();
            shadow.rows_mut()[..own.len()].copy_from_slice(own);
            shadow.set_rowi(self.rowi);
        } else {
            self.rowi = recovered;
        }
        self.rows = Rows::Shadow(shadow);

        if recovered > 0 {
            let newest = self.time_at(recovered - 1);
            self.last_time = self.last_time.max(newest);
        }
        debug!("WAL shadowed at {:?} with {} rows", series, self.rowi);
        Ok(recovered)
    }

    /// Move rows back into memory, deleting the shadow file when `remove`
    pub fn detach_shadow(&mut self, remove: bool) -> Result<()> {
        let rows = std::mem::replace(&mut self.rows, Rows::Memory(Vec::new()));
        match rows {
            Rows::Memory(v) => {
                self.rows = Rows::Memory(v);
                Ok(())
            }
            Rows::Shadow(shadow) => {
                self.rows = Rows::Memory(shadow.rows().to_vec());
                if remove {
                    shadow.remove()
                } else {
                    shadow.flush()
                }
            }
        }
    }

    /// Sync the shadow file, if any
    pub fn sync(&mut self) -> Result<()> {
        if let Rows::Shadow(shadow) = &self.rows {
            shadow.flush()?;
        }
        self.writes_since_sync = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    fn should_sync(&self) -> bool {
        if !self.is_shadowed() {
            return false;
        }
        match self.config.sync_policy {
            SyncPolicy::Immediate => true,
            SyncPolicy::EveryN(n) => self.writes_since_sync >= n,
            SyncPolicy::Interval { millis } => {
                self.last_sync.elapsed().as_millis() >= millis as u128
            }
            SyncPolicy::None => false,
        }
    }
}
