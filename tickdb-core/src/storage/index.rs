//! Recursive blob index
//!
//! The index of a series is itself a series with layout `cz`: every blob
//! contributes two rows, `(from, beg, rows)` and `(till, end, rows)`. Once
//! the index series holds enough blobs it indexes itself the same way, and
//! each level is embedded in its parent's file after the meta chunks.

use super::series::Series;
use crate::transpose::Columns;
use crate::types::{ByteRange, FieldValue, TimeRange};
use crate::{Result, TickError};
use serde::{Deserialize, Serialize};

/// Location and time span of one blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// First and last time offset in the blob
    pub time: TimeRange,
    /// Byte range relative to the blob area
    pub bytes: ByteRange,
    /// Number of rows
    pub rows: u64,
}

/// Blob index backed by a nested series
#[derive(Debug)]
pub struct Index {
    series: Series,
}

impl Index {
    /// Create an empty index
    pub fn new() -> Result<Self> {
        Ok(Self {
            series: Series::new_index()?,
        })
    }

    /// Load an index from an embedded file image
    pub fn from_image(image: Vec<u8>) -> Result<Self> {
        Ok(Self {
            series: Series::index_from_image(image)?,
        })
    }

    /// Number of indexed blobs
    pub fn len(&self) -> usize {
        (self.series.len() / 2) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record one blob
    pub fn add(&mut self, entry: &IndexEntry) -> Result<()> {
        self.series.push(
            entry.time.from,
            &[FieldValue::Count(entry.bytes.beg), FieldValue::Size(entry.rows)],
        )?;
        self.series.push(
            entry.time.till,
            &[FieldValue::Count(entry.bytes.end), FieldValue::Size(entry.rows)],
        )
    }

    /// All entries in blob order
    pub fn ranges(&mut self) -> Result<Vec<IndexEntry>> {
        self.lookup(TimeRange::new(0, u64::MAX))
    }

    /// Entries whose time span overlaps `range`
    pub fn lookup(&mut self, range: TimeRange) -> Result<Vec<IndexEntry>> {
        let mut cols = Columns::new(self.series.layout());
        self.series.collect_overlapping(range, &mut cols)?;
        Ok(pair_rows(&cols)?
            .into_iter()
            .filter(|e| e.time.overlaps(&range))
            .collect())
    }

    #[cfg(test)]
    pub(crate) fn series_mut(&mut self) -> &mut Series {
        &mut self.series
    }

    /// Freeze the index series and return its file image
    pub(crate) fn freeze_image(&mut self) -> Result<Vec<u8>> {
        self.series.freeze()?;
        self.series.image()
    }
}

fn count_at(cols: &Columns, row: usize, field: usize) -> Result<u64> {
    match cols.value(row, field) {
        FieldValue::Count(v) | FieldValue::Size(v) => Ok(v),
        other => Err(TickError::Corruption(format!(
            "index row {} holds {:?}",
            row, other
        ))),
    }
}

/// Fold consecutive `(from, beg)` and `(till, end)` rows into entries
fn pair_rows(cols: &Columns) -> Result<Vec<IndexEntry>> {
    if cols.len() % 2 != 0 {
        return Err(TickError::Corruption(format!(
            "index holds an odd number of rows: {}",
            cols.len()
        )));
    }
    let times = cols.times();
    let mut entries = Vec::with_capacity(cols.len() / 2);
    for row in (0..cols.len()).step_by(2) {
        let entry = IndexEntry {
            time: TimeRange::new(times[row], times[row + 1]),
            bytes: ByteRange::new(count_at(cols, row, 0)?, count_at(cols, row + 1, 0)?),
            rows: count_at(cols, row, 1)?,
        };
        if entry.bytes.end < entry.bytes.beg || entry.time.till < entry.time.from {
            return Err(TickError::Corruption(format!("inverted index entry {:?}", entry)));
        }
        entries.push(entry);
    }
    Ok(entries)
}
