//! Series engine
//!
//! A [`Series`] owns a WAL, a byte store holding header, blobs and meta
//! chunks, an obarray and a nested [`Index`]. Unattached series keep their
//! blobs in memory; attaching migrates them into a file.

use super::blob::{self, BlobHeader};
use super::format::{FileHeader, Meta};
use super::index::{Index, IndexEntry};
use super::store::{FileStore, MemStore, Store};
use super::{OpenMode, SeriesConfig};
use crate::obarray::Obarray;
use crate::transpose::{Column, Columns, RowShape};
use crate::types::{ByteRange, FieldType, FieldValue, Layout, TagCode, Tick, TimeOffset, TimeRange};
use crate::wal::{Wal, WalConfig};
use crate::{config, Result, TickError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Everything tied to one store: file or memory
#[derive(Debug)]
struct Backing {
    store: Box<dyn Store>,
    header: FileHeader,
    header_len: u64,
    attached: Option<(PathBuf, OpenMode)>,
    index: Option<Box<Index>>,
    obarray: Obarray,
    blobs: usize,
    rows: u64,
}

/// A freshly loaded backing plus what the series adopts from it
struct Loaded {
    backing: Backing,
    fields: Vec<String>,
    last_time: Option<TimeOffset>,
}

impl Backing {
    /// Empty backing over `store`, header written
    fn create(mut store: Box<dyn Store>, layout: &Layout, block_size: usize) -> Result<Self> {
        let header = FileHeader::new(layout, block_size);
        let bytes = header.to_bytes();
        store.truncate(0)?;
        store.write_at(0, &bytes)?;
        Ok(Self {
            store,
            header,
            header_len: bytes.len() as u64,
            attached: None,
            index: None,
            obarray: Obarray::new(),
            blobs: 0,
            rows: 0,
        })
    }

    fn memory(layout: &Layout, block_size: usize) -> Result<Self> {
        Self::create(Box::new(MemStore::new()), layout, block_size)
    }

    /// Load an existing image from `store`
    fn load(
        mut store: Box<dyn Store>,
        layout: &Layout,
        block_size: usize,
        nest_threshold: usize,
    ) -> Result<Loaded> {
        let len = store.len();
        let header = FileHeader::from_bytes(store.view(0, len)?)?;
        if &header.layout != layout {
            return Err(TickError::LayoutMismatch {
                expected: layout.to_string(),
                actual: header.layout.to_string(),
            });
        }
        if header.block_size() != block_size {
            return Err(TickError::InvalidFormat(format!(
                "file block size {} differs from series block size {}",
                header.block_size(),
                block_size
            )));
        }

        let header_len = header.encoded_len() as u64;
        let end = header_len
            .checked_add(header.next_section)
            .filter(|&end| end <= len)
            .ok_or_else(|| {
                TickError::Corruption(format!(
                    "file of {} bytes ends inside its meta area at {} past the header",
                    len, header.next_section
                ))
            })?;
        let meta_at = header_len + header.meta_offset;
        let meta = Meta::from_bytes(store.view(meta_at, end - meta_at)?)?;
        let obarray = Obarray::from_bytes(&meta.obarray)?;

        let mut backing = Self {
            store,
            header,
            header_len,
            attached: None,
            index: None,
            obarray,
            blobs: 0,
            rows: 0,
        };

        let ranges = backing.scan_blobs()?;
        for range in &ranges {
            let head = BlobHeader::parse(backing.blob_bytes(*range)?)?;
            backing.rows += head.rows as u64;
        }
        backing.blobs = ranges.len();

        if len > end {
            let image = backing.store.view(end, len - end)?.to_vec();
            let index = Index::from_image(image)?;
            if index.len() == backing.blobs {
                backing.index = Some(Box::new(index));
            } else {
                warn!(
                    "Embedded index holds {} entries for {} blobs, rebuilding",
                    index.len(),
                    backing.blobs
                );
            }
        }
        if backing.index.is_none() && backing.blobs >= nest_threshold {
            debug!("Rebuilding index over {} blobs", backing.blobs);
            backing.build_index()?;
        }

        let last_time = match ranges.last() {
            Some(&range) => Some(blob::time_bounds(backing.blob_bytes(range)?)?.0.till),
            None => None,
        };

        Ok(Loaded {
            backing,
            fields: meta.fields,
            last_time,
        })
    }

    fn is_read_only(&self) -> bool {
        matches!(self.attached, Some((_, OpenMode::ReadOnly)))
    }

    /// Bytes of the blob at `range`, relative to the blob area
    fn blob_bytes(&mut self, range: ByteRange) -> Result<&[u8]> {
        self.store.view(self.header_len + range.beg, range.len())
    }

    /// Walk the blob framing words
    fn scan_blobs(&mut self) -> Result<Vec<ByteRange>> {
        let mut ranges = Vec::new();
        let mut at = 0u64;
        while at < self.header.meta_offset {
            let avail = self.header.meta_offset - at;
            let head = BlobHeader::parse(self.store.view(self.header_len + at, avail.min(8))?)?;
            if head.size > avail {
                return Err(TickError::Corruption(format!(
                    "blob at {} claims {} bytes, {} left before meta",
                    at, head.size, avail
                )));
            }
            ranges.push(ByteRange::new(at, at + head.size));
            at += head.size;
        }
        Ok(ranges)
    }

    /// Index entries recomputed from the blobs themselves
    fn scan_entries(&mut self) -> Result<Vec<IndexEntry>> {
        let ranges = self.scan_blobs()?;
        let mut entries = Vec::with_capacity(ranges.len());
        for range in ranges {
            let (time, rows) = blob::time_bounds(self.blob_bytes(range)?)?;
            entries.push(IndexEntry {
                time,
                bytes: range,
                rows: rows as u64,
            });
        }
        Ok(entries)
    }

    fn build_index(&mut self) -> Result<()> {
        let mut index = Index::new()?;
        for entry in self.scan_entries()? {
            index.add(&entry)?;
        }
        self.index = Some(Box::new(index));
        Ok(())
    }

    /// Record a freshly written blob
    fn index_blob(&mut self, entry: &IndexEntry, nest_threshold: usize) -> Result<()> {
        match self.index.as_mut() {
            Some(index) => index.add(entry),
            None if self.blobs >= nest_threshold => self.build_index(),
            None => Ok(()),
        }
    }

    /// Blob ranges overlapping `range`, using the index when there is one
    fn blobs_overlapping(&mut self, range: TimeRange) -> Result<Vec<ByteRange>> {
        match self.index.as_mut() {
            Some(index) => Ok(index.lookup(range)?.into_iter().map(|e| e.bytes).collect()),
            None => self.scan_blobs(),
        }
    }

    /// Rewrite meta chunks and header, cutting the store after them
    fn write_meta(&mut self, fields: &[String]) -> Result<()> {
        let meta = Meta {
            fields: fields.to_vec(),
            obarray: self.obarray.to_bytes(),
        }
        .to_bytes();
        let at = self.header_len + self.header.meta_offset;
        self.store.write_at(at, &meta)?;
        self.header.next_section = self.header.meta_offset + meta.len() as u64;
        self.store.write_at(0, &self.header.to_bytes())?;
        self.store.truncate(at + meta.len() as u64)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ReadCursor {
    /// Next blob, relative to the blob area
    offset: u64,
    wal_done: bool,
}

/// Summary of a series
#[derive(Debug, Clone, Serialize)]
pub struct SeriesStats {
    pub layout: String,
    pub block_size: usize,
    pub path: Option<PathBuf>,
    pub read_only: bool,
    /// Number of blobs written
    pub blobs: usize,
    /// Rows in blobs
    pub rows_flushed: u64,
    /// Rows still in the WAL
    pub rows_pending: usize,
    /// Bytes taken by blobs
    pub blob_bytes: u64,
    /// Row-major bytes the blobs stand for
    pub raw_bytes: u64,
    /// Total store size
    pub store_bytes: u64,
    pub index_entries: usize,
    pub tags: usize,
    pub last_time: Option<TimeOffset>,
}

impl SeriesStats {
    /// Get compression ratio of the flushed rows
    pub fn compression_ratio(&self) -> f64 {
        if self.blob_bytes == 0 {
            return 0.0;
        }
        self.raw_bytes as f64 / self.blob_bytes as f64
    }
}

/// A tick series: WAL, blobs, index and obarray
#[derive(Debug)]
pub struct Series {
    layout: Layout,
    config: SeriesConfig,
    wal: Wal,
    backing: Backing,
    field_names: Vec<String>,
    cursor: ReadCursor,
    /// Blobs needed before this series indexes itself
    nest_threshold: usize,
}

impl Series {
    /// Create an unattached series backed by memory
    pub fn new(layout: Layout, config: SeriesConfig) -> Result<Self> {
        Self::build(layout, config, 1)
    }

    fn build(layout: Layout, config: SeriesConfig, nest_threshold: usize) -> Result<Self> {
        config.validate()?;
        let wal = Wal::new(RowShape::new(&layout), config.block_size, config.wal.clone());
        let backing = Backing::memory(&layout, config.block_size)?;
        Ok(Self {
            layout,
            config,
            wal,
            backing,
            field_names: Vec::new(),
            cursor: ReadCursor::default(),
            nest_threshold,
        })
    }

    /// Series for an index level
    pub(crate) fn new_index() -> Result<Self> {
        let config = SeriesConfig {
            block_size: config::INDEX_BLOCK_SIZE,
            wal: WalConfig {
                shadow: false,
                ..Default::default()
            },
        };
        Self::build(
            Layout::parse(config::INDEX_LAYOUT)?,
            config,
            config::INDEX_NEST_THRESHOLD,
        )
    }

    /// Index level loaded from an embedded image
    pub(crate) fn index_from_image(image: Vec<u8>) -> Result<Self> {
        let mut series = Self::new_index()?;
        let loaded = Backing::load(
            Box::new(MemStore::from_bytes(image)),
            &series.layout,
            series.config.block_size,
            series.nest_threshold,
        )?;
        series.install(loaded);
        Ok(series)
    }

    /// Open an existing file, taking layout and block size from its header
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        Self::open_with(path, mode, WalConfig::default())
    }

    /// Like [`open`](Self::open) with a custom WAL configuration
    pub fn open_with<P: AsRef<Path>>(path: P, mode: OpenMode, wal: WalConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut store = FileStore::open(path, mode)?;
        let len = store.len();
        let header = FileHeader::from_bytes(store.view(0, len)?)?;
        let config = SeriesConfig {
            block_size: header.block_size(),
            wal,
        };
        let mut series = Self::new(header.layout, config)?;
        series.attach_store(Box::new(store), path, mode)?;
        Ok(series)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// Backing file, if attached
    pub fn path(&self) -> Option<&Path> {
        self.backing.attached.as_ref().map(|(p, _)| p.as_path())
    }

    pub fn mode(&self) -> Option<OpenMode> {
        self.backing.attached.as_ref().map(|(_, m)| *m)
    }

    pub fn is_attached(&self) -> bool {
        self.backing.attached.is_some()
    }

    pub fn is_read_only(&self) -> bool {
        self.backing.is_read_only()
    }

    /// Total rows, flushed and pending
    pub fn len(&self) -> u64 {
        self.backing.rows + self.wal.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time of the newest committed tick
    pub fn last_time(&self) -> Option<TimeOffset> {
        self.wal.last_time()
    }

    fn has_data(&self) -> bool {
        self.backing.blobs > 0 || !self.wal.is_empty()
    }

    fn writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(TickError::ReadOnly);
        }
        Ok(())
    }

    /// Write the pending tick without committing it
    pub fn bang(&mut self, time: TimeOffset, fields: &[FieldValue]) -> Result<()> {
        self.writable()?;
        if self.wal.is_full() {
            // a flush that failed earlier gets another chance
            self.flush()?;
        }
        self.wal.bang(time, fields)
    }

    /// Commit the pending tick, flushing when the WAL fills up
    pub fn keep_last(&mut self) -> Result<()> {
        self.writable()?;
        if self.wal.advance()? {
            self.flush()?;
        }
        Ok(())
    }

    /// Write and commit one tick
    pub fn push(&mut self, time: TimeOffset, fields: &[FieldValue]) -> Result<()> {
        self.bang(time, fields)?;
        self.keep_last()
    }

    pub fn push_tick(&mut self, tick: &Tick) -> Result<()> {
        self.push(tick.time, &tick.fields)
    }

    /// Compress the WAL into a blob
    pub fn flush(&mut self) -> Result<()> {
        if self.wal.is_empty() {
            return Ok(());
        }
        self.writable()?;

        let mut cols = Columns::with_capacity(&self.layout, self.wal.len());
        self.wal.columnify(&mut cols);
        self.write_block(&cols)?;
        self.wal.reset();
        self.wal.sync()
    }

    /// Append `cols` as one blob and index it
    fn write_block(&mut self, cols: &Columns) -> Result<()> {
        let (bytes, stats) = blob::encode(cols)?;
        let beg = self.backing.header.meta_offset;
        let end = beg + bytes.len() as u64;

        if let Err(e) = self.commit_blob(&bytes, end) {
            warn!("Flush of {} rows failed, rolling back: {}", cols.len(), e);
            self.backing.header.meta_offset = beg;
            if let Err(e) = self.backing.write_meta(&self.field_names) {
                warn!("Could not restore meta after failed flush: {}", e);
            }
            return Err(e);
        }
        self.backing.blobs += 1;
        self.backing.rows += cols.len() as u64;

        let times = cols.times();
        let time = TimeRange::new(times[0], times[times.len() - 1]);
        self.wal.set_last_time(self.wal.last_time().max(Some(time.till)));

        let entry = IndexEntry {
            time,
            bytes: ByteRange::new(beg, end),
            rows: cols.len() as u64,
        };
        // the blob is durable; a dropped index is rebuilt by scanning
        if let Err(e) = self.backing.index_blob(&entry, self.nest_threshold) {
            warn!("Indexing blob at {} failed, dropping the index: {}", beg, e);
            self.backing.index = None;
        }

        debug!(
            "Flushed {} rows into {} bytes ({:.2}x) at {}",
            stats.rows,
            stats.encoded_bytes,
            stats.compression_ratio(),
            beg
        );
        Ok(())
    }

    fn commit_blob(&mut self, bytes: &[u8], end: u64) -> Result<()> {
        let at = self.backing.header_len + self.backing.header.meta_offset;
        self.backing.store.write_at(at, bytes)?;
        self.backing.header.meta_offset = end;
        self.backing.write_meta(&self.field_names)?;
        self.backing.store.sync()
    }

    /// Flush, then append the index image and sync
    pub fn freeze(&mut self) -> Result<()> {
        if self.is_read_only() {
            return Ok(());
        }
        self.flush()?;
        self.backing.write_meta(&self.field_names)?;

        if let Some(index) = self.backing.index.as_mut() {
            let image = index.freeze_image()?;
            let at = self.backing.header_len + self.backing.header.next_section;
            self.backing.store.write_at(at, &image)?;
            self.backing.store.truncate(at + image.len() as u64)?;
        }
        self.backing.store.sync()?;
        self.wal.sync()
    }

    /// Complete file image of this series
    pub(crate) fn image(&mut self) -> Result<Vec<u8>> {
        self.backing.store.image()
    }

    /// Attach to a file.
    ///
    /// An attached series is frozen and detached first. Ticks held in memory
    /// are appended to the file; they must not predate its last tick. Their
    /// tag codes are re-interned into the file's obarray, see [`tag`](Self::tag).
    pub fn attach<P: AsRef<Path>>(&mut self, path: P, mode: OpenMode) -> Result<()> {
        let path = path.as_ref();
        if self.is_attached() {
            self.detach()?;
        }
        if mode == OpenMode::ReadOnly && self.has_data() {
            return Err(TickError::ReadOnly);
        }
        let store = FileStore::open(path, mode)?;
        self.attach_store(Box::new(store), path, mode)
    }

    fn attach_store(&mut self, store: Box<dyn Store>, path: &Path, mode: OpenMode) -> Result<()> {
        self.flush()?;

        let mut loaded = if store.is_empty() {
            if mode == OpenMode::ReadOnly {
                return Err(TickError::InvalidFormat(format!("{:?} is empty", path)));
            }
            Loaded {
                backing: Backing::create(store, &self.layout, self.config.block_size)?,
                fields: Vec::new(),
                last_time: None,
            }
        } else {
            Backing::load(store, &self.layout, self.config.block_size, self.nest_threshold)?
        };
        loaded.backing.attached = Some((path.to_path_buf(), mode));

        let old_first = match self.backing.scan_blobs()?.first() {
            Some(&range) => Some(blob::time_bounds(self.backing.blob_bytes(range)?)?.0.from),
            None => None,
        };
        if let (Some(first), Some(last)) = (old_first, loaded.last_time) {
            if first < last {
                return Err(TickError::OutOfOrder { time: first, last });
            }
        }

        let old_last = self.wal.last_time();
        let blobs_in_file = loaded.backing.blobs;
        let file_last = loaded.last_time;
        let old = self.install(loaded);

        if mode == OpenMode::ReadWrite {
            match self.wal.attach_shadow(path) {
                Ok(recovered) if recovered > 0 => {
                    // rows already in the file cannot be appended again
                    let stale = if self.wal_repeats_last_blob()? {
                        let n = self.wal.len();
                        self.wal.discard(n)?;
                        n
                    } else {
                        match file_last {
                            Some(last) => self.wal.discard_before(last)?,
                            None => 0,
                        }
                    };
                    if stale > 0 {
                        warn!(
                            "Dropped {} replayed WAL rows already covered by {:?}",
                            stale, path
                        );
                    }
                    info!("Replayed {} WAL rows into {:?}", recovered - stale, path);
                    if old.blobs > 0 {
                        self.flush()?;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Continuing without shadow WAL for {:?}: {}", path, e),
            }
        }

        if let (Some(first), Some(last)) = (old_first, self.wal.last_time()) {
            if first < last {
                // replayed rows overlap the buffered ones
                let err = TickError::OutOfOrder { time: first, last };
                self.detach()?;
                self.backing = old;
                self.wal.set_last_time(old_last);
                return Err(err);
            }
        }

        let migrated = old.blobs;
        if migrated > 0 {
            self.migrate(old)?;
        }
        if mode == OpenMode::ReadWrite && !self.field_names.is_empty() {
            self.backing.write_meta(&self.field_names)?;
        }

        info!(
            "Attached {:?} ({:?}): {} blobs in file, {} migrated",
            path, mode, blobs_in_file, migrated
        );
        Ok(())
    }

    /// Whether the WAL rows are a copy of the last blob, as left behind by a
    /// crash between committing a blob and resetting the shadow
    fn wal_repeats_last_blob(&mut self) -> Result<bool> {
        let range = match self.backing.scan_blobs()?.last() {
            Some(&range) => range,
            None => return Ok(false),
        };
        let bytes = self.backing.blob_bytes(range)?;
        if blob::time_bounds(bytes)?.1 != self.wal.len() {
            return Ok(false);
        }
        let mut last = Columns::with_capacity(&self.layout, self.wal.len());
        blob::decode(bytes, &mut last)?;
        let mut pending = Columns::with_capacity(&self.layout, self.wal.len());
        self.wal.columnify(&mut pending);
        Ok(last == pending)
    }

    /// Swap in a loaded backing, returning the previous one
    fn install(&mut self, loaded: Loaded) -> Backing {
        if self.field_names.is_empty() {
            self.field_names = loaded.fields;
        }
        self.wal.set_last_time(loaded.last_time);
        self.cursor = ReadCursor::default();
        std::mem::replace(&mut self.backing, loaded.backing)
    }

    /// Re-encode the blobs of a memory backing into the current store
    fn migrate(&mut self, mut old: Backing) -> Result<()> {
        for (_, name) in old.obarray.iter() {
            self.backing.obarray.intern(name);
        }
        let tag_fields: Vec<usize> = self
            .layout
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, ty)| **ty == FieldType::Tag)
            .map(|(i, _)| i)
            .collect();

        for range in old.scan_blobs()? {
            let mut cols = Columns::new(&self.layout);
            blob::decode(old.blob_bytes(range)?, &mut cols)?;
            for &f in &tag_fields {
                if let Column::Longs(codes) = cols.column_mut(f) {
                    for code in codes.iter_mut() {
                        if let Some(name) = old.obarray.name(*code) {
                            *code = self.backing.obarray.lookup(name).unwrap_or(*code);
                        }
                    }
                }
            }
            self.write_block(&cols)?;
        }
        Ok(())
    }

    /// Freeze, close the file and drop its shadow WAL.
    ///
    /// Afterwards the series is empty and unattached. On failure the series
    /// stays attached and the shadow is kept.
    pub fn detach(&mut self) -> Result<()> {
        let path = match &self.backing.attached {
            Some((path, _)) => path.clone(),
            None => return Ok(()),
        };
        self.freeze()?;
        self.wal.detach_shadow(true)?;

        self.backing = Backing::memory(&self.layout, self.config.block_size)?;
        self.wal.set_last_time(None);
        self.cursor = ReadCursor::default();
        info!("Detached {:?}", path);
        Ok(())
    }

    /// Append the next blob's rows to `cols`, then the WAL rows, then 0
    pub fn read_ticks(&mut self, cols: &mut Columns) -> Result<usize> {
        self.check_columns(cols)?;
        let meta_offset = self.backing.header.meta_offset;

        if self.cursor.offset < meta_offset {
            let avail = meta_offset - self.cursor.offset;
            let at = self.backing.header_len + self.cursor.offset;
            let head = BlobHeader::parse(self.backing.store.view(at, avail.min(8))?)?;
            if head.size > avail {
                return Err(TickError::Corruption(format!(
                    "blob at {} claims {} bytes, {} left before meta",
                    self.cursor.offset, head.size, avail
                )));
            }
            let n = blob::decode(self.backing.store.view(at, head.size)?, cols)?;
            self.cursor.offset += head.size;
            return Ok(n);
        }

        if !self.cursor.wal_done {
            self.cursor.wal_done = true;
            return Ok(self.wal.columnify(cols));
        }
        Ok(0)
    }

    /// Append all ticks within `range` to `cols`, returns the count
    pub fn read_range(&mut self, range: TimeRange, cols: &mut Columns) -> Result<usize> {
        self.check_columns(cols)?;
        let before = cols.len();
        self.collect_overlapping(range, cols)?;
        cols.retain_times_from(before, |t| range.contains(t));
        Ok(cols.len() - before)
    }

    /// Append every row of blobs overlapping `range` plus the WAL rows
    pub(crate) fn collect_overlapping(&mut self, range: TimeRange, cols: &mut Columns) -> Result<usize> {
        let before = cols.len();
        for bytes in self.backing.blobs_overlapping(range)? {
            blob::decode(self.backing.blob_bytes(bytes)?, cols)?;
        }
        self.wal.columnify(cols);
        Ok(cols.len() - before)
    }

    /// Restart [`read_ticks`](Self::read_ticks) from the first blob
    pub fn rewind(&mut self) {
        self.cursor = ReadCursor::default();
    }

    fn check_columns(&self, cols: &Columns) -> Result<()> {
        if cols.layout() != &self.layout {
            return Err(TickError::FieldMismatch(format!(
                "columns for {:?} cannot hold {:?} ticks",
                cols.layout().to_string(),
                self.layout.to_string()
            )));
        }
        Ok(())
    }

    /// Index entries, one per blob
    pub fn index_entries(&mut self) -> Result<Vec<IndexEntry>> {
        match self.backing.index.as_mut() {
            Some(index) => index.ranges(),
            None => self.backing.scan_entries(),
        }
    }

    /// Whether a nested index exists
    pub fn has_index(&self) -> bool {
        self.backing.index.is_some()
    }

    pub fn stats(&self) -> SeriesStats {
        let raw_row = 8 + self.layout.fields().iter().map(|f| f.width()).sum::<usize>();
        SeriesStats {
            layout: self.layout.to_string(),
            block_size: self.config.block_size,
            path: self.path().map(Path::to_path_buf),
            read_only: self.is_read_only(),
            blobs: self.backing.blobs,
            rows_flushed: self.backing.rows,
            rows_pending: self.wal.len(),
            blob_bytes: self.backing.header.meta_offset,
            raw_bytes: self.backing.rows * raw_row as u64,
            store_bytes: self.backing.store.len(),
            index_entries: self.backing.index.as_ref().map_or(0, |i| i.len()),
            tags: self.backing.obarray.len(),
            last_time: self.last_time(),
        }
    }

    /// Name the time field and every layout field
    pub fn put_fields<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        self.writable()?;
        if names.len() != self.layout.len() + 1 {
            return Err(TickError::FieldMismatch(format!(
                "{} names for a time field plus {} fields",
                names.len(),
                self.layout.len()
            )));
        }
        self.field_names = names.iter().map(|n| n.as_ref().to_string()).collect();
        Ok(())
    }

    /// Field names, time field first; empty if never set
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// Code for tag `s`, interning it when writable.
    ///
    /// Codes are local to the obarray of the current backing. Attaching a
    /// series that holds ticks to a file with its own tags remaps their
    /// codes by name, so codes taken before the attach must be fetched
    /// again afterwards.
    pub fn tag(&mut self, s: &str) -> Result<TagCode> {
        if self.is_read_only() {
            return self.backing.obarray.lookup(s).ok_or(TickError::ReadOnly);
        }
        Ok(self.backing.obarray.intern(s))
    }

    /// String for a tag code
    pub fn tag_name(&self, code: TagCode) -> Option<&str> {
        self.backing.obarray.name(code)
    }
}
