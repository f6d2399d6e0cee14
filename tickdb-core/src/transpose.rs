//! Row <-> column transposition
//!
//! The WAL stores ticks row-major: the time offset in bytes `0..8`, then
//! every field at its cumulative offset rounded up to the field alignment.
//! Blobs store them column-major. Row bytes are little-endian.

use crate::types::{FieldType, FieldValue, Layout, Tick, TimeOffset};
use crate::{Result, TickError};

/// Byte geometry of one row for a given layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowShape {
    layout: Layout,
    offsets: Vec<usize>,
    row_size: usize,
}

impl RowShape {
    pub fn new(layout: &Layout) -> Self {
        let mut offsets = Vec::with_capacity(layout.len());
        let mut at = 8usize;
        let mut max_align = 8usize;
        for ty in layout.fields() {
            let align = ty.align();
            at = (at + align - 1) / align * align;
            offsets.push(at);
            at += ty.width();
            max_align = max_align.max(align);
        }
        let row_size = (at + max_align - 1) / max_align * max_align;
        Self {
            layout: layout.clone(),
            offsets,
            row_size,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Byte offset of field `i` within a row
    pub fn offset(&self, i: usize) -> usize {
        self.offsets[i]
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Serialize one tick into `row`
    pub fn write_row(&self, row: &mut [u8], time: TimeOffset, fields: &[FieldValue]) -> Result<()> {
        self.check_fields(fields)?;
        row[..8].copy_from_slice(&time.to_le_bytes());
        for ((value, ty), &off) in fields.iter().zip(self.layout.fields()).zip(&self.offsets) {
            let bits = value.to_bits().to_le_bytes();
            row[off..off + ty.width()].copy_from_slice(&bits[..ty.width()]);
        }
        Ok(())
    }

    /// Time offset stored in `row`
    pub fn row_time(&self, row: &[u8]) -> TimeOffset {
        read_le(&row[..8])
    }

    /// Deserialize one tick from `row`
    pub fn read_row(&self, row: &[u8]) -> Tick {
        let fields = self
            .layout
            .fields()
            .iter()
            .zip(&self.offsets)
            .map(|(&ty, &off)| FieldValue::from_bits(ty, read_le(&row[off..off + ty.width()])))
            .collect();
        Tick::new(self.row_time(row), fields)
    }

    fn check_fields(&self, fields: &[FieldValue]) -> Result<()> {
        if fields.len() != self.layout.len() {
            return Err(TickError::FieldMismatch(format!(
                "layout {:?} has {} fields, tick has {}",
                self.layout.to_string(),
                self.layout.len(),
                fields.len()
            )));
        }
        for (i, (value, &ty)) in fields.iter().zip(self.layout.fields()).enumerate() {
            if value.field_type() != ty {
                return Err(TickError::FieldMismatch(format!(
                    "field {} is {:?}, layout wants {:?}",
                    i,
                    value.field_type(),
                    ty
                )));
            }
        }
        Ok(())
    }
}

fn read_le(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(raw)
}

/// One decoded column, typed by storage width
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Bytes(Vec<u8>),
    Words(Vec<u32>),
    Longs(Vec<u64>),
}

impl Column {
    fn for_field(ty: FieldType, capacity: usize) -> Self {
        match ty.width() {
            1 => Column::Bytes(Vec::with_capacity(capacity)),
            4 => Column::Words(Vec::with_capacity(capacity)),
            _ => Column::Longs(Vec::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Bytes(v) => v.len(),
            Column::Words(v) => v.len(),
            Column::Longs(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bits at row `i`, zero-extended
    pub fn bits(&self, i: usize) -> u64 {
        match self {
            Column::Bytes(v) => v[i] as u64,
            Column::Words(v) => v[i] as u64,
            Column::Longs(v) => v[i],
        }
    }

    fn push_bits(&mut self, bits: u64) {
        match self {
            Column::Bytes(v) => v.push(bits as u8),
            Column::Words(v) => v.push(bits as u32),
            Column::Longs(v) => v.push(bits),
        }
    }

    /// Extend by `n` zeroed rows, returning the new tail for decoding into
    pub(crate) fn grow(&mut self, n: usize) -> ColumnTail<'_> {
        match self {
            Column::Bytes(v) => {
                let at = v.len();
                v.resize(at + n, 0);
                ColumnTail::Bytes(&mut v[at..])
            }
            Column::Words(v) => {
                let at = v.len();
                v.resize(at + n, 0);
                ColumnTail::Words(&mut v[at..])
            }
            Column::Longs(v) => {
                let at = v.len();
                v.resize(at + n, 0);
                ColumnTail::Longs(&mut v[at..])
            }
        }
    }

    fn truncate(&mut self, n: usize) {
        match self {
            Column::Bytes(v) => v.truncate(n),
            Column::Words(v) => v.truncate(n),
            Column::Longs(v) => v.truncate(n),
        }
    }

    fn retain_rows(&mut self, keep: &[bool]) {
        let mut it = keep.iter();
        match self {
            Column::Bytes(v) => v.retain(|_| *it.next().unwrap_or(&false)),
            Column::Words(v) => v.retain(|_| *it.next().unwrap_or(&false)),
            Column::Longs(v) => v.retain(|_| *it.next().unwrap_or(&false)),
        }
    }
}

/// Mutable view of freshly grown column rows
pub(crate) enum ColumnTail<'a> {
    Bytes(&'a mut [u8]),
    Words(&'a mut [u32]),
    Longs(&'a mut [u64]),
}

/// Caller-owned column buffers for a whole layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    layout: Layout,
    times: Vec<TimeOffset>,
    cols: Vec<Column>,
}

impl Columns {
    pub fn new(layout: &Layout) -> Self {
        Self::with_capacity(layout, 0)
    }

    pub fn with_capacity(layout: &Layout, capacity: usize) -> Self {
        Self {
            layout: layout.clone(),
            times: Vec::with_capacity(capacity),
            cols: layout
                .fields()
                .iter()
                .map(|&ty| Column::for_field(ty, capacity))
                .collect(),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    pub fn truncate(&mut self, n: usize) {
        self.times.truncate(n);
        self.cols.iter_mut().for_each(|c| c.truncate(n));
    }

    pub fn times(&self) -> &[TimeOffset] {
        &self.times
    }

    pub fn column(&self, i: usize) -> &Column {
        &self.cols[i]
    }

    /// Append one tick, checking it against the layout
    pub fn push(&mut self, tick: &Tick) -> Result<()> {
        if tick.fields.len() != self.layout.len()
            || tick
                .fields
                .iter()
                .zip(self.layout.fields())
                .any(|(v, &ty)| v.field_type() != ty)
        {
            return Err(TickError::FieldMismatch(format!(
                "tick does not match layout {:?}",
                self.layout.to_string()
            )));
        }
        self.times.push(tick.time);
        for (col, value) in self.cols.iter_mut().zip(&tick.fields) {
            col.push_bits(value.to_bits());
        }
        Ok(())
    }

    /// Value of `field` at `row`
    pub fn value(&self, row: usize, field: usize) -> FieldValue {
        FieldValue::from_bits(self.layout.fields()[field], self.cols[field].bits(row))
    }

    /// Tick at `row`
    pub fn tick(&self, row: usize) -> Tick {
        let fields = (0..self.cols.len()).map(|f| self.value(row, f)).collect();
        Tick::new(self.times[row], fields)
    }

    pub fn iter(&self) -> impl Iterator<Item = Tick> + '_ {
        (0..self.len()).map(move |row| self.tick(row))
    }

    /// Keep only rows whose time offset satisfies `pred`, starting at `from_row`
    pub(crate) fn retain_times_from<F>(&mut self, from_row: usize, pred: F)
    where
        F: Fn(TimeOffset) -> bool,
    {
        let keep: Vec<bool> = self
            .times
            .iter()
            .enumerate()
            .map(|(i, &t)| i < from_row || pred(t))
            .collect();
        if keep.iter().all(|&k| k) {
            return;
        }
        let mut it = keep.iter();
        self.times.retain(|_| *it.next().unwrap_or(&false));
        self.cols.iter_mut().for_each(|c| c.retain_rows(&keep));
    }

    pub(crate) fn times_mut(&mut self) -> &mut Vec<TimeOffset> {
        &mut self.times
    }

    pub(crate) fn column_mut(&mut self, i: usize) -> &mut Column {
        &mut self.cols[i]
    }
}

/// Lay `cols` out row-major, returns the row bytes
pub fn rowify(shape: &RowShape, cols: &Columns) -> Vec<u8> {
    let rz = shape.row_size();
    let mut rows = vec![0u8; cols.len() * rz];
    for (row, chunk) in rows.chunks_exact_mut(rz).enumerate() {
        chunk[..8].copy_from_slice(&cols.times[row].to_le_bytes());
        for (f, ty) in shape.layout.fields().iter().enumerate() {
            let off = shape.offsets[f];
            let bits = cols.cols[f].bits(row).to_le_bytes();
            chunk[off..off + ty.width()].copy_from_slice(&bits[..ty.width()]);
        }
    }
    rows
}

/// Append every complete row in `rows` to `cols`, returns the row count
pub fn columnify(shape: &RowShape, rows: &[u8], cols: &mut Columns) -> usize {
    let rz = shape.row_size();
    let n = rows.len() / rz;
    cols.times.reserve(n);
    for chunk in rows.chunks_exact(rz) {
        cols.times.push(shape.row_time(chunk));
        for (f, ty) in shape.layout.fields().iter().enumerate() {
            let off = shape.offsets[f];
            cols.cols[f].push_bits(read_le(&chunk[off..off + ty.width()]));
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Px, Qx};
    use proptest::prelude::*;

    #[test]
    fn test_offsets_are_aligned() {
        let shape = RowShape::new(&Layout::parse("bpqbs").unwrap());
        assert_eq!(shape.offset(0), 8);
        assert_eq!(shape.offset(1), 12);
        assert_eq!(shape.offset(2), 16);
        assert_eq!(shape.offset(3), 24);
        assert_eq!(shape.offset(4), 32);
        assert_eq!(shape.row_size(), 40);

        let bare = RowShape::new(&Layout::parse("").unwrap());
        assert_eq!(bare.row_size(), 8);

        let pp = RowShape::new(&Layout::parse("pp").unwrap());
        assert_eq!(pp.row_size(), 16);
    }

    #[test]
    fn test_write_read_row() {
        let shape = RowShape::new(&Layout::parse("spq").unwrap());
        let fields = vec![
            FieldValue::Tag(3),
            Px::from_f32(1.25).into(),
            Qx::MISSING.into(),
        ];
        let mut row = vec![0u8; shape.row_size()];
        shape.write_row(&mut row, 77, &fields).unwrap();
        assert_eq!(shape.read_row(&row), Tick::new(77, fields));

        let err = shape
            .write_row(&mut row, 78, &[FieldValue::Tag(1)])
            .unwrap_err();
        assert!(matches!(err, TickError::FieldMismatch(_)));
    }

    #[test]
    fn test_retain_times() {
        let layout = Layout::parse("z").unwrap();
        let mut cols = Columns::new(&layout);
        for t in 0..10u64 {
            cols.push(&Tick::new(t, vec![FieldValue::Size(t * 10)])).unwrap();
        }
        cols.retain_times_from(2, |t| t >= 7);
        assert_eq!(cols.times(), &[0, 1, 7, 8, 9]);
        assert_eq!(cols.value(2, 0), FieldValue::Size(70));
    }

    fn layout_strategy() -> impl Strategy<Value = Layout> {
        prop::collection::vec(prop::sample::select(b"btspqfdzc".to_vec()), 0..8).prop_map(|codes| {
            let s: String = codes.into_iter().map(|c| c as char).collect();
            Layout::parse(&s).unwrap()
        })
    }

    proptest! {
        #[test]
        fn prop_alignment_invariant(layout in layout_strategy()) {
            let shape = RowShape::new(&layout);
            let mut end = 8;
            for (i, ty) in layout.fields().iter().enumerate() {
                let off = shape.offset(i);
                prop_assert_eq!(off % ty.align(), 0);
                prop_assert!(off >= end);
                end = off + ty.width();
            }
            prop_assert!(shape.row_size() >= end);
            prop_assert_eq!(shape.row_size() % 8, 0);
        }

        #[test]
        fn prop_columnify_rowify_inverse(
            layout in layout_strategy(),
            seed in prop::collection::vec(any::<u64>(), 0..64),
        ) {
            let mut cols = Columns::new(&layout);
            for (i, &s) in seed.iter().enumerate() {
                let fields = layout
                    .fields()
                    .iter()
                    .map(|&ty| FieldValue::from_bits(ty, s.rotate_left(i as u32)))
                    .collect();
                cols.push(&Tick::new(i as u64, fields)).unwrap();
            }

            let shape = RowShape::new(&layout);
            let rows = rowify(&shape, &cols);
            prop_assert_eq!(rows.len(), cols.len() * shape.row_size());

            let mut back = Columns::new(&layout);
            prop_assert_eq!(columnify(&shape, &rows, &mut back), cols.len());
            prop_assert_eq!(back, cols);
        }
    }
}
