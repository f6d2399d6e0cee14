use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tempfile::TempDir;
use tickdb_core::storage::{OpenMode, Series, SeriesConfig};
use tickdb_core::transpose::{Columns, RowShape};
use tickdb_core::wal::{Shadow, SyncPolicy, Wal, WalConfig};
use tickdb_core::{FieldValue, Layout, Px, Qx, Tick, TickError, TimeRange};

fn random_ticks(n: usize, seed: u64) -> Vec<Tick> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut time = 1_600_000_000_000_000_000u64;
    (0..n)
        .map(|_| {
            time += rng.gen_range(0..5_000_000);
            let px = if rng.gen_bool(0.02) {
                Px::MISSING
            } else {
                Px::from_f32(1.0 + rng.gen_range(0..20_000) as f32 / 10_000.0)
            };
            let qx = Qx::from_f64(rng.gen_range(1..1_000) as f64 * 1_000.0);
            Tick::new(time, vec![px.into(), qx.into()])
        })
        .collect()
}

fn pq(i: u64) -> Vec<FieldValue> {
    vec![Px::from_bits(i as u32).into(), Qx::from_bits(i).into()]
}

fn read_all(series: &mut Series) -> Vec<Tick> {
    let mut cols = Columns::new(series.layout());
    series.rewind();
    while series.read_ticks(&mut cols).unwrap() > 0 {}
    cols.iter().collect()
}

fn write_file(path: &Path, block_size: usize, times: std::ops::Range<u64>) {
    let mut series = Series::new(
        Layout::parse("pq").unwrap(),
        SeriesConfig::with_block_size(block_size),
    )
    .unwrap();
    series.attach(path, OpenMode::ReadWrite).unwrap();
    for t in times {
        series.push(t, &pq(t)).unwrap();
    }
    series.detach().unwrap();
}

#[test]
fn test_end_to_end_reopen_read_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("eurusd.cots");
    let ticks = random_ticks(20_000, 7);

    let mut series = Series::new(Layout::parse("pq").unwrap(), SeriesConfig::default()).unwrap();
    series.attach(&path, OpenMode::ReadWrite).unwrap();
    series.put_fields(&["STAMP", "BID", "SIZE"]).unwrap();
    for tick in &ticks {
        series.push_tick(tick).unwrap();
    }
    assert_eq!(series.stats().blobs, 2);
    series.detach().unwrap();
    assert!(!Shadow::path_for(&path).exists());

    let mut ro = Series::open(&path, OpenMode::ReadOnly).unwrap();
    assert_eq!(ro.block_size(), 8192);
    assert_eq!(ro.field_names(), &["STAMP", "BID", "SIZE"]);

    let stats = ro.stats();
    assert_eq!(stats.blobs, 3);
    assert_eq!(stats.rows_flushed, 20_000);
    assert_eq!(stats.rows_pending, 0);
    assert_eq!(stats.index_entries, 3);
    assert!(stats.compression_ratio() > 1.0);

    assert_eq!(read_all(&mut ro), ticks);
}

#[test]
fn test_out_of_order_leaves_wal_unchanged() {
    let mut series = Series::new(
        Layout::parse("pq").unwrap(),
        SeriesConfig::with_block_size(512),
    )
    .unwrap();
    for t in 100..110 {
        series.push(t, &pq(t)).unwrap();
    }
    let err = series.push(50, &pq(50)).unwrap_err();
    assert!(matches!(err, TickError::OutOfOrder { time: 50, last: 109 }));
    assert_eq!(series.stats().rows_pending, 10);

    series.push(109, &pq(1)).unwrap();
    assert_eq!(series.stats().rows_pending, 11);
    assert_eq!(series.last_time(), Some(109));
}

#[test]
fn test_index_covers_every_flush() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ticks.cots");
    write_file(&path, 512, 0..512 * 5);

    let mut ro = Series::open(&path, OpenMode::ReadOnly).unwrap();
    assert!(ro.has_index());
    let entries = ro.index_entries().unwrap();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[0].bytes.beg, 0);
    for pair in entries.windows(2) {
        assert_eq!(pair[0].bytes.end, pair[1].bytes.beg);
        assert!(pair[0].time.till <= pair[1].time.from);
    }
    for (i, entry) in entries.iter().enumerate() {
        let first = i as u64 * 512;
        assert_eq!(entry.time, TimeRange::new(first, first + 511));
        assert_eq!(entry.rows, 512);
    }
    assert_eq!(entries[4].bytes.end, ro.stats().blob_bytes);
}

#[test]
fn test_read_range_uses_index() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ticks.cots");
    write_file(&path, 512, 0..5_000);

    let mut ro = Series::open(&path, OpenMode::ReadOnly).unwrap();
    let mut cols = Columns::new(ro.layout());
    let n = ro.read_range(TimeRange::new(1_000, 1_099), &mut cols).unwrap();
    assert_eq!(n, 100);
    assert_eq!(cols.tick(0), Tick::new(1_000, pq(1_000)));
    assert_eq!(cols.tick(99), Tick::new(1_099, pq(1_099)));

    cols.clear();
    assert_eq!(ro.read_range(TimeRange::new(9_000, 10_000), &mut cols).unwrap(), 0);
}

#[test]
fn test_obarray_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quotes.cots");
    let layout = Layout::parse("sp").unwrap();

    let mut series = Series::new(layout.clone(), SeriesConfig::with_block_size(512)).unwrap();
    series.attach(&path, OpenMode::ReadWrite).unwrap();
    let codes: Vec<u64> = ["ECN1", "ECN2", "ECN3"]
        .iter()
        .map(|s| series.tag(s).unwrap())
        .collect();
    for (t, &code) in codes.iter().enumerate() {
        series
            .push(t as u64, &[FieldValue::Tag(code), Px::from_f32(1.5).into()])
            .unwrap();
    }
    series.detach().unwrap();

    let mut rw = Series::open(&path, OpenMode::ReadWrite).unwrap();
    assert_eq!(rw.tag("ECN2").unwrap(), codes[1]);
    assert_eq!(rw.tag_name(codes[2]), Some("ECN3"));
    let fresh = rw.tag("ECN4").unwrap();
    assert!(!codes.contains(&fresh));
    rw.detach().unwrap();

    let mut ro = Series::open(&path, OpenMode::ReadOnly).unwrap();
    assert_eq!(ro.tag("ECN4").unwrap(), fresh);
    assert!(matches!(ro.tag("ECN5"), Err(TickError::ReadOnly)));
    let ticks = read_all(&mut ro);
    assert_eq!(ticks[0].fields[0], FieldValue::Tag(codes[0]));
}

#[test]
fn test_shadow_replayed_after_crash() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ticks.cots");
    let config = SeriesConfig {
        block_size: 512,
        wal: WalConfig {
            shadow: true,
            sync_policy: SyncPolicy::Immediate,
        },
    };

    let mut series = Series::new(Layout::parse("pq").unwrap(), config).unwrap();
    series.attach(&path, OpenMode::ReadWrite).unwrap();
    for t in 0..600 {
        series.push(t, &pq(t)).unwrap();
    }
    // dropped without detach: 512 rows flushed, 88 only in the shadow
    drop(series);
    assert!(Shadow::path_for(&path).exists());

    let mut series = Series::open(&path, OpenMode::ReadWrite).unwrap();
    assert_eq!(series.stats().rows_pending, 88);
    assert_eq!(series.last_time(), Some(599));
    assert!(series.push(10, &pq(10)).is_err());
    series.push(600, &pq(600)).unwrap();
    series.detach().unwrap();

    let mut ro = Series::open(&path, OpenMode::ReadOnly).unwrap();
    let ticks = read_all(&mut ro);
    assert_eq!(ticks.len(), 601);
    assert!(ticks.iter().enumerate().all(|(i, t)| t.time == i as u64));
}

/// Leave a shadow next to `path` holding ticks at `times`
fn leave_shadow(path: &Path, times: std::ops::Range<u64>) {
    let layout = Layout::parse("pq").unwrap();
    let config = WalConfig {
        shadow: true,
        sync_policy: SyncPolicy::Immediate,
    };
    let mut wal = Wal::new(RowShape::new(&layout), 512, config);
    wal.attach_shadow(path).unwrap();
    for t in times {
        wal.bang(t, &pq(t)).unwrap();
        wal.advance().unwrap();
    }
    wal.sync().unwrap();
}

#[test]
fn test_stale_shadow_rows_dropped_on_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ticks.cots");
    write_file(&path, 512, 1_000..2_000);
    leave_shadow(&path, 0..10);

    let mut series = Series::open(&path, OpenMode::ReadWrite).unwrap();
    assert_eq!(series.stats().rows_pending, 0);
    assert_eq!(series.last_time(), Some(1_999));
    series.push(2_000, &pq(2_000)).unwrap();
    series.detach().unwrap();
    assert!(!Shadow::path_for(&path).exists());

    let mut ro = Series::open(&path, OpenMode::ReadOnly).unwrap();
    let ticks = read_all(&mut ro);
    assert_eq!(ticks.len(), 1_001);
    assert_eq!(ticks[0].time, 1_000);
    assert_eq!(ticks[1_000].time, 2_000);
}

#[test]
fn test_shadow_matching_last_blob_not_replayed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ticks.cots");
    // blobs hold 0..512 and 512..1000
    write_file(&path, 512, 0..1_000);
    // the shadow still holds the rows of the second blob
    leave_shadow(&path, 512..1_000);

    let mut series = Series::open(&path, OpenMode::ReadWrite).unwrap();
    assert_eq!(series.stats().rows_pending, 0);
    assert_eq!(series.len(), 1_000);
    series.push(999, &pq(999)).unwrap();
    series.detach().unwrap();

    let mut ro = Series::open(&path, OpenMode::ReadOnly).unwrap();
    let ticks = read_all(&mut ro);
    assert_eq!(ticks.len(), 1_001);
    assert_eq!(ticks[998].time, 998);
    assert_eq!(ticks[999].time, 999);
    assert_eq!(ticks[1_000].time, 999);
}

#[test]
fn test_attach_appends_memory_ticks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ticks.cots");
    write_file(&path, 512, 0..1_000);

    let mut series = Series::new(
        Layout::parse("pq").unwrap(),
        SeriesConfig::with_block_size(512),
    )
    .unwrap();
    for t in 1_000..3_000 {
        series.push(t, &pq(t)).unwrap();
    }
    series.attach(&path, OpenMode::ReadWrite).unwrap();
    assert_eq!(series.len(), 3_000);
    series.push(3_000, &pq(3_000)).unwrap();
    series.detach().unwrap();

    let mut ro = Series::open(&path, OpenMode::ReadOnly).unwrap();
    let ticks = read_all(&mut ro);
    assert_eq!(ticks.len(), 3_001);
    assert!(ticks.iter().enumerate().all(|(i, t)| t.time == i as u64));
    assert_eq!(ro.index_entries().unwrap().len(), ro.stats().blobs);
}

#[test]
fn test_open_failures() {
    let dir = TempDir::new().unwrap();

    let empty = dir.path().join("empty.cots");
    std::fs::write(&empty, b"").unwrap();
    let mut series = Series::new(Layout::parse("pq").unwrap(), SeriesConfig::default()).unwrap();
    assert!(matches!(
        series.attach(&empty, OpenMode::ReadOnly),
        Err(TickError::InvalidFormat(_))
    ));

    let garbage = dir.path().join("garbage.cots");
    std::fs::write(&garbage, vec![0xabu8; 128]).unwrap();
    assert!(matches!(
        Series::open(&garbage, OpenMode::ReadOnly),
        Err(TickError::InvalidFormat(_))
    ));

    let path = dir.path().join("ticks.cots");
    write_file(&path, 512, 0..10);
    let mut wider = Series::new(Layout::parse("pqz").unwrap(), SeriesConfig::with_block_size(512)).unwrap();
    assert!(matches!(
        wider.attach(&path, OpenMode::ReadOnly),
        Err(TickError::LayoutMismatch { .. })
    ));
    let mut bigger = Series::new(Layout::parse("pq").unwrap(), SeriesConfig::default()).unwrap();
    assert!(matches!(
        bigger.attach(&path, OpenMode::ReadOnly),
        Err(TickError::InvalidFormat(_))
    ));
}

#[test]
fn test_corrupt_blob_detected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ticks.cots");
    write_file(&path, 512, 0..1_024);

    // "cotsv1" + endian + three words + "pq\0"
    let header_len = 4 + 2 + 2 + 24 + 3;
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[header_len + 100] ^= 0x5a;
    std::fs::write(&path, &bytes).unwrap();

    let mut ro = Series::open(&path, OpenMode::ReadOnly).unwrap();
    let mut cols = Columns::new(ro.layout());
    let err = ro.read_ticks(&mut cols).unwrap_err();
    assert!(err.is_corruption());
    assert!(cols.is_empty());
}

#[test]
fn test_header_offsets_past_end_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("huge.cots");

    let mut bytes = b"cotsv1".to_vec();
    bytes.extend_from_slice(&0x3c3eu16.to_ne_bytes());
    bytes.extend_from_slice(&0u64.to_be_bytes());
    bytes.extend_from_slice(&0u64.to_be_bytes());
    bytes.extend_from_slice(&u64::MAX.to_be_bytes());
    bytes.extend_from_slice(b"pq\0");
    std::fs::write(&path, &bytes).unwrap();

    let err = Series::open(&path, OpenMode::ReadOnly).unwrap_err();
    assert!(err.is_corruption());
}
