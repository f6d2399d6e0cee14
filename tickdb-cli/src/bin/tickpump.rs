//! tickpump - append tab-separated quotes from stdin to a series file
//!
//! Input lines look like `secs.nanos<TAB>source<TAB>bid<TAB>size`. An empty
//! bid or size is stored as missing.

use anyhow::{bail, Context};
use clap::Parser;
use std::io::{self, BufRead};
use std::path::PathBuf;
use tickdb_core::storage::{OpenMode, Series, SeriesConfig};
use tickdb_core::wal::{SyncPolicy, WalConfig};
use tickdb_core::{config, FieldValue, Layout, Px, Qx, TimeOffset};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const LAYOUT: &str = "spq";
const FIELDS: [&str; 4] = ["STAMP", "SOURCE", "BID", "SIZE"];

#[derive(Parser, Debug)]
#[command(name = "tickpump", version, about = "Append quotes from stdin to a tick series")]
struct Args {
    /// Series file, created when missing
    file: PathBuf,

    /// WAL block size in rows
    #[arg(short, long, default_value_t = config::DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Sync the shadow WAL after every tick
    #[arg(long)]
    sync: bool,

    /// Skip malformed or out-of-order lines instead of failing
    #[arg(long)]
    lenient: bool,
}

/// Parse `secs.nanos` into nanoseconds
fn parse_stamp(s: &str) -> anyhow::Result<TimeOffset> {
    let (secs, frac) = s.split_once('.').unwrap_or((s, ""));
    if frac.len() > 9 {
        bail!("more than nanosecond precision in {:?}", s);
    }
    let secs: u64 = secs.parse().with_context(|| format!("bad seconds in {:?}", s))?;
    let nanos: u64 = if frac.is_empty() {
        0
    } else {
        format!("{:0<9}", frac)
            .parse()
            .with_context(|| format!("bad fraction in {:?}", s))?
    };
    secs.checked_mul(1_000_000_000)
        .and_then(|t| t.checked_add(nanos))
        .with_context(|| format!("timestamp {:?} out of range", s))
}

fn parse_px(s: &str) -> anyhow::Result<Px> {
    if s.is_empty() {
        return Ok(Px::MISSING);
    }
    Ok(Px::from_f32(s.parse().with_context(|| format!("bad price {:?}", s))?))
}

fn parse_qx(s: &str) -> anyhow::Result<Qx> {
    if s.is_empty() {
        return Ok(Qx::MISSING);
    }
    Ok(Qx::from_f64(s.parse().with_context(|| format!("bad quantity {:?}", s))?))
}

fn pump_line(series: &mut Series, line: &str) -> anyhow::Result<()> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() != 4 {
        bail!("expected 4 columns, got {}", cols.len());
    }
    let time = parse_stamp(cols[0])?;
    let source = series.tag(cols[1])?;
    let fields = [
        FieldValue::Tag(source),
        parse_px(cols[2])?.into(),
        parse_qx(cols[3])?.into(),
    ];
    series.push(time, &fields)?;
    Ok(())
}

/// Error for a failed input line; a failed detach is only logged
fn line_failed(err: anyhow::Error, line: usize, detached: tickdb_core::Result<()>) -> anyhow::Error {
    if let Err(e) = detached {
        warn!("Could not detach after line {}: {}", line, e);
    }
    err.context(format!("line {}", line))
}

fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = SeriesConfig {
        block_size: args.block_size,
        wal: WalConfig {
            shadow: true,
            sync_policy: if args.sync {
                SyncPolicy::Immediate
            } else {
                SyncPolicy::default()
            },
        },
    };

    let mut series = Series::new(Layout::parse(LAYOUT)?, config)?;
    series
        .attach(&args.file, OpenMode::ReadWrite)
        .with_context(|| format!("cannot attach {:?}", args.file))?;
    if series.field_names().is_empty() {
        series.put_fields(&FIELDS)?;
    }

    let mut pumped = 0u64;
    let mut skipped = 0u64;
    for (n, line) in io::stdin().lock().lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        match pump_line(&mut series, &line) {
            Ok(()) => pumped += 1,
            Err(e) if args.lenient => {
                warn!("line {}: {}", n + 1, e);
                skipped += 1;
            }
            Err(e) => return Err(line_failed(e, n + 1, series.detach())),
        }
    }

    series.freeze()?;
    let stats = series.stats();
    series.detach()?;
    info!(
        "Pumped {} ticks ({} skipped) into {:?}: {} blobs, {:.2}x",
        pumped,
        skipped,
        args.file,
        stats.blobs,
        stats.compression_ratio()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stamp() {
        assert_eq!(parse_stamp("12.5").unwrap(), 12_500_000_000);
        assert_eq!(parse_stamp("1.000000001").unwrap(), 1_000_000_001);
        assert_eq!(parse_stamp("7").unwrap(), 7_000_000_000);
        assert!(parse_stamp("1.0000000001").is_err());
        assert!(parse_stamp("x.1").is_err());
    }

    #[test]
    fn test_line_error_survives_failed_detach() {
        let parse = parse_stamp("x.1").unwrap_err();
        let err = line_failed(parse, 3, Err(tickdb_core::TickError::ReadOnly));
        assert_eq!(err.to_string(), "line 3");
        assert!(format!("{:#}", err).starts_with("line 3: bad seconds"));
        assert!(err.downcast_ref::<tickdb_core::TickError>().is_none());
    }

    #[test]
    fn test_missing_values() {
        assert!(parse_px("").unwrap().is_missing());
        assert!(parse_qx("").unwrap().is_missing());
        assert_eq!(parse_px("1.25").unwrap().to_f32(), 1.25);
        assert!(parse_qx("abc").is_err());
    }
}
