//! tickdump - print the ticks of series files

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tickdb_core::storage::{OpenMode, Series};
use tickdb_core::transpose::Columns;
use tickdb_core::{FieldValue, TimeRange};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "tickdump", version, about = "Print ticks stored in series files")]
struct Args {
    /// Series files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Emit one JSON object per tick
    #[arg(long)]
    json: bool,

    /// Only ticks at or after this offset
    #[arg(long)]
    from: Option<u64>,

    /// Only ticks at or before this offset
    #[arg(long)]
    till: Option<u64>,

    /// Print series statistics instead of ticks
    #[arg(long)]
    stats: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
enum JsonValue<'a> {
    Num(u64),
    Float(f64),
    Text(&'a str),
    Missing(Option<()>),
}

fn stamp(t: u64) -> String {
    format!("{}.{:09}", t / 1_000_000_000, t % 1_000_000_000)
}

fn json_value<'a>(series: &'a Series, value: &FieldValue) -> JsonValue<'a> {
    match *value {
        FieldValue::Tag(code) => series
            .tag_name(code)
            .map(JsonValue::Text)
            .unwrap_or(JsonValue::Num(code)),
        FieldValue::Price(px) if px.is_missing() => JsonValue::Missing(None),
        FieldValue::Price(px) => JsonValue::Float(px.to_f32() as f64),
        FieldValue::Quantity(qx) if qx.is_missing() => JsonValue::Missing(None),
        FieldValue::Quantity(qx) => JsonValue::Float(qx.to_f64()),
        FieldValue::Float(v) => JsonValue::Float(v as f64),
        FieldValue::Double(v) => JsonValue::Float(v),
        ref other => JsonValue::Num(other.to_bits()),
    }
}

fn text_value(series: &Series, value: &FieldValue) -> String {
    match json_value(series, value) {
        JsonValue::Num(v) => v.to_string(),
        JsonValue::Float(v) => v.to_string(),
        JsonValue::Text(s) => s.to_string(),
        JsonValue::Missing(_) => String::new(),
    }
}

fn field_names(series: &Series) -> Vec<String> {
    let names = series.field_names();
    if names.len() == series.layout().len() + 1 {
        return names.to_vec();
    }
    std::iter::once("time".to_string())
        .chain(series.layout().fields().iter().enumerate().map(|(i, ty)| {
            format!("{}{}", ty.code() as char, i)
        }))
        .collect()
}

fn dump(series: &Series, cols: &Columns, json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    let names = field_names(series);
    for tick in cols.iter() {
        if json {
            let mut obj = BTreeMap::new();
            obj.insert(names[0].as_str(), JsonValue::Num(tick.time));
            for (name, value) in names[1..].iter().zip(&tick.fields) {
                obj.insert(name.as_str(), json_value(series, value));
            }
            serde_json::to_writer(&mut *out, &obj)?;
            writeln!(out)?;
        } else {
            let mut line = stamp(tick.time);
            for value in &tick.fields {
                line.push('\t');
                line.push_str(&text_value(series, value));
            }
            writeln!(out, "{}", line)?;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    for path in &args.files {
        let mut series = Series::open(path, OpenMode::ReadOnly)
            .with_context(|| format!("cannot open {:?}", path))?;

        if args.stats {
            serde_json::to_writer_pretty(&mut out, &series.stats())?;
            writeln!(out)?;
            continue;
        }

        let mut cols = Columns::new(series.layout());
        if args.from.is_some() || args.till.is_some() {
            let range = TimeRange::new(args.from.unwrap_or(0), args.till.unwrap_or(u64::MAX));
            series.read_range(range, &mut cols)?;
            dump(&series, &cols, args.json, &mut out)?;
            continue;
        }
        while series.read_ticks(&mut cols)? > 0 {
            dump(&series, &cols, args.json, &mut out)?;
            cols.clear();
        }
    }
    out.flush()?;
    Ok(())
}
