use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use windcrab_api::datastream::WindowedStream;
use windcrab_api::environment::{ExecutionConfig, StreamExecutionEnvironment};
use windcrab_core::config::{WatermarkRegressionPolicy, WindowConfig};
use windcrab_core::time::{BoundedOutOfOrderness, TimeCharacteristic};
use windcrab_core::types::StreamRecord;
use windcrab_core::window::{
    CountEvictor, CountTrigger, PurgingTrigger, Reducer, SessionWindows, SlidingWindows, TimeWindow,
    TumblingWindows,
};

#[derive(Parser, Debug)]
#[command(name = "windcrab")]
#[command(about = "Keyed window aggregation over CSV input", long_about = None)]
struct Cli {
    /// Log filter, e.g. `info` or `windcrab_core=debug`.
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Aggregate `key,ts,value` rows into event-time windows and print one line per result.
    Run {
        /// Input file, or `-` for stdin.
        #[arg(long, default_value = "-")]
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = WindowKind::Tumbling)]
        window: WindowKind,
        /// Window size for tumbling and sliding windows.
        #[arg(long, default_value_t = 1000)]
        size_ms: u64,
        #[arg(long)]
        slide_ms: Option<u64>,
        /// Inactivity gap for session windows.
        #[arg(long, default_value_t = 1000)]
        gap_ms: u64,
        #[arg(long, value_enum, default_value_t = Aggregate::Sum)]
        aggregate: Aggregate,
        /// Fire (and purge) every N elements instead of at the end of the window.
        #[arg(long)]
        count_trigger: Option<u64>,
        /// Keep only the last N elements of a window when it fires.
        #[arg(long)]
        evict_count: Option<usize>,
        #[arg(long, default_value_t = 0)]
        out_of_orderness_ms: u64,
        #[arg(long, default_value_t = 0)]
        allowed_lateness_ms: u64,
        #[arg(long, default_value_t = 1)]
        parallelism: usize,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum WindowKind {
    Tumbling,
    Sliding,
    Session,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregate {
    Sum,
    Count,
    Min,
    Max,
}

impl Aggregate {
    fn lift(self, value: i64) -> i64 {
        match self {
            Aggregate::Count => 1,
            _ => value,
        }
    }

    fn combine(self, a: i64, b: i64) -> i64 {
        match self {
            Aggregate::Sum | Aggregate::Count => a.saturating_add(b),
            Aggregate::Min => a.min(b),
            Aggregate::Max => a.max(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Row {
    key: String,
    ts: i64,
    value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WindowResult {
    key: String,
    start: i64,
    end: i64,
    value: i64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(cli.log.as_str())
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            input,
            window,
            size_ms,
            slide_ms,
            gap_ms,
            aggregate,
            count_trigger,
            evict_count,
            out_of_orderness_ms,
            allowed_lateness_ms,
            parallelism,
        } => {
            let rows = parse_rows(&read_input(&input)?, aggregate)?;
            info!(rows = rows.len(), ?window, ?aggregate, "read input");

            let window_config = WindowConfig::new(TimeCharacteristic::EventTime)
                .with_allowed_lateness(Duration::from_millis(allowed_lateness_ms))
                .with_watermark_regression(WatermarkRegressionPolicy::Clamp);
            let env = StreamExecutionEnvironment::new("windcrab-run", window_config)
                .with_execution_config(ExecutionConfig::default().with_parallelism(parallelism));
            let keyed = env
                .from_iter(rows)
                .assign_timestamps_and_watermarks(BoundedOutOfOrderness::new(
                    Duration::from_millis(out_of_orderness_ms),
                    |row: &Row| row.ts,
                ))
                .key_by(|row: &Row| row.key.clone());

            let size = Duration::from_millis(size_ms);
            let options = RunOptions {
                aggregate,
                count_trigger,
                evict_count,
            };
            let mut results = match window {
                WindowKind::Tumbling => run(keyed.window(TumblingWindows::of(size)), options)?,
                WindowKind::Sliding => {
                    let slide = Duration::from_millis(slide_ms.unwrap_or(size_ms));
                    run(keyed.window(SlidingWindows::of(size, slide)), options)?
                }
                WindowKind::Session => {
                    run(keyed.window(SessionWindows::with_gap(Duration::from_millis(gap_ms))), options)?
                }
            };

            results.sort_by(|a, b| (a.timestamp, &a.value.key).cmp(&(b.timestamp, &b.value.key)));
            for record in results {
                let r = record.value;
                println!("{},{},{},{}", r.key, r.start, r.end, r.value);
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct RunOptions {
    aggregate: Aggregate,
    count_trigger: Option<u64>,
    evict_count: Option<usize>,
}

fn run(
    mut windowed: WindowedStream<String, Row, TimeWindow>,
    options: RunOptions,
) -> Result<Vec<StreamRecord<WindowResult>>> {
    if let Some(n) = options.count_trigger {
        windowed = windowed.trigger(PurgingTrigger::of(CountTrigger::of(n)));
    }
    if let Some(n) = options.evict_count {
        windowed = windowed.evictor(CountEvictor::of(n));
    }

    let aggregate = options.aggregate;
    let reducer = Reducer::new(move |a: Row, b: Row| Row {
        key: a.key,
        ts: a.ts.max(b.ts),
        value: aggregate.combine(a.value, b.value),
    });
    let job = windowed.reduce_with(
        reducer,
        |key: &String, window: &TimeWindow, folded: &[Row], out: &mut Vec<WindowResult>| {
            out.extend(folded.iter().map(|row| WindowResult {
                key: key.clone(),
                start: window.start,
                end: window.end,
                value: row.value,
            }));
        },
    )?;
    debug!(
        variant = ?job.variant(),
        representation = ?job.representation(),
        trigger = job.trigger_name(),
        evictor = ?job.evictor_name(),
        "window job built"
    );
    job.execute()
}

fn read_input(path: &PathBuf) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Parse `key,ts,value` lines. Blank lines, `#` comments and a `key,ts,value`
/// header are skipped.
fn parse_rows(input: &str, aggregate: Aggregate) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line == "key,ts,value" {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [key, ts, value] = fields.as_slice() else {
            bail!("line {}: expected `key,ts,value`, got {line:?}", index + 1);
        };
        let ts = ts
            .parse::<i64>()
            .with_context(|| format!("line {}: invalid timestamp {ts:?}", index + 1))?;
        let value = value
            .parse::<i64>()
            .with_context(|| format!("line {}: invalid value {value:?}", index + 1))?;
        rows.push(Row {
            key: key.to_string(),
            ts,
            value: aggregate.lift(value),
        });
    }
    Ok(rows)
}
