//! # Surgelab Runner
//!
//! Thin batch/stream entry point around the detection pipeline: reads a
//! tick stream (CSV or JSONL, file or stdin), routes it through
//! `OnsetEngine`, writes confirmed onsets to stdout as JSONL, persists the
//! full event stream to per-symbol day files, and reports summary counts.
//!
//! Exit codes: 0 clean, 2 configuration error, 3 malformed input.

pub mod reader;
pub mod sink;

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use surgelab_detect::OnsetEngine;
use surgelab_models::{ConfigError, DetectorConfig, OnsetEvent};

use reader::{CsvTicks, InputError, InputFormat, JsonlTicks, VolumeNormalizer};
use sink::{EventLog, RunSummary};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_INPUT: i32 = 3;

/// Surge-onset detection over a Korean equity tick stream.
#[derive(Debug, Parser)]
#[command(name = "surgelab")]
#[command(about = "Detect confirmed price-surge onsets in a tick stream")]
#[command(version)]
pub struct Cli {
    /// Tick input: CSV or JSONL path, `-` for stdin
    #[arg(required_unless_present = "stream")]
    pub input: Option<PathBuf>,

    /// TOML config path; tuned defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Tick-by-tick stdin mode (JSONL), flushing output per event
    #[arg(long, conflicts_with = "input")]
    pub stream: bool,

    /// Emit summary counts to stderr at end of run
    #[arg(long)]
    pub stats: bool,

    /// Directory for per-symbol `{symbol}_{date}.jsonl` event logs
    #[arg(long)]
    pub events_dir: Option<PathBuf>,

    /// Override wire-format detection
    #[arg(long, value_enum)]
    pub format: Option<InputFormat>,
}

/// Why a run terminated unsuccessfully.
#[derive(Debug)]
pub enum RunError {
    Config(ConfigError),
    Input(InputError),
    Other(anyhow::Error),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Config(_) => EXIT_CONFIG,
            RunError::Input(_) => EXIT_INPUT,
            RunError::Other(_) => EXIT_FAILURE,
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(err: ConfigError) -> Self {
        RunError::Config(err)
    }
}

impl From<InputError> for RunError {
    fn from(err: InputError) -> Self {
        RunError::Input(err)
    }
}

impl From<anyhow::Error> for RunError {
    fn from(err: anyhow::Error) -> Self {
        RunError::Other(err)
    }
}

/// CLI entry; returns the process exit code.
pub fn run() -> i32 {
    init_logging();
    let cli = Cli::parse();
    match run_cli(&cli) {
        Ok(summary) => {
            if cli.stats {
                match serde_json::to_string(&summary) {
                    Ok(line) => eprintln!("{line}"),
                    Err(err) => warn!(%err, "failed to serialize run summary"),
                }
            }
            EXIT_OK
        }
        Err(err) => {
            match &err {
                RunError::Config(e) => eprintln!("config error: {e}"),
                RunError::Input(e) => eprintln!("input error: {e}"),
                RunError::Other(e) => eprintln!("error: {e:#}"),
            }
            err.exit_code()
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Execute one run as described by the CLI.
pub fn run_cli(cli: &Cli) -> Result<RunSummary, RunError> {
    let config = match &cli.config {
        Some(path) => DetectorConfig::from_toml(path)?,
        None => DetectorConfig::default(),
    };

    let engine = OnsetEngine::new(config.clone())?;
    let log = EventLog::new(cli.events_dir.clone()).map_err(RunError::Other)?;
    let normalizer = VolumeNormalizer::new(config.input.cumulative_volume);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if cli.stream {
        let stdin = std::io::stdin();
        let ticks = JsonlTicks::new(stdin.lock());
        return process(ticks, engine, log, normalizer, &mut out, true);
    }

    let Some(input) = cli.input.as_ref() else {
        return Err(RunError::Other(anyhow::anyhow!(
            "an input path is required unless --stream is set"
        )));
    };
    if input.as_os_str() == "-" {
        let stdin = std::io::stdin();
        let reader = BufReader::new(stdin.lock());
        let format = cli.format.unwrap_or(InputFormat::Jsonl);
        return dispatch(format, reader, engine, log, normalizer, &mut out);
    }

    let file = File::open(input).map_err(|source| {
        RunError::Input(InputError::Io { line: 0, source })
    })?;
    let reader = BufReader::new(file);
    let format = cli
        .format
        .unwrap_or_else(|| InputFormat::from_extension(input));
    dispatch(format, reader, engine, log, normalizer, &mut out)
}

fn dispatch<R: BufRead>(
    format: InputFormat,
    reader: R,
    engine: OnsetEngine,
    log: EventLog,
    normalizer: VolumeNormalizer,
    out: &mut impl Write,
) -> Result<RunSummary, RunError> {
    match format {
        InputFormat::Jsonl => process(JsonlTicks::new(reader), engine, log, normalizer, out, false),
        InputFormat::Csv => process(CsvTicks::new(reader), engine, log, normalizer, out, false),
    }
}

/// The run loop: decode, normalize, push, emit.
///
/// Decoding failures abort with the offending line; ticks the pipeline
/// rejects are skipped with a diagnostic and counted.
fn process(
    ticks: impl Iterator<Item = Result<surgelab_models::Tick, InputError>>,
    mut engine: OnsetEngine,
    mut log: EventLog,
    mut normalizer: VolumeNormalizer,
    out: &mut impl Write,
    flush_per_event: bool,
) -> Result<RunSummary, RunError> {
    let mut tick_count: u64 = 0;
    let mut skipped: u64 = 0;

    for tick in ticks {
        let mut tick = tick?;
        normalizer.apply(&mut tick);
        tick_count += 1;

        let events = match engine.push(&tick) {
            Ok(events) => events,
            Err(err) => {
                warn!(%err, "skipping bad tick");
                skipped += 1;
                continue;
            }
        };

        for event in &events {
            let line = log.append(event).map_err(RunError::Other)?;
            if matches!(event, OnsetEvent::OnsetConfirmed { .. }) {
                writeln!(out, "{line}")
                    .map_err(|e| RunError::Other(anyhow::Error::new(e)))?;
                if flush_per_event {
                    out.flush()
                        .map_err(|e| RunError::Other(anyhow::Error::new(e)))?;
                }
            }
        }
    }

    out.flush()
        .map_err(|e| RunError::Other(anyhow::Error::new(e)))?;
    log.flush().map_err(RunError::Other)?;

    let summary = log.summary(tick_count, skipped, engine.symbol_count());
    info!(
        ticks = summary.ticks,
        skipped = summary.skipped_ticks,
        candidates = summary.events.candidates,
        confirmed = summary.events.confirmed,
        rejected = summary.events.rejected_refractory,
        "run complete"
    );
    Ok(summary)
}
