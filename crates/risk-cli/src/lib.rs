//! Risk Engine Command Line
//!
//! Reads JSON Lines transactions, scores them with the hybrid engine and
//! writes one decision per line. Logs go to stderr so stdout stays parseable.

use anyhow::{anyhow, bail, Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use scoring_engine::{
    telemetry, HybridScoringEngine, LogFormat, LoggingConfig, TelemetryConfig, TransactionRecord,
};
use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Records evaluated per batch
const CHUNK_SIZE: usize = 512;

pub const USAGE: &str = "\
Usage: risk-engine [--config <path>] [--input <path|->]

  --config <path>   engine configuration (default: config/engine.toml)
  --input <path>    JSON Lines transactions, '-' for stdin (default: -)
  --help            print this message";

/// Transaction source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Stdin,
    File(PathBuf),
}

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config: PathBuf,
    pub input: Input,
    pub help: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from("config/engine.toml"),
            input: Input::Stdin,
            help: false,
        }
    }
}

impl CliArgs {
    /// Parse arguments, program name excluded
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let value = args.next().context("--config needs a path")?;
                    parsed.config = PathBuf::from(value);
                }
                "--input" => {
                    let value = args.next().context("--input needs a path or '-'")?;
                    parsed.input = if value == "-" {
                        Input::Stdin
                    } else {
                        Input::File(PathBuf::from(value))
                    };
                }
                "-h" | "--help" => parsed.help = true,
                other => bail!("unknown argument '{}'\n\n{}", other, USAGE),
            }
        }
        Ok(parsed)
    }
}

/// Install the global subscriber; `RUST_LOG` overrides the configured level
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log level '{}'", config.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    }
    .map_err(|e| anyhow!("failed to set tracing subscriber: {}", e))
}

/// Start the Prometheus scrape endpoint when configured
pub fn install_metrics(config: &TelemetryConfig) -> Result<()> {
    let Some(listen) = config.prometheus_listen.as_deref() else {
        return Ok(());
    };

    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid prometheus_listen address '{}'", listen))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus exporter")?;
    telemetry::describe();

    info!("Prometheus metrics on http://{}/metrics", addr);
    Ok(())
}

/// Counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Non-blank input lines
    pub read: usize,
    /// Lines that were not a JSON transaction
    pub malformed: usize,
    pub decided: usize,
    /// Rejected or failed evaluations
    pub failed: usize,
}

/// Score every line of `reader`, writing decisions to `writer`
pub async fn score_stream<R, W>(
    engine: &HybridScoringEngine,
    reader: R,
    mut writer: W,
    deadline: Option<Duration>,
) -> Result<RunSummary>
where
    R: BufRead,
    W: Write,
{
    let mut summary = RunSummary::default();
    let mut pending = Vec::with_capacity(CHUNK_SIZE);

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read input line {}", index + 1))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.read += 1;

        match serde_json::from_str::<TransactionRecord>(line) {
            Ok(record) => pending.push(record),
            Err(e) => {
                summary.malformed += 1;
                warn!(line = index + 1, error = %e, "Skipping malformed input line");
            }
        }

        if pending.len() == CHUNK_SIZE {
            flush(engine, &mut pending, &mut writer, deadline, &mut summary).await?;
        }
    }

    flush(engine, &mut pending, &mut writer, deadline, &mut summary).await?;
    writer.flush().context("failed to flush output")?;
    Ok(summary)
}

async fn flush<W: Write>(
    engine: &HybridScoringEngine,
    pending: &mut Vec<TransactionRecord>,
    writer: &mut W,
    deadline: Option<Duration>,
    summary: &mut RunSummary,
) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }

    let records = std::mem::take(pending);
    let results = match deadline {
        Some(deadline) => engine.evaluate_batch_with_deadline(records, deadline).await,
        None => engine.evaluate_batch(records).await,
    };

    for result in results {
        match result {
            Ok(decision) => {
                serde_json::to_writer(&mut *writer, &decision).context("failed to encode decision")?;
                writeln!(writer).context("failed to write output")?;
                summary.decided += 1;
            }
            // Already logged by the engine
            Err(_) => summary.failed += 1,
        }
    }
    Ok(())
}
