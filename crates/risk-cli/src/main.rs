//! Risk Engine - Main Entry Point

use anyhow::{Context, Result};
use risk_cli::{init_logging, install_metrics, score_stream, CliArgs, Input, USAGE};
use scoring_engine::{EngineConfig, HybridScoringEngine};
use std::fs::File;
use std::io::{self, BufReader};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse(std::env::args().skip(1))?;
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = EngineConfig::load_from_path(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    init_logging(&config.logging)?;

    info!("=== Risk Engine v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        config_version = %config.version,
        review = config.thresholds.review,
        block = config.thresholds.block,
        "Configuration loaded from {}",
        args.config.display()
    );

    install_metrics(&config.telemetry)?;
    let engine = HybridScoringEngine::from_config(&config).context("failed to build scoring engine")?;
    let deadline = config.batch.deadline();

    let stdout = io::stdout();
    let summary = match &args.input {
        Input::Stdin => score_stream(&engine, io::stdin().lock(), stdout.lock(), deadline).await?,
        Input::File(path) => {
            let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            score_stream(&engine, BufReader::new(file), stdout.lock(), deadline).await?
        }
    };

    info!(
        read = summary.read,
        decided = summary.decided,
        failed = summary.failed,
        malformed = summary.malformed,
        "Scoring complete"
    );
    Ok(())
}
