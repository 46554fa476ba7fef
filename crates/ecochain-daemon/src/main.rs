//! EcoChain daemon
//!
//! `ecochaind serve` runs the epoch pipeline with its scheduler and the
//! read-only REST API. `ecochaind score <file>` scores a JSON array of raw
//! readings offline.

use anyhow::Context;
use clap::{Parser, Subcommand};
use ecochain_daemon::config::DaemonConfig;
use ecochain_daemon::server::{load_readings, Server};
use ecochain_scoring::{advise, ReadingBuffer, SustainabilityScorer, TelemetryNormalizer};
use ecochain_types::ScoreResult;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// EcoChain daemon CLI
#[derive(Parser)]
#[command(name = "ecochaind")]
#[command(
    about = "EcoChain Guardian - sustainability scoring and reward distribution",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ECOCHAIN_CONFIG", global = true)]
    config: Option<String>,

    /// Listen address (overrides configuration)
    #[arg(short, long, env = "ECOCHAIN_LISTEN_ADDR", global = true)]
    listen: Option<String>,

    /// Log level (overrides configuration)
    #[arg(long, env = "ECOCHAIN_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "ECOCHAIN_LOG_JSON", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon (default)
    Serve,

    /// Score a JSON array of raw readings and print the results
    Score {
        /// Path to the readings file
        file: PathBuf,
    },
}

/// One line of `score` output
#[derive(Serialize)]
struct ScoredReading {
    #[serde(flatten)]
    score: ScoreResult,
    advice: Vec<&'static str>,
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = DaemonConfig::load(cli.config.as_deref()).context("loading configuration")?;

    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;
    init_tracing(&config.logging.level, config.logging.json);

    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("invalid listen address {listen}"))?;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let server = Server::new(config).await?;
            server.run().await?;
        }
        Command::Score { file } => score_file(&config, &file).await?,
    }

    Ok(())
}

async fn score_file(config: &DaemonConfig, file: &Path) -> anyhow::Result<()> {
    config.scoring.validate()?;
    let readings = load_readings(file).await?;

    let mut buffer = ReadingBuffer::new(TelemetryNormalizer::new(config.epoch.clock()));
    for raw in &readings {
        if let Err(e) = buffer.ingest(raw) {
            tracing::warn!(
                operation_id = %raw.operation_id,
                error = %e,
                "Skipping invalid reading"
            );
        }
    }

    let scorer = SustainabilityScorer::new(config.scoring.clone());
    let mut output = Vec::new();
    for epoch in buffer.epochs() {
        let batch = scorer.score_all(&buffer.take_epoch(epoch));
        for (id, err) in &batch.failed {
            tracing::warn!(operation_id = %id, error = %err, "Could not score reading");
        }
        output.extend(batch.scored.into_iter().map(|score| ScoredReading {
            advice: advise(&score).iter().map(|a| a.message()).collect(),
            score,
        }));
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
