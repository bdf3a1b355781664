//! FlatLand runner
//!
//! Loads a document, feeds player inputs one tick each, then runs scheduled
//! ticks. Every step report is printed as one JSON line.

use clap::Parser;
use flatland::{EngineConfig, Simulation, StepReport};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Run a FlatLand document headless and print step reports as JSON lines
#[derive(Parser, Debug)]
#[command(name = "flatland")]
#[command(about = "Deterministic rule engine for declarative 2D grid worlds")]
struct Args {
    /// Path to the JSON world document
    document: PathBuf,

    /// Scheduled ticks to run after the inputs
    #[arg(long, default_value_t = 0)]
    ticks: u64,

    /// Comma-separated player inputs (up, down, left, right, wait)
    #[arg(long, value_delimiter = ',')]
    inputs: Vec<String>,

    /// Random seed (a seed in the document takes precedence)
    #[arg(long)]
    seed: Option<u64>,

    /// Engine configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn emit(report: &StepReport) -> Result<(), Box<dyn std::error::Error>> {
    let line = serde_json::to_string(report)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    Ok(())
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let mut sim = Simulation::load_file(&args.document, config)?;

    for token in &args.inputs {
        let report = sim.submit_input(token)?;
        emit(&report)?;
        if report.is_terminal() {
            tracing::info!(tick = report.tick, victory = report.victory, "Run finished");
            return Ok(());
        }
    }
    for _ in 0..args.ticks {
        let report = sim.step()?;
        emit(&report)?;
        if report.is_terminal() {
            tracing::info!(tick = report.tick, victory = report.victory, "Run finished");
            return Ok(());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flatland=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "flatland failed");
            ExitCode::FAILURE
        }
    }
}
