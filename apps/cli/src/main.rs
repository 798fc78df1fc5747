//! Titanic CLI - Command-line interface for the Titanic survival pipeline
//!
//! This CLI provides a `titanic` command that prepares the passenger
//! dataset, runs tracked training and evaluation, and manages the model
//! registry stored next to the runs.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{evaluate, models, predict, prepare, runs, train};

/// Titanic CLI - Tracked training for the Titanic survival classifier
#[derive(Parser, Debug)]
#[command(
    name = "titanic",
    author,
    version,
    about = "Titanic - tracked random forest training for survival prediction",
    long_about = "Titanic cleans the Kaggle passenger CSV, trains a random forest inside a tracked run,\nregisters the model, and evaluates registered versions on held-out data."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Tracking store root (overrides TITANIC_TRACKING_ROOT) [default: mlruns]
    #[arg(long, global = true)]
    tracking_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a random forest inside a tracked run
    ///
    /// Splits the processed dataset, fits the forest, logs params, metrics
    /// and the model artifact, and registers a new model version.
    Train(train::TrainArgs),

    /// Evaluate a stored model on a fresh held-out split
    Evaluate(evaluate::EvaluateArgs),

    /// Build (or rebuild) the processed dataset cache
    Prepare(prepare::PrepareArgs),

    /// Predict survival for a raw passenger CSV
    Predict(predict::PredictArgs),

    /// Inspect recorded runs
    #[command(subcommand)]
    Runs(runs::RunsCommand),

    /// Manage registered models
    #[command(subcommand)]
    Models(models::ModelsCommand),
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = config::load_config(args.tracking_root, args.log_level)?;

    // Initialize tracing
    let level = match config.log_level() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Train(cmd) => train::execute(cmd, &config),
        Command::Evaluate(cmd) => evaluate::execute(cmd, &config),
        Command::Prepare(cmd) => prepare::execute(cmd, &config),
        Command::Predict(cmd) => predict::execute(cmd, &config),
        Command::Runs(cmd) => runs::execute(cmd, &config),
        Command::Models(cmd) => models::execute(cmd, &config),
    }
}
