//! Training command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use titanic_training::job::TRAINING_EXPERIMENT;
use titanic_training::{
    run_training, ForestParams, ModelRegistry, PipelineConfig, TrackingContext, TrackingLayout, TrainingJobSpec,
};

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Processing directory for the cleaned dataset [default: data/processed]
    #[arg(long)]
    pub data_path: Option<PathBuf>,

    /// Raw Kaggle train.csv [default: data/raw/train.csv]
    #[arg(long)]
    pub raw_path: Option<PathBuf>,

    /// Number of trees in the forest
    #[arg(long, default_value_t = 100)]
    pub n_estimators: usize,

    /// Maximum tree depth
    #[arg(long, default_value_t = 5)]
    pub max_depth: usize,

    /// Seed for the split, bootstrap samples and feature sampling
    #[arg(long, default_value_t = 42)]
    pub random_state: u64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: TrainArgs, config: &PipelineConfig) -> Result<()> {
    let root = config.tracking_root();
    let ctx = TrackingContext::open(&root, TRAINING_EXPERIMENT)
        .with_context(|| format!("Failed to open tracking store at {}", root.display()))?;
    let registry = ModelRegistry::new(TrackingLayout::new(root));

    let params = ForestParams {
        n_estimators: args.n_estimators,
        max_depth: args.max_depth,
        random_state: args.random_state,
    };
    let spec = TrainingJobSpec::new(
        args.data_path.unwrap_or_else(|| config.data_path()),
        args.raw_path.unwrap_or_else(|| config.raw_path()),
        params,
    );

    let outcome = run_training(&ctx, &registry, &spec).context("Training run failed")?;

    if args.json {
        let out = json!({
            "run_id": outcome.run_id,
            "run_name": spec.run_name(),
            "metrics": outcome.metrics,
            "model_version": outcome.model_version,
            "model_uri": outcome.model_uri.to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", "Training complete".bold().green());
    println!("  Run:      {} ({})", outcome.run_id.cyan(), spec.run_name().dimmed());
    println!("  Accuracy: {:.4}", outcome.metrics.accuracy);
    println!("  F1 score: {:.4}", outcome.metrics.f1_score);
    println!("  Model:    {}", outcome.model_uri.to_string().cyan());
    println!();
    Ok(())
}
