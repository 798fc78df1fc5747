//! Evaluation command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use titanic_training::job::EVALUATION_EXPERIMENT;
use titanic_training::{
    run_evaluation, EvaluationJobSpec, ModelRegistry, ModelUri, PipelineConfig, TrackingContext, TrackingLayout,
};

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Model to evaluate (runs:/<run_id>/<path>, models:/<name>/<version|stage>, models:/<name>@<alias>)
    #[arg(long)]
    pub model_uri: String,

    /// Processing directory for the cleaned dataset [default: data/processed]
    #[arg(long)]
    pub data_path: Option<PathBuf>,

    /// Raw Kaggle train.csv [default: data/raw/train.csv]
    #[arg(long)]
    pub raw_path: Option<PathBuf>,

    /// Seed for the held-out split
    #[arg(long, default_value_t = 42)]
    pub random_state: u64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: EvaluateArgs, config: &PipelineConfig) -> Result<()> {
    let uri: ModelUri = args.model_uri.parse().context("Invalid --model-uri")?;

    let root = config.tracking_root();
    let ctx = TrackingContext::open(&root, EVALUATION_EXPERIMENT)
        .with_context(|| format!("Failed to open tracking store at {}", root.display()))?;
    let registry = ModelRegistry::new(TrackingLayout::new(root));

    let spec = EvaluationJobSpec::new(
        uri,
        args.data_path.unwrap_or_else(|| config.data_path()),
        args.raw_path.unwrap_or_else(|| config.raw_path()),
        args.random_state,
    );
    let outcome = run_evaluation(&ctx, &registry, &spec).context("Evaluation run failed")?;

    if args.json {
        let out = json!({
            "run_id": outcome.run_id,
            "model_uri": spec.model_uri.to_string(),
            "metrics": outcome.metrics,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Evaluation of {}", spec.model_uri).bold().cyan());
    println!("  Run:       {}", outcome.run_id.dimmed());
    println!("  Accuracy:  {:.4}", outcome.metrics.accuracy);
    println!("  Precision: {:.4}", outcome.metrics.precision);
    println!("  Recall:    {:.4}", outcome.metrics.recall);
    println!("  F1 score:  {:.4}", outcome.metrics.f1_score);
    println!();
    Ok(())
}
