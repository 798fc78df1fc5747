//! Batch inference command.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use titanic_training::{predict_raw, write_predictions, ModelRegistry, ModelUri, PipelineConfig, TrackingLayout};

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Model to use for prediction
    #[arg(long)]
    pub model_uri: String,

    /// Raw passenger CSV (the Survived column is optional)
    #[arg(long)]
    pub input: PathBuf,

    /// Write predictions as CSV instead of printing them
    #[arg(long)]
    pub output: Option<PathBuf>,
}

pub fn execute(args: PredictArgs, config: &PipelineConfig) -> Result<()> {
    let uri: ModelUri = args.model_uri.parse().context("Invalid --model-uri")?;
    let registry = ModelRegistry::new(TrackingLayout::new(config.tracking_root()));

    let predictions = predict_raw(&registry, &uri, &args.input)
        .with_context(|| format!("Failed to predict {}", args.input.display()))?;

    if let Some(output) = args.output {
        write_predictions(&output, &predictions)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("Wrote {} predictions to {}", predictions.len(), output.display().to_string().cyan());
        return Ok(());
    }

    println!("{:<6} {:<6} {}", "Row", "Label", "P(survived)");
    println!("{}", "─".repeat(28));
    for (row, p) in predictions.iter().enumerate() {
        let label = if p.label == 1 { "1".green() } else { "0".red() };
        println!("{:<6} {:<6} {:.4}", row + 1, label, p.probability);
    }
    Ok(())
}
