//! Dataset preparation command.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use titanic_training::{prepare_dataset, PipelineConfig};

#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Processing directory for the cleaned dataset [default: data/processed]
    #[arg(long)]
    pub data_path: Option<PathBuf>,

    /// Raw Kaggle train.csv [default: data/raw/train.csv]
    #[arg(long)]
    pub raw_path: Option<PathBuf>,

    /// Rebuild the cache even if it already exists
    #[arg(long)]
    pub force: bool,
}

pub fn execute(args: PrepareArgs, config: &PipelineConfig) -> Result<()> {
    let data_path = args.data_path.unwrap_or_else(|| config.data_path());
    let raw_path = args.raw_path.unwrap_or_else(|| config.raw_path());

    let dataset = prepare_dataset(&data_path, &raw_path, args.force).context("Failed to prepare dataset")?;
    let survived = dataset.target.iter().filter(|&&t| t == 1).count();

    println!();
    println!("{}", "Processed dataset ready".bold().green());
    println!("  Path:     {}", dataset.path.display().to_string().cyan());
    println!("  Rows:     {} ({} survived)", dataset.len(), survived);
    println!("  Columns:  {}", dataset.features.columns().join(", "));
    println!("  Dataset:  {}", dataset.dataset_id.to_string().dimmed());
    println!();
    Ok(())
}
