//! Run inspection commands.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;
use titanic_training::tracking::list_experiments;
use titanic_training::{write_run_tree, PipelineConfig, RunStatus, TrackingContext, TrackingLayout};

/// Run subcommands
#[derive(Subcommand, Debug)]
pub enum RunsCommand {
    /// Print the directory tree of the tracking store
    Tree,
    /// List runs with their status and metrics
    List {
        /// Only show runs of this experiment
        #[arg(long)]
        experiment: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn execute(cmd: RunsCommand, config: &PipelineConfig) -> Result<()> {
    match cmd {
        RunsCommand::Tree => tree_command(config),
        RunsCommand::List { experiment, json } => list_command(config, experiment.as_deref(), json),
    }
}

fn tree_command(config: &PipelineConfig) -> Result<()> {
    let root = config.tracking_root();
    let mut stdout = std::io::stdout().lock();
    write_run_tree(&root, &mut stdout).with_context(|| format!("Failed to list {}", root.display()))?;
    Ok(())
}

fn list_command(config: &PipelineConfig, experiment: Option<&str>, json_output: bool) -> Result<()> {
    let root = config.tracking_root();
    let layout = TrackingLayout::new(root.clone());
    let experiments = list_experiments(&layout).context("Failed to read tracking store")?;

    let mut rows = Vec::new();
    for exp in experiments.iter().filter(|e| experiment.is_none_or(|name| e.name == name)) {
        let ctx = TrackingContext::open(&root, &exp.name)?;
        for run in ctx.list_runs()? {
            rows.push((exp.name.clone(), ctx.get_run(&run.run_id)?));
        }
    }

    if json_output {
        let out: Vec<_> = rows
            .iter()
            .map(|(experiment, record)| {
                json!({
                    "experiment": experiment,
                    "run_id": record.info.run_id,
                    "run_name": record.info.run_name,
                    "status": record.info.status.to_string(),
                    "start_time": record.info.start_time,
                    "params": record.params,
                    "metrics": record.metrics,
                    "tags": record.tags,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Runs ({})", rows.len()).bold().cyan());
    println!();

    if rows.is_empty() {
        println!("  {}", "No runs recorded yet.".dimmed());
        println!("  {}", "Tip: run `titanic train` to record one.".dimmed());
        return Ok(());
    }

    println!("{:<34} {:<14} {:<10} {:<10} {}", "Run", "Name", "Status", "Accuracy", "Experiment");
    println!("{}", "─".repeat(100));
    for (experiment, record) in rows {
        let status = match record.info.status {
            RunStatus::Finished => record.info.status.to_string().green(),
            RunStatus::Failed => record.info.status.to_string().red(),
            RunStatus::Running => record.info.status.to_string().yellow(),
        };
        let accuracy = record.metrics.get("accuracy").map_or_else(|| "-".to_string(), |a| format!("{a:.4}"));
        println!(
            "{:<34} {:<14} {:<10} {:<10} {}",
            record.info.run_id.cyan(),
            record.info.run_name,
            status,
            accuracy,
            experiment.dimmed()
        );
    }
    println!();
    Ok(())
}
