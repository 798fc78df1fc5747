//! Model registry commands.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;
use titanic_training::job::REGISTERED_MODEL_NAME;
use titanic_training::{load_registered_model, ModelRegistry, ModelSelector, ModelStage, PipelineConfig, TrackingLayout};

/// Registry subcommands
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// List registered models and their versions
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load a registered model and show its manifest
    Load {
        /// Registered model name
        #[arg(long, default_value = REGISTERED_MODEL_NAME)]
        name: String,
        /// Version number
        #[arg(long, conflicts_with = "stage")]
        version: Option<u32>,
        /// Stage or alias (e.g. Production, champion)
        #[arg(long)]
        stage: Option<String>,
    },
    /// Point an alias at a version
    Alias {
        #[arg(long, default_value = REGISTERED_MODEL_NAME)]
        name: String,
        #[arg(long)]
        alias: String,
        #[arg(long)]
        version: u32,
    },
    /// Move a version to a stage (None, Staging, Production, Archived)
    Stage {
        #[arg(long, default_value = REGISTERED_MODEL_NAME)]
        name: String,
        #[arg(long)]
        version: u32,
        #[arg(long)]
        stage: String,
    },
}

pub fn execute(cmd: ModelsCommand, config: &PipelineConfig) -> Result<()> {
    let registry = ModelRegistry::new(TrackingLayout::new(config.tracking_root()));
    match cmd {
        ModelsCommand::List { json } => list_command(&registry, json),
        ModelsCommand::Load { name, version, stage } => {
            let selector = version.map(ModelSelector::Version).or(stage.map(ModelSelector::Stage));
            load_command(&registry, &name, selector)
        }
        ModelsCommand::Alias { name, alias, version } => {
            registry.set_alias(&name, &alias, version).context("Failed to set alias")?;
            println!("{} {name}@{alias} -> version {version}", "✓".green());
            Ok(())
        }
        ModelsCommand::Stage { name, version, stage } => {
            let stage: ModelStage = stage.parse()?;
            registry.transition_stage(&name, version, stage).context("Failed to change stage")?;
            println!("{} {name} version {version} -> {stage}", "✓".green());
            Ok(())
        }
    }
}

fn list_command(registry: &ModelRegistry, json_output: bool) -> Result<()> {
    let models = registry.list_models().context("Failed to read model registry")?;

    if json_output {
        let mut out = Vec::new();
        for model in &models {
            let versions = registry.versions(&model.name)?;
            out.push(json!({
                "name": model.name,
                "created_at": model.created_at,
                "aliases": model.aliases,
                "versions": versions,
            }));
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Registered Models ({})", models.len()).bold().cyan());
    println!();

    if models.is_empty() {
        println!("  {}", "No registered models found.".dimmed());
        return Ok(());
    }

    for model in models {
        println!("{}", model.name.bold());
        for version in registry.versions(&model.name)? {
            let aliases: Vec<&str> = model
                .aliases
                .iter()
                .filter(|(_, v)| **v == version.version)
                .map(|(alias, _)| alias.as_str())
                .collect();
            println!(
                "  v{:<4} {:<11} {} {}",
                version.version,
                version.stage.to_string(),
                version.run_id.dimmed(),
                aliases.iter().map(|a| format!("@{a}")).collect::<Vec<_>>().join(" ").yellow()
            );
        }
    }
    println!();
    Ok(())
}

fn load_command(registry: &ModelRegistry, name: &str, selector: Option<ModelSelector>) -> Result<()> {
    let (model, manifest) = load_registered_model(registry, name, selector)?;

    println!();
    println!("{}", "Model loaded".bold().green());
    println!("  Run:       {}", manifest.run_id.cyan());
    println!("  Type:      {}", manifest.model_type);
    println!(
        "  Params:    n_estimators={} max_depth={} random_state={}",
        manifest.params.n_estimators, manifest.params.max_depth, manifest.params.random_state
    );
    println!("  Trees:     {}", model.trees().len());
    println!("  Features:  {}", manifest.feature_names.join(", "));
    println!("  Dataset:   {}", manifest.dataset_id.to_string().dimmed());
    println!();
    Ok(())
}
