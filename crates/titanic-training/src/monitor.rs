//! Helpers for inspecting the tracking store.

use crate::artifacts::ModelManifest;
use crate::error::TrainingResult;
use crate::forest::RandomForestClassifier;
use crate::registry::{ModelRegistry, ModelSelector, ModelUri};
use std::io::Write;
use std::path::Path;
use tracing::info;
use walkdir::WalkDir;

/// Files listed per directory before the rest are summarised.
const FILES_PER_DIR: usize = 5;

/// Write an indented listing of every directory under `root`.
///
/// Each directory line is followed by up to five of its files, sorted by
/// name, and a `... and N more files` line for the remainder.
pub fn write_run_tree(root: &Path, out: &mut impl Write) -> TrainingResult<()> {
    if !root.exists() {
        writeln!(out, "No runs recorded yet: {} does not exist.", root.display())?;
        return Ok(());
    }

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| anyhow::anyhow!("failed to walk {}: {e}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let indent = "  ".repeat(entry.depth());
        let name = entry.file_name().to_string_lossy();
        writeln!(out, "{indent}{name}/")?;

        let mut files: Vec<String> = std::fs::read_dir(entry.path())?
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        files.sort();

        let sub_indent = "  ".repeat(entry.depth() + 1);
        for file in files.iter().take(FILES_PER_DIR) {
            writeln!(out, "{sub_indent}{file}")?;
        }
        if files.len() > FILES_PER_DIR {
            writeln!(out, "{sub_indent}... and {} more files", files.len() - FILES_PER_DIR)?;
        }
    }
    Ok(())
}

/// Load a registered model by name; `None` selects the latest version.
pub fn load_registered_model(
    registry: &ModelRegistry,
    name: &str,
    selector: Option<ModelSelector>,
) -> TrainingResult<(RandomForestClassifier, ModelManifest)> {
    let uri = ModelUri::registry(name, selector.unwrap_or(ModelSelector::Latest));
    info!(uri = %uri, "loading registered model");
    registry.load_model(&uri)
}
