//! File-backed model registry.
//!
//! A registered model is a logical name with numbered versions. Each version
//! points at a run artifact (`runs:/<run_id>/<artifact>`) and may carry a
//! stage; the model itself may map aliases to versions.

use crate::artifacts::{load_model, read_json, write_json, ModelManifest};
use crate::error::{TrainingError, TrainingResult};
use crate::forest::RandomForestClassifier;
use crate::layout::{TrackingLayout, META_FILE};
use crate::tracking::find_run;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{error, info};

const RUNS_SCHEME: &str = "runs:/";
const MODELS_SCHEME: &str = "models:/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelStage {
    #[default]
    None,
    Staging,
    Production,
    Archived,
}

impl FromStr for ModelStage {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            "archived" => Ok(Self::Archived),
            other => Err(TrainingError::InvalidSpec(format!(
                "unknown stage {other:?} (expected None, Staging, Production or Archived)"
            ))),
        }
    }
}

impl std::fmt::Display for ModelStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "None",
            Self::Staging => "Staging",
            Self::Production => "Production",
            Self::Archived => "Archived",
        };
        f.write_str(s)
    }
}

/// Which version of a registered model to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSelector {
    Version(u32),
    /// An alias name, or failing that a stage name (case-insensitive).
    Stage(String),
    Latest,
}

/// Locator of a persisted model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelUri {
    Run { run_id: String, artifact_path: String },
    Registry { name: String, selector: ModelSelector },
}

impl ModelUri {
    #[must_use]
    pub fn run(run_id: impl Into<String>, artifact_path: impl Into<String>) -> Self {
        Self::Run { run_id: run_id.into(), artifact_path: artifact_path.into() }
    }

    #[must_use]
    pub fn registry(name: impl Into<String>, selector: ModelSelector) -> Self {
        Self::Registry { name: name.into(), selector }
    }
}

impl FromStr for ModelUri {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| TrainingError::InvalidSpec(format!("invalid model URI {s:?}: {why}"));

        if let Some(rest) = s.strip_prefix(RUNS_SCHEME) {
            let (run_id, artifact_path) =
                rest.split_once('/').ok_or_else(|| invalid("expected runs:/<run_id>/<artifact_path>"))?;
            if run_id.is_empty() || artifact_path.is_empty() || artifact_path.contains('/') {
                return Err(invalid("expected runs:/<run_id>/<artifact_path>"));
            }
            return Ok(Self::run(run_id, artifact_path));
        }

        if let Some(rest) = s.strip_prefix(MODELS_SCHEME) {
            let rest = rest.trim_end_matches('/');
            if let Some((name, alias)) = rest.split_once('@') {
                if name.is_empty() || alias.is_empty() {
                    return Err(invalid("expected models:/<name>@<alias>"));
                }
                return Ok(Self::registry(name, ModelSelector::Stage(alias.to_string())));
            }
            let (name, selector) = match rest.split_once('/') {
                None => (rest, ModelSelector::Latest),
                Some((name, part)) if part.eq_ignore_ascii_case("latest") => (name, ModelSelector::Latest),
                Some((name, part)) if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) => {
                    let version = part.parse().map_err(|_| invalid("version out of range"))?;
                    (name, ModelSelector::Version(version))
                }
                Some((name, part)) => (name, ModelSelector::Stage(part.to_string())),
            };
            if name.is_empty() || matches!(&selector, ModelSelector::Stage(s) if s.is_empty() || s.contains('/')) {
                return Err(invalid("expected models:/<name>/<version_or_stage>"));
            }
            return Ok(Self::registry(name, selector));
        }

        Err(invalid("expected a runs:/ or models:/ URI"))
    }
}

impl std::fmt::Display for ModelUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run { run_id, artifact_path } => write!(f, "{RUNS_SCHEME}{run_id}/{artifact_path}"),
            Self::Registry { name, selector: ModelSelector::Version(v) } => write!(f, "{MODELS_SCHEME}{name}/{v}"),
            Self::Registry { name, selector: ModelSelector::Stage(s) } => write!(f, "{MODELS_SCHEME}{name}@{s}"),
            Self::Registry { name, selector: ModelSelector::Latest } => write!(f, "{MODELS_SCHEME}{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredModel {
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub aliases: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: u32,
    pub run_id: String,
    /// `runs:/` URI of the artifact this version points at.
    pub source: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stage: ModelStage,
}

fn validate_name(name: &str) -> TrainingResult<()> {
    if name.is_empty() || name.contains(['/', '\\', '@']) || name.starts_with('.') {
        return Err(TrainingError::InvalidSpec(format!("invalid registered model name: {name:?}")));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    layout: TrackingLayout,
}

impl ModelRegistry {
    #[must_use]
    pub fn new(layout: TrackingLayout) -> Self {
        Self { layout }
    }

    #[must_use]
    pub fn layout(&self) -> &TrackingLayout {
        &self.layout
    }

    pub fn list_models(&self) -> TrainingResult<Vec<RegisteredModel>> {
        let dir = match std::fs::read_dir(self.layout.models_dir()) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for entry in dir {
            let meta = entry?.path().join(META_FILE);
            if meta.exists() {
                out.push(read_json::<RegisteredModel>(&meta)?);
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub fn get_model(&self, name: &str) -> TrainingResult<RegisteredModel> {
        validate_name(name)?;
        let meta = self.layout.registered_model_dir(name).join(META_FILE);
        if !meta.exists() {
            return Err(TrainingError::Tracking(format!("registered model {name} not found")));
        }
        read_json(&meta)
    }

    /// Versions of `name`, ascending.
    pub fn versions(&self, name: &str) -> TrainingResult<Vec<ModelVersion>> {
        let dir = self.layout.registered_model_dir(name);
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let is_version = entry.file_name().to_string_lossy().starts_with("version-");
            let meta = entry.path().join(META_FILE);
            if is_version && meta.exists() {
                out.push(read_json::<ModelVersion>(&meta)?);
            }
        }
        out.sort_by_key(|v| v.version);
        Ok(out)
    }

    pub fn get_version(&self, name: &str, version: u32) -> TrainingResult<ModelVersion> {
        self.get_model(name)?;
        let meta = self.layout.model_version_dir(name, version).join(META_FILE);
        if !meta.exists() {
            return Err(TrainingError::Tracking(format!("model {name} has no version {version}")));
        }
        read_json(&meta)
    }

    pub fn latest_version(&self, name: &str) -> TrainingResult<ModelVersion> {
        self.get_model(name)?;
        self.versions(name)?
            .pop()
            .ok_or_else(|| TrainingError::Tracking(format!("model {name} has no versions")))
    }

    /// Add a new version of `name` pointing at `runs:/<run_id>/<artifact_path>`.
    pub fn register_version(&self, name: &str, run_id: &str, artifact_path: &str) -> TrainingResult<ModelVersion> {
        validate_name(name)?;
        let model_dir = self.layout.registered_model_dir(name);
        let meta = model_dir.join(META_FILE);
        if !meta.exists() {
            std::fs::create_dir_all(&model_dir)?;
            let model = RegisteredModel { name: name.to_string(), created_at: Utc::now(), aliases: BTreeMap::new() };
            write_json(&meta, &model)?;
            info!(name, "registered new model");
        }

        let next = self.versions(name)?.last().map_or(1, |v| v.version + 1);
        let version = ModelVersion {
            name: name.to_string(),
            version: next,
            run_id: run_id.to_string(),
            source: ModelUri::run(run_id, artifact_path).to_string(),
            created_at: Utc::now(),
            stage: ModelStage::None,
        };
        let dir = self.layout.model_version_dir(name, next);
        std::fs::create_dir_all(&dir)?;
        write_json(dir.join(META_FILE), &version)?;
        info!(name, version = next, run_id, "created model version");
        Ok(version)
    }

    pub fn set_alias(&self, name: &str, alias: &str, version: u32) -> TrainingResult<RegisteredModel> {
        if alias.is_empty() || alias.contains('/') || alias.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TrainingError::InvalidSpec(format!("invalid alias: {alias:?}")));
        }
        self.get_version(name, version)?;
        let mut model = self.get_model(name)?;
        model.aliases.insert(alias.to_string(), version);
        write_json(self.layout.registered_model_dir(name).join(META_FILE), &model)?;
        info!(name, alias, version, "set model alias");
        Ok(model)
    }

    pub fn transition_stage(&self, name: &str, version: u32, stage: ModelStage) -> TrainingResult<ModelVersion> {
        let mut mv = self.get_version(name, version)?;
        mv.stage = stage;
        write_json(self.layout.model_version_dir(name, version).join(META_FILE), &mv)?;
        info!(name, version, stage = %stage, "transitioned model stage");
        Ok(mv)
    }

    /// Resolve a selector to a concrete version.
    ///
    /// `Stage` checks aliases first, then picks the highest version whose
    /// stage matches case-insensitively.
    pub fn resolve(&self, name: &str, selector: &ModelSelector) -> TrainingResult<ModelVersion> {
        match selector {
            ModelSelector::Version(v) => self.get_version(name, *v),
            ModelSelector::Latest => self.latest_version(name),
            ModelSelector::Stage(stage) => {
                let model = self.get_model(name)?;
                if let Some(&v) = model.aliases.get(stage) {
                    return self.get_version(name, v);
                }
                self.versions(name)?
                    .into_iter()
                    .rev()
                    .find(|v| v.stage.to_string().eq_ignore_ascii_case(stage))
                    .ok_or_else(|| TrainingError::Tracking(format!("model {name} has no version in stage or alias {stage:?}")))
            }
        }
    }

    /// Directory holding the artifact `uri` points at.
    pub fn artifact_dir(&self, uri: &ModelUri) -> TrainingResult<PathBuf> {
        match uri {
            ModelUri::Run { run_id, artifact_path } => {
                let run = find_run(&self.layout, run_id)?
                    .ok_or_else(|| TrainingError::Tracking(format!("run {run_id} not found")))?;
                Ok(self.layout.artifacts_dir(&run.experiment_id, &run.run_id).join(artifact_path))
            }
            ModelUri::Registry { name, selector } => {
                let version = self.resolve(name, selector)?;
                match version.source.parse::<ModelUri>()? {
                    source @ ModelUri::Run { .. } => self.artifact_dir(&source),
                    ModelUri::Registry { .. } => Err(TrainingError::Tracking(format!(
                        "model {name} version {} has a non-run source {}",
                        version.version, version.source
                    ))),
                }
            }
        }
    }

    /// Resolve and load the model behind `uri`.
    ///
    /// Any failure is logged and returned as [`TrainingError::ModelLoad`].
    pub fn load_model(&self, uri: &ModelUri) -> TrainingResult<(RandomForestClassifier, ModelManifest)> {
        let loaded = self.artifact_dir(uri).and_then(|dir| load_model(&dir));
        match loaded {
            Ok(loaded) => {
                info!(uri = %uri, run_id = %loaded.1.run_id, "loaded model");
                Ok(loaded)
            }
            Err(e) => {
                error!(uri = %uri, error = %e, "failed to load model");
                Err(TrainingError::model_load(uri, e))
            }
        }
    }
}
