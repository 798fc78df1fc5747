//! Local file-backed experiment tracking.
//!
//! A [`TrackingContext`] is an explicit handle on one experiment inside a
//! store root; runs are opened from it and written only through the
//! [`ActiveRun`] scope it returns.

use crate::artifacts::{read_json, write_json};
use crate::error::{TrainingError, TrainingResult};
use crate::layout::TrackingLayout;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentInfo {
    pub experiment_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub run_name: String,
    pub experiment_id: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

/// Everything logged under one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub info: RunInfo,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
}

fn validate_key(kind: &str, key: &str) -> TrainingResult<()> {
    if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
        return Err(TrainingError::Tracking(format!("invalid {kind} key: {key:?}")));
    }
    Ok(())
}

/// Experiments in the store, ordered by numeric id.
pub fn list_experiments(layout: &TrackingLayout) -> TrainingResult<Vec<ExperimentInfo>> {
    let dir = match std::fs::read_dir(layout.root()) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut out = Vec::new();
    for entry in dir {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.parse::<u64>().is_err() {
            continue;
        }
        let meta = layout.experiment_meta_path(&name);
        if meta.exists() {
            out.push(read_json::<ExperimentInfo>(&meta)?);
        }
    }
    out.sort_by_key(|e| e.experiment_id.parse::<u64>().unwrap_or(u64::MAX));
    Ok(out)
}

/// Locate a run by id across all experiments.
pub fn find_run(layout: &TrackingLayout, run_id: &str) -> TrainingResult<Option<RunInfo>> {
    validate_key("run", run_id)?;
    for experiment in list_experiments(layout)? {
        let meta = layout.run_meta_path(&experiment.experiment_id, run_id);
        if meta.exists() {
            return Ok(Some(read_json(&meta)?));
        }
    }
    Ok(None)
}

fn read_value_dir(dir: &Path) -> TrainingResult<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        if entry.path().is_file() {
            let key = entry.file_name().to_string_lossy().to_string();
            out.insert(key, std::fs::read_to_string(entry.path())?);
        }
    }
    Ok(out)
}

/// Latest value of a metric file (`<ts_ms> <value> <step>` per line).
fn parse_latest_metric(key: &str, contents: &str) -> TrainingResult<f64> {
    contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .next_back()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| TrainingError::Tracking(format!("metric file for {key} is malformed")))
}

/// Load everything logged under a run.
pub fn load_run(layout: &TrackingLayout, info: RunInfo) -> TrainingResult<RunRecord> {
    let (exp, run) = (info.experiment_id.as_str(), info.run_id.as_str());
    let params = read_value_dir(&layout.params_dir(exp, run))?;
    let tags = read_value_dir(&layout.tags_dir(exp, run))?;
    let metrics = read_value_dir(&layout.metrics_dir(exp, run))?
        .into_iter()
        .map(|(k, v)| parse_latest_metric(&k, &v).map(|value| (k, value)))
        .collect::<TrainingResult<BTreeMap<_, _>>>()?;

    Ok(RunRecord { info, params, metrics, tags })
}

/// Handle on one experiment of a tracking store.
#[derive(Debug, Clone)]
pub struct TrackingContext {
    layout: TrackingLayout,
    experiment: ExperimentInfo,
}

impl TrackingContext {
    /// Open the store at `root` and select `experiment_name`, creating it if needed.
    pub fn open(root: impl Into<PathBuf>, experiment_name: &str) -> TrainingResult<Self> {
        let layout = TrackingLayout::new(root.into());
        std::fs::create_dir_all(layout.root())?;

        let experiments = list_experiments(&layout)?;
        if let Some(experiment) = experiments.iter().find(|e| e.name == experiment_name) {
            return Ok(Self { layout, experiment: experiment.clone() });
        }

        let next_id = experiments
            .iter()
            .filter_map(|e| e.experiment_id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let experiment = ExperimentInfo {
            experiment_id: next_id.to_string(),
            name: experiment_name.to_string(),
            created_at: Utc::now(),
        };
        std::fs::create_dir_all(layout.experiment_dir(&experiment.experiment_id))?;
        write_json(layout.experiment_meta_path(&experiment.experiment_id), &experiment)?;
        info!(experiment_id = %experiment.experiment_id, name = experiment_name, "created experiment");

        Ok(Self { layout, experiment })
    }

    #[must_use]
    pub fn layout(&self) -> &TrackingLayout {
        &self.layout
    }

    #[must_use]
    pub fn experiment(&self) -> &ExperimentInfo {
        &self.experiment
    }

    pub fn start_run(&self, run_name: &str) -> TrainingResult<ActiveRun> {
        let info = RunInfo {
            run_id: Uuid::new_v4().simple().to_string(),
            run_name: run_name.to_string(),
            experiment_id: self.experiment.experiment_id.clone(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
        };
        self.layout.ensure_run_dirs(&info.experiment_id, &info.run_id)?;
        write_json(self.layout.run_meta_path(&info.experiment_id, &info.run_id), &info)?;
        info!(run_id = %info.run_id, run_name, experiment = %self.experiment.name, "started run");

        Ok(ActiveRun { layout: self.layout.clone(), info, closed: false })
    }

    /// Runs of this experiment, oldest first.
    pub fn list_runs(&self) -> TrainingResult<Vec<RunInfo>> {
        let dir = self.layout.experiment_dir(&self.experiment.experiment_id);
        let mut runs = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let meta = entry?.path().join(crate::layout::META_FILE);
            if meta.exists() {
                runs.push(read_json::<RunInfo>(&meta)?);
            }
        }
        runs.sort_by_key(|r| r.start_time);
        Ok(runs)
    }

    pub fn get_run(&self, run_id: &str) -> TrainingResult<RunRecord> {
        validate_key("run", run_id)?;
        let meta = self.layout.run_meta_path(&self.experiment.experiment_id, run_id);
        if !meta.exists() {
            return Err(TrainingError::Tracking(format!(
                "run {run_id} not found in experiment {}",
                self.experiment.name
            )));
        }
        load_run(&self.layout, read_json(&meta)?)
    }
}

/// Write scope of a single run.
///
/// Call [`ActiveRun::finish`] to mark the run `FINISHED`; a scope dropped
/// without it (early return, `?`, panic) is marked `FAILED`.
#[derive(Debug)]
pub struct ActiveRun {
    layout: TrackingLayout,
    info: RunInfo,
    closed: bool,
}

impl ActiveRun {
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    #[must_use]
    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    /// Params are immutable: re-logging a key with a different value fails.
    pub fn log_param(&self, key: &str, value: impl Display) -> TrainingResult<()> {
        validate_key("param", key)?;
        let value = value.to_string();
        let path = self.layout.params_dir(&self.info.experiment_id, &self.info.run_id).join(key);
        if path.exists() {
            let existing = std::fs::read_to_string(&path)?;
            if existing != value {
                return Err(TrainingError::Tracking(format!(
                    "param {key} already logged as {existing:?}, refusing to change it to {value:?}"
                )));
            }
            return Ok(());
        }
        std::fs::write(path, &value)?;
        debug!(run_id = %self.info.run_id, key, value = %value, "logged param");
        Ok(())
    }

    pub fn log_metric(&self, key: &str, value: f64) -> TrainingResult<()> {
        validate_key("metric", key)?;
        let path = self.layout.metrics_dir(&self.info.experiment_id, &self.info.run_id).join(key);
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{} {} 0", Utc::now().timestamp_millis(), value)?;
        debug!(run_id = %self.info.run_id, key, value, "logged metric");
        Ok(())
    }

    pub fn log_metrics<'k>(&self, metrics: impl IntoIterator<Item = (&'k str, f64)>) -> TrainingResult<()> {
        for (key, value) in metrics {
            self.log_metric(key, value)?;
        }
        Ok(())
    }

    pub fn set_tag(&self, key: &str, value: impl Display) -> TrainingResult<()> {
        validate_key("tag", key)?;
        let path = self.layout.tags_dir(&self.info.experiment_id, &self.info.run_id).join(key);
        std::fs::write(path, value.to_string())?;
        Ok(())
    }

    /// Directory for artifact `artifact_path` of this run, created on demand.
    pub fn artifact_dir(&self, artifact_path: &str) -> TrainingResult<PathBuf> {
        validate_key("artifact", artifact_path)?;
        let dir = self.layout.artifacts_dir(&self.info.experiment_id, &self.info.run_id).join(artifact_path);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn close(&mut self, status: RunStatus) -> TrainingResult<()> {
        self.closed = true;
        self.info.status = status;
        self.info.end_time = Some(Utc::now());
        write_json(self.layout.run_meta_path(&self.info.experiment_id, &self.info.run_id), &self.info)
    }

    pub fn finish(mut self) -> TrainingResult<RunInfo> {
        self.close(RunStatus::Finished)?;
        info!(run_id = %self.info.run_id, "finished run");
        Ok(self.info.clone())
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        warn!(run_id = %self.info.run_id, "run scope ended without finishing; marking FAILED");
        if let Err(e) = self.close(RunStatus::Failed) {
            warn!(run_id = %self.info.run_id, error = %e, "failed to record run failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_reuses_experiment_by_name() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("mlruns");

        let train = TrackingContext::open(&root, "train").unwrap();
        let eval = TrackingContext::open(&root, "eval").unwrap();
        let again = TrackingContext::open(&root, "train").unwrap();

        assert_eq!(train.experiment().experiment_id, "1");
        assert_eq!(eval.experiment().experiment_id, "2");
        assert_eq!(again.experiment(), train.experiment());
    }

    #[test]
    fn test_run_logs_params_metrics_and_tags() {
        let temp = TempDir::new().unwrap();
        let ctx = TrackingContext::open(temp.path().join("mlruns"), "train").unwrap();

        let run = ctx.start_run("RF_n10_d3").unwrap();
        run.log_param("n_estimators", 10).unwrap();
        run.log_param("test_size", 0.2).unwrap();
        run.log_metric("accuracy", 0.5).unwrap();
        run.log_metric("accuracy", 0.75).unwrap();
        run.set_tag("model_type", "RandomForest").unwrap();
        let info = run.finish().unwrap();

        let record = ctx.get_run(&info.run_id).unwrap();
        assert_eq!(record.info.status, RunStatus::Finished);
        assert!(record.info.end_time.is_some());
        assert_eq!(record.params["n_estimators"], "10");
        assert_eq!(record.params["test_size"], "0.2");
        assert_eq!(record.metrics["accuracy"], 0.75);
        assert_eq!(record.tags["model_type"], "RandomForest");
    }

    #[test]
    fn test_dropped_scope_is_marked_failed() {
        let temp = TempDir::new().unwrap();
        let ctx = TrackingContext::open(temp.path().join("mlruns"), "train").unwrap();

        let run_id = {
            let run = ctx.start_run("aborted").unwrap();
            run.log_metric("accuracy", 0.1).unwrap();
            run.run_id().to_string()
        };

        assert_eq!(ctx.get_run(&run_id).unwrap().info.status, RunStatus::Failed);
    }

    #[test]
    fn test_param_cannot_change() {
        let temp = TempDir::new().unwrap();
        let ctx = TrackingContext::open(temp.path().join("mlruns"), "train").unwrap();
        let run = ctx.start_run("r").unwrap();

        run.log_param("max_depth", 3).unwrap();
        run.log_param("max_depth", 3).unwrap();
        assert!(matches!(run.log_param("max_depth", 4), Err(TrainingError::Tracking(_))));
        assert!(run.log_param("../escape", 1).is_err());
        run.finish().unwrap();
    }

    #[test]
    fn test_find_run_searches_all_experiments() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("mlruns");
        TrackingContext::open(&root, "first").unwrap();
        let ctx = TrackingContext::open(&root, "second").unwrap();
        let run_id = ctx.start_run("r").unwrap().finish().unwrap().run_id;

        let found = find_run(ctx.layout(), &run_id).unwrap().unwrap();
        assert_eq!(found.experiment_id, "2");
        assert!(find_run(ctx.layout(), "missing").unwrap().is_none());
        assert_eq!(ctx.list_runs().unwrap().len(), 1);
    }
}
