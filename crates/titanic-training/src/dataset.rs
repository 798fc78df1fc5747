use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Feature columns in canonical order.
pub const FEATURES: [&str; 6] = ["Pclass", "Sex", "Age", "SibSp", "Parch", "Fare"];
pub const TARGET_COL: &str = "Survived";
pub const PROCESSED_FILE_NAME: &str = "train_processed.csv";
pub const DEFAULT_RAW_PATH: &str = "data/raw/train.csv";

pub type FeatureRow = [f64; FEATURES.len()];

/// Stable identifier for a processed dataset (content hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub String);

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One row of the raw passenger CSV.
///
/// Every field is optional: empty or unparsable cells become `None` and are
/// caught by the integrity check after cleaning.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "Pclass", default, deserialize_with = "csv::invalid_option")]
    pub pclass: Option<i64>,
    #[serde(rename = "Sex", default, deserialize_with = "csv::invalid_option")]
    pub sex: Option<String>,
    #[serde(rename = "Age", default, deserialize_with = "csv::invalid_option")]
    pub age: Option<f64>,
    #[serde(rename = "SibSp", default, deserialize_with = "csv::invalid_option")]
    pub sib_sp: Option<i64>,
    #[serde(rename = "Parch", default, deserialize_with = "csv::invalid_option")]
    pub parch: Option<i64>,
    #[serde(rename = "Fare", default, deserialize_with = "csv::invalid_option")]
    pub fare: Option<f64>,
    #[serde(rename = "Survived", default, deserialize_with = "csv::invalid_option")]
    pub survived: Option<u8>,
}

/// A cleaned row: six encoded features plus the target, nothing missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    #[serde(rename = "Pclass")]
    pub pclass: i64,
    #[serde(rename = "Sex")]
    pub sex: u8,
    #[serde(rename = "Age")]
    pub age: f64,
    #[serde(rename = "SibSp")]
    pub sib_sp: i64,
    #[serde(rename = "Parch")]
    pub parch: i64,
    #[serde(rename = "Fare")]
    pub fare: f64,
    #[serde(rename = "Survived")]
    pub survived: u8,
}

impl ProcessedRecord {
    #[must_use]
    pub fn features(&self) -> FeatureRow {
        [
            self.pclass as f64,
            f64::from(self.sex),
            self.age,
            self.sib_sp as f64,
            self.parch as f64,
            self.fare,
        ]
    }
}

/// Feature matrix with the six canonical columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    #[must_use]
    pub fn new(rows: Vec<FeatureRow>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn columns(&self) -> &'static [&'static str] {
        &FEATURES
    }

    #[must_use]
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, or `None` for an unknown column name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = FEATURES.iter().position(|c| *c == name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        Self { rows: indices.iter().map(|&i| self.rows[i]).collect() }
    }
}

/// Processed features and the aligned target column.
#[derive(Debug, Clone)]
pub struct ProcessedDataset {
    pub features: FeatureTable,
    pub target: Vec<u8>,
    pub dataset_id: DatasetId,
    pub path: PathBuf,
}

impl ProcessedDataset {
    #[must_use]
    pub fn len(&self) -> usize {
        self.target.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    /// Rows at `indices`, features and target kept aligned.
    #[must_use]
    pub fn subset(&self, indices: &[usize]) -> (FeatureTable, Vec<u8>) {
        (self.features.select(indices), indices.iter().map(|&i| self.target[i]).collect())
    }
}

/// Median of the non-NaN values; the mean of the two middle values for even counts.
#[must_use]
pub fn median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[must_use]
pub fn encode_sex(value: &str) -> Option<u8> {
    match value {
        "male" => Some(0),
        "female" => Some(1),
        _ => None,
    }
}

/// Row after median fill and sex encoding, before the integrity check.
struct FilledRow {
    pclass: Option<i64>,
    sex: Option<u8>,
    age: Option<f64>,
    sib_sp: Option<i64>,
    parch: Option<i64>,
    fare: Option<f64>,
    survived: Option<u8>,
}

impl FilledRow {
    fn first_missing_feature(&self) -> Option<&'static str> {
        [
            self.pclass.is_none(),
            self.sex.is_none(),
            self.age.is_none(),
            self.sib_sp.is_none(),
            self.parch.is_none(),
            self.fare.is_none(),
        ]
        .iter()
        .position(|missing| *missing)
        .map(|idx| FEATURES[idx])
    }
}

fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

fn fill_and_encode(records: &[RawRecord]) -> Vec<FilledRow> {
    let age_median = median(records.iter().filter_map(|r| r.age));
    let fare_median = median(records.iter().filter_map(|r| r.fare));
    debug!(?age_median, ?fare_median, rows = records.len(), "computed fill medians");

    records
        .iter()
        .map(|r| FilledRow {
            pclass: r.pclass,
            sex: r.sex.as_deref().and_then(encode_sex),
            age: present(r.age).or(age_median),
            sib_sp: r.sib_sp,
            parch: r.parch,
            fare: present(r.fare).or(fare_median),
            survived: r.survived.filter(|v| *v <= 1),
        })
        .collect()
}

fn integrity_error(row: usize, column: &str) -> TrainingError {
    TrainingError::DataIntegrity(format!(
        "data row {} still has a missing or invalid `{column}` value after preprocessing",
        row + 1
    ))
}

/// Clean a raw batch into processed records.
///
/// Age and Fare gaps are filled with the batch medians, Sex is encoded, and
/// any value still missing afterwards is rejected.
pub fn preprocess_records(records: &[RawRecord]) -> TrainingResult<Vec<ProcessedRecord>> {
    fill_and_encode(records)
        .into_iter()
        .enumerate()
        .map(|(idx, row)| {
            if let Some(col) = row.first_missing_feature() {
                return Err(integrity_error(idx, col));
            }
            match (row.pclass, row.sex, row.age, row.sib_sp, row.parch, row.fare, row.survived) {
                (Some(pclass), Some(sex), Some(age), Some(sib_sp), Some(parch), Some(fare), Some(survived)) => {
                    Ok(ProcessedRecord { pclass, sex, age, sib_sp, parch, fare, survived })
                }
                _ => Err(integrity_error(idx, TARGET_COL)),
            }
        })
        .collect()
}

/// Clean raw rows into features only; the target column is ignored.
pub fn clean_features(records: &[RawRecord]) -> TrainingResult<FeatureTable> {
    let rows = fill_and_encode(records)
        .into_iter()
        .enumerate()
        .map(|(idx, row)| match (row.pclass, row.sex, row.age, row.sib_sp, row.parch, row.fare) {
            (Some(pclass), Some(sex), Some(age), Some(sib_sp), Some(parch), Some(fare)) => {
                Ok([pclass as f64, f64::from(sex), age, sib_sp as f64, parch as f64, fare])
            }
            _ => Err(integrity_error(idx, row.first_missing_feature().unwrap_or(TARGET_COL))),
        })
        .collect::<TrainingResult<Vec<_>>>()?;
    Ok(FeatureTable::new(rows))
}

/// Load the raw passenger CSV.
///
/// `require_target` controls whether the `Survived` column must be present
/// (training data) or may be absent (inference input).
pub fn load_raw_records(raw_path: &Path, require_target: bool) -> TrainingResult<Vec<RawRecord>> {
    if !raw_path.exists() {
        return Err(TrainingError::NotFound {
            path: raw_path.to_path_buf(),
            hint: format!(
                "Place the Kaggle `train.csv` at `{DEFAULT_RAW_PATH}` or pass its location with --raw-path."
            ),
        });
    }

    let mut reader = csv::Reader::from_path(raw_path)?;
    let headers = reader.headers()?.clone();
    let required = FEATURES.iter().copied().chain(require_target.then_some(TARGET_COL));
    let missing: Vec<&str> = required.filter(|col| !headers.iter().any(|h| h == *col)).collect();
    if !missing.is_empty() {
        return Err(TrainingError::Dataset(format!(
            "{} is missing required columns: {}",
            raw_path.display(),
            missing.join(", ")
        )));
    }

    let records = reader.deserialize().collect::<Result<Vec<RawRecord>, _>>()?;
    if records.is_empty() {
        return Err(TrainingError::Dataset(format!("{} has no data rows", raw_path.display())));
    }
    Ok(records)
}

pub fn write_processed(path: &Path, records: &[ProcessedRecord]) -> TrainingResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn compute_dataset_id(bytes: &[u8]) -> DatasetId {
    DatasetId(hex::encode(Sha256::digest(bytes)))
}

/// Read a processed CSV back into features and target.
pub fn load_processed_dataset(path: &Path) -> TrainingResult<ProcessedDataset> {
    let bytes = std::fs::read(path)?;
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let records = reader.deserialize().collect::<Result<Vec<ProcessedRecord>, _>>()?;

    Ok(ProcessedDataset {
        features: FeatureTable::new(records.iter().map(ProcessedRecord::features).collect()),
        target: records.iter().map(|r| r.survived).collect(),
        dataset_id: compute_dataset_id(&bytes),
        path: path.to_path_buf(),
    })
}

/// Return the processed dataset under `processing_dir`, building it from
/// `raw_path` only when the cache file does not exist yet.
pub fn ensure_processed_dataset(processing_dir: &Path, raw_path: &Path) -> TrainingResult<ProcessedDataset> {
    prepare_dataset(processing_dir, raw_path, false)
}

/// Like [`ensure_processed_dataset`], but `force` rebuilds an existing cache.
pub fn prepare_dataset(processing_dir: &Path, raw_path: &Path, force: bool) -> TrainingResult<ProcessedDataset> {
    let processed_file = processing_dir.join(PROCESSED_FILE_NAME);

    if force || !processed_file.exists() {
        let raw = load_raw_records(raw_path, true)?;
        let processed = preprocess_records(&raw)?;
        write_processed(&processed_file, &processed)?;
        info!(
            raw = %raw_path.display(),
            processed = %processed_file.display(),
            rows = processed.len(),
            "wrote processed dataset"
        );
    } else {
        debug!(path = %processed_file.display(), "reusing cached processed dataset");
    }

    load_processed_dataset(&processed_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "PassengerId,Survived,Pclass,Name,Sex,Age,SibSp,Parch,Fare\n";

    fn write_raw(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("raw").join("train.csv");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("{HEADER}{body}")).unwrap();
        path
    }

    #[test]
    fn test_median_odd_even_and_empty() {
        assert_eq!(median([3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median([4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median([f64::NAN, 5.0]), Some(5.0));
        assert_eq!(median(Vec::<f64>::new()), None);
    }

    #[test]
    fn test_encode_sex() {
        assert_eq!(encode_sex("male"), Some(0));
        assert_eq!(encode_sex("female"), Some(1));
        assert_eq!(encode_sex("Male"), None);
        assert_eq!(encode_sex(""), None);
    }

    #[test]
    fn test_preprocess_fills_age_and_fare_with_batch_median() {
        let temp = TempDir::new().unwrap();
        let raw = write_raw(
            &temp,
            "1,0,3,\"Braund, Mr. Owen\",male,20,1,0,7.25\n\
             2,1,1,\"Cumings, Mrs. John\",female,,1,0,71.28\n\
             3,1,3,\"Heikkinen, Miss. Laina\",female,40,0,0,\n\
             4,0,2,\"Allen, Mr. William\",male,30,0,0,8.05\n",
        );

        let records = load_raw_records(&raw, true).unwrap();
        let processed = preprocess_records(&records).unwrap();

        assert_eq!(processed.len(), 4);
        assert_eq!(processed[1].age, 30.0);
        assert_eq!(processed[2].fare, 8.05);
        assert_eq!(processed.iter().map(|r| r.sex).collect::<Vec<_>>(), vec![0, 1, 1, 0]);
    }

    #[test]
    fn test_preprocess_rejects_unknown_sex() {
        let records = vec![RawRecord {
            pclass: Some(1),
            sex: Some("unknown".to_string()),
            age: Some(30.0),
            sib_sp: Some(0),
            parch: Some(0),
            fare: Some(10.0),
            survived: Some(1),
        }];
        let err = preprocess_records(&records).unwrap_err();
        assert!(matches!(err, TrainingError::DataIntegrity(ref msg) if msg.contains("Sex")));
    }

    #[test]
    fn test_preprocess_rejects_missing_pclass() {
        let temp = TempDir::new().unwrap();
        let raw = write_raw(&temp, "1,0,,x,male,20,1,0,7.25\n2,1,1,y,female,30,0,0,9.5\n");
        let records = load_raw_records(&raw, true).unwrap();
        let err = preprocess_records(&records).unwrap_err();
        assert!(matches!(err, TrainingError::DataIntegrity(ref msg) if msg.contains("Pclass")));
    }

    #[test]
    fn test_missing_raw_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = ensure_processed_dataset(&temp.path().join("processed"), &temp.path().join("nope.csv"))
            .unwrap_err();
        assert!(matches!(err, TrainingError::NotFound { .. }));
        assert!(err.to_string().contains("train.csv"));
    }

    #[test]
    fn test_missing_required_column_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.csv");
        std::fs::write(&path, "Survived,Pclass,Sex,Age,SibSp,Parch\n1,1,female,30,0,0\n").unwrap();
        let err = load_raw_records(&path, true).unwrap_err();
        assert!(matches!(err, TrainingError::Dataset(ref msg) if msg.contains("Fare")));
    }

    #[test]
    fn test_inference_input_may_omit_target() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.csv");
        std::fs::write(&path, "Pclass,Sex,Age,SibSp,Parch,Fare\n3,male,,0,0,7.8\n1,female,38,1,0,71.3\n").unwrap();

        let records = load_raw_records(&path, false).unwrap();
        let table = clean_features(&records).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.column("Age").unwrap(), vec![38.0, 38.0]);
    }

    #[test]
    fn test_cache_is_reused_and_stable() {
        let temp = TempDir::new().unwrap();
        let raw = write_raw(
            &temp,
            "1,0,3,a,male,22,1,0,7.25\n2,1,1,b,female,38,1,0,71.28\n3,1,3,c,female,,0,0,7.92\n",
        );
        let processing_dir = temp.path().join("processed");

        let first = ensure_processed_dataset(&processing_dir, &raw).unwrap();
        let bytes_first = std::fs::read(processing_dir.join(PROCESSED_FILE_NAME)).unwrap();

        // The raw file is no longer consulted once the cache exists.
        std::fs::remove_file(&raw).unwrap();
        let second = ensure_processed_dataset(&processing_dir, &raw).unwrap();
        let bytes_second = std::fs::read(processing_dir.join(PROCESSED_FILE_NAME)).unwrap();

        assert_eq!(bytes_first, bytes_second);
        assert_eq!(first.dataset_id, second.dataset_id);
        assert_eq!(second.features.len(), 3);
        assert_eq!(second.target, vec![0, 1, 1]);
    }

    #[test]
    fn test_processed_file_has_canonical_header() {
        let temp = TempDir::new().unwrap();
        let raw = write_raw(&temp, "1,0,3,a,male,22,1,0,7.25\n");
        let processing_dir = temp.path().join("nested").join("processed");

        ensure_processed_dataset(&processing_dir, &raw).unwrap();
        let contents = std::fs::read_to_string(processing_dir.join(PROCESSED_FILE_NAME)).unwrap();
        assert_eq!(contents.lines().next().unwrap(), "Pclass,Sex,Age,SibSp,Parch,Fare,Survived");
    }
}
