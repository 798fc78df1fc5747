use crate::dataset::FeatureRow;
use crate::error::TrainingResult;

/// A fitted binary classifier over the canonical feature rows.
///
/// Positive class is `1` (survived).
pub trait Classifier {
    fn id(&self) -> &'static str;

    /// Probability of the positive class for each row.
    fn predict_proba(&self, rows: &[FeatureRow]) -> TrainingResult<Vec<f64>>;

    fn predict(&self, rows: &[FeatureRow]) -> TrainingResult<Vec<u8>> {
        Ok(self.predict_proba(rows)?.into_iter().map(|p| u8::from(p > 0.5)).collect())
    }
}
