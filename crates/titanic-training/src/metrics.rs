use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Binary classification metrics, positive class = 1.
///
/// A zero denominator yields 0.0 for that metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

/// Confusion counts for the positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionCounts {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionCounts {
    pub fn tally(y_true: &[u8], y_pred: &[u8]) -> TrainingResult<Self> {
        if y_true.len() != y_pred.len() {
            return Err(TrainingError::Dataset(format!(
                "y_true ({}) and y_pred ({}) differ in length",
                y_true.len(),
                y_pred.len()
            )));
        }
        let mut counts = Self::default();
        for (&truth, &pred) in y_true.iter().zip(y_pred) {
            match (truth == 1, pred == 1) {
                (true, true) => counts.true_positive += 1,
                (false, true) => counts.false_positive += 1,
                (false, false) => counts.true_negative += 1,
                (true, false) => counts.false_negative += 1,
            }
        }
        Ok(counts)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 { 0.0 } else { numerator as f64 / denominator as f64 }
}

impl ClassificationMetrics {
    pub fn compute(y_true: &[u8], y_pred: &[u8]) -> TrainingResult<Self> {
        let c = ConfusionCounts::tally(y_true, y_pred)?;
        let precision = ratio(c.true_positive, c.true_positive + c.false_positive);
        let recall = ratio(c.true_positive, c.true_positive + c.false_negative);
        let f1_score = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Ok(Self {
            accuracy: ratio(c.true_positive + c.true_negative, c.total()),
            precision,
            recall,
            f1_score,
        })
    }

    /// Metric name → value, using the names logged to the tracker.
    #[must_use]
    pub fn as_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("accuracy", self.accuracy),
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1_score", self.f1_score),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_definitions() {
        // TP=2, FP=1, TN=1, FN=1
        let y_true = [1, 1, 1, 0, 0];
        let y_pred = [1, 1, 0, 1, 0];
        let m = ClassificationMetrics::compute(&y_true, &y_pred).unwrap();

        assert!((m.accuracy - 0.6).abs() < 1e-12);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1_score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_positive_predictions_yields_zero() {
        let m = ClassificationMetrics::compute(&[1, 0, 0], &[0, 0, 0]).unwrap();
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1_score, 0.0);
        assert!((m.accuracy - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_metrics_are_deterministic() {
        let y_true = [1, 0, 1, 1, 0, 0, 1];
        let y_pred = [1, 0, 0, 1, 1, 0, 1];
        assert_eq!(
            ClassificationMetrics::compute(&y_true, &y_pred).unwrap(),
            ClassificationMetrics::compute(&y_true, &y_pred).unwrap()
        );
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        assert!(ClassificationMetrics::compute(&[1, 0], &[1]).is_err());
    }

    #[test]
    fn test_as_map_uses_logged_names() {
        let m = ClassificationMetrics::compute(&[1], &[1]).unwrap();
        let keys: Vec<_> = m.as_map().into_keys().collect();
        assert_eq!(keys, vec!["accuracy", "f1_score", "precision", "recall"]);
    }
}
