//! Bagged CART random forest for binary labels.

use crate::classifier::Classifier;
use crate::dataset::FeatureRow;
use crate::error::{TrainingError, TrainingResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub random_state: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self { n_estimators: 100, max_depth: 5, random_state: 42 }
    }
}

impl ForestParams {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.n_estimators == 0 {
            return Err(TrainingError::InvalidSpec("n_estimators must be >= 1".to_string()));
        }
        if self.max_depth == 0 {
            return Err(TrainingError::InvalidSpec("max_depth must be >= 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Node {
    /// `proba` is the share of positive samples that reached the leaf.
    Leaf { proba: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }

    fn predict_proba_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { proba } => return proba,
                Node::Split { feature, threshold, left, right } => {
                    idx = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

struct BestSplit {
    impurity: f64,
    feature: usize,
    threshold: f64,
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

struct TreeBuilder<'a, R> {
    rows: &'a [R],
    labels: &'a [u8],
    n_features: usize,
    max_features: usize,
    max_depth: usize,
    nodes: Vec<Node>,
}

impl<R: AsRef<[f64]>> TreeBuilder<'_, R> {
    fn value(&self, row: usize, feature: usize) -> f64 {
        self.rows[row].as_ref()[feature]
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn grow(&mut self, sample: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let total = sample.len();
        let positives = sample.iter().filter(|&&i| self.labels[i] == 1).count();
        let proba = positives as f64 / total as f64;

        if depth >= self.max_depth || total < 2 || positives == 0 || positives == total {
            return self.push(Node::Leaf { proba });
        }
        let Some(best) = self.best_split(&sample, positives, rng) else {
            return self.push(Node::Leaf { proba });
        };

        let (left, right): (Vec<usize>, Vec<usize>) =
            sample.into_iter().partition(|&i| self.value(i, best.feature) <= best.threshold);

        // Reserve the slot so the parent precedes its children.
        let id = self.push(Node::Leaf { proba });
        let left = self.grow(left, depth + 1, rng);
        let right = self.grow(right, depth + 1, rng);
        self.nodes[id] = Node::Split { feature: best.feature, threshold: best.threshold, left, right };
        id
    }

    /// Best Gini split over a random subset of `max_features` non-constant features.
    fn best_split(&self, sample: &[usize], positives: usize, rng: &mut StdRng) -> Option<BestSplit> {
        let total = sample.len();
        let mut features: Vec<usize> = (0..self.n_features).collect();
        features.shuffle(rng);

        let mut best: Option<BestSplit> = None;
        let mut evaluated = 0;
        for feature in features {
            if evaluated >= self.max_features {
                break;
            }
            let mut values: Vec<(f64, u8)> =
                sample.iter().map(|&i| (self.value(i, feature), self.labels[i])).collect();
            values.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut has_candidate = false;
            let mut left_n = 0;
            let mut left_pos = 0;
            for pair in values.windows(2) {
                left_n += 1;
                left_pos += usize::from(pair[0].1);
                if !(pair[0].0 < pair[1].0) {
                    continue;
                }
                has_candidate = true;

                let right_n = total - left_n;
                let right_pos = positives - left_pos;
                let impurity = (left_n as f64 * gini(left_pos, left_n)
                    + right_n as f64 * gini(right_pos, right_n))
                    / total as f64;

                if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                    let mut threshold = (pair[0].0 + pair[1].0) / 2.0;
                    if threshold >= pair[1].0 {
                        threshold = pair[0].0;
                    }
                    best = Some(BestSplit { impurity, feature, threshold });
                }
            }
            if has_candidate {
                evaluated += 1;
            }
        }
        best
    }
}

/// Random forest classifier: bootstrap-sampled CART trees with soft voting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    params: ForestParams,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForestClassifier {
    #[must_use]
    pub fn new(params: ForestParams) -> Self {
        Self { params, n_features: 0, trees: Vec::new() }
    }

    #[must_use]
    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    #[must_use]
    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn fit<R: AsRef<[f64]>>(&mut self, rows: &[R], labels: &[u8]) -> TrainingResult<()> {
        self.params.validate()?;
        if rows.is_empty() {
            return Err(TrainingError::Dataset("cannot fit on an empty dataset".to_string()));
        }
        if rows.len() != labels.len() {
            return Err(TrainingError::Dataset(format!(
                "feature rows ({}) and labels ({}) differ in length",
                rows.len(),
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(TrainingError::Dataset(format!("labels must be 0 or 1, found {bad}")));
        }
        let n_features = rows[0].as_ref().len();
        if n_features == 0 || rows.iter().any(|r| r.as_ref().len() != n_features) {
            return Err(TrainingError::Dataset("feature rows must share a non-zero width".to_string()));
        }

        let n = rows.len();
        let max_features = ((n_features as f64).sqrt() as usize).max(1);
        let mut rng = StdRng::seed_from_u64(self.params.random_state);

        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for _ in 0..self.params.n_estimators {
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let mut builder = TreeBuilder {
                rows,
                labels,
                n_features,
                max_features,
                max_depth: self.params.max_depth,
                nodes: Vec::new(),
            };
            builder.grow(sample, 0, &mut rng);
            trees.push(DecisionTree { nodes: builder.nodes });
        }

        debug!(trees = trees.len(), rows = n, max_features, "fitted random forest");
        self.n_features = n_features;
        self.trees = trees;
        Ok(())
    }

    pub fn predict_proba_rows<R: AsRef<[f64]>>(&self, rows: &[R]) -> TrainingResult<Vec<f64>> {
        if !self.is_fitted() {
            return Err(TrainingError::InvalidSpec("random forest is not fitted".to_string()));
        }
        rows.iter()
            .map(|row| {
                let row = row.as_ref();
                if row.len() != self.n_features {
                    return Err(TrainingError::Dataset(format!(
                        "expected {} features, got {}",
                        self.n_features,
                        row.len()
                    )));
                }
                let sum: f64 = self.trees.iter().map(|t| t.predict_proba_row(row)).sum();
                Ok(sum / self.trees.len() as f64)
            })
            .collect()
    }
}

impl Classifier for RandomForestClassifier {
    fn id(&self) -> &'static str {
        "random-forest"
    }

    fn predict_proba(&self, rows: &[FeatureRow]) -> TrainingResult<Vec<f64>> {
        self.predict_proba_rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Survival driven by sex and class, with some noise columns.
    fn toy_rows() -> (Vec<FeatureRow>, Vec<u8>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..60 {
            let sex = f64::from(u8::from(i % 2 == 0));
            let pclass = f64::from((i % 3) as u8 + 1);
            rows.push([pclass, sex, 20.0 + f64::from(i as u8), 0.0, 0.0, 10.0 * pclass]);
            labels.push(u8::from(sex == 1.0 && pclass < 3.0));
        }
        (rows, labels)
    }

    #[test]
    fn test_forest_learns_separable_rule() {
        let (rows, labels) = toy_rows();
        let mut forest = RandomForestClassifier::new(ForestParams { n_estimators: 25, max_depth: 4, random_state: 0 });
        forest.fit(&rows, &labels).unwrap();

        let predictions = forest.predict(&rows).unwrap();
        let correct = predictions.iter().zip(&labels).filter(|(p, l)| p == l).count();
        assert!(correct >= 54, "only {correct}/60 correct");
    }

    #[test]
    fn test_forest_is_deterministic_for_seed() {
        let (rows, labels) = toy_rows();
        let params = ForestParams { n_estimators: 10, max_depth: 3, random_state: 7 };

        let mut a = RandomForestClassifier::new(params);
        let mut b = RandomForestClassifier::new(params);
        a.fit(&rows, &labels).unwrap();
        b.fit(&rows, &labels).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.predict_proba(&rows).unwrap(), b.predict_proba(&rows).unwrap());
    }

    #[test]
    fn test_trees_respect_max_depth() {
        let (rows, labels) = toy_rows();
        let mut forest = RandomForestClassifier::new(ForestParams { n_estimators: 5, max_depth: 2, random_state: 1 });
        forest.fit(&rows, &labels).unwrap();
        assert!(forest.trees().iter().all(|t| t.depth() <= 2));
    }

    #[test]
    fn test_probabilities_are_bounded() {
        let (rows, labels) = toy_rows();
        let mut forest = RandomForestClassifier::new(ForestParams { n_estimators: 8, max_depth: 3, random_state: 3 });
        forest.fit(&rows, &labels).unwrap();
        assert!(forest.predict_proba(&rows).unwrap().iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_serialized_forest_predicts_identically() {
        let (rows, labels) = toy_rows();
        let mut forest = RandomForestClassifier::new(ForestParams { n_estimators: 4, max_depth: 3, random_state: 5 });
        forest.fit(&rows, &labels).unwrap();

        let json = serde_json::to_string(&forest).unwrap();
        let restored: RandomForestClassifier = serde_json::from_str(&json).unwrap();
        assert_eq!(forest.predict(&rows).unwrap(), restored.predict(&rows).unwrap());
    }

    #[test]
    fn test_invalid_params_and_inputs() {
        let (rows, labels) = toy_rows();
        let mut forest = RandomForestClassifier::new(ForestParams { n_estimators: 0, max_depth: 3, random_state: 0 });
        assert!(matches!(forest.fit(&rows, &labels), Err(TrainingError::InvalidSpec(_))));

        let mut forest = RandomForestClassifier::new(ForestParams::default());
        assert!(forest.fit(&rows, &labels[..10]).is_err());
        assert!(forest.predict(&rows).is_err());
    }
}
