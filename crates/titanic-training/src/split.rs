use crate::error::{TrainingError, TrainingResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Row indices of the two partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle-split `target` into train/test indices, preserving class balance.
///
/// `ceil(test_size * n)` rows go to the test partition. Each class receives
/// the floor of its proportional share, and the leftover slots go to the
/// classes with the largest fractional remainder.
pub fn stratified_split(target: &[u8], test_size: f64, seed: u64) -> TrainingResult<SplitIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(TrainingError::InvalidSpec(format!("test_size must be in (0, 1), got {test_size}")));
    }

    let n = target.len();
    let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in target.iter().enumerate() {
        by_class.entry(label).or_default().push(idx);
    }

    if let Some((label, members)) = by_class.iter().find(|(_, members)| members.len() < 2) {
        return Err(TrainingError::InvalidSpec(format!(
            "class {label} has {} member(s); a stratified split needs at least 2 per class",
            members.len()
        )));
    }

    let n_test = (test_size * n as f64).ceil() as usize;
    let n_train = n - n_test;
    let n_classes = by_class.len();
    if n_test < n_classes || n_train < n_classes {
        return Err(TrainingError::InvalidSpec(format!(
            "split of {n} rows into {n_train} train / {n_test} test cannot hold all {n_classes} classes"
        )));
    }

    let counts: Vec<usize> = by_class.values().map(Vec::len).collect();
    let quotas = allocate_test_quotas(&counts, n, n_test);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);
    for (members, quota) in by_class.values().zip(quotas) {
        let mut shuffled = members.clone();
        shuffled.shuffle(&mut rng);
        test.extend_from_slice(&shuffled[..quota]);
        train.extend_from_slice(&shuffled[quota..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Ok(SplitIndices { train, test })
}

fn allocate_test_quotas(counts: &[usize], n: usize, n_test: usize) -> Vec<usize> {
    let mut quotas: Vec<usize> = counts.iter().map(|&c| c * n_test / n).collect();
    let remaining = n_test - quotas.iter().sum::<usize>();

    // The leftover is a sum of fractional parts, so it is smaller than the
    // class count and a single +1 pass suffices.
    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let rem_a = counts[a] * n_test % n;
        let rem_b = counts[b] * n_test % n;
        rem_b.cmp(&rem_a).then(counts[b].cmp(&counts[a])).then(a.cmp(&b))
    });
    for &idx in order.iter().take(remaining) {
        quotas[idx] = (quotas[idx] + 1).min(counts[idx]);
    }
    quotas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(ones: usize, zeros: usize) -> Vec<u8> {
        let mut out = vec![1u8; ones];
        out.extend(vec![0u8; zeros]);
        out
    }

    fn count_ones(target: &[u8], idx: &[usize]) -> usize {
        idx.iter().filter(|&&i| target[i] == 1).count()
    }

    #[test]
    fn test_split_sizes_and_disjoint_cover() {
        let target = labels(38, 62);
        let split = stratified_split(&target, 0.2, 42).unwrap();

        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);

        let mut all: Vec<usize> = split.train.iter().chain(split.test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_preserves_class_proportion_within_one_sample() {
        for (ones, zeros) in [(38, 62), (6, 4), (50, 50), (7, 93), (342, 549)] {
            let target = labels(ones, zeros);
            let n = target.len() as f64;
            let split = stratified_split(&target, 0.2, 7).unwrap();
            let share = ones as f64 / n;

            let test_ones = count_ones(&target, &split.test) as f64;
            let train_ones = count_ones(&target, &split.train) as f64;
            assert!((test_ones - share * split.test.len() as f64).abs() <= 1.0);
            assert!((train_ones - share * split.train.len() as f64).abs() <= 1.0);
        }
    }

    #[test]
    fn test_split_is_deterministic_for_seed() {
        let target = labels(30, 70);
        let a = stratified_split(&target, 0.2, 42).unwrap();
        let b = stratified_split(&target, 0.2, 42).unwrap();
        let c = stratified_split(&target, 0.2, 43).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_ten_row_split_takes_one_per_class() {
        let target = labels(6, 4);
        let split = stratified_split(&target, 0.2, 0).unwrap();
        assert_eq!(split.test.len(), 2);
        assert_eq!(count_ones(&target, &split.test), 1);
    }

    #[test]
    fn test_split_rejects_singleton_class() {
        let target = labels(1, 9);
        assert!(matches!(stratified_split(&target, 0.2, 0), Err(TrainingError::InvalidSpec(_))));
    }

    #[test]
    fn test_split_rejects_bad_test_size() {
        let target = labels(5, 5);
        assert!(stratified_split(&target, 0.0, 0).is_err());
        assert!(stratified_split(&target, 1.0, 0).is_err());
    }
}
