//! Seeded train/validation/test partitioning.

use ht_types::{DataError, Dataset, HtResult, Partition, PartitionKind, Row, Split};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Ratios and seed for the two-stage split.
///
/// The first stage holds out `held_out_ratio` of all rows; the second stage
/// divides the hold-out into validation and test, with `test_fraction` of it
/// going to test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub held_out_ratio: f64,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            held_out_ratio: 0.2,
            test_fraction: 0.5,
            seed: 42,
        }
    }
}

/// Shuffle `rows` with a generator seeded by `seed` and cut it in two.
///
/// Returns `(train, test)` where `test` holds `ceil(test_ratio * n)` rows.
/// Both halves keep the shuffled order. Class balance is not preserved.
pub fn train_test_split(
    rows: &[Row],
    test_ratio: f64,
    seed: u64,
) -> HtResult<(Vec<Row>, Vec<Row>)> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(DataError::InvalidRatio { ratio: test_ratio }.into());
    }

    let n = rows.len();
    let n_test = (test_ratio * n as f64).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(DataError::InsufficientData {
            message: format!(
                "{} rows cannot be split with test ratio {} (train {}, test {})",
                n, test_ratio, n_train, n_test
            ),
        }
        .into());
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let test = order[..n_test].iter().map(|&i| rows[i].clone()).collect();
    let train = order[n_test..].iter().map(|&i| rows[i].clone()).collect();
    Ok((train, test))
}

/// Partition a dataset into train, validation and test sets.
pub fn partition(dataset: &Dataset, config: &SplitConfig) -> HtResult<Split> {
    let (train, held_out) = train_test_split(&dataset.rows, config.held_out_ratio, config.seed)?;
    let (validation, test) = train_test_split(&held_out, config.test_fraction, config.seed)?;

    let split = Split {
        train: Partition::new(PartitionKind::Train, train),
        validation: Partition::new(PartitionKind::Validation, validation),
        test: Partition::new(PartitionKind::Test, test),
    };

    tracing::info!(
        "Partitioned {} rows of '{}': train={}, validation={}, test={}",
        dataset.len(),
        dataset.name,
        split.train.len(),
        split.validation.len(),
        split.test.len()
    );

    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iris::load_iris;

    fn toy_rows(n: usize) -> Vec<Row> {
        (0..n).map(|i| Row::new(i, vec![i as f64], (i % 2) as f64)).collect()
    }

    #[test]
    fn iris_split_sizes() {
        let iris = load_iris().unwrap();
        let split = partition(&iris, &SplitConfig::default()).unwrap();

        assert_eq!(split.train.len(), 120);
        assert_eq!(split.validation.len(), 15);
        assert_eq!(split.test.len(), 15);
        assert_eq!(split.total_rows(), iris.len());
    }

    #[test]
    fn partitions_are_disjoint() {
        let iris = load_iris().unwrap();
        let split = partition(&iris, &SplitConfig::default()).unwrap();
        assert!(split.is_disjoint());

        let mut all: Vec<usize> = split
            .partitions()
            .iter()
            .flat_map(|p| p.ids())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..150).collect::<Vec<_>>());
    }

    #[test]
    fn same_seed_same_split() {
        let iris = load_iris().unwrap();
        let config = SplitConfig::default();
        let a = partition(&iris, &config).unwrap();
        let b = partition(&iris, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seed_changes_membership() {
        let iris = load_iris().unwrap();
        let a = partition(&iris, &SplitConfig::default()).unwrap();
        let b = partition(
            &iris,
            &SplitConfig {
                seed: 7,
                ..SplitConfig::default()
            },
        )
        .unwrap();
        assert_ne!(a.test.ids(), b.test.ids());
    }

    #[test]
    fn test_size_rounds_up() {
        let (train, test) = train_test_split(&toy_rows(11), 0.5, 1).unwrap();
        assert_eq!(test.len(), 6);
        assert_eq!(train.len(), 5);
    }

    #[test]
    fn rejects_out_of_range_ratio() {
        for ratio in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            let err = train_test_split(&toy_rows(10), ratio, 42).unwrap_err();
            assert!(err.to_string().contains("Split ratio"), "ratio {ratio}");
        }
    }

    #[test]
    fn rejects_too_few_rows() {
        let err = train_test_split(&toy_rows(1), 0.5, 42).unwrap_err();
        assert!(err.to_string().contains("Insufficient data"));

        let err = train_test_split(&[], 0.2, 42).unwrap_err();
        assert!(err.to_string().contains("Insufficient data"));
    }
}
