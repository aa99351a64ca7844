//! Seeded random train/test partition.
//!
//! Each row is assigned independently by a uniform draw, so subset sizes are
//! only approximately proportional to the weights and the split ignores time
//! order. That is a known limitation for price series and is kept as is.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::features::FeatureMatrix;

/// Training and test subsets of one feature matrix
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train: FeatureMatrix,
    pub test: FeatureMatrix,
}

/// Assign every row to a bucket according to normalized `weights`.
///
/// Returns the row indices of each bucket, preserving the original order.
pub fn random_partition(n_rows: usize, weights: &[f64], seed: u64) -> Vec<Vec<usize>> {
    let total: f64 = weights.iter().sum();
    let mut bounds = Vec::with_capacity(weights.len());
    let mut acc = 0.0;
    for w in weights {
        acc += w / total;
        bounds.push(acc);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut buckets = vec![Vec::new(); weights.len()];

    for row in 0..n_rows {
        let draw: f64 = rng.r#gen();
        let bucket = bounds
            .iter()
            .position(|&b| draw < b)
            .unwrap_or(weights.len() - 1);
        buckets[bucket].push(row);
    }

    buckets
}

/// Split into train/test with `train_ratio` of rows expected in train.
pub fn train_test_split(matrix: &FeatureMatrix, train_ratio: f64, seed: u64) -> TrainTestSplit {
    let buckets = random_partition(matrix.n_rows(), &[train_ratio, 1.0 - train_ratio], seed);

    let split = TrainTestSplit {
        train: matrix.select(&buckets[0]),
        test: matrix.select(&buckets[1]),
    };
    tracing::info!(
        "Split {} rows into {} train / {} test (seed {})",
        matrix.n_rows(),
        split.train.n_rows(),
        split.test.n_rows(),
        seed
    );
    split
}
