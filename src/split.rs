//! Seeded train/holdout partitioning.

use crate::encoder::FeatureMatrix;
use crate::error::{Result, RiskError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

/// Train and holdout halves of an encoded dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train_x: FeatureMatrix,
    pub test_x: FeatureMatrix,
    pub train_y: Vec<u8>,
    pub test_y: Vec<u8>,
}

/// Partition rows into train and holdout sets.
///
/// Row indices are shuffled with a `StdRng` seeded from `seed`, the first
/// `ceil(n * holdout_fraction)` go to the holdout set. The same inputs and
/// seed always give the same partition.
pub fn split(
    features: &FeatureMatrix,
    labels: &[u8],
    holdout_fraction: f64,
    seed: u64,
) -> Result<Split> {
    if !(holdout_fraction > 0.0 && holdout_fraction < 1.0) {
        return Err(RiskError::config(format!(
            "holdout_fraction must lie in (0, 1), got {}",
            holdout_fraction
        )));
    }
    if labels.len() != features.n_rows() {
        return Err(RiskError::malformed(format!(
            "{} labels for {} feature rows",
            labels.len(),
            features.n_rows()
        )));
    }

    let n = features.n_rows();
    let n_test = (n as f64 * holdout_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(RiskError::config(format!(
            "holdout_fraction {} leaves an empty partition for {} rows",
            holdout_fraction, n
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let (test_idx, train_idx) = indices.split_at(n_test);

    debug!(
        train_rows = train_idx.len(),
        test_rows = test_idx.len(),
        seed = seed,
        "Dataset split"
    );

    Ok(Split {
        train_x: features.select(train_idx),
        test_x: features.select(test_idx),
        train_y: train_idx.iter().map(|&i| labels[i]).collect(),
        test_y: test_idx.iter().map(|&i| labels[i]).collect(),
    })
}
