use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::insight_core::feature::validate_features;
use crate::utils::{percentile, validate_contamination, AnalysisError};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Isolation forest parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestOptions {
    /// Number of trees in the forest
    pub n_trees: usize,
    /// Upper bound on the per-tree subsample size
    pub max_samples: usize,
    /// Depth limit; `ceil(log2(sample_size))` when absent
    pub max_tree_depth: Option<usize>,
    /// Expected share of outliers, used to place the decision threshold
    pub contamination: f64,
    /// RNG seed; every fit starts from this seed
    pub seed: u64,
}

impl Default for ForestOptions {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            max_tree_depth: None,
            contamination: 0.0001,
            seed: 42,
        }
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A fitted isolation forest
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fit a forest on the rows of `features`
    ///
    /// Fitting is deterministic: the RNG is seeded from `options.seed` on
    /// every call, so identical input yields an identical forest.
    pub fn fit(features: &Array2<f64>, options: &ForestOptions) -> Result<Self, AnalysisError> {
        validate_features(features)?;

        let n_samples = features.nrows();
        if n_samples < 2 {
            return Err(AnalysisError::ValidationError(
                "isolation forest needs at least two samples".to_string(),
            ));
        }
        if options.n_trees == 0 {
            return Err(AnalysisError::ModelError("n_trees must be > 0".to_string()));
        }

        let sample_size = n_samples.min(options.max_samples.max(2));
        let max_depth = options
            .max_tree_depth
            .unwrap_or_else(|| (sample_size as f64).log2().ceil() as usize);

        let mut rng = StdRng::seed_from_u64(options.seed);
        let trees = (0..options.n_trees)
            .map(|_| {
                let mut indices =
                    rand::seq::index::sample(&mut rng, n_samples, sample_size).into_vec();
                build_tree(features, &mut indices, 0, max_depth, &mut rng)
            })
            .collect();

        Ok(Self { trees, sample_size })
    }

    /// Anomaly score in [0, 1]; higher is more anomalous
    pub fn score(&self, sample: ArrayView1<'_, f64>) -> f64 {
        let total: f64 = self
            .trees
            .iter()
            .map(|tree| path_length(tree, sample, 0))
            .sum();
        let mean_path = total / self.trees.len() as f64;

        2f64.powf(-mean_path / average_path_length(self.sample_size))
    }
}

fn build_tree(
    features: &Array2<f64>,
    indices: &mut [usize],
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= max_depth || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    // Only features that still vary inside this node can split it
    let candidates: Vec<(usize, f64, f64)> = (0..features.ncols())
        .filter_map(|col| {
            let (min, max) = indices.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), &row| {
                    let v = features[[row, col]];
                    (lo.min(v), hi.max(v))
                },
            );
            (max > min).then_some((col, min, max))
        })
        .collect();

    if candidates.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = split_threshold(min, max, rng.gen::<f64>());

    // min <= threshold < max keeps both sides non-empty
    let mut split_at = 0;
    for i in 0..indices.len() {
        if features[[indices[i], feature]] <= threshold {
            indices.swap(i, split_at);
            split_at += 1;
        }
    }
    let (left, right) = indices.split_at_mut(split_at);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(features, left, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(features, right, depth + 1, max_depth, rng)),
    }
}

/// Uniform point in `[min, max)` for `t` in `[0, 1)`, without forming
/// `max - min`, which overflows for values of opposite sign near `f64::MAX`
fn split_threshold(min: f64, max: f64, t: f64) -> f64 {
    let threshold = min * (1.0 - t) + max * t;
    if threshold >= min && threshold < max {
        threshold
    } else {
        min
    }
}

fn path_length(node: &Node, sample: ArrayView1<'_, f64>, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if sample[*feature] <= *threshold {
                path_length(left, sample, depth + 1)
            } else {
                path_length(right, sample, depth + 1)
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Run isolation forest outlier detection
///
/// # Arguments
/// * `features` - Feature matrix (rows=samples, cols=features)
/// * `options` - Forest parameters; `options.contamination` places the threshold
///
/// # Returns
/// * `Ok((scores, labels))` - Anomaly scores (0-1) and outlier labels
/// * `Err(AnalysisError)` - If validation or fitting fails
///
/// # Algorithm
/// A point is an outlier when its score lies strictly above the
/// `100 * (1 - contamination)` percentile of all scores. With a tiny
/// contamination only the single most isolated point of a group can pass,
/// and ties at the top flag nothing.
pub fn run_isolation_forest(
    features: Array2<f64>,
    options: &ForestOptions,
) -> Result<(Vec<f64>, Vec<bool>), AnalysisError> {
    validate_contamination(options.contamination)?;

    let forest = IsolationForest::fit(&features, options)?;
    let scores: Vec<f64> = features.rows().into_iter().map(|row| forest.score(row)).collect();

    let threshold = percentile(&scores, 100.0 * (1.0 - options.contamination))
        .ok_or_else(|| AnalysisError::ModelError("no scores computed".to_string()))?;
    let labels: Vec<bool> = scores.iter().map(|&s| s > threshold).collect();

    Ok((scores, labels))
}
