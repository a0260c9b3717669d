//! Isolation Forest
//!
//! Unsupervised outlier detector. Each tree recursively partitions a random
//! subsample with random axis-aligned cuts; anomalies are isolated in fewer
//! cuts. For a row x with mean path length E[h(x)] over the forest:
//!
//!   s(x) = 2^(-E[h(x)] / c(psi)),   raw score = -s(x)
//!
//! where psi is the subsample size and c(n) the average unsuccessful-search
//! path length of a binary search tree. The decision score subtracts an
//! offset equal to the `contamination` quantile of the training raw scores,
//! so roughly `contamination` of the training rows fall below zero.
//!
//! Every tree draws from its own ChaCha stream seeded from (seed, tree index),
//! so results are identical across runs and thread counts.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::strategy::error::ModelError;
use crate::strategy::stats;

const MODEL: &str = "isolation forest";
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForestConfig {
    pub trees: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
    pub min_rows: usize,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            trees: 100,
            max_samples: 256,
            contamination: 0.02,
            seed: 42,
            min_rows: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(rows: &[Vec<f64>], sample: Vec<usize>, max_depth: usize, rng: &mut ChaCha8Rng) -> Self {
        let mut tree = IsolationTree { nodes: Vec::new() };
        tree.grow(rows, sample, 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        rows: &[Vec<f64>],
        sample: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: sample.len() });
        if depth >= max_depth || sample.len() <= 1 {
            return id;
        }

        // only features that still vary inside this node can split it
        let width = rows[sample[0]].len();
        let candidates: Vec<(usize, f64, f64)> = (0..width)
            .filter_map(|f| {
                let (lo, hi) = sample.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(rows[i][f]), hi.max(rows[i][f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<usize>, Vec<usize>) =
            sample.into_iter().partition(|&i| rows[i][feature] <= threshold);

        let left_id = self.grow(rows, left, depth + 1, max_depth, rng);
        let right_id = self.grow(rows, right, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left: left_id,
            right: right_id,
        };
        id
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

fn tree_seed(seed: u64, tree: usize) -> u64 {
    seed ^ (tree as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Fitted forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    width: usize,
    /// Decision threshold on raw scores
    pub offset: f64,
    pub contamination: f64,
}

impl IsolationForest {
    pub fn fit(rows: &[Vec<f64>], config: &IsolationForestConfig) -> Result<Self, ModelError> {
        let required = config.min_rows.max(2);
        if rows.len() < required {
            return Err(ModelError::InsufficientRows {
                model: MODEL,
                required,
                actual: rows.len(),
            });
        }
        let width = rows[0].len();
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(ModelError::DimensionMismatch {
                model: MODEL,
                expected: width,
                actual: bad.len(),
            });
        }

        let n = rows.len();
        let sample_size = config.max_samples.clamp(2, n);
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        let trees: Vec<IsolationTree> = (0..config.trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(tree_seed(config.seed, t));
                let sample = index::sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::build(rows, sample, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            width,
            offset: 0.0,
            contamination: config.contamination,
        };

        let raw: Vec<f64> = rows.par_iter().map(|r| forest.raw_score(r)).collect();
        forest.offset = stats::quantile(&raw, config.contamination).unwrap_or(-0.5);

        tracing::debug!(
            "isolation forest: {} trees, {} rows, subsample {}, depth {}, offset {:.6}",
            forest.trees.len(),
            n,
            sample_size,
            max_depth,
            forest.offset
        );
        Ok(forest)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Negated anomaly score in [-1, 0); lower is more anomalous
    fn raw_score(&self, row: &[f64]) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.path_length(row)).sum();
        let mean_depth = total / self.trees.len() as f64;
        -(2f64.powf(-mean_depth / average_path_length(self.sample_size)))
    }

    pub fn score_samples(&self, row: &[f64]) -> Result<f64, ModelError> {
        if row.len() != self.width {
            return Err(ModelError::DimensionMismatch {
                model: MODEL,
                expected: self.width,
                actual: row.len(),
            });
        }
        Ok(self.raw_score(row))
    }

    /// Decision score; negative means anomalous
    pub fn decision_function(&self, row: &[f64]) -> Result<f64, ModelError> {
        Ok(self.score_samples(row)? - self.offset)
    }

    pub fn decision_scores(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        rows.par_iter().map(|r| self.decision_function(r)).collect()
    }

    pub fn is_anomaly(&self, row: &[f64]) -> Result<bool, ModelError> {
        Ok(self.decision_function(row)? < 0.0)
    }
}
