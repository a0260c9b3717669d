//! Random Forest Classifier
//!
//! Bagged CART trees with weighted Gini impurity. Each tree fits a bootstrap
//! sample and considers a random subset of sqrt(width) features at every
//! split. With balanced weighting each class contributes
//! n / (classes_present * count(class)) per row.
//!
//! Class probabilities are averaged over trees; the prediction is the most
//! probable class, ties resolved toward the lower class index.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::strategy::error::ModelError;

const MODEL: &str = "random forest";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub balanced: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            trees: 100,
            max_depth: 8,
            min_samples_split: 2,
            balanced: true,
            seed: 42,
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
        proba: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
    /// Unnormalized impurity decrease per feature
    importances: Vec<f64>,
}

/// Training view shared by every tree
struct TrainingSet<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [usize],
    weights: Vec<f64>,
    n_classes: usize,
    width: usize,
    max_features: usize,
}

impl TrainingSet<'_> {
    fn class_weights(&self, sample: &[usize]) -> Vec<f64> {
        let mut dist = vec![0.0; self.n_classes];
        for &i in sample {
            dist[self.labels[i]] += self.weights[i];
        }
        dist
    }
}

fn gini(dist: &[f64]) -> f64 {
    let total: f64 = dist.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - dist.iter().map(|w| (w / total) * (w / total)).sum::<f64>()
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

impl DecisionTree {
    fn fit(data: &TrainingSet<'_>, sample: Vec<usize>, config: &ForestConfig, rng: &mut ChaCha8Rng) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            importances: vec![0.0; data.width],
        };
        tree.grow(data, sample, 0, config, rng);
        tree
    }

    fn grow(
        &mut self,
        data: &TrainingSet<'_>,
        sample: Vec<usize>,
        depth: usize,
        config: &ForestConfig,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let dist = data.class_weights(&sample);
        let total: f64 = dist.iter().sum();
        let impurity = gini(&dist);

        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            proba: dist.iter().map(|w| if total > 0.0 { w / total } else { 0.0 }).collect(),
        });

        if depth >= config.max_depth || sample.len() < config.min_samples_split || impurity <= 0.0 {
            return id;
        }

        let Some(best) = self.best_split(data, &sample, total, impurity, rng) else {
            return id;
        };
        self.importances[best.feature] += best.decrease;

        let (left, right): (Vec<usize>, Vec<usize>) = sample
            .into_iter()
            .partition(|&i| data.rows[i][best.feature] <= best.threshold);
        let left_id = self.grow(data, left, depth + 1, config, rng);
        let right_id = self.grow(data, right, depth + 1, config, rng);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: left_id,
            right: right_id,
        };
        id
    }

    fn best_split(
        &self,
        data: &TrainingSet<'_>,
        sample: &[usize],
        total: f64,
        impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let features = index::sample(rng, data.width, data.max_features).into_vec();
        let mut best: Option<BestSplit> = None;
        let mut order = sample.to_vec();

        for feature in features {
            order.sort_by(|&a, &b| data.rows[a][feature].total_cmp(&data.rows[b][feature]));

            let mut left = vec![0.0; data.n_classes];
            let mut right = data.class_weights(&order);
            let mut left_total = 0.0;

            for pos in 0..order.len().saturating_sub(1) {
                let i = order[pos];
                let w = data.weights[i];
                left[data.labels[i]] += w;
                right[data.labels[i]] -= w;
                left_total += w;

                let here = data.rows[i][feature];
                let next = data.rows[order[pos + 1]][feature];
                if next <= here {
                    continue;
                }
                let right_total = total - left_total;
                let children = (left_total * gini(&left) + right_total * gini(&right)) / total;
                let decrease = total * (impurity - children);
                if best.as_ref().map_or(true, |b| decrease > b.decrease) && decrease > 0.0 {
                    best = Some(BestSplit {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        decrease,
                    });
                }
            }
        }
        best
    }

    fn proba(&self, row: &[f64]) -> &[f64] {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => node = if row[*feature] <= *threshold { *left } else { *right },
                Node::Leaf { proba } => return proba,
            }
        }
    }
}

/// Fitted classifier over class indices `0..n_classes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_classes: usize,
    width: usize,
    /// Class weights used during fitting
    pub class_weights: Vec<f64>,
}

impl RandomForest {
    pub fn fit(
        rows: &[Vec<f64>],
        labels: &[usize],
        n_classes: usize,
        config: &ForestConfig,
    ) -> Result<Self, ModelError> {
        if rows.is_empty() {
            return Err(ModelError::InsufficientRows {
                model: MODEL,
                required: 1,
                actual: 0,
            });
        }
        if rows.len() != labels.len() {
            return Err(ModelError::DimensionMismatch {
                model: MODEL,
                expected: rows.len(),
                actual: labels.len(),
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
        if let Some(&bad) = labels.iter().find(|&&c| c >= n_classes) {
            return Err(ModelError::DegenerateTrainingSet {
                model: MODEL,
                reason: format!("label {} outside 0..{}", bad, n_classes),
            });
        }

        let mut counts = vec![0usize; n_classes];
        for &c in labels {
            counts[c] += 1;
        }
        let present = counts.iter().filter(|&&c| c > 0).count();
        let class_weights: Vec<f64> = counts
            .iter()
            .map(|&c| {
                if !config.balanced {
                    1.0
                } else if c == 0 {
                    0.0
                } else {
                    rows.len() as f64 / (present * c) as f64
                }
            })
            .collect();

        let data = TrainingSet {
            rows,
            labels,
            weights: labels.iter().map(|&c| class_weights[c]).collect(),
            n_classes,
            width,
            max_features: ((width as f64).sqrt() as usize).clamp(1, width.max(1)),
        };

        let n = rows.len();
        let trees: Vec<DecisionTree> = (0..config.trees)
            .into_par_iter()
            .map(|t| {
                let stream = config.seed.wrapping_add(t as u64).wrapping_mul(0x2545_F491_4F6C_DD1D);
                let mut rng = ChaCha8Rng::seed_from_u64(stream);
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(&data, bootstrap, config, &mut rng)
            })
            .collect();

        tracing::debug!(
            "random forest: {} trees over {} rows x {} features, class counts {:?}",
            trees.len(),
            n,
            width,
            counts
        );

        Ok(Self {
            trees,
            n_classes,
            width,
            class_weights,
        })
    }

    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        if row.len() != self.width {
            return Err(ModelError::DimensionMismatch {
                model: MODEL,
                expected: self.width,
                actual: row.len(),
            });
        }
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, t) in proba.iter_mut().zip(tree.proba(row)) {
                *p += t;
            }
        }
        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        Ok(proba)
    }

    pub fn predict(&self, row: &[f64]) -> Result<usize, ModelError> {
        let proba = self.predict_proba(row)?;
        let mut best = 0;
        for (c, &p) in proba.iter().enumerate() {
            if p > proba[best] {
                best = c;
            }
        }
        Ok(best)
    }

    pub fn predict_all(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, ModelError> {
        rows.par_iter().map(|r| self.predict(r)).collect()
    }

    /// Mean impurity decrease per feature, normalized to sum to 1
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.width];
        for tree in &self.trees {
            let sum: f64 = tree.importances.iter().sum();
            if sum > 0.0 {
                for (t, imp) in total.iter_mut().zip(&tree.importances) {
                    *t += imp / sum;
                }
            }
        }
        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            total.iter_mut().for_each(|t| *t /= sum);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Class determined by the first feature; second feature is noise
    fn separable(n: usize) -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n {
            let class = i % 3;
            rows.push(vec![class as f64 * 10.0 + rng.gen_range(-1.0..1.0), rng.gen_range(-5.0..5.0)]);
            labels.push(class);
        }
        (rows, labels)
    }

    #[test]
    fn test_learns_separable_classes() {
        let (rows, labels) = separable(150);
        let forest = RandomForest::fit(&rows, &labels, 4, &ForestConfig { trees: 25, ..Default::default() }).unwrap();
        let predicted = forest.predict_all(&rows).unwrap();
        let correct = predicted.iter().zip(&labels).filter(|(p, l)| p == l).count();
        assert!(correct as f64 / labels.len() as f64 > 0.95);
        assert_eq!(forest.predict(&[20.0, 0.0]).unwrap(), 2);
        // class 3 never seen
        assert_eq!(forest.predict_proba(&[0.0, 0.0]).unwrap()[3], 0.0);
    }

    #[test]
    fn test_importances_favor_informative_feature() {
        let (rows, labels) = separable(150);
        let forest = RandomForest::fit(&rows, &labels, 3, &ForestConfig { trees: 25, ..Default::default() }).unwrap();
        let imp = forest.feature_importances();
        assert_relative_eq!(imp.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_balanced_weights() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let labels = vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 1];
        let forest = RandomForest::fit(&rows, &labels, 4, &ForestConfig { trees: 3, ..Default::default() }).unwrap();
        assert_relative_eq!(forest.class_weights[0], 10.0 / 16.0);
        assert_relative_eq!(forest.class_weights[1], 10.0 / 4.0);
        assert_eq!(forest.class_weights[2], 0.0);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (rows, labels) = separable(60);
        let config = ForestConfig { trees: 10, ..Default::default() };
        let a = RandomForest::fit(&rows, &labels, 3, &config).unwrap();
        let b = RandomForest::fit(&rows, &labels, 3, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_class_predicts_that_class() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0]];
        let forest = RandomForest::fit(&rows, &[2, 2, 2], 4, &ForestConfig { trees: 5, ..Default::default() }).unwrap();
        assert_eq!(forest.predict(&[100.0]).unwrap(), 2);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(RandomForest::fit(&[], &[], 4, &ForestConfig::default()).is_err());
        assert!(matches!(
            RandomForest::fit(&[vec![1.0]], &[7], 4, &ForestConfig::default()),
            Err(ModelError::DegenerateTrainingSet { .. })
        ));
    }
}
