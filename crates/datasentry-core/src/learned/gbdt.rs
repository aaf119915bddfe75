//! Histogram-based gradient-boosted decision trees for binary targets.
//!
//! Trees grow leaf-wise: at every step the leaf with the largest split gain
//! is split, until `num_leaves` is reached or no split clears the
//! `min_data_in_leaf` / `min_sum_hessian` limits. Features are bucketed into
//! at most `max_bin` histogram bins before training. Training is
//! single-threaded and driven by one seeded RNG, so the same inputs always
//! produce the same booster.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::config::LearnedConfig;
use crate::error::{DetectionError, Result};

/// Training parameters for [`Booster::train`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoosterParams {
    pub num_iterations: usize,
    pub learning_rate: f64,
    pub num_leaves: usize,
    pub min_data_in_leaf: usize,
    pub min_sum_hessian: f64,
    pub feature_fraction: f64,
    pub bagging_fraction: f64,
    pub bagging_freq: usize,
    pub max_bin: usize,
    pub lambda_l2: f64,
    /// Reweight the minority class so both classes carry equal total weight.
    pub is_unbalance: bool,
    pub seed: u64,
}

impl BoosterParams {
    pub fn from_config(config: &LearnedConfig, seed: u64) -> Self {
        Self {
            num_iterations: config.num_iterations,
            learning_rate: config.learning_rate,
            num_leaves: config.num_leaves,
            min_data_in_leaf: config.min_data_in_leaf,
            min_sum_hessian: config.min_sum_hessian,
            feature_fraction: config.feature_fraction,
            bagging_fraction: config.bagging_fraction,
            bagging_freq: config.bagging_freq,
            max_bin: config.max_bin,
            lambda_l2: config.lambda_l2,
            is_unbalance: true,
            seed,
        }
    }
}

// =============================================================================
// Binning
// =============================================================================

/// Maps raw feature values to histogram bins.
///
/// Bin `b` holds values `x <= upper_bounds[b]`; the last bound is infinite.
#[derive(Debug, Clone, PartialEq)]
struct BinMapper {
    upper_bounds: Vec<f64>,
}

impl BinMapper {
    fn fit(values: &[f64], max_bin: usize) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mut distinct = sorted.clone();
        distinct.dedup();

        let mut cuts = Vec::new();
        if distinct.len() <= max_bin {
            cuts.extend(distinct.windows(2).map(|w| midpoint(w[0], w[1])));
        } else {
            // equal-frequency cuts
            let n = sorted.len();
            for k in 1..max_bin {
                let idx = k * n / max_bin;
                let (lo, hi) = (sorted[idx - 1], sorted[idx]);
                if lo < hi {
                    let cut = midpoint(lo, hi);
                    if cuts.last().is_none_or(|&last| cut > last) {
                        cuts.push(cut);
                    }
                }
            }
        }
        cuts.push(f64::INFINITY);
        Self { upper_bounds: cuts }
    }

    fn bin(&self, value: f64) -> usize {
        self.upper_bounds.partition_point(|&ub| ub < value)
    }

    fn num_bins(&self) -> usize {
        self.upper_bounds.len()
    }
}

fn midpoint(lo: f64, hi: f64) -> f64 {
    lo + (hi - lo) / 2.0
}

// =============================================================================
// Trees
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Split {
        feature: usize,
        bin: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, features: &[Vec<f64>], row: usize) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if features[*feature][row] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    fn predict_binned(&self, bins: &[Vec<usize>], row: usize) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    bin,
                    left,
                    right,
                    ..
                } => {
                    idx = if bins[*feature][row] <= *bin {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct SplitCandidate {
    feature: usize,
    bin: usize,
    threshold: f64,
    gain: f64,
}

#[derive(Debug)]
struct LeafWork {
    node: usize,
    rows: Vec<usize>,
    sum_gradient: f64,
    sum_hessian: f64,
    split: Option<SplitCandidate>,
}

struct GrowContext<'a> {
    bins: &'a [Vec<usize>],
    mappers: &'a [BinMapper],
    gradients: &'a [f64],
    hessians: &'a [f64],
    features: &'a [usize],
    params: &'a BoosterParams,
}

impl GrowContext<'_> {
    fn leaf(&self, node: usize, rows: Vec<usize>) -> LeafWork {
        let sum_gradient = rows.iter().map(|&r| self.gradients[r]).sum();
        let sum_hessian = rows.iter().map(|&r| self.hessians[r]).sum();
        let split = self.best_split(&rows, sum_gradient, sum_hessian);
        LeafWork {
            node,
            rows,
            sum_gradient,
            sum_hessian,
            split,
        }
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda_l2)
    }

    fn best_split(&self, rows: &[usize], sum_g: f64, sum_h: f64) -> Option<SplitCandidate> {
        let min_data = self.params.min_data_in_leaf.max(1);
        if rows.len() < 2 * min_data {
            return None;
        }
        let parent_score = self.score(sum_g, sum_h);
        let mut best: Option<SplitCandidate> = None;

        for &feature in self.features {
            let mapper = &self.mappers[feature];
            let num_bins = mapper.num_bins();
            if num_bins < 2 {
                continue;
            }

            let mut hist_g = vec![0.0; num_bins];
            let mut hist_h = vec![0.0; num_bins];
            let mut hist_n = vec![0usize; num_bins];
            for &r in rows {
                let b = self.bins[feature][r];
                hist_g[b] += self.gradients[r];
                hist_h[b] += self.hessians[r];
                hist_n[b] += 1;
            }

            let (mut left_g, mut left_h, mut left_n) = (0.0, 0.0, 0usize);
            for b in 0..num_bins - 1 {
                left_g += hist_g[b];
                left_h += hist_h[b];
                left_n += hist_n[b];
                let right_n = rows.len() - left_n;
                if left_n < min_data || right_n < min_data {
                    continue;
                }
                let right_g = sum_g - left_g;
                let right_h = sum_h - left_h;
                if left_h < self.params.min_sum_hessian || right_h < self.params.min_sum_hessian {
                    continue;
                }

                let gain = self.score(left_g, left_h) + self.score(right_g, right_h) - parent_score;
                if gain > 0.0 && best.as_ref().is_none_or(|s| gain > s.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        bin: b,
                        threshold: mapper.upper_bounds[b],
                        gain,
                    });
                }
            }
        }
        best
    }

    /// Grow one tree over `rows`. Returns `None` when the root cannot split.
    fn grow(&self, rows: Vec<usize>, importance: &mut [f64]) -> Option<Tree> {
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut leaves = vec![self.leaf(0, rows)];

        while leaves.len() < self.params.num_leaves {
            let mut chosen: Option<(usize, f64)> = None;
            for (i, leaf) in leaves.iter().enumerate() {
                if let Some(split) = &leaf.split
                    && chosen.is_none_or(|(_, g)| split.gain > g)
                {
                    chosen = Some((i, split.gain));
                }
            }
            let Some((i, _)) = chosen else { break };

            let leaf = leaves.swap_remove(i);
            let Some(split) = leaf.split else { break };
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .iter()
                .partition(|&&r| self.bins[split.feature][r] <= split.bin);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { value: 0.0 });
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[leaf.node] = Node::Split {
                feature: split.feature,
                bin: split.bin,
                threshold: split.threshold,
                left,
                right,
            };
            importance[split.feature] += split.gain;

            leaves.push(self.leaf(left, left_rows));
            leaves.push(self.leaf(right, right_rows));
        }

        if leaves.len() < 2 {
            return None;
        }

        for leaf in &leaves {
            let value = -leaf.sum_gradient / (leaf.sum_hessian + self.params.lambda_l2)
                * self.params.learning_rate;
            nodes[leaf.node] = Node::Leaf {
                value: if value.is_finite() { value } else { 0.0 },
            };
        }
        Some(Tree { nodes })
    }
}

// =============================================================================
// Booster
// =============================================================================

/// A trained binary classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Booster {
    init_score: f64,
    trees: Vec<Tree>,
    feature_gain: Vec<f64>,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl Booster {
    /// Train on column-major `features` with 0/1 `labels`.
    pub fn train(features: &[Vec<f64>], labels: &[f64], params: &BoosterParams) -> Result<Self> {
        let n = labels.len();
        if features.is_empty() {
            return Err(DetectionError::insufficient("lightgbm", "no feature columns"));
        }
        if n == 0 || features.iter().any(|f| f.len() != n) {
            return Err(DetectionError::insufficient(
                "lightgbm",
                "feature and label lengths differ or are empty",
            ));
        }

        let n_pos = labels.iter().filter(|&&y| y > 0.5).count();
        let n_neg = n - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return Err(DetectionError::DegenerateLabels(
                "training labels contain a single class".to_string(),
            ));
        }

        let (w_pos, w_neg) = if params.is_unbalance {
            if n_pos < n_neg {
                (n_neg as f64 / n_pos as f64, 1.0)
            } else {
                (1.0, n_pos as f64 / n_neg as f64)
            }
        } else {
            (1.0, 1.0)
        };
        let weights: Vec<f64> = labels
            .iter()
            .map(|&y| if y > 0.5 { w_pos } else { w_neg })
            .collect();

        // Balanced weights put the weighted positive rate at exactly one half.
        let init_score = if params.is_unbalance {
            0.0
        } else {
            let p = n_pos as f64 / n as f64;
            (p / (1.0 - p)).ln()
        };

        let mappers: Vec<BinMapper> = features
            .iter()
            .map(|f| BinMapper::fit(f, params.max_bin))
            .collect();
        let bins: Vec<Vec<usize>> = features
            .iter()
            .zip(&mappers)
            .map(|(f, m)| f.iter().map(|&v| m.bin(v)).collect())
            .collect();

        let mut rng = StdRng::seed_from_u64(params.seed);
        let all_rows: Vec<usize> = (0..n).collect();
        let all_features: Vec<usize> = (0..features.len()).collect();
        let use_bagging = params.bagging_freq > 0 && params.bagging_fraction < 1.0;
        let bag_size = ((params.bagging_fraction * n as f64) as usize).clamp(1, n);
        let feature_count = ((params.feature_fraction * features.len() as f64).round() as usize)
            .clamp(1, features.len());

        let mut scores = vec![init_score; n];
        let mut gradients = vec![0.0; n];
        let mut hessians = vec![0.0; n];
        let mut feature_gain = vec![0.0; features.len()];
        let mut trees = Vec::with_capacity(params.num_iterations);
        let mut bag = all_rows.clone();

        for iteration in 0..params.num_iterations {
            if use_bagging && iteration % params.bagging_freq == 0 {
                bag = all_rows.choose_multiple(&mut rng, bag_size).copied().collect();
                bag.sort_unstable();
            }

            let mut tree_features: Vec<usize> = if feature_count < features.len() {
                all_features
                    .choose_multiple(&mut rng, feature_count)
                    .copied()
                    .collect()
            } else {
                all_features.clone()
            };
            tree_features.sort_unstable();

            for i in 0..n {
                let p = sigmoid(scores[i]);
                let y = if labels[i] > 0.5 { 1.0 } else { 0.0 };
                gradients[i] = (p - y) * weights[i];
                hessians[i] = (p * (1.0 - p)).max(f64::EPSILON) * weights[i];
            }

            let context = GrowContext {
                bins: &bins,
                mappers: &mappers,
                gradients: &gradients,
                hessians: &hessians,
                features: &tree_features,
                params,
            };
            let Some(tree) = context.grow(bag.clone(), &mut feature_gain) else {
                debug!(iteration, "No further splits meet the leaf limits, stopping");
                break;
            };

            for (i, score) in scores.iter_mut().enumerate() {
                *score += tree.predict_binned(&bins, i);
            }
            trees.push(tree);
        }

        debug!(trees = trees.len(), rows = n, "Booster trained");
        Ok(Self {
            init_score,
            trees,
            feature_gain,
        })
    }

    /// Probability of the positive class for one row of column-major `features`.
    pub fn predict_proba(&self, features: &[Vec<f64>], row: usize) -> f64 {
        let raw = self.init_score
            + self
                .trees
                .iter()
                .map(|t| t.predict(features, row))
                .sum::<f64>();
        sigmoid(raw)
    }

    /// Summed split gain per feature.
    pub fn feature_gain(&self) -> &[f64] {
        &self.feature_gain
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BoosterParams {
        BoosterParams::from_config(&LearnedConfig::default(), 42)
    }

    #[test]
    fn test_bin_mapper_distinct_values() {
        let mapper = BinMapper::fit(&[1.0, 2.0, 2.0, 4.0], 255);
        assert_eq!(mapper.upper_bounds, vec![1.5, 3.0, f64::INFINITY]);
        assert_eq!(mapper.bin(1.0), 0);
        assert_eq!(mapper.bin(2.0), 1);
        assert_eq!(mapper.bin(100.0), 2);
    }

    #[test]
    fn test_bin_mapper_caps_bins() {
        let values: Vec<f64> = (0..1000).map(f64::from).collect();
        let mapper = BinMapper::fit(&values, 16);
        assert!(mapper.num_bins() <= 16);
        assert!(mapper.num_bins() > 2);
    }

    #[test]
    fn test_learns_separable_signal() {
        // positives sit at x >= 80
        let x: Vec<f64> = (0..100).map(f64::from).collect();
        let labels: Vec<f64> = (0..100).map(|i| if i >= 80 { 1.0 } else { 0.0 }).collect();
        let features = vec![x];

        let booster = Booster::train(&features, &labels, &params()).unwrap();
        assert!(booster.num_trees() > 0);
        assert!(booster.predict_proba(&features, 95) > 0.5);
        assert!(booster.predict_proba(&features, 10) < 0.5);
        assert!(booster.feature_gain()[0] > 0.0);
    }

    #[test]
    fn test_training_is_deterministic() {
        let x: Vec<f64> = (0..200).map(|i| f64::from((i * 37) % 101)).collect();
        let z: Vec<f64> = (0..200).map(|i| f64::from(i % 7)).collect();
        let labels: Vec<f64> = (0..200).map(|i| if i % 9 == 0 { 1.0 } else { 0.0 }).collect();
        let features = vec![x, z];

        let a = Booster::train(&features, &labels, &params()).unwrap();
        let b = Booster::train(&features, &labels, &params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_small_input_stays_at_prior() {
        let features = vec![vec![1.0, 2.0, 3.0, 4.0]];
        let labels = vec![0.0, 1.0, 0.0, 1.0];
        let booster = Booster::train(&features, &labels, &params()).unwrap();
        assert_eq!(booster.num_trees(), 0);
        assert_eq!(booster.predict_proba(&features, 0), 0.5);
    }

    #[test]
    fn test_single_class_rejected() {
        let features = vec![vec![1.0, 2.0]];
        let result = Booster::train(&features, &[0.0, 0.0], &params());
        assert!(matches!(result, Err(DetectionError::DegenerateLabels(_))));
    }
}
