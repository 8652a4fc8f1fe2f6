//! Isolation forest with automatic contamination.
//!
//! Scores follow the usual convention: `decision_function` is
//! `score_samples + 0.5`, higher means more normal, and points with a
//! negative decision value are labelled anomalous.

use crate::config::ForestConfig;
use crate::error::{AnomalyError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Serializer};
use std::fmt;

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Decision threshold under automatic contamination.
const OFFSET: f64 = -0.5;

/// Expected path length of an unsuccessful search in a binary search tree of `n` points.
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

/// Two-valued outcome of the forest's decision boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnomalyLabel {
    Normal,
    Anomalous,
}

impl AnomalyLabel {
    pub fn from_decision(decision: f64) -> Self {
        if decision < 0.0 {
            AnomalyLabel::Anomalous
        } else {
            AnomalyLabel::Normal
        }
    }

    /// Wire value: `1` normal, `-1` anomalous.
    pub fn as_i8(self) -> i8 {
        match self {
            AnomalyLabel::Normal => 1,
            AnomalyLabel::Anomalous => -1,
        }
    }
}

impl Serialize for AnomalyLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.as_i8())
    }
}

impl fmt::Display for AnomalyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyLabel::Normal => f.write_str("normal"),
            AnomalyLabel::Anomalous => f.write_str("anomalous"),
        }
    }
}

/// Build an `n x 2` matrix from feature pairs.
pub fn matrix(points: &[[f64; 2]]) -> Array2<f64> {
    Array2::from_shape_fn((points.len(), 2), |(i, j)| points[i][j])
}

#[derive(Debug, Clone, Copy)]
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

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(data: &ArrayView2<f64>, rows: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build(data, rows, 0, max_depth, rng);
        tree
    }

    fn build(
        &mut self,
        data: &ArrayView2<f64>,
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= max_depth || rows.len() < 2 {
            return id;
        }

        // Only features that still vary inside this node can split it.
        let candidates: Vec<(usize, f64, f64)> = (0..data.ncols())
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = data[[r, f]];
                    (lo.min(v), hi.max(v))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        // The span can overflow for finite bounds of opposite sign.
        let threshold = if (hi - lo).is_finite() {
            rng.gen_range(lo..hi)
        } else {
            let u: f64 = rng.gen();
            lo * (1.0 - u) + hi * u
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| data[[r, feature]] <= threshold);

        let left = self.build(data, left_rows, depth + 1, max_depth, rng);
        let right = self.build(data, right_rows, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, x: &ArrayView1<f64>) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[feature] <= threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// A fitted forest. Immutable once built.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    n_features: usize,
    sub_sample: usize,
    n_train: usize,
}

impl IsolationForest {
    /// Fit on every row of `data`. The RNG is seeded from `config.seed`, so the
    /// same rows in the same order give the same forest.
    pub fn fit(data: ArrayView2<f64>, config: &ForestConfig) -> Result<Self> {
        let (n, n_features) = data.dim();
        if n == 0 || n_features == 0 {
            return Err(AnomalyError::Model("cannot fit on an empty table".into()));
        }
        if config.n_estimators == 0 {
            return Err(AnomalyError::Model("n_estimators must be positive".into()));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(AnomalyError::Model("training data contains non-finite values".into()));
        }

        let sub_sample = config.max_samples.clamp(1, n);
        let max_depth = (sub_sample.max(2) as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let trees = (0..config.n_estimators)
            .map(|_| {
                let rows = index::sample(&mut rng, n, sub_sample).into_vec();
                IsolationTree::grow(&data, rows, max_depth, &mut rng)
            })
            .collect();

        Ok(Self {
            trees,
            n_features,
            sub_sample,
            n_train: n,
        })
    }

    /// Rows the forest was fitted on.
    pub fn n_train(&self) -> usize {
        self.n_train
    }

    fn check_width(&self, data: &ArrayView2<f64>) -> Result<()> {
        if data.ncols() != self.n_features {
            return Err(AnomalyError::Model(format!(
                "expected {} features, got {}",
                self.n_features,
                data.ncols()
            )));
        }
        Ok(())
    }

    fn score_point(&self, x: &ArrayView1<f64>) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.path_length(x)).sum();
        let mean = total / self.trees.len() as f64;
        let norm = average_path_length(self.sub_sample);
        let ratio = if norm > 0.0 { mean / norm } else { 1.0 };
        -(2f64.powf(-ratio))
    }

    /// Raw scores in `[-1, 0)`; lower is more abnormal.
    pub fn score_samples(&self, data: ArrayView2<f64>) -> Result<Vec<f64>> {
        self.check_width(&data)?;
        Ok(data.rows().into_iter().map(|x| self.score_point(&x)).collect())
    }

    /// Shifted scores; negative values are anomalous.
    pub fn decision_function(&self, data: ArrayView2<f64>) -> Result<Vec<f64>> {
        Ok(self
            .score_samples(data)?
            .into_iter()
            .map(|s| s - OFFSET)
            .collect())
    }

    pub fn predict(&self, data: ArrayView2<f64>) -> Result<Vec<AnomalyLabel>> {
        Ok(self
            .decision_function(data)?
            .into_iter()
            .map(AnomalyLabel::from_decision)
            .collect())
    }
}
