//! Per-chain sampler state: the tree ensemble and its fitted values.

use ndarray::{Array1, Array2};

use crate::control::Control;
use crate::data::Data;
use crate::tree::Tree;

/// Mutable snapshot of one chain's fit.
///
/// This is exactly what the checkpoint codec persists per chain: the trees
/// with their permuted index buffers, the per-tree and aggregated fits, the
/// current residual standard deviation, and elapsed sampling time.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    /// One tree per ensemble slot.
    pub trees: Vec<Tree>,
    /// Fitted values per `[tree, observation]`.
    pub tree_fits: Array2<f64>,
    /// Sum of tree fits per training observation.
    pub total_fits: Array1<f64>,
    /// Sum of tree fits per test observation, when a test set is attached.
    pub total_test_fits: Option<Array1<f64>>,
    /// Current residual standard deviation.
    pub sigma: f64,
    /// Elapsed sampling time in seconds.
    pub running_time: f64,
}

impl State {
    /// Creates the pre-sampling state: single-leaf trees, zero fits, and
    /// sigma seeded from the data's estimate.
    pub fn new(control: &Control, data: &Data) -> Self {
        let trees = (0..control.num_trees)
            .map(|_| Tree::new(data.num_observations, data.num_predictors))
            .collect();

        Self {
            trees,
            tree_fits: Array2::zeros((control.num_trees, data.num_observations)),
            total_fits: Array1::zeros(data.num_observations),
            total_test_fits: (data.num_test_observations > 0)
                .then(|| Array1::zeros(data.num_test_observations)),
            sigma: data.sigma_estimate,
            running_time: 0.0,
        }
    }
}
