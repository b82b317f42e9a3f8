//! The `Model` aggregate: move probabilities and the three priors.
//!
//! Prior log-density math lives with the external sampler; the core only
//! needs the parameter sets for checkpointing and the end-node posterior-draw
//! seam that leaf value sampling goes through.

use rand::RngCore;
use rand_distr::{Distribution, Normal};

/// Chipman-George-McCulloch tree structure prior parameters.
///
/// A node at depth `d` splits with probability `base / (1 + d)^power`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgmPrior {
    /// Base split probability.
    pub base: f64,
    /// Depth penalty exponent.
    pub power: f64,
}

/// Zero-centered normal prior on leaf values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalPrior {
    /// Prior precision (inverse variance) of a leaf value.
    pub precision: f64,
}

/// Scaled inverse-chi-squared prior on the residual variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiSquaredPrior {
    /// Degrees of freedom.
    pub degrees_of_freedom: f64,
    /// Scale.
    pub scale: f64,
}

/// Sampling seam for leaf posterior values.
///
/// A tree hands the conjugate sufficient statistics of one leaf to the prior
/// and gets back a posterior draw; the tree itself never sees distribution
/// parameters.
pub trait EndNodePrior {
    /// Draws a posterior leaf value given the leaf's average, its effective
    /// observation count, and the current residual variance.
    fn draw_from_posterior(
        &self,
        rng: &mut dyn RngCore,
        average: f64,
        num_effective_observations: f64,
        residual_variance: f64,
    ) -> f64;
}

impl EndNodePrior for NormalPrior {
    fn draw_from_posterior(
        &self,
        rng: &mut dyn RngCore,
        average: f64,
        num_effective_observations: f64,
        residual_variance: f64,
    ) -> f64 {
        let data_precision = num_effective_observations / residual_variance;
        let posterior_precision = self.precision + data_precision;
        let posterior_mean = average * data_precision / posterior_precision;
        let posterior_sd = posterior_precision.recip().sqrt();

        Normal::new(posterior_mean, posterior_sd)
            .expect("posterior standard deviation is finite and positive")
            .sample(rng)
    }
}

/// Move probabilities plus the tree, end-node, and variance priors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Model {
    /// Probability of proposing a birth-or-death move.
    pub birth_or_death_probability: f64,
    /// Probability of proposing a swap move.
    pub swap_probability: f64,
    /// Probability of proposing a change move.
    pub change_probability: f64,
    /// Probability that a birth-or-death move is a birth.
    pub birth_probability: f64,
    /// Tree structure prior.
    pub tree_prior: CgmPrior,
    /// End-node value prior.
    pub end_node_prior: NormalPrior,
    /// Residual variance prior.
    pub sigma_squared_prior: ChiSquaredPrior,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            birth_or_death_probability: 0.5,
            swap_probability: 0.1,
            change_probability: 0.4,
            birth_probability: 0.5,
            tree_prior: CgmPrior {
                base: 0.95,
                power: 2.0,
            },
            end_node_prior: NormalPrior { precision: 1.0 },
            sigma_squared_prior: ChiSquaredPrior {
                degrees_of_freedom: 3.0,
                scale: 1.0,
            },
        }
    }
}
