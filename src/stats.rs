//! Thread-parallel statistics reductions.
//!
//! Leaf statistics (means, effective observation counts, residual variances)
//! are recomputed through an injected [`ThreadManager`] capability rather
//! than an owned thread pool. Each call is a synchronous, blocking fan-out /
//! fan-in: the reduction is dispatched as one task keyed by a per-chain
//! [`TaskId`] and the caller blocks until the result is available. No partial
//! results are observable and a dispatched reduction always runs to
//! completion. Independent chains may run their reductions concurrently;
//! operations within one chain are strictly sequential.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Identifies the chain on whose behalf a reduction runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub usize);

/// One statistics reduction over a response (or residual) vector.
///
/// Indexed variants gather through an observation-index slice; the
/// non-indexed variants cover a node owning the full `[0, n)` range. Weighted
/// variants fold per-observation weights into both the numerator and the
/// effective observation count.
#[derive(Debug, Clone, Copy)]
pub enum Reduction<'a> {
    /// Mean over the whole vector.
    Mean { values: &'a [f64] },
    /// Mean over `values[i]` for each `i` in `indices`.
    IndexedMean {
        values: &'a [f64],
        indices: &'a [usize],
    },
    /// Weighted mean over the whole vector.
    WeightedMean {
        values: &'a [f64],
        weights: &'a [f64],
    },
    /// Weighted mean gathered through `indices`.
    IndexedWeightedMean {
        values: &'a [f64],
        weights: &'a [f64],
        indices: &'a [usize],
    },
    /// Variance about an externally supplied mean, whole vector.
    VarianceForKnownMean { values: &'a [f64], mean: f64 },
    /// Variance about a known mean, gathered through `indices`.
    IndexedVarianceForKnownMean {
        values: &'a [f64],
        indices: &'a [usize],
        mean: f64,
    },
    /// Weighted variance about a known mean, whole vector.
    WeightedVarianceForKnownMean {
        values: &'a [f64],
        weights: &'a [f64],
        mean: f64,
    },
    /// Weighted variance about a known mean, gathered through `indices`.
    IndexedWeightedVarianceForKnownMean {
        values: &'a [f64],
        weights: &'a [f64],
        indices: &'a [usize],
        mean: f64,
    },
}

/// Result of a reduction.
///
/// `value` is the mean or variance. `num_effective_observations` is the
/// weighted observation count: the raw count for unweighted reductions, the
/// weight sum for weighted ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReduceResult {
    /// The computed mean or variance.
    pub value: f64,
    /// Raw or weighted observation count folded into the reduction.
    pub num_effective_observations: f64,
}

impl ReduceResult {
    fn empty() -> Self {
        Self {
            value: 0.0,
            num_effective_observations: 0.0,
        }
    }
}

/// Capability for running statistics reductions.
///
/// The core depends only on this seam, not on any particular thread-pool
/// implementation. Implementations must be synchronous: `reduce` returns the
/// completed result and never exposes intermediate state.
pub trait ThreadManager {
    /// Runs one reduction to completion on behalf of the chain `task`.
    fn reduce(&self, task: TaskId, reduction: Reduction<'_>) -> ReduceResult;
}

/// Inline, single-threaded evaluation; the semantic reference.
///
/// Useful in tests and for fits too small to benefit from parallelism.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialThreadManager;

impl ThreadManager for SerialThreadManager {
    fn reduce(&self, _task: TaskId, reduction: Reduction<'_>) -> ReduceResult {
        evaluate_serial(reduction)
    }
}

/// Rayon-backed thread manager owning its pool.
pub struct RayonThreadManager {
    pool: ThreadPool,
}

impl RayonThreadManager {
    /// Builds a manager with `num_threads` worker threads (0 lets rayon pick).
    pub fn new(num_threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;
        Ok(Self { pool })
    }
}

impl ThreadManager for RayonThreadManager {
    fn reduce(&self, task: TaskId, reduction: Reduction<'_>) -> ReduceResult {
        log::trace!("dispatching reduction for chain task {}", task.0);
        self.pool.install(|| evaluate_parallel(reduction))
    }
}

/// Evaluates a reduction sequentially.
pub fn evaluate_serial(reduction: Reduction<'_>) -> ReduceResult {
    match reduction {
        Reduction::Mean { values } => {
            if values.is_empty() {
                return ReduceResult::empty();
            }
            let sum: f64 = values.iter().sum();
            mean_result(sum, values.len() as f64)
        }
        Reduction::IndexedMean { values, indices } => {
            if indices.is_empty() {
                return ReduceResult::empty();
            }
            let sum: f64 = indices.iter().map(|&i| values[i]).sum();
            mean_result(sum, indices.len() as f64)
        }
        Reduction::WeightedMean { values, weights } => {
            let (sum, weight_sum) = values
                .iter()
                .zip(weights)
                .fold((0.0, 0.0), |(s, w), (&y, &wt)| (s + wt * y, w + wt));
            mean_result(sum, weight_sum)
        }
        Reduction::IndexedWeightedMean {
            values,
            weights,
            indices,
        } => {
            let (sum, weight_sum) = indices
                .iter()
                .fold((0.0, 0.0), |(s, w), &i| (s + weights[i] * values[i], w + weights[i]));
            mean_result(sum, weight_sum)
        }
        Reduction::VarianceForKnownMean { values, mean } => {
            if values.is_empty() {
                return ReduceResult::empty();
            }
            let sum: f64 = values.iter().map(|&y| (y - mean) * (y - mean)).sum();
            variance_result(sum, values.len() as f64)
        }
        Reduction::IndexedVarianceForKnownMean {
            values,
            indices,
            mean,
        } => {
            if indices.is_empty() {
                return ReduceResult::empty();
            }
            let sum: f64 = indices
                .iter()
                .map(|&i| (values[i] - mean) * (values[i] - mean))
                .sum();
            variance_result(sum, indices.len() as f64)
        }
        Reduction::WeightedVarianceForKnownMean {
            values,
            weights,
            mean,
        } => {
            let (sum, weight_sum) = values.iter().zip(weights).fold(
                (0.0, 0.0),
                |(s, w), (&y, &wt)| (s + wt * (y - mean) * (y - mean), w + wt),
            );
            variance_result(sum, weight_sum)
        }
        Reduction::IndexedWeightedVarianceForKnownMean {
            values,
            weights,
            indices,
            mean,
        } => {
            let (sum, weight_sum) = indices.iter().fold((0.0, 0.0), |(s, w), &i| {
                (s + weights[i] * (values[i] - mean) * (values[i] - mean), w + weights[i])
            });
            variance_result(sum, weight_sum)
        }
    }
}

/// Evaluates a reduction on the current rayon pool.
fn evaluate_parallel(reduction: Reduction<'_>) -> ReduceResult {
    match reduction {
        Reduction::Mean { values } => {
            if values.is_empty() {
                return ReduceResult::empty();
            }
            let sum: f64 = values.par_iter().sum();
            mean_result(sum, values.len() as f64)
        }
        Reduction::IndexedMean { values, indices } => {
            if indices.is_empty() {
                return ReduceResult::empty();
            }
            let sum: f64 = indices.par_iter().map(|&i| values[i]).sum();
            mean_result(sum, indices.len() as f64)
        }
        Reduction::WeightedMean { values, weights } => {
            let (sum, weight_sum) = values
                .par_iter()
                .zip(weights)
                .map(|(&y, &wt)| (wt * y, wt))
                .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));
            mean_result(sum, weight_sum)
        }
        Reduction::IndexedWeightedMean {
            values,
            weights,
            indices,
        } => {
            let (sum, weight_sum) = indices
                .par_iter()
                .map(|&i| (weights[i] * values[i], weights[i]))
                .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));
            mean_result(sum, weight_sum)
        }
        Reduction::VarianceForKnownMean { values, mean } => {
            if values.is_empty() {
                return ReduceResult::empty();
            }
            let sum: f64 = values.par_iter().map(|&y| (y - mean) * (y - mean)).sum();
            variance_result(sum, values.len() as f64)
        }
        Reduction::IndexedVarianceForKnownMean {
            values,
            indices,
            mean,
        } => {
            if indices.is_empty() {
                return ReduceResult::empty();
            }
            let sum: f64 = indices
                .par_iter()
                .map(|&i| (values[i] - mean) * (values[i] - mean))
                .sum();
            variance_result(sum, indices.len() as f64)
        }
        Reduction::WeightedVarianceForKnownMean {
            values,
            weights,
            mean,
        } => {
            let (sum, weight_sum) = values
                .par_iter()
                .zip(weights)
                .map(|(&y, &wt)| (wt * (y - mean) * (y - mean), wt))
                .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));
            variance_result(sum, weight_sum)
        }
        Reduction::IndexedWeightedVarianceForKnownMean {
            values,
            weights,
            indices,
            mean,
        } => {
            let (sum, weight_sum) = indices
                .par_iter()
                .map(|&i| (weights[i] * (values[i] - mean) * (values[i] - mean), weights[i]))
                .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));
            variance_result(sum, weight_sum)
        }
    }
}

fn mean_result(sum: f64, num_effective_observations: f64) -> ReduceResult {
    if num_effective_observations == 0.0 {
        return ReduceResult::empty();
    }
    ReduceResult {
        value: sum / num_effective_observations,
        num_effective_observations,
    }
}

fn variance_result(sum: f64, num_effective_observations: f64) -> ReduceResult {
    if num_effective_observations == 0.0 {
        return ReduceResult::empty();
    }
    ReduceResult {
        value: sum / num_effective_observations,
        num_effective_observations,
    }
}
