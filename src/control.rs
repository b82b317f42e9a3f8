//! The `Control` aggregate: sampler run parameters.

use std::fmt;

/// Callback invoked once per kept sample; arguments are the sample index and
/// whether the sampler is still burning in.
///
/// Process-local only. The checkpoint codec never persists a callback and
/// always resets it to `None` on read.
pub type IterationCallback = Box<dyn FnMut(usize, bool) + Send>;

/// Run parameters controlling a fit.
pub struct Control {
    /// Whether the response is binary (probit link) rather than continuous.
    pub binary_response: bool,
    /// Whether to print progress while sampling.
    pub verbose: bool,
    /// Whether training fits are retained for every kept sample.
    pub keep_training_fits: bool,
    /// Whether cutpoints come from observed quantiles rather than a uniform grid.
    pub use_quantiles: bool,
    /// Number of posterior samples to keep.
    pub num_samples: usize,
    /// Number of burn-in iterations to discard.
    pub num_burn_in: usize,
    /// Number of trees in the sum-of-trees ensemble.
    pub num_trees: usize,
    /// Worker threads for statistics reductions (0 lets the pool decide).
    pub num_threads: usize,
    /// Keep one sample per this many tree updates.
    pub tree_thinning_rate: u32,
    /// Progress-print interval in iterations.
    pub print_every: u32,
    /// Whether to print the cutpoint inventory before sampling.
    pub print_cutoffs: bool,
    /// Per-sample notification hook; never serialized.
    pub callback: Option<IterationCallback>,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            binary_response: false,
            verbose: false,
            keep_training_fits: true,
            use_quantiles: false,
            num_samples: 800,
            num_burn_in: 200,
            num_trees: 75,
            num_threads: 1,
            tree_thinning_rate: 1,
            print_every: 100,
            print_cutoffs: false,
            callback: None,
        }
    }
}

// The callback is process-local state; comparison and debug output cover the
// persisted fields only.
impl PartialEq for Control {
    fn eq(&self, other: &Self) -> bool {
        self.binary_response == other.binary_response
            && self.verbose == other.verbose
            && self.keep_training_fits == other.keep_training_fits
            && self.use_quantiles == other.use_quantiles
            && self.num_samples == other.num_samples
            && self.num_burn_in == other.num_burn_in
            && self.num_trees == other.num_trees
            && self.num_threads == other.num_threads
            && self.tree_thinning_rate == other.tree_thinning_rate
            && self.print_every == other.print_every
            && self.print_cutoffs == other.print_cutoffs
    }
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Control")
            .field("binary_response", &self.binary_response)
            .field("verbose", &self.verbose)
            .field("keep_training_fits", &self.keep_training_fits)
            .field("use_quantiles", &self.use_quantiles)
            .field("num_samples", &self.num_samples)
            .field("num_burn_in", &self.num_burn_in)
            .field("num_trees", &self.num_trees)
            .field("num_threads", &self.num_threads)
            .field("tree_thinning_rate", &self.tree_thinning_rate)
            .field("print_every", &self.print_every)
            .field("print_cutoffs", &self.print_cutoffs)
            .field("callback", &self.callback.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
