//! The `Data` aggregate: observations, predictors, and derived cutpoints.
//!
//! `Data` is read-mostly input to the core. Besides the serialized fields
//! (response, covariates, optional weights and offsets, per-predictor type
//! tags and max-cut counts) it carries two derived structures the tree code
//! works against: the per-variable cutpoint tables that ordinal split rules
//! index into, and a column-major quantized copy of the predictor matrix
//! whose `u16` entries are what the partitioner actually compares. Cutpoint
//! generation itself is the data-loading collaborator's job; `Data` only
//! consumes a cutpoint inventory via [`Data::set_cut_points`].

use ndarray::{Array1, Array2, ArrayView1};

/// Per-predictor measurement scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableType {
    /// Continuous or ordered; split by thresholding a cutpoint index.
    Ordinal,
    /// Unordered categories; split by a goes-right bitmask over category ids.
    Categorical,
}

impl VariableType {
    /// Serialized tag value.
    pub fn to_u32(self) -> u32 {
        match self {
            VariableType::Ordinal => 0,
            VariableType::Categorical => 1,
        }
    }

    /// Parses a serialized tag value.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(VariableType::Ordinal),
            1 => Some(VariableType::Categorical),
            _ => None,
        }
    }
}

/// Observation data and its derived split-candidate structures.
#[derive(Debug, Clone)]
pub struct Data {
    /// Number of training observations.
    pub num_observations: usize,
    /// Number of predictor variables.
    pub num_predictors: usize,
    /// Number of test observations (0 when no test set is attached).
    pub num_test_observations: usize,
    /// Prior estimate of the residual standard deviation.
    pub sigma_estimate: f64,
    /// Response vector, length `num_observations`. Must be contiguous
    /// (standard layout); build it with an owning constructor, not a strided
    /// view.
    pub y: Array1<f64>,
    /// Covariate matrix, `num_observations x num_predictors`, row-major.
    pub x: Array2<f64>,
    /// Test covariate matrix, `num_test_observations x num_predictors`.
    pub x_test: Option<Array2<f64>>,
    /// Per-observation weights. Must be contiguous, like `y`.
    pub weights: Option<Array1<f64>>,
    /// Per-observation fixed offsets.
    pub offset: Option<Array1<f64>>,
    /// Per-test-observation fixed offsets.
    pub test_offset: Option<Array1<f64>>,
    /// Measurement scale of each predictor.
    pub variable_types: Vec<VariableType>,
    /// Requested maximum cutpoint count per predictor.
    pub max_num_cuts: Option<Vec<u32>>,

    // Derived, not serialized.
    cut_points: Vec<Vec<f64>>,
    x_quantized: Vec<u16>,
}

impl Data {
    /// Creates a `Data` without weights, offsets, or a test set.
    ///
    /// Cutpoints start empty; attach them with [`Data::set_cut_points`]
    /// before any tree operation evaluates rules.
    pub fn new(x: Array2<f64>, y: Array1<f64>, variable_types: Vec<VariableType>) -> Self {
        let num_observations = x.nrows();
        let num_predictors = x.ncols();
        assert_eq!(y.len(), num_observations);
        assert_eq!(variable_types.len(), num_predictors);

        Self {
            num_observations,
            num_predictors,
            num_test_observations: 0,
            sigma_estimate: 1.0,
            y,
            x,
            x_test: None,
            weights: None,
            offset: None,
            test_offset: None,
            variable_types,
            max_num_cuts: None,
            cut_points: vec![Vec::new(); num_predictors],
            x_quantized: Vec::new(),
        }
    }

    /// Attaches the per-variable cutpoint inventory and re-quantizes the
    /// predictor matrix against it.
    ///
    /// For an ordinal variable the quantized value of an observation is the
    /// number of cutpoints strictly below it, so that `value > cut[k]` is
    /// equivalent to `quantized > k`. Categorical variables pass their
    /// category ids through unchanged; cutpoint entries for them are ignored.
    pub fn set_cut_points(&mut self, cut_points: Vec<Vec<f64>>) {
        assert_eq!(cut_points.len(), self.num_predictors);
        self.cut_points = cut_points;
        self.x_quantized = vec![0; self.num_observations * self.num_predictors];

        for variable_index in 0..self.num_predictors {
            for observation in 0..self.num_observations {
                let value = self.x[[observation, variable_index]];
                self.x_quantized[variable_index * self.num_observations + observation] =
                    self.quantize(variable_index, value);
            }
        }
    }

    fn quantize(&self, variable_index: usize, value: f64) -> u16 {
        match self.variable_types[variable_index] {
            VariableType::Categorical => value as u16,
            VariableType::Ordinal => self.cut_points[variable_index]
                .iter()
                .take_while(|&&cut| cut < value)
                .count() as u16,
        }
    }

    /// The cutpoint table for one predictor.
    pub fn cut_points(&self, variable_index: usize) -> &[f64] {
        &self.cut_points[variable_index]
    }

    /// The quantized column for one predictor, length `num_observations`.
    ///
    /// Panics if cutpoints have not been attached.
    pub fn x_column_quantized(&self, variable_index: usize) -> &[u16] {
        assert!(
            !self.x_quantized.is_empty(),
            "cut points not set; call set_cut_points first"
        );
        let start = variable_index * self.num_observations;
        &self.x_quantized[start..start + self.num_observations]
    }

    /// Quantizes a raw predictor row for rule evaluation, e.g. a test-set row.
    pub fn quantize_row(&self, row: ArrayView1<f64>) -> Vec<u16> {
        (0..self.num_predictors)
            .map(|variable_index| self.quantize(variable_index, row[variable_index]))
            .collect()
    }

    /// The quantized predictor row of one training observation.
    pub fn quantized_observation(&self, observation: usize) -> Vec<u16> {
        (0..self.num_predictors)
            .map(|variable_index| self.x_column_quantized(variable_index)[observation])
            .collect()
    }

    /// Weights as a slice, if present.
    ///
    /// Panics if a non-contiguous array was stored in `weights`.
    pub fn weights_slice(&self) -> Option<&[f64]> {
        self.weights
            .as_ref()
            .map(|w| w.as_slice().expect("weights must be contiguous"))
    }

    /// Response as a slice.
    ///
    /// Panics if a non-contiguous array was stored in `y`.
    pub fn y_slice(&self) -> &[f64] {
        self.y.as_slice().expect("response must be contiguous")
    }
}
