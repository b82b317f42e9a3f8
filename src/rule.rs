//! Split rules for internal tree nodes.
//!
//! A `Rule` is the split predicate stored at an internal node. It has two
//! encodings sharing one payload word: an ordinal threshold index into the
//! per-variable cutpoint table, or a categorical bitmask of the category ids
//! that go right. The variable's type (held by [`Data`]) decides which
//! interpretation applies.

use crate::data::{Data, VariableType};

/// Sentinel marking a rule whose variable has not been set.
pub const INVALID_RULE_VARIABLE: i32 = -1;

/// Split value returned for an invalid rule.
pub const SPLIT_VALUE_INVALID: f64 = -1000.0;
/// Split value returned for a categorical rule, which has no single cutpoint.
pub const SPLIT_VALUE_CATEGORICAL: f64 = -2000.0;

/// Split predicate over one predictor variable.
///
/// A rule is either fully invalid (`variable_index == INVALID_RULE_VARIABLE`)
/// or fully valid; never partially set. Equality is bitwise on
/// `(variable_index, payload)`, which the derived impl provides because
/// invalidation writes a fixed payload bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    /// Index of the predictor this rule splits on, or the invalid sentinel.
    pub variable_index: i32,
    payload: u32,
}

impl Rule {
    /// Creates an invalid rule.
    pub fn invalid() -> Self {
        Self {
            variable_index: INVALID_RULE_VARIABLE,
            payload: INVALID_RULE_VARIABLE as u32,
        }
    }

    /// Creates an ordinal rule splitting `variable_index` at cutpoint index
    /// `split_index`.
    pub fn ordinal(variable_index: i32, split_index: u16) -> Self {
        Self {
            variable_index,
            payload: u32::from(split_index),
        }
    }

    /// Creates a categorical rule with the given goes-right bitmask.
    pub fn categorical(variable_index: i32, category_directions: u32) -> Self {
        Self {
            variable_index,
            payload: category_directions,
        }
    }

    /// Reconstructs a rule from its two serialized words.
    pub fn from_bits(variable_index: u32, payload: u32) -> Self {
        Self {
            variable_index: variable_index as i32,
            payload,
        }
    }

    /// Resets this rule to the invalid sentinel state.
    pub fn invalidate(&mut self) {
        *self = Self::invalid();
    }

    /// Whether the rule's variable has not been set.
    pub fn is_invalid(&self) -> bool {
        self.variable_index == INVALID_RULE_VARIABLE
    }

    /// The ordinal threshold index. Meaningless for categorical rules.
    pub fn split_index(&self) -> u16 {
        self.payload as u16
    }

    /// The categorical goes-right bitmask. Meaningless for ordinal rules.
    pub fn category_directions(&self) -> u32 {
        self.payload
    }

    /// The raw payload word, as serialized.
    pub fn payload_bits(&self) -> u32 {
        self.payload
    }

    /// Whether the given category id branches right under this rule.
    pub fn category_goes_right(&self, category_id: u16) -> bool {
        (self.payload >> category_id) & 1 != 0
    }

    /// Marks a category id as branching right.
    pub fn set_category_goes_right(&mut self, category_id: u16) {
        self.payload |= 1 << category_id;
    }

    /// Marks a category id as branching left.
    pub fn set_category_goes_left(&mut self, category_id: u16) {
        self.payload &= !(1 << category_id);
    }

    /// Evaluates the rule against a quantized predictor row.
    ///
    /// Ordinal variables branch right when the quantized value exceeds the
    /// threshold index; categorical variables branch right when the observed
    /// category id is in the bitmask.
    pub fn goes_right(&self, data: &Data, xt: &[u16]) -> bool {
        let variable_index = self.variable_index as usize;
        match data.variable_types[variable_index] {
            VariableType::Categorical => self.category_goes_right(xt[variable_index]),
            VariableType::Ordinal => xt[variable_index] > self.split_index(),
        }
    }

    /// Maps the threshold index back to the real cutpoint value.
    ///
    /// Returns [`SPLIT_VALUE_INVALID`] for an invalid rule and
    /// [`SPLIT_VALUE_CATEGORICAL`] for a categorical variable.
    pub fn split_value(&self, data: &Data) -> f64 {
        if self.is_invalid() {
            return SPLIT_VALUE_INVALID;
        }
        let variable_index = self.variable_index as usize;
        if data.variable_types[variable_index] != VariableType::Ordinal {
            return SPLIT_VALUE_CATEGORICAL;
        }

        data.cut_points(variable_index)[usize::from(self.split_index())]
    }
}
