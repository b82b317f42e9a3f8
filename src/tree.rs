//! Arena-based binary decision trees over a shared observation-index buffer.
//!
//! A `Tree` owns a flat arena of nodes addressed by stable [`NodeId`]s and a
//! single buffer of observation indices. The top node owns the whole buffer;
//! every descendant owns a contiguous subrange of its parent's range, which
//! is what lets a structural change re-slice observations by permuting the
//! buffer in place instead of copying. Orphaned subtrees go onto a free list
//! and their slots are reused by later splits.
//!
//! A node is either internal (a split [`Rule`] and two children) or a leaf
//! (an average and an effective observation count); the two states are a sum
//! type and the only transitions between them are [`Tree::split`] and
//! [`Tree::orphan_children`]. A freshly created child has no observations
//! assigned until its parent's partition step runs, and must not be queried
//! for statistics before then.

use rand::RngCore;
use thiserror::Error;

use crate::data::{Data, VariableType};
use crate::model::EndNodePrior;
use crate::partition::{
    partition_indices, partition_indices_by, partition_range, partition_range_by,
};
use crate::rule::Rule;
use crate::stats::{Reduction, TaskId, ThreadManager};

/// Stable handle to a node in a tree's arena.
pub type NodeId = usize;

/// The arena slot of every tree's top node.
pub const TOP_NODE: NodeId = 0;

/// Shared context for tree operations: the data, the reduction capability,
/// and the chain's task identifier.
pub struct FitContext<'a> {
    /// Observation data, cutpoints, and quantized predictor columns.
    pub data: &'a Data,
    /// Reduction capability for statistics recomputation.
    pub thread_manager: &'a dyn ThreadManager,
    /// Task identifier of the chain these operations belong to.
    pub task: TaskId,
}

/// Errors from tree mutation primitives.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// Attempted to split a node that already has children.
    #[error("cannot split a non-leaf node")]
    NonLeafSplit,
    /// The node id does not address a node in this tree.
    #[error("node index does not exist")]
    InvalidNodeIndex,
    /// Attempted to split with a rule whose variable is unset.
    #[error("split rule is not set")]
    InvalidRule,
}

/// Discriminated node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Split node: the rule and the two children it partitions into.
    Internal {
        /// Split predicate.
        rule: Rule,
        /// Left child (fails the rule).
        left: NodeId,
        /// Right child (satisfies the rule).
        right: NodeId,
    },
    /// Bottom node holding aggregated statistics.
    Leaf {
        /// Mean of the response over the owned observations.
        average: f64,
        /// Weighted observation count (raw count when unweighted).
        num_effective_observations: f64,
    },
}

/// One tree vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Parent slot; `None` at the tree top.
    pub parent: Option<NodeId>,
    /// Internal or leaf payload.
    pub kind: NodeKind,
    /// Which predictors remain eligible for splits below this node.
    pub variables_available_for_split: Vec<bool>,
    /// Offset of this node's observation slice in the tree's index buffer.
    pub observation_start: usize,
    /// Length of the observation slice.
    pub num_observations: usize,
    /// Position in the bottom-node enumeration; leaves only.
    pub enumeration_index: Option<usize>,
}

impl Node {
    /// Whether this node is a leaf.
    pub fn is_bottom(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Leaf statistics `(average, num_effective_observations)`, if a leaf.
    pub fn leaf_stats(&self) -> Option<(f64, f64)> {
        match self.kind {
            NodeKind::Leaf {
                average,
                num_effective_observations,
            } => Some((average, num_effective_observations)),
            NodeKind::Internal { .. } => None,
        }
    }

    /// The split rule, if internal.
    pub fn rule(&self) -> Option<&Rule> {
        match &self.kind {
            NodeKind::Internal { rule, .. } => Some(rule),
            NodeKind::Leaf { .. } => None,
        }
    }

    fn children(&self) -> Option<(NodeId, NodeId)> {
        match self.kind {
            NodeKind::Internal { left, right, .. } => Some((left, right)),
            NodeKind::Leaf { .. } => None,
        }
    }
}

/// Which aspect of the fit changed before a state update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeUpdate {
    /// Structure or covariates changed: memberships must be repartitioned.
    StructureChanged,
    /// Only response values changed: recompute leaf statistics in place.
    ValuesChanged,
}

/// A binary decision tree plus the observation-index buffer it permutes.
///
/// Cloning a tree clones the arena and the buffer; because nodes hold
/// offsets rather than pointers, the clone's slices automatically refer to
/// the clone's own buffer.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    indices: Vec<usize>,
}

impl Tree {
    /// Creates a single-leaf tree owning observations `[0, num_observations)`.
    pub fn new(num_observations: usize, num_predictors: usize) -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                kind: NodeKind::Leaf {
                    average: 0.0,
                    num_effective_observations: 0.0,
                },
                variables_available_for_split: vec![true; num_predictors],
                observation_start: 0,
                num_observations,
                enumeration_index: None,
            }],
            free: Vec::new(),
            indices: (0..num_observations).collect(),
        }
    }

    /// Creates a single-leaf tree over an existing index permutation.
    ///
    /// Used when reconstructing a tree whose node records will be filled in
    /// afterwards, e.g. during checkpoint decode.
    pub(crate) fn from_indices(indices: Vec<usize>, num_predictors: usize) -> Self {
        let num_observations = indices.len();
        let mut tree = Self::new(num_observations, num_predictors);
        tree.indices = indices;
        tree
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id] = node;
            id
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn release_subtree(&mut self, id: NodeId) {
        if let Some((left, right)) = self.nodes[id].children() {
            self.release_subtree(left);
            self.release_subtree(right);
        }
        self.free.push(id);
    }

    /// Borrows a node.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Mutably borrows a node.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// The tree's observation-index buffer.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// The observation indices owned by one node.
    pub fn observation_indices(&self, id: NodeId) -> &[usize] {
        let node = &self.nodes[id];
        &self.indices[node.observation_start..node.observation_start + node.num_observations]
    }

    /// Whether the tree is a single leaf.
    pub fn has_single_node(&self) -> bool {
        self.nodes[TOP_NODE].is_bottom()
    }

    // ------------------------------------------------------------------
    // Structural mutation
    // ------------------------------------------------------------------

    /// Converts a leaf into an internal node and recomputes statistics.
    ///
    /// The children inherit this node's eligible-variable set; the split
    /// variable is cleared on whichever side the caller signals as having an
    /// exhausted cutpoint range. The node's observation slice is then
    /// repartitioned between the children and leaf statistics recomputed.
    pub fn split(
        &mut self,
        id: NodeId,
        rule: Rule,
        ctx: &FitContext<'_>,
        y: &[f64],
        exhausted_left: bool,
        exhausted_right: bool,
    ) -> Result<(), TreeError> {
        self.split_structure(id, rule, exhausted_left, exhausted_right)?;
        self.assign_observations_at(id, ctx, Some(y));
        Ok(())
    }

    /// Like [`Tree::split`] but defers statistics: children are repartitioned
    /// with zeroed leaf statistics.
    pub fn split_without_statistics(
        &mut self,
        id: NodeId,
        rule: Rule,
        ctx: &FitContext<'_>,
        exhausted_left: bool,
        exhausted_right: bool,
    ) -> Result<(), TreeError> {
        self.split_structure(id, rule, exhausted_left, exhausted_right)?;
        self.assign_observations_at(id, ctx, None);
        Ok(())
    }

    fn split_structure(
        &mut self,
        id: NodeId,
        rule: Rule,
        exhausted_left: bool,
        exhausted_right: bool,
    ) -> Result<(), TreeError> {
        if rule.is_invalid() {
            return Err(TreeError::InvalidRule);
        }
        if id >= self.nodes.len() {
            return Err(TreeError::InvalidNodeIndex);
        }
        if !self.nodes[id].is_bottom() {
            return Err(TreeError::NonLeafSplit);
        }

        let variable_index = rule.variable_index as usize;
        let start = self.nodes[id].observation_start;

        let mut left_variables = self.nodes[id].variables_available_for_split.clone();
        let mut right_variables = left_variables.clone();
        if exhausted_left {
            left_variables[variable_index] = false;
        }
        if exhausted_right {
            right_variables[variable_index] = false;
        }

        let left = self.alloc(Node {
            parent: Some(id),
            kind: NodeKind::Leaf {
                average: 0.0,
                num_effective_observations: 0.0,
            },
            variables_available_for_split: left_variables,
            observation_start: start,
            num_observations: 0,
            enumeration_index: None,
        });
        let right = self.alloc(Node {
            parent: Some(id),
            kind: NodeKind::Leaf {
                average: 0.0,
                num_effective_observations: 0.0,
            },
            variables_available_for_split: right_variables,
            observation_start: start,
            num_observations: 0,
            enumeration_index: None,
        });

        self.nodes[id].kind = NodeKind::Internal { rule, left, right };
        self.nodes[id].enumeration_index = None;
        Ok(())
    }

    /// Merges the children's leaf statistics into this node and discards
    /// them, reverting the node to a leaf.
    ///
    /// The merged average is the effective-observation-weighted mean of the
    /// children's averages; given correctly computed children on a true
    /// partition it equals a from-scratch recomputation on this node's slice
    /// up to rounding. Used to revert a structural proposal.
    pub fn orphan_children(&mut self, id: NodeId) {
        let (left, right) = self.nodes[id]
            .children()
            .expect("orphan_children called on a leaf");
        let (left_average, left_count) = self.nodes[left]
            .leaf_stats()
            .expect("orphan_children requires leaf children");
        let (right_average, right_count) = self.nodes[right]
            .leaf_stats()
            .expect("orphan_children requires leaf children");

        let num_effective_observations = left_count + right_count;
        let average = left_average * (left_count / num_effective_observations)
            + right_average * (right_count / num_effective_observations);

        self.release_subtree(left);
        self.release_subtree(right);
        self.nodes[id].kind = NodeKind::Leaf {
            average,
            num_effective_observations,
        };
    }

    // ------------------------------------------------------------------
    // Observation assignment and statistics propagation
    // ------------------------------------------------------------------

    /// Top-down repartition of the subtree under `id`, folding in the
    /// response vector at the leaves.
    pub fn assign_observations(&mut self, id: NodeId, ctx: &FitContext<'_>, y: &[f64]) {
        self.assign_observations_at(id, ctx, Some(y));
    }

    /// Top-down repartition with statistics deferred: every reached leaf is
    /// re-zeroed instead of recomputed.
    pub fn assign_observations_without_statistics(&mut self, id: NodeId, ctx: &FitContext<'_>) {
        self.assign_observations_at(id, ctx, None);
    }

    fn assign_observations_at(&mut self, id: NodeId, ctx: &FitContext<'_>, y: Option<&[f64]>) {
        let Some((left, right)) = self.nodes[id].children() else {
            match y {
                Some(y) => self.set_average(id, ctx, y),
                None => self.zero_leaf(id),
            }
            return;
        };

        self.clear_observations(left);
        self.clear_observations(right);

        let start = self.nodes[id].observation_start;
        let length = self.nodes[id].num_observations;
        if length == 0 {
            return;
        }

        let rule = *self.nodes[id].rule().expect("internal node has a rule");
        let variable_index = rule.variable_index as usize;
        let is_top = self.nodes[id].parent.is_none();

        let num_on_left = {
            let x = ctx.data.x_column_quantized(variable_index);
            let slice = &mut self.indices[start..start + length];
            match ctx.data.variable_types[variable_index] {
                VariableType::Ordinal => {
                    if is_top {
                        partition_range(x, rule.split_index(), slice)
                    } else {
                        partition_indices(x, rule.split_index(), slice)
                    }
                }
                VariableType::Categorical => {
                    if is_top {
                        partition_range_by(x, slice, |value| rule.category_goes_right(value))
                    } else {
                        partition_indices_by(x, slice, |value| rule.category_goes_right(value))
                    }
                }
            }
        };

        self.nodes[left].observation_start = start;
        self.nodes[left].num_observations = num_on_left;
        self.nodes[right].observation_start = start + num_on_left;
        self.nodes[right].num_observations = length - num_on_left;

        self.assign_observations_at(left, ctx, y);
        self.assign_observations_at(right, ctx, y);
    }

    fn clear_observations(&mut self, id: NodeId) {
        self.nodes[id].observation_start = self.nodes[self.nodes[id].parent.unwrap_or(id)]
            .observation_start;
        self.nodes[id].num_observations = 0;
        match self.nodes[id].kind {
            NodeKind::Leaf { .. } => self.zero_leaf(id),
            NodeKind::Internal { left, right, .. } => {
                self.clear_observations(left);
                self.clear_observations(right);
            }
        }
    }

    fn zero_leaf(&mut self, id: NodeId) {
        self.nodes[id].kind = NodeKind::Leaf {
            average: 0.0,
            num_effective_observations: 0.0,
        };
    }

    /// Recomputes leaf statistics below `id` without touching structure or
    /// memberships ("values changed" update).
    pub fn set_averages(&mut self, id: NodeId, ctx: &FitContext<'_>, y: &[f64]) {
        self.set_averages_at(id, ctx, y);
    }

    fn set_averages_at(&mut self, id: NodeId, ctx: &FitContext<'_>, y: &[f64]) {
        match self.nodes[id].children() {
            None => self.set_average(id, ctx, y),
            Some((left, right)) => {
                self.set_averages_at(left, ctx, y);
                self.set_averages_at(right, ctx, y);
            }
        }
    }

    /// Recomputes one leaf's statistics through the reduction capability.
    pub fn set_average(&mut self, id: NodeId, ctx: &FitContext<'_>, y: &[f64]) {
        let node = &self.nodes[id];
        let is_top = node.parent.is_none();
        let start = node.observation_start;
        let length = node.num_observations;

        let reduction = match (is_top, ctx.data.weights_slice()) {
            (true, None) => Reduction::Mean { values: y },
            (true, Some(weights)) => Reduction::WeightedMean { values: y, weights },
            (false, None) => Reduction::IndexedMean {
                values: y,
                indices: &self.indices[start..start + length],
            },
            (false, Some(weights)) => Reduction::IndexedWeightedMean {
                values: y,
                weights,
                indices: &self.indices[start..start + length],
            },
        };

        let result = ctx.thread_manager.reduce(ctx.task, reduction);
        self.nodes[id].kind = NodeKind::Leaf {
            average: result.value,
            num_effective_observations: result.num_effective_observations,
        };
    }

    /// Dispatches a whole-tree state update of the given kind.
    pub fn update_state(&mut self, ctx: &FitContext<'_>, y: &[f64], update: TreeUpdate) {
        match update {
            TreeUpdate::StructureChanged => self.assign_observations(TOP_NODE, ctx, y),
            TreeUpdate::ValuesChanged => self.set_averages(TOP_NODE, ctx, y),
        }
    }

    /// Residual variance at a leaf about its own average.
    ///
    /// Drives the caller's inverse-chi-squared noise-variance update. Panics
    /// if called on an internal node, which has no average of its own.
    pub fn compute_variance(&self, id: NodeId, ctx: &FitContext<'_>, y: &[f64]) -> f64 {
        let node = &self.nodes[id];
        let (average, _) = node
            .leaf_stats()
            .expect("compute_variance requires a leaf node");
        let is_top = node.parent.is_none();
        let start = node.observation_start;
        let length = node.num_observations;

        let reduction = match (is_top, ctx.data.weights_slice()) {
            (true, None) => Reduction::VarianceForKnownMean {
                values: y,
                mean: average,
            },
            (true, Some(weights)) => Reduction::WeightedVarianceForKnownMean {
                values: y,
                weights,
                mean: average,
            },
            (false, None) => Reduction::IndexedVarianceForKnownMean {
                values: y,
                indices: &self.indices[start..start + length],
                mean: average,
            },
            (false, Some(weights)) => Reduction::IndexedWeightedVarianceForKnownMean {
                values: y,
                weights,
                indices: &self.indices[start..start + length],
                mean: average,
            },
        };

        ctx.thread_manager.reduce(ctx.task, reduction).value
    }

    /// Draws a leaf's posterior value from the supplied end-node prior.
    ///
    /// An empty leaf yields 0.0 without consulting the prior.
    pub fn draw_from_posterior(
        &self,
        id: NodeId,
        rng: &mut dyn RngCore,
        prior: &dyn EndNodePrior,
        residual_variance: f64,
    ) -> f64 {
        let node = &self.nodes[id];
        if node.num_observations == 0 {
            return 0.0;
        }
        let (average, num_effective_observations) = node
            .leaf_stats()
            .expect("draw_from_posterior requires a leaf node");
        prior.draw_from_posterior(rng, average, num_effective_observations, residual_variance)
    }

    // ------------------------------------------------------------------
    // Traversal queries
    // ------------------------------------------------------------------
    //
    // All traversals walk left before right; callers correlate the returned
    // vectors positionally with per-node scratch arrays, so the relative
    // order must stay consistent across query kinds.

    fn children_are_bottom(&self, id: NodeId) -> bool {
        match self.nodes[id].children() {
            Some((left, right)) => self.nodes[left].is_bottom() && self.nodes[right].is_bottom(),
            None => false,
        }
    }

    /// All leaves, in depth-first left-to-right order.
    pub fn bottom_nodes(&self) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.fill_bottom(TOP_NODE, &mut result);
        result
    }

    fn fill_bottom(&self, id: NodeId, result: &mut Vec<NodeId>) {
        match self.nodes[id].children() {
            None => result.push(id),
            Some((left, right)) => {
                self.fill_bottom(left, result);
                self.fill_bottom(right, result);
            }
        }
    }

    /// All leaves, assigning each its enumeration index as it is visited.
    pub fn enumerate_bottom_nodes(&mut self) -> Vec<NodeId> {
        let result = self.bottom_nodes();
        for (position, &id) in result.iter().enumerate() {
            self.nodes[id].enumeration_index = Some(position);
        }
        result
    }

    /// Internal nodes whose children are both leaves.
    pub fn no_grand_nodes(&self) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.fill_no_grand(TOP_NODE, &mut result);
        result
    }

    fn fill_no_grand(&self, id: NodeId, result: &mut Vec<NodeId>) {
        if self.nodes[id].is_bottom() {
            return;
        }
        if self.children_are_bottom(id) {
            result.push(id);
            return;
        }
        let (left, right) = self.nodes[id].children().expect("internal node");
        self.fill_no_grand(left, result);
        self.fill_no_grand(right, result);
    }

    /// Internal nodes, children before self.
    pub fn not_bottom_nodes(&self) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.fill_not_bottom(TOP_NODE, &mut result);
        result
    }

    fn fill_not_bottom(&self, id: NodeId, result: &mut Vec<NodeId>) {
        if self.nodes[id].is_bottom() {
            return;
        }
        if self.children_are_bottom(id) {
            result.push(id);
            return;
        }
        let (left, right) = self.nodes[id].children().expect("internal node");
        self.fill_not_bottom(left, result);
        self.fill_not_bottom(right, result);
        result.push(id);
    }

    /// Internal nodes eligible for a swap proposal: those with at least one
    /// internal child. Children before self.
    pub fn swappable_nodes(&self) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.fill_swappable(TOP_NODE, &mut result);
        result
    }

    fn fill_swappable(&self, id: NodeId, result: &mut Vec<NodeId>) {
        if self.nodes[id].is_bottom() || self.children_are_bottom(id) {
            return;
        }
        let (left, right) = self.nodes[id].children().expect("internal node");
        let left_shallow = self.nodes[left].is_bottom() || self.children_are_bottom(left);
        let right_shallow = self.nodes[right].is_bottom() || self.children_are_bottom(right);
        if left_shallow && right_shallow {
            result.push(id);
            return;
        }
        self.fill_swappable(left, result);
        self.fill_swappable(right, result);
        result.push(id);
    }

    /// Number of leaves.
    pub fn num_bottom_nodes(&self) -> usize {
        self.count_bottom(TOP_NODE)
    }

    fn count_bottom(&self, id: NodeId) -> usize {
        match self.nodes[id].children() {
            None => 1,
            Some((left, right)) => self.count_bottom(left) + self.count_bottom(right),
        }
    }

    /// Number of internal nodes.
    pub fn num_not_bottom_nodes(&self) -> usize {
        match self.nodes[TOP_NODE].children() {
            None => 0,
            Some(_) => self.count_internal(TOP_NODE),
        }
    }

    fn count_internal(&self, id: NodeId) -> usize {
        match self.nodes[id].children() {
            None => 0,
            Some((left, right)) => 1 + self.count_internal(left) + self.count_internal(right),
        }
    }

    /// Number of internal nodes whose children are both leaves.
    pub fn num_no_grand_nodes(&self) -> usize {
        self.no_grand_nodes().len()
    }

    /// Number of swap-eligible nodes.
    pub fn num_swappable_nodes(&self) -> usize {
        self.swappable_nodes().len()
    }

    /// Root-to-leaf descent applying each internal node's rule to the
    /// quantized predictor row.
    pub fn find_bottom_node(&self, data: &Data, xt: &[u16]) -> NodeId {
        let mut id = TOP_NODE;
        while let Some((left, right)) = self.nodes[id].children() {
            let rule = self.nodes[id].rule().expect("internal node has a rule");
            id = if rule.goes_right(data, xt) { right } else { left };
        }
        id
    }

    /// The fitted value for one quantized predictor row: the average of the
    /// leaf the row descends to.
    pub fn get_prediction(&self, data: &Data, xt: &[u16]) -> f64 {
        let id = self.find_bottom_node(data, xt);
        let (average, _) = self.nodes[id]
            .leaf_stats()
            .expect("descent ends at a leaf");
        average
    }

    /// Writes `prediction` into `y_hat` at every observation the node owns.
    ///
    /// The top node fills the whole vector; any other node scatters through
    /// its observation-index slice. Used to maintain per-tree fit vectors
    /// after a leaf's posterior value is drawn.
    pub fn set_predictions(&self, id: NodeId, y_hat: &mut [f64], prediction: f64) {
        let node = &self.nodes[id];
        if node.parent.is_none() {
            y_hat[..node.num_observations].fill(prediction);
            return;
        }
        for &observation in self.observation_indices(id) {
            y_hat[observation] = prediction;
        }
    }

    /// Adds one to `counts[rule.variable_index]` for every internal node.
    pub fn count_variable_uses(&self, counts: &mut [u32]) {
        self.count_variable_uses_at(TOP_NODE, counts);
    }

    fn count_variable_uses_at(&self, id: NodeId, counts: &mut [u32]) {
        if let NodeKind::Internal { rule, left, right } = &self.nodes[id].kind {
            counts[rule.variable_index as usize] += 1;
            self.count_variable_uses_at(*left, counts);
            self.count_variable_uses_at(*right, counts);
        }
    }

    // ------------------------------------------------------------------
    // Shape queries
    // ------------------------------------------------------------------

    /// Distance from the node to the top.
    pub fn node_depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Height of the subtree under a node (0 for a leaf).
    pub fn depth_below(&self, id: NodeId) -> usize {
        match self.nodes[id].children() {
            None => 0,
            Some((left, right)) => 1 + self.depth_below(left).max(self.depth_below(right)),
        }
    }

    /// Number of descendants of a node.
    pub fn num_nodes_below(&self, id: NodeId) -> usize {
        match self.nodes[id].children() {
            None => 0,
            Some((left, right)) => {
                2 + self.num_nodes_below(left) + self.num_nodes_below(right)
            }
        }
    }

    /// How many predictors remain eligible for splits below a node.
    pub fn num_variables_available_for_split(&self, id: NodeId) -> usize {
        self.nodes[id]
            .variables_available_for_split
            .iter()
            .filter(|&&available| available)
            .count()
    }

    fn structurally_equal(&self, other: &Tree, a: NodeId, b: NodeId) -> bool {
        let node_a = &self.nodes[a];
        let node_b = &other.nodes[b];
        if node_a.variables_available_for_split != node_b.variables_available_for_split
            || node_a.observation_start != node_b.observation_start
            || node_a.num_observations != node_b.num_observations
            || node_a.enumeration_index != node_b.enumeration_index
        {
            return false;
        }
        match (&node_a.kind, &node_b.kind) {
            (
                NodeKind::Leaf {
                    average: avg_a,
                    num_effective_observations: n_a,
                },
                NodeKind::Leaf {
                    average: avg_b,
                    num_effective_observations: n_b,
                },
            ) => avg_a == avg_b && n_a == n_b,
            (
                NodeKind::Internal {
                    rule: rule_a,
                    left: left_a,
                    right: right_a,
                },
                NodeKind::Internal {
                    rule: rule_b,
                    left: left_b,
                    right: right_b,
                },
            ) => {
                rule_a == rule_b
                    && self.structurally_equal(other, *left_a, *left_b)
                    && self.structurally_equal(other, *right_a, *right_b)
            }
            _ => false,
        }
    }
}

// Structural comparison: arena slot numbering is an implementation detail
// that differs between a built tree and its decoded copy.
impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.indices == other.indices && self.structurally_equal(other, TOP_NODE, TOP_NODE)
    }
}
