use ndarray::{arr1, arr2, Array1, Array2};

use bart_core::data::{Data, VariableType};
use bart_core::rule::Rule;
use bart_core::stats::{SerialThreadManager, TaskId};
use bart_core::tree::{FitContext, Tree, TreeError, TreeUpdate, TOP_NODE};

fn ordinal_data(x: Array2<f64>, y: Array1<f64>, cut_points: Vec<Vec<f64>>) -> Data {
    let num_predictors = x.ncols();
    let mut data = Data::new(x, y, vec![VariableType::Ordinal; num_predictors]);
    data.set_cut_points(cut_points);
    data
}

fn context<'a>(data: &'a Data, manager: &'a SerialThreadManager) -> FitContext<'a> {
    FitContext {
        data,
        thread_manager: manager,
        task: TaskId(0),
    }
}

#[test]
fn split_assigns_observations_and_leaf_averages() {
    let x = arr2(&[[0.2], [0.8]]);
    let y = arr1(&[10.0, 20.0]);
    let data = ordinal_data(x, y, vec![vec![0.5]]);
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    let mut tree = Tree::new(2, 1);
    tree.split(TOP_NODE, Rule::ordinal(0, 0), &ctx, data.y_slice(), false, false)
        .unwrap();

    let bottoms = tree.bottom_nodes();
    assert_eq!(bottoms.len(), 2);

    let (left_average, left_count) = tree.node(bottoms[0]).leaf_stats().unwrap();
    let (right_average, right_count) = tree.node(bottoms[1]).leaf_stats().unwrap();
    assert_eq!((left_average, left_count), (10.0, 1.0));
    assert_eq!((right_average, right_count), (20.0, 1.0));
    assert_eq!(tree.observation_indices(bottoms[0]), &[0]);
    assert_eq!(tree.observation_indices(bottoms[1]), &[1]);
}

#[test]
fn orphan_children_inverts_split() {
    let x = arr2(&[
        [0.1],
        [0.3],
        [0.6],
        [0.7],
        [0.9],
        [0.2],
    ]);
    let y = arr1(&[1.0, 2.0, 4.0, 8.0, 16.0, 32.0]);
    let overall_mean = y.iter().sum::<f64>() / y.len() as f64;
    let data = ordinal_data(x, y, vec![vec![0.5]]);
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    let mut tree = Tree::new(6, 1);
    tree.split(TOP_NODE, Rule::ordinal(0, 0), &ctx, data.y_slice(), false, false)
        .unwrap();
    assert!(!tree.has_single_node());

    tree.orphan_children(TOP_NODE);
    assert!(tree.has_single_node());

    let (average, count) = tree.node(TOP_NODE).leaf_stats().unwrap();
    assert!((average - overall_mean).abs() < 1e-9);
    assert_eq!(count, 6.0);
}

#[test]
fn nested_splits_keep_index_buffer_a_permutation() {
    let x = arr2(&[
        [0.1, 0.9],
        [0.3, 0.1],
        [0.6, 0.8],
        [0.7, 0.2],
        [0.9, 0.6],
        [0.2, 0.4],
        [0.8, 0.3],
        [0.4, 0.7],
    ]);
    let y = arr1(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    let data = ordinal_data(x, y, vec![vec![0.5], vec![0.5]]);
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    let mut tree = Tree::new(8, 2);
    tree.split(TOP_NODE, Rule::ordinal(0, 0), &ctx, data.y_slice(), false, false)
        .unwrap();
    let right = tree.bottom_nodes()[1];
    tree.split(right, Rule::ordinal(1, 0), &ctx, data.y_slice(), false, false)
        .unwrap();

    // The buffer is always a permutation of the observation ids.
    let mut seen: Vec<usize> = tree.indices().to_vec();
    seen.sort_unstable();
    assert_eq!(seen, (0..8).collect::<Vec<usize>>());

    // Leaf slices are disjoint, cover everything, and agree with the rules.
    let bottoms = tree.bottom_nodes();
    assert_eq!(bottoms.len(), 3);
    let total: usize = bottoms
        .iter()
        .map(|&id| tree.node(id).num_observations)
        .sum();
    assert_eq!(total, 8);

    for &i in tree.observation_indices(bottoms[0]) {
        assert!(data.x[[i, 0]] < 0.5);
    }
    for &i in tree.observation_indices(bottoms[1]) {
        assert!(data.x[[i, 0]] > 0.5 && data.x[[i, 1]] < 0.5);
    }
    for &i in tree.observation_indices(bottoms[2]) {
        assert!(data.x[[i, 0]] > 0.5 && data.x[[i, 1]] > 0.5);
    }

    // Each leaf average matches a from-scratch mean over its slice.
    for &id in &bottoms {
        let indices = tree.observation_indices(id);
        let expected = indices.iter().map(|&i| data.y[i]).sum::<f64>() / indices.len() as f64;
        let (average, count) = tree.node(id).leaf_stats().unwrap();
        assert!((average - expected).abs() < 1e-9);
        assert_eq!(count, indices.len() as f64);
    }
}

#[test]
fn categorical_rules_partition_by_bitmask() {
    let x = arr2(&[[0.0], [1.0], [2.0], [3.0], [1.0], [2.0]]);
    let y = arr1(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let mut data = Data::new(x, y, vec![VariableType::Categorical]);
    data.set_cut_points(vec![Vec::new()]);
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    // Categories 1 and 3 go right.
    let mut rule = Rule::categorical(0, 0);
    rule.set_category_goes_right(1);
    rule.set_category_goes_right(3);

    let mut tree = Tree::new(6, 1);
    tree.split(TOP_NODE, rule, &ctx, data.y_slice(), false, false)
        .unwrap();

    let bottoms = tree.bottom_nodes();
    for &i in tree.observation_indices(bottoms[0]) {
        let category = data.x[[i, 0]] as u16;
        assert!(category == 0 || category == 2);
    }
    for &i in tree.observation_indices(bottoms[1]) {
        let category = data.x[[i, 0]] as u16;
        assert!(category == 1 || category == 3);
    }
    assert_eq!(tree.node(bottoms[0]).num_observations, 3);
    assert_eq!(tree.node(bottoms[1]).num_observations, 3);
}

#[test]
fn weighted_leaf_statistics_use_effective_counts() {
    let x = arr2(&[[0.2], [0.4], [0.8]]);
    let y = arr1(&[1.0, 3.0, 9.0]);
    let mut data = ordinal_data(x, y, vec![vec![0.5]]);
    data.weights = Some(arr1(&[1.0, 3.0, 2.0]));
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    let mut tree = Tree::new(3, 1);
    tree.split(TOP_NODE, Rule::ordinal(0, 0), &ctx, data.y_slice(), false, false)
        .unwrap();

    let bottoms = tree.bottom_nodes();
    let (left_average, left_count) = tree.node(bottoms[0]).leaf_stats().unwrap();
    assert!((left_average - (1.0 + 3.0 * 3.0) / 4.0).abs() < 1e-9);
    assert_eq!(left_count, 4.0);

    let (right_average, right_count) = tree.node(bottoms[1]).leaf_stats().unwrap();
    assert_eq!((right_average, right_count), (9.0, 2.0));
}

#[test]
fn values_changed_update_recomputes_without_repartitioning() {
    let x = arr2(&[[0.2], [0.8]]);
    let y = arr1(&[10.0, 20.0]);
    let data = ordinal_data(x, y, vec![vec![0.5]]);
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    let mut tree = Tree::new(2, 1);
    tree.split(TOP_NODE, Rule::ordinal(0, 0), &ctx, data.y_slice(), false, false)
        .unwrap();

    let residuals = [3.0, 7.0];
    tree.update_state(&ctx, &residuals, TreeUpdate::ValuesChanged);

    let bottoms = tree.bottom_nodes();
    assert_eq!(tree.node(bottoms[0]).leaf_stats().unwrap().0, 3.0);
    assert_eq!(tree.node(bottoms[1]).leaf_stats().unwrap().0, 7.0);
}

#[test]
fn traversal_orders_are_consistent() {
    let x = arr2(&[
        [0.1, 0.1],
        [0.2, 0.9],
        [0.8, 0.2],
        [0.9, 0.9],
    ]);
    let y = arr1(&[1.0, 2.0, 3.0, 4.0]);
    let data = ordinal_data(x, y, vec![vec![0.5], vec![0.5]]);
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    let mut tree = Tree::new(4, 2);
    tree.split(TOP_NODE, Rule::ordinal(0, 0), &ctx, data.y_slice(), false, false)
        .unwrap();
    let left = tree.bottom_nodes()[0];
    tree.split(left, Rule::ordinal(1, 0), &ctx, data.y_slice(), false, false)
        .unwrap();

    assert_eq!(tree.num_bottom_nodes(), 3);
    assert_eq!(tree.num_not_bottom_nodes(), 2);
    assert_eq!(tree.num_no_grand_nodes(), 1);
    assert_eq!(tree.num_swappable_nodes(), 1);

    // The only no-grand node is the split left child; the top is the only
    // swappable node and internal nodes come children-first.
    assert_eq!(tree.no_grand_nodes(), vec![left]);
    assert_eq!(tree.swappable_nodes(), vec![TOP_NODE]);
    assert_eq!(tree.not_bottom_nodes(), vec![left, TOP_NODE]);

    let enumerated = tree.enumerate_bottom_nodes();
    for (position, &id) in enumerated.iter().enumerate() {
        assert_eq!(tree.node(id).enumeration_index, Some(position));
    }

    assert_eq!(tree.node_depth(TOP_NODE), 0);
    assert_eq!(tree.node_depth(left), 1);
    assert_eq!(tree.depth_below(TOP_NODE), 2);
    assert_eq!(tree.num_nodes_below(TOP_NODE), 4);
}

#[test]
fn find_bottom_node_follows_rules() {
    let x = arr2(&[[0.1, 0.1], [0.2, 0.9], [0.8, 0.2], [0.9, 0.9]]);
    let y = arr1(&[1.0, 2.0, 3.0, 4.0]);
    let data = ordinal_data(x, y, vec![vec![0.5], vec![0.5]]);
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    let mut tree = Tree::new(4, 2);
    tree.split(TOP_NODE, Rule::ordinal(0, 0), &ctx, data.y_slice(), false, false)
        .unwrap();

    for observation in 0..4 {
        let row = data.quantized_observation(observation);
        let id = tree.find_bottom_node(&data, &row);
        assert!(tree
            .observation_indices(id)
            .contains(&observation));
    }
}

#[test]
fn predictions_scatter_through_leaf_slices() {
    let x = arr2(&[[0.1], [0.7], [0.3], [0.9]]);
    let y = arr1(&[1.0, 2.0, 3.0, 4.0]);
    let data = ordinal_data(x, y, vec![vec![0.5]]);
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    let mut tree = Tree::new(4, 1);
    tree.split(TOP_NODE, Rule::ordinal(0, 0), &ctx, data.y_slice(), false, false)
        .unwrap();
    let bottoms = tree.bottom_nodes();

    let mut y_hat = vec![0.0; 4];
    tree.set_predictions(bottoms[0], &mut y_hat, -1.5);
    tree.set_predictions(bottoms[1], &mut y_hat, 2.5);
    assert_eq!(y_hat, vec![-1.5, 2.5, -1.5, 2.5]);

    // A row lands in a leaf and predicts that leaf's average.
    for observation in 0..4 {
        let row = data.quantized_observation(observation);
        let leaf = tree.find_bottom_node(&data, &row);
        assert_eq!(
            tree.get_prediction(&data, &row),
            tree.node(leaf).leaf_stats().unwrap().0
        );
    }

    // At the top the whole vector is overwritten.
    let single = Tree::new(4, 1);
    single.set_predictions(TOP_NODE, &mut y_hat, 7.0);
    assert_eq!(y_hat, vec![7.0; 4]);
}

#[test]
fn split_errors() {
    let x = arr2(&[[0.2], [0.8]]);
    let y = arr1(&[10.0, 20.0]);
    let data = ordinal_data(x, y, vec![vec![0.5]]);
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    let mut tree = Tree::new(2, 1);
    assert_eq!(
        tree.split(TOP_NODE, Rule::invalid(), &ctx, data.y_slice(), false, false),
        Err(TreeError::InvalidRule)
    );
    assert_eq!(
        tree.split(99, Rule::ordinal(0, 0), &ctx, data.y_slice(), false, false),
        Err(TreeError::InvalidNodeIndex)
    );

    tree.split(TOP_NODE, Rule::ordinal(0, 0), &ctx, data.y_slice(), false, false)
        .unwrap();
    assert_eq!(
        tree.split(TOP_NODE, Rule::ordinal(0, 0), &ctx, data.y_slice(), false, false),
        Err(TreeError::NonLeafSplit)
    );
}

#[test]
fn exhausted_sides_lose_the_split_variable() {
    let x = arr2(&[[0.2, 0.3], [0.8, 0.7]]);
    let y = arr1(&[10.0, 20.0]);
    let data = ordinal_data(x, y, vec![vec![0.5], vec![0.5]]);
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    let mut tree = Tree::new(2, 2);
    tree.split(TOP_NODE, Rule::ordinal(0, 0), &ctx, data.y_slice(), true, false)
        .unwrap();

    let bottoms = tree.bottom_nodes();
    assert_eq!(tree.num_variables_available_for_split(bottoms[0]), 1);
    assert_eq!(tree.num_variables_available_for_split(bottoms[1]), 2);
    assert!(!tree.node(bottoms[0]).variables_available_for_split[0]);
}

#[test]
fn count_variable_uses_covers_all_internal_nodes() {
    let x = arr2(&[[0.1, 0.1], [0.2, 0.9], [0.8, 0.2], [0.9, 0.9]]);
    let y = arr1(&[1.0, 2.0, 3.0, 4.0]);
    let data = ordinal_data(x, y, vec![vec![0.5], vec![0.5]]);
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    let mut tree = Tree::new(4, 2);
    tree.split(TOP_NODE, Rule::ordinal(0, 0), &ctx, data.y_slice(), false, false)
        .unwrap();
    let left = tree.bottom_nodes()[0];
    tree.split(left, Rule::ordinal(1, 0), &ctx, data.y_slice(), false, false)
        .unwrap();

    let mut counts = [0u32; 2];
    tree.count_variable_uses(&mut counts);
    assert_eq!(counts, [1, 1]);
}

#[test]
fn compute_variance_matches_direct_calculation() {
    let x = arr2(&[[0.2], [0.8]]);
    let y = arr1(&[10.0, 20.0]);
    let data = ordinal_data(x, y, vec![vec![0.5]]);
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    let mut tree = Tree::new(2, 1);
    tree.set_average(TOP_NODE, &ctx, data.y_slice());
    let variance = tree.compute_variance(TOP_NODE, &ctx, data.y_slice());
    assert!((variance - 25.0).abs() < 1e-9);
}

#[test]
fn clones_are_structurally_equal_and_independent() {
    let x = arr2(&[[0.2], [0.8]]);
    let y = arr1(&[10.0, 20.0]);
    let data = ordinal_data(x, y, vec![vec![0.5]]);
    let manager = SerialThreadManager;
    let ctx = context(&data, &manager);

    let mut tree = Tree::new(2, 1);
    tree.split(TOP_NODE, Rule::ordinal(0, 0), &ctx, data.y_slice(), false, false)
        .unwrap();

    let mut copy = tree.clone();
    assert_eq!(tree, copy);

    copy.orphan_children(TOP_NODE);
    assert_ne!(tree, copy);
    assert!(!tree.has_single_node());
}
