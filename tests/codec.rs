use std::io::Cursor;

use ndarray::{arr1, arr2, Array1, Array2};

use bart_core::codec::{
    read_checkpoint, read_control, read_data, read_model, read_state, write_checkpoint,
    write_control, write_data, write_model, write_state,
};
use bart_core::control::Control;
use bart_core::data::{Data, VariableType};
use bart_core::model::{ChiSquaredPrior, CgmPrior, Model, NormalPrior};
use bart_core::rule::Rule;
use bart_core::state::State;
use bart_core::stats::{SerialThreadManager, TaskId};
use bart_core::tree::{FitContext, TOP_NODE};

fn sample_control() -> Control {
    Control {
        binary_response: false,
        verbose: true,
        keep_training_fits: true,
        use_quantiles: false,
        num_samples: 500,
        num_burn_in: 100,
        num_trees: 2,
        num_threads: 4,
        tree_thinning_rate: 5,
        print_every: 50,
        print_cutoffs: false,
        callback: None,
    }
}

fn sample_model() -> Model {
    Model {
        birth_or_death_probability: 0.5,
        swap_probability: 0.1,
        change_probability: 0.4,
        birth_probability: 0.5,
        tree_prior: CgmPrior {
            base: 0.95,
            power: 2.0,
        },
        end_node_prior: NormalPrior { precision: 3.5 },
        sigma_squared_prior: ChiSquaredPrior {
            degrees_of_freedom: 3.0,
            scale: 0.9,
        },
    }
}

// 50 observations, 3 predictors: one categorical with 4 categories, two
// ordinal. Weights present, no test set.
fn sample_data() -> Data {
    let num_observations = 50;
    let mut rows = Vec::with_capacity(num_observations * 3);
    for i in 0..num_observations {
        rows.push((i % 4) as f64);
        rows.push((i as f64 * 0.713).sin());
        rows.push((i as f64 * 0.291).cos());
    }
    let x = Array2::from_shape_vec((num_observations, 3), rows).unwrap();
    let y = Array1::from_iter((0..num_observations).map(|i| (i as f64).sqrt()));

    let mut data = Data::new(
        x,
        y,
        vec![
            VariableType::Categorical,
            VariableType::Ordinal,
            VariableType::Ordinal,
        ],
    );
    data.sigma_estimate = 0.8;
    data.weights = Some(Array1::from_elem(num_observations, 2.0));
    data
}

#[test]
fn control_round_trip_resets_callback() {
    let mut control = sample_control();
    control.callback = Some(Box::new(|_, _| {}));

    let mut buf = Vec::new();
    write_control(&mut buf, &control).unwrap();
    let decoded = read_control(&mut Cursor::new(&buf)).unwrap();

    assert_eq!(decoded, control);
    assert!(decoded.callback.is_none());
}

#[test]
fn data_round_trip_with_each_optional_section() {
    let base = sample_data();

    let mut with_offsets = sample_data();
    with_offsets.weights = None;
    with_offsets.offset = Some(Array1::from_elem(50, 0.25));
    with_offsets.num_test_observations = 5;
    with_offsets.x_test = Some(arr2(&[
        [0.0, 0.1, 0.2],
        [1.0, 0.3, 0.4],
        [2.0, 0.5, 0.6],
        [3.0, 0.7, 0.8],
        [0.0, 0.9, 1.0],
    ]));
    with_offsets.test_offset = Some(arr1(&[0.1, 0.2, 0.3, 0.4, 0.5]));

    let mut with_max_cuts = sample_data();
    with_max_cuts.max_num_cuts = Some(vec![4, 100, 100]);

    for data in [base, with_offsets, with_max_cuts] {
        let mut buf = Vec::new();
        write_data(&mut buf, &data).unwrap();
        let decoded = read_data(&mut Cursor::new(&buf)).unwrap();

        assert_eq!(decoded.num_observations, data.num_observations);
        assert_eq!(decoded.num_predictors, data.num_predictors);
        assert_eq!(decoded.num_test_observations, data.num_test_observations);
        assert_eq!(decoded.sigma_estimate, data.sigma_estimate);
        assert_eq!(decoded.y, data.y);
        assert_eq!(decoded.x, data.x);
        assert_eq!(decoded.x_test, data.x_test);
        assert_eq!(decoded.weights, data.weights);
        assert_eq!(decoded.offset, data.offset);
        assert_eq!(decoded.test_offset, data.test_offset);
        assert_eq!(decoded.variable_types, data.variable_types);
        assert_eq!(decoded.max_num_cuts, data.max_num_cuts);
    }
}

#[test]
fn model_round_trip() {
    let model = sample_model();
    let mut buf = Vec::new();
    write_model(&mut buf, &model).unwrap();
    assert_eq!(read_model(&mut Cursor::new(&buf)).unwrap(), model);
}

#[test]
fn model_tag_corruption_is_an_invalid_sequence() {
    let model = sample_model();
    let mut buf = Vec::new();
    write_model(&mut buf, &model).unwrap();

    // The tree-prior tag sits right after the four move probabilities; the
    // other two tags follow their sections.
    for tag_offset in [32, 32 + 4 + 16, 32 + 4 + 16 + 4 + 8] {
        let mut corrupted = buf.clone();
        corrupted[tag_offset] ^= 0xff;
        let err = read_model(&mut Cursor::new(&corrupted)).unwrap_err();
        assert!(err.is_invalid_sequence());
    }
}

fn multi_level_state(control: &Control, data: &Data) -> State {
    let manager = SerialThreadManager;
    let ctx = FitContext {
        data,
        thread_manager: &manager,
        task: TaskId(0),
    };

    let mut state = State::new(control, data);
    let y: Vec<f64> = data.y_slice().to_vec();

    let tree = &mut state.trees[0];
    tree.split(TOP_NODE, Rule::ordinal(1, 3), &ctx, &y, false, false)
        .unwrap();
    let right = tree.bottom_nodes()[1];
    let mut rule = Rule::categorical(0, 0);
    rule.set_category_goes_right(1);
    rule.set_category_goes_right(2);
    tree.split(right, rule, &ctx, &y, false, false).unwrap();
    tree.enumerate_bottom_nodes();

    state.sigma = 0.42;
    state.running_time = 12.5;
    state.tree_fits.fill(0.125);
    state.total_fits.fill(0.25);
    state
}

#[test]
fn state_round_trip_with_multi_level_tree() {
    let control = sample_control();
    let mut data = sample_data();
    data.set_cut_points(vec![
        Vec::new(),
        (0..8).map(|i| i as f64 / 8.0 - 0.5).collect(),
        (0..8).map(|i| i as f64 / 8.0 - 0.5).collect(),
    ]);

    let state = multi_level_state(&control, &data);
    let mut buf = Vec::new();
    write_state(&mut buf, &state, &control, &data).unwrap();
    let decoded = read_state(&mut Cursor::new(&buf), &control, &data).unwrap();

    assert_eq!(decoded, state);
}

#[test]
fn checkpoint_round_trip() {
    let control = sample_control();
    let mut data = sample_data();
    data.set_cut_points(vec![
        Vec::new(),
        (0..8).map(|i| i as f64 / 8.0 - 0.5).collect(),
        (0..8).map(|i| i as f64 / 8.0 - 0.5).collect(),
    ]);
    let model = sample_model();
    let state = multi_level_state(&control, &data);

    let mut buf = Vec::new();
    write_checkpoint(&mut buf, &control, &data, &model, &state).unwrap();
    let checkpoint = read_checkpoint(&mut Cursor::new(&buf)).unwrap();

    assert_eq!(checkpoint.control, control);
    assert_eq!(checkpoint.model, model);
    assert_eq!(checkpoint.state, state);
    assert_eq!(checkpoint.data.y, data.y);
}

#[test]
fn malformed_node_flags_are_rejected() {
    let control = Control {
        num_trees: 1,
        ..sample_control()
    };
    let x = arr2(&[[0.1], [0.2], [0.3], [0.4]]);
    let y = arr1(&[1.0, 2.0, 3.0, 4.0]);
    let data = Data::new(x, y, vec![VariableType::Ordinal]);
    let state = State::new(&control, &data);

    let mut buf = Vec::new();
    write_state(&mut buf, &state, &control, &data).unwrap();

    // Index buffer (4 x u64) then the top node's four u64 header fields put
    // the children flag byte at offset 64.
    assert_eq!(buf[64], 0);
    buf[64] = 7;

    let err = read_state(&mut Cursor::new(&buf), &control, &data).unwrap_err();
    assert!(err.is_invalid_sequence());
}

#[test]
fn out_of_range_node_offset_is_rejected() {
    let control = Control {
        num_trees: 1,
        ..sample_control()
    };
    let x = arr2(&[[0.1], [0.2], [0.3], [0.4]]);
    let y = arr1(&[1.0, 2.0, 3.0, 4.0]);
    let data = Data::new(x, y, vec![VariableType::Ordinal]);
    let state = State::new(&control, &data);

    let mut buf = Vec::new();
    write_state(&mut buf, &state, &control, &data).unwrap();

    // The top node's observation offset follows the 32-byte index buffer.
    buf[32..40].copy_from_slice(&100u64.to_le_bytes());

    let err = read_state(&mut Cursor::new(&buf), &control, &data).unwrap_err();
    assert!(err.is_invalid_sequence());
}

#[test]
fn more_than_sixty_four_predictors_is_rejected() {
    let control = Control {
        num_trees: 1,
        ..sample_control()
    };
    let num_predictors = 65;
    let x = Array2::zeros((2, num_predictors));
    let y = arr1(&[1.0, 2.0]);
    let data = Data::new(x, y, vec![VariableType::Ordinal; num_predictors]);
    let state = State::new(&control, &data);

    let mut buf = Vec::new();
    let err = write_state(&mut buf, &state, &control, &data).unwrap_err();
    assert!(err.is_invalid_sequence());

    // The read side checks before consuming anything.
    let err = read_state(&mut Cursor::new(&buf), &control, &data).unwrap_err();
    assert!(err.is_invalid_sequence());
}

#[test]
fn truncated_stream_is_an_io_failure() {
    let control = sample_control();
    let mut buf = Vec::new();
    write_control(&mut buf, &control).unwrap();
    buf.truncate(buf.len() - 2);

    let err = read_control(&mut Cursor::new(&buf)).unwrap_err();
    assert!(!err.is_invalid_sequence());
}
