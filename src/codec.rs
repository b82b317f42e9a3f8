//! Binary checkpoint codec for the Control, Data, Model, and State aggregates.
//!
//! Each aggregate is a flat, versionless sequence of little-endian
//! fixed-width fields in a fixed order. Optional sections are announced by a
//! leading bitmask field whose bits are consumed in write order. Model embeds
//! a 4-byte ASCII tag before each prior's parameters; a mismatched tag is a
//! hard decode failure. State embeds, per tree slot, the chain's permuted
//! index buffer followed by the tree's node records (pre-order, left before
//! right). No compression, no checksums.
//!
//! Every aggregate-level function is an error boundary: the first failure
//! aborts that aggregate, logs one diagnostic, and drops whatever was built
//! so far. Callers composing a full checkpoint stop at the first failing
//! aggregate; a partial checkpoint is never valid or resumable.

use std::io::{Read, Write};

use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::control::Control;
use crate::data::{Data, VariableType};
use crate::model::{ChiSquaredPrior, CgmPrior, Model, NormalPrior};
use crate::rule::Rule;
use crate::state::State;
use crate::tree::{Node, NodeId, NodeKind, Tree, TOP_NODE};

/// Encode/decode failure.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying sink or source failed.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    /// A prior section's type tag did not match the expected bytes.
    #[error("unexpected type tag: expected {expected:?}, found {found:?}")]
    TagMismatch {
        /// The tag the section must carry.
        expected: [u8; 4],
        /// The bytes actually read.
        found: [u8; 4],
    },
    /// A decoded index or enum tag fell outside its valid range.
    #[error("decoded value {value} out of range (limit {limit})")]
    IndexOutOfRange {
        /// The offending value.
        value: u64,
        /// The exclusive upper bound it violated.
        limit: u64,
    },
    /// A node record's children flag byte was neither 0 nor 1.
    #[error("malformed node flag byte {0}")]
    MalformedNodeFlags(u8),
    /// The eligible-variable bitmask is a single `u64` word, capping node
    /// records at 64 predictors.
    #[error("variable bitmask supports at most 64 predictors, got {0}")]
    TooManyPredictors(usize),
}

impl CodecError {
    /// Whether this is a format failure ("invalid sequence") rather than an
    /// I/O failure.
    pub fn is_invalid_sequence(&self) -> bool {
        !matches!(self, CodecError::Io(_))
    }
}

const TAG_TREE_PRIOR: [u8; 4] = *b"cgm ";
const TAG_END_NODE_PRIOR: [u8; 4] = *b"nrml";
const TAG_SIGMA_SQUARED_PRIOR: [u8; 4] = *b"chsq";

const NO_ENUMERATION_INDEX: u64 = u64::MAX;

const CONTROL_FLAG_BINARY_RESPONSE: u32 = 1 << 0;
const CONTROL_FLAG_VERBOSE: u32 = 1 << 1;
const CONTROL_FLAG_KEEP_TRAINING_FITS: u32 = 1 << 2;
const CONTROL_FLAG_USE_QUANTILES: u32 = 1 << 3;

const DATA_FLAG_HAS_WEIGHTS: u32 = 1 << 0;
const DATA_FLAG_HAS_OFFSET: u32 = 1 << 1;
const DATA_FLAG_HAS_TEST_OFFSET: u32 = 1 << 2;
const DATA_FLAG_HAS_MAX_NUM_CUTS: u32 = 1 << 3;

// ----------------------------------------------------------------------
// Primitive field helpers
// ----------------------------------------------------------------------

fn write_u8<W: Write>(writer: &mut W, value: u8) -> Result<(), CodecError> {
    writer.write_all(&[value])?;
    Ok(())
}

fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<(), CodecError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<(), CodecError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_size<W: Write>(writer: &mut W, value: usize) -> Result<(), CodecError> {
    write_u64(writer, value as u64)
}

fn write_f64<W: Write>(writer: &mut W, value: f64) -> Result<(), CodecError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_f64_iter<W, I>(writer: &mut W, values: I) -> Result<(), CodecError>
where
    W: Write,
    I: IntoIterator<Item = f64>,
{
    for value in values {
        write_f64(writer, value)?;
    }
    Ok(())
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8, CodecError> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, CodecError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64, CodecError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_size<R: Read>(reader: &mut R) -> Result<usize, CodecError> {
    Ok(read_u64(reader)? as usize)
}

fn read_f64<R: Read>(reader: &mut R) -> Result<f64, CodecError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_f64_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<f64>, CodecError> {
    (0..len).map(|_| read_f64(reader)).collect()
}

fn write_tag<W: Write>(writer: &mut W, tag: [u8; 4]) -> Result<(), CodecError> {
    writer.write_all(&tag)?;
    Ok(())
}

fn expect_tag<R: Read>(reader: &mut R, expected: [u8; 4]) -> Result<(), CodecError> {
    let mut found = [0u8; 4];
    reader.read_exact(&mut found)?;
    if found != expected {
        return Err(CodecError::TagMismatch { expected, found });
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Control
// ----------------------------------------------------------------------

/// Serializes a `Control` aggregate. The callback is not persisted.
pub fn write_control<W: Write>(writer: &mut W, control: &Control) -> Result<(), CodecError> {
    write_control_fields(writer, control).map_err(|err| {
        log::warn!("error writing control object: {err}");
        err
    })
}

/// Deserializes a `Control` aggregate; the callback is always `None`.
pub fn read_control<R: Read>(reader: &mut R) -> Result<Control, CodecError> {
    read_control_fields(reader).map_err(|err| {
        log::warn!("error reading control object: {err}");
        err
    })
}

fn write_control_fields<W: Write>(writer: &mut W, control: &Control) -> Result<(), CodecError> {
    let mut flags = 0u32;
    if control.binary_response {
        flags |= CONTROL_FLAG_BINARY_RESPONSE;
    }
    if control.verbose {
        flags |= CONTROL_FLAG_VERBOSE;
    }
    if control.keep_training_fits {
        flags |= CONTROL_FLAG_KEEP_TRAINING_FITS;
    }
    if control.use_quantiles {
        flags |= CONTROL_FLAG_USE_QUANTILES;
    }

    write_u32(writer, flags)?;
    write_size(writer, control.num_samples)?;
    write_size(writer, control.num_burn_in)?;
    write_size(writer, control.num_trees)?;
    write_size(writer, control.num_threads)?;
    write_u32(writer, control.tree_thinning_rate)?;
    write_u32(writer, control.print_every)?;
    write_u32(writer, u32::from(control.print_cutoffs))?;
    Ok(())
}

fn read_control_fields<R: Read>(reader: &mut R) -> Result<Control, CodecError> {
    let flags = read_u32(reader)?;
    Ok(Control {
        binary_response: flags & CONTROL_FLAG_BINARY_RESPONSE != 0,
        verbose: flags & CONTROL_FLAG_VERBOSE != 0,
        keep_training_fits: flags & CONTROL_FLAG_KEEP_TRAINING_FITS != 0,
        use_quantiles: flags & CONTROL_FLAG_USE_QUANTILES != 0,
        num_samples: read_size(reader)?,
        num_burn_in: read_size(reader)?,
        num_trees: read_size(reader)?,
        num_threads: read_size(reader)?,
        tree_thinning_rate: read_u32(reader)?,
        print_every: read_u32(reader)?,
        print_cutoffs: read_u32(reader)? != 0,
        callback: None,
    })
}

// ----------------------------------------------------------------------
// Data
// ----------------------------------------------------------------------

/// Serializes a `Data` aggregate. Derived cutpoints and quantized columns
/// are not persisted.
pub fn write_data<W: Write>(writer: &mut W, data: &Data) -> Result<(), CodecError> {
    write_data_fields(writer, data).map_err(|err| {
        log::warn!("error writing data object: {err}");
        err
    })
}

/// Deserializes a `Data` aggregate.
///
/// Cutpoints are not part of the stream; attach them afterwards with
/// [`Data::set_cut_points`] before running tree operations.
pub fn read_data<R: Read>(reader: &mut R) -> Result<Data, CodecError> {
    read_data_fields(reader).map_err(|err| {
        log::warn!("error reading data object: {err}");
        err
    })
}

fn write_data_fields<W: Write>(writer: &mut W, data: &Data) -> Result<(), CodecError> {
    let mut flags = 0u32;
    if data.weights.is_some() {
        flags |= DATA_FLAG_HAS_WEIGHTS;
    }
    if data.offset.is_some() {
        flags |= DATA_FLAG_HAS_OFFSET;
    }
    if data.test_offset.is_some() {
        flags |= DATA_FLAG_HAS_TEST_OFFSET;
    }
    if data.max_num_cuts.is_some() {
        flags |= DATA_FLAG_HAS_MAX_NUM_CUTS;
    }

    write_u32(writer, flags)?;
    write_size(writer, data.num_observations)?;
    write_size(writer, data.num_predictors)?;
    write_size(writer, data.num_test_observations)?;
    write_f64(writer, data.sigma_estimate)?;
    write_f64_iter(writer, data.y.iter().copied())?;
    write_f64_iter(writer, data.x.iter().copied())?;
    if let Some(x_test) = &data.x_test {
        write_f64_iter(writer, x_test.iter().copied())?;
    }
    if let Some(weights) = &data.weights {
        write_f64_iter(writer, weights.iter().copied())?;
    }
    if let Some(offset) = &data.offset {
        write_f64_iter(writer, offset.iter().copied())?;
    }
    if let Some(test_offset) = &data.test_offset {
        write_f64_iter(writer, test_offset.iter().copied())?;
    }
    for variable_type in &data.variable_types {
        write_u32(writer, variable_type.to_u32())?;
    }
    if let Some(max_num_cuts) = &data.max_num_cuts {
        for &max in max_num_cuts {
            write_u32(writer, max)?;
        }
    }
    Ok(())
}

fn read_data_fields<R: Read>(reader: &mut R) -> Result<Data, CodecError> {
    let flags = read_u32(reader)?;
    let num_observations = read_size(reader)?;
    let num_predictors = read_size(reader)?;
    let num_test_observations = read_size(reader)?;
    let sigma_estimate = read_f64(reader)?;

    let y = Array1::from_vec(read_f64_vec(reader, num_observations)?);
    let x = Array2::from_shape_vec(
        (num_observations, num_predictors),
        read_f64_vec(reader, num_observations * num_predictors)?,
    )
    .expect("vector length matches matrix shape");

    let x_test = if num_test_observations > 0 {
        Some(
            Array2::from_shape_vec(
                (num_test_observations, num_predictors),
                read_f64_vec(reader, num_test_observations * num_predictors)?,
            )
            .expect("vector length matches matrix shape"),
        )
    } else {
        None
    };
    let weights = if flags & DATA_FLAG_HAS_WEIGHTS != 0 {
        Some(Array1::from_vec(read_f64_vec(reader, num_observations)?))
    } else {
        None
    };
    let offset = if flags & DATA_FLAG_HAS_OFFSET != 0 {
        Some(Array1::from_vec(read_f64_vec(reader, num_observations)?))
    } else {
        None
    };
    let test_offset = if flags & DATA_FLAG_HAS_TEST_OFFSET != 0 {
        Some(Array1::from_vec(read_f64_vec(
            reader,
            num_test_observations,
        )?))
    } else {
        None
    };

    let mut variable_types = Vec::with_capacity(num_predictors);
    for _ in 0..num_predictors {
        let tag = read_u32(reader)?;
        variable_types.push(VariableType::from_u32(tag).ok_or(
            CodecError::IndexOutOfRange {
                value: u64::from(tag),
                limit: 2,
            },
        )?);
    }

    let max_num_cuts = if flags & DATA_FLAG_HAS_MAX_NUM_CUTS != 0 {
        Some(
            (0..num_predictors)
                .map(|_| read_u32(reader))
                .collect::<Result<Vec<u32>, _>>()?,
        )
    } else {
        None
    };

    let mut data = Data::new(x, y, variable_types);
    data.num_test_observations = num_test_observations;
    data.sigma_estimate = sigma_estimate;
    data.x_test = x_test;
    data.weights = weights;
    data.offset = offset;
    data.test_offset = test_offset;
    data.max_num_cuts = max_num_cuts;
    Ok(data)
}

// ----------------------------------------------------------------------
// Model
// ----------------------------------------------------------------------

/// Serializes a `Model` aggregate with its self-describing prior tags.
pub fn write_model<W: Write>(writer: &mut W, model: &Model) -> Result<(), CodecError> {
    write_model_fields(writer, model).map_err(|err| {
        log::warn!("error writing model object: {err}");
        err
    })
}

/// Deserializes a `Model` aggregate, failing hard on any prior-tag mismatch.
pub fn read_model<R: Read>(reader: &mut R) -> Result<Model, CodecError> {
    read_model_fields(reader).map_err(|err| {
        log::warn!("error reading model object: {err}");
        err
    })
}

fn write_model_fields<W: Write>(writer: &mut W, model: &Model) -> Result<(), CodecError> {
    write_f64(writer, model.birth_or_death_probability)?;
    write_f64(writer, model.swap_probability)?;
    write_f64(writer, model.change_probability)?;
    write_f64(writer, model.birth_probability)?;

    write_tag(writer, TAG_TREE_PRIOR)?;
    write_f64(writer, model.tree_prior.base)?;
    write_f64(writer, model.tree_prior.power)?;

    write_tag(writer, TAG_END_NODE_PRIOR)?;
    write_f64(writer, model.end_node_prior.precision)?;

    write_tag(writer, TAG_SIGMA_SQUARED_PRIOR)?;
    write_f64(writer, model.sigma_squared_prior.degrees_of_freedom)?;
    write_f64(writer, model.sigma_squared_prior.scale)?;
    Ok(())
}

fn read_model_fields<R: Read>(reader: &mut R) -> Result<Model, CodecError> {
    let birth_or_death_probability = read_f64(reader)?;
    let swap_probability = read_f64(reader)?;
    let change_probability = read_f64(reader)?;
    let birth_probability = read_f64(reader)?;

    expect_tag(reader, TAG_TREE_PRIOR)?;
    let tree_prior = CgmPrior {
        base: read_f64(reader)?,
        power: read_f64(reader)?,
    };

    expect_tag(reader, TAG_END_NODE_PRIOR)?;
    let end_node_prior = NormalPrior {
        precision: read_f64(reader)?,
    };

    expect_tag(reader, TAG_SIGMA_SQUARED_PRIOR)?;
    let sigma_squared_prior = ChiSquaredPrior {
        degrees_of_freedom: read_f64(reader)?,
        scale: read_f64(reader)?,
    };

    Ok(Model {
        birth_or_death_probability,
        swap_probability,
        change_probability,
        birth_probability,
        tree_prior,
        end_node_prior,
        sigma_squared_prior,
    })
}

// ----------------------------------------------------------------------
// State
// ----------------------------------------------------------------------

/// Serializes one chain's `State`: index buffers, trees, and fits.
pub fn write_state<W: Write>(
    writer: &mut W,
    state: &State,
    control: &Control,
    data: &Data,
) -> Result<(), CodecError> {
    write_state_fields(writer, state, control, data).map_err(|err| {
        log::warn!("error writing state object: {err}");
        err
    })
}

/// Deserializes one chain's `State` against the control and data it was
/// written under.
pub fn read_state<R: Read>(
    reader: &mut R,
    control: &Control,
    data: &Data,
) -> Result<State, CodecError> {
    read_state_fields(reader, control, data).map_err(|err| {
        log::warn!("error reading state object: {err}");
        err
    })
}

fn write_state_fields<W: Write>(
    writer: &mut W,
    state: &State,
    control: &Control,
    data: &Data,
) -> Result<(), CodecError> {
    debug_assert_eq!(state.trees.len(), control.num_trees);
    if data.num_predictors > 64 {
        return Err(CodecError::TooManyPredictors(data.num_predictors));
    }

    for tree in &state.trees {
        for &index in tree.indices() {
            write_size(writer, index)?;
        }
    }
    for tree in &state.trees {
        write_node(writer, tree, TOP_NODE)?;
    }
    write_f64_iter(writer, state.tree_fits.iter().copied())?;
    write_f64_iter(writer, state.total_fits.iter().copied())?;
    if let Some(total_test_fits) = &state.total_test_fits {
        write_f64_iter(writer, total_test_fits.iter().copied())?;
    }
    write_f64(writer, state.sigma)?;
    write_f64(writer, state.running_time)?;
    Ok(())
}

fn read_state_fields<R: Read>(
    reader: &mut R,
    control: &Control,
    data: &Data,
) -> Result<State, CodecError> {
    let num_observations = data.num_observations;
    let num_trees = control.num_trees;
    if data.num_predictors > 64 {
        return Err(CodecError::TooManyPredictors(data.num_predictors));
    }

    let mut index_buffers = Vec::with_capacity(num_trees);
    for _ in 0..num_trees {
        let indices = (0..num_observations)
            .map(|_| read_size(reader))
            .collect::<Result<Vec<usize>, _>>()?;
        index_buffers.push(indices);
    }

    let mut trees = Vec::with_capacity(num_trees);
    for indices in index_buffers {
        let mut tree = Tree::from_indices(indices, data.num_predictors);
        read_node(reader, &mut tree, TOP_NODE, num_observations, data.num_predictors)?;
        trees.push(tree);
    }

    let tree_fits = Array2::from_shape_vec(
        (num_trees, num_observations),
        read_f64_vec(reader, num_trees * num_observations)?,
    )
    .expect("vector length matches matrix shape");
    let total_fits = Array1::from_vec(read_f64_vec(reader, num_observations)?);
    let total_test_fits = if data.num_test_observations > 0 {
        Some(Array1::from_vec(read_f64_vec(
            reader,
            data.num_test_observations,
        )?))
    } else {
        None
    };

    Ok(State {
        trees,
        tree_fits,
        total_fits,
        total_test_fits,
        sigma: read_f64(reader)?,
        running_time: read_f64(reader)?,
    })
}

fn write_node<W: Write>(writer: &mut W, tree: &Tree, id: NodeId) -> Result<(), CodecError> {
    let node = tree.node(id);

    write_size(writer, node.observation_start)?;
    write_u64(
        writer,
        node.enumeration_index
            .map_or(NO_ENUMERATION_INDEX, |index| index as u64),
    )?;
    write_size(writer, node.num_observations)?;

    let mut variable_bits = 0u64;
    for (variable_index, &available) in node.variables_available_for_split.iter().enumerate() {
        if available {
            variable_bits |= 1 << variable_index;
        }
    }
    write_u64(writer, variable_bits)?;

    match &node.kind {
        NodeKind::Leaf {
            average,
            num_effective_observations,
        } => {
            write_u8(writer, 0)?;
            write_f64(writer, *average)?;
            write_f64(writer, *num_effective_observations)?;
            Ok(())
        }
        NodeKind::Internal { rule, left, right } => {
            write_u8(writer, 1)?;
            write_u32(writer, rule.variable_index as u32)?;
            write_u32(writer, rule.payload_bits())?;
            write_node(writer, tree, *left)?;
            write_node(writer, tree, *right)
        }
    }
}

fn read_node<R: Read>(
    reader: &mut R,
    tree: &mut Tree,
    id: NodeId,
    num_observations: usize,
    num_predictors: usize,
) -> Result<(), CodecError> {
    let observation_start = read_u64(reader)?;
    if observation_start >= num_observations as u64 {
        return Err(CodecError::IndexOutOfRange {
            value: observation_start,
            limit: num_observations as u64,
        });
    }
    let enumeration_index = read_u64(reader)?;
    let node_num_observations = read_size(reader)?;
    let variable_bits = read_u64(reader)?;

    {
        let node = tree.node_mut(id);
        node.observation_start = observation_start as usize;
        node.num_observations = node_num_observations;
        node.enumeration_index = (enumeration_index != NO_ENUMERATION_INDEX)
            .then(|| enumeration_index as usize);
        node.variables_available_for_split = (0..num_predictors)
            .map(|variable_index| (variable_bits >> variable_index) & 1 != 0)
            .collect();
    }

    match read_u8(reader)? {
        0 => {
            let average = read_f64(reader)?;
            let num_effective_observations = read_f64(reader)?;
            tree.node_mut(id).kind = NodeKind::Leaf {
                average,
                num_effective_observations,
            };
            Ok(())
        }
        1 => {
            let variable_word = read_u32(reader)?;
            let payload = read_u32(reader)?;
            let rule = Rule::from_bits(variable_word, payload);

            let placeholder = |parent: NodeId| Node {
                parent: Some(parent),
                kind: NodeKind::Leaf {
                    average: 0.0,
                    num_effective_observations: 0.0,
                },
                variables_available_for_split: Vec::new(),
                observation_start: 0,
                num_observations: 0,
                enumeration_index: None,
            };
            let left = tree.alloc(placeholder(id));
            let right = tree.alloc(placeholder(id));
            tree.node_mut(id).kind = NodeKind::Internal { rule, left, right };

            read_node(reader, tree, left, num_observations, num_predictors)?;
            read_node(reader, tree, right, num_observations, num_predictors)
        }
        other => Err(CodecError::MalformedNodeFlags(other)),
    }
}

// ----------------------------------------------------------------------
// Whole checkpoint
// ----------------------------------------------------------------------

/// A decoded full checkpoint.
#[derive(Debug)]
pub struct Checkpoint {
    /// Sampler run parameters (callback reset to `None`).
    pub control: Control,
    /// Observation data, without derived cutpoints.
    pub data: Data,
    /// Move probabilities and priors.
    pub model: Model,
    /// The chain state.
    pub state: State,
}

/// Writes a full checkpoint, stopping at the first failing aggregate.
pub fn write_checkpoint<W: Write>(
    writer: &mut W,
    control: &Control,
    data: &Data,
    model: &Model,
    state: &State,
) -> Result<(), CodecError> {
    write_control(writer, control)?;
    write_data(writer, data)?;
    write_model(writer, model)?;
    write_state(writer, state, control, data)
}

/// Reads a full checkpoint, stopping at the first failing aggregate.
pub fn read_checkpoint<R: Read>(reader: &mut R) -> Result<Checkpoint, CodecError> {
    let control = read_control(reader)?;
    let data = read_data(reader)?;
    let model = read_model(reader)?;
    let state = read_state(reader, &control, &data)?;
    Ok(Checkpoint {
        control,
        data,
        model,
        state,
    })
}
