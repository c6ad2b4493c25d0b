//! Row-parallel prediction over a committed model.
//!
//! The engine walks every tree for every input row, routes leaf outputs to
//! `(target, row, class)` cells according to the per-tree annotation, then
//! applies averaging, base scores and (for default prediction) the model's
//! post-processor.
//!
//! Rows are partitioned across a worker pool; each row is processed in full
//! by one worker with trees evaluated sequentially, so outputs are
//! bit-identical regardless of the thread count for `raw`, `leaf_id` and
//! `score_per_tree`.

pub mod postprocess;
pub mod traversal;

use ndarray::ArrayView2;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{MatchedElement, Model, ModelPreset, Tree};
use crate::utils::{run_with_threads, Parallelism};

use postprocess::PostProcessor;
use traversal::evaluate_tree;

// =============================================================================
// Configuration
// =============================================================================

/// What the engine should output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictKind {
    /// Sum over trees and apply the model's post-processor.
    #[default]
    Default,
    /// Sum over trees without post-processing (margin scores).
    Raw,
    /// The internal id of the reached leaf, per tree.
    LeafId,
    /// Unsummed margin scores, per tree.
    ScorePerTree,
}

impl PredictKind {
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(Self::Default),
            "raw" => Ok(Self::Raw),
            "leaf_id" => Ok(Self::LeafId),
            "score_per_tree" => Ok(Self::ScorePerTree),
            _ => Err(Error::UnknownIdentifier(format!("unknown predict_type: {s}"))),
        }
    }
}

/// Prediction engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct Configuration {
    pub pred_kind: PredictKind,
    /// Worker count; zero or negative means "use all cores".
    pub nthread: i32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self { pred_kind: PredictKind::Default, nthread: 0 }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigurationFields {
    predict_type: Option<String>,
    nthread: Option<i32>,
}

impl Configuration {
    /// Parse `{"predict_type": ..., "nthread": ...}`.
    ///
    /// Unknown keys are rejected; both fields are optional.
    pub fn from_json(config_json: &str) -> Result<Self> {
        let fields: ConfigurationFields = serde_json::from_str(config_json)?;
        let pred_kind = match fields.predict_type {
            Some(name) => PredictKind::from_str(&name)?,
            None => PredictKind::Default,
        };
        Ok(Self { pred_kind, nthread: fields.nthread.unwrap_or(0) })
    }
}

// =============================================================================
// Output shape
// =============================================================================

/// Shape of the output tensor for `num_row` input rows under `config`.
pub fn get_output_shape(model: &Model, num_row: u64, config: &Configuration) -> Vec<u64> {
    let num_tree = model.num_tree() as u64;
    let max_num_class = model.max_num_class() as u64;
    match config.pred_kind {
        PredictKind::Default | PredictKind::Raw => {
            if model.num_target > 1 {
                vec![model.num_target as u64, num_row, max_num_class]
            } else {
                vec![num_row, max_num_class]
            }
        }
        PredictKind::LeafId => vec![num_row, num_tree],
        PredictKind::ScorePerTree => vec![num_row, num_tree, max_num_class],
    }
}

// =============================================================================
// Entry point
// =============================================================================

/// Run prediction over a row-major `num_row x num_feature` input matrix.
///
/// The input element type must equal the model's leaf output type, and
/// `output` must have exactly the shape reported by [`get_output_shape`].
pub fn predict<I: MatchedElement>(
    model: &Model,
    input: &[I],
    num_row: u64,
    output: &mut [I],
    config: &Configuration,
) -> Result<()> {
    let leaf_output_type = model.leaf_output_type();
    if leaf_output_type != I::TYPE_INFO {
        return Err(Error::TypeMismatch { expected: leaf_output_type, got: I::TYPE_INFO });
    }
    let preset = I::preset_of(model)
        .ok_or(Error::TypeMismatch { expected: leaf_output_type, got: I::TYPE_INFO })?;

    let num_feature = model.num_feature as usize;
    let expected_input = num_row as usize * num_feature;
    if input.len() != expected_input {
        return Err(Error::Validation(format!(
            "input has {} elements, expected num_row * num_feature = {expected_input}",
            input.len()
        )));
    }
    let expected_output: u64 = get_output_shape(model, num_row, config).iter().product();
    if output.len() as u64 != expected_output {
        return Err(Error::Validation(format!(
            "output has {} elements, expected {expected_output}",
            output.len()
        )));
    }

    let input_view = ArrayView2::from_shape((num_row as usize, num_feature), input)
        .map_err(|e| Error::Validation(format!("bad input shape: {e}")))?;

    let n_threads = if config.nthread <= 0 { 0 } else { config.nthread as usize };
    run_with_threads(n_threads, |parallelism| match config.pred_kind {
        PredictKind::Raw => predict_raw(model, preset, input_view, output, parallelism, None),
        PredictKind::Default => {
            let postprocessor = PostProcessor::from_name(&model.postprocessor)?;
            predict_raw(model, preset, input_view, output, parallelism, Some(postprocessor))
        }
        PredictKind::LeafId => predict_leaf_id(preset, input_view, output, parallelism),
        PredictKind::ScorePerTree => {
            predict_score_per_tree(model, preset, input_view, output, parallelism)
        }
    })
}

// =============================================================================
// Raw / default prediction
// =============================================================================

/// Accumulate one leaf's contribution into a row's `[target][class]` cells.
fn route_leaf<I: MatchedElement>(
    model: &Model,
    tree: &Tree<I, I>,
    tree_id: usize,
    leaf_id: i32,
    row_acc: &mut [I],
    max_class: usize,
) -> Result<()> {
    let num_target = model.num_target as usize;
    let target = model.target_id[tree_id];
    let class = model.class_id[tree_id];
    let shape = model.leaf_vector_shape;

    let expect_shape = |expected: [u32; 2]| -> Result<()> {
        if shape != expected {
            return Err(Error::Validation(format!(
                "tree {tree_id} routes ({target}, {class}) which requires leaf_vector_shape \
                 {expected:?}, model has {shape:?}"
            )));
        }
        Ok(())
    };

    if tree.has_leaf_vector(leaf_id) {
        let leaf = tree.leaf_vector(leaf_id);
        match (target, class) {
            (-1, -1) => {
                expect_shape([model.num_target, model.max_num_class()])?;
                for t in 0..num_target {
                    for c in 0..model.num_class[t] as usize {
                        row_acc[t * max_class + c] =
                            row_acc[t * max_class + c] + leaf[t * max_class + c];
                    }
                }
            }
            (-1, c) => {
                expect_shape([model.num_target, 1])?;
                for t in 0..num_target {
                    row_acc[t * max_class + c as usize] =
                        row_acc[t * max_class + c as usize] + leaf[t];
                }
            }
            (t, -1) => {
                expect_shape([1, model.max_num_class()])?;
                for c in 0..model.num_class[t as usize] as usize {
                    row_acc[t as usize * max_class + c] =
                        row_acc[t as usize * max_class + c] + leaf[c];
                }
            }
            (t, c) => {
                expect_shape([1, 1])?;
                row_acc[t as usize * max_class + c as usize] =
                    row_acc[t as usize * max_class + c as usize] + leaf[0];
            }
        }
    } else {
        if target < 0 || class < 0 {
            return Err(Error::Validation(format!(
                "tree {tree_id} routes ({target}, {class}) but its leaves carry scalar \
                 outputs; broadcast routing requires leaf vectors"
            )));
        }
        expect_shape([1, 1])?;
        let cell = target as usize * max_class + class as usize;
        row_acc[cell] = row_acc[cell] + tree.leaf_value(leaf_id);
    }
    Ok(())
}

/// Number of trees contributing to each `[target][class]` cell.
fn contribution_counts(model: &Model, max_class: usize) -> Vec<u64> {
    let num_target = model.num_target as usize;
    let mut counts = vec![0u64; num_target * max_class];
    for tree_id in 0..model.target_id.len() {
        match (model.target_id[tree_id], model.class_id[tree_id]) {
            (-1, -1) => {
                for t in 0..num_target {
                    for c in 0..model.num_class[t] as usize {
                        counts[t * max_class + c] += 1;
                    }
                }
            }
            (-1, c) => {
                for t in 0..num_target {
                    counts[t * max_class + c as usize] += 1;
                }
            }
            (t, -1) => {
                for c in 0..model.num_class[t as usize] as usize {
                    counts[t as usize * max_class + c] += 1;
                }
            }
            (t, c) => counts[t as usize * max_class + c as usize] += 1,
        }
    }
    counts
}

fn predict_raw<I: MatchedElement>(
    model: &Model,
    preset: &ModelPreset<I, I>,
    input: ArrayView2<'_, I>,
    output: &mut [I],
    parallelism: Parallelism,
    postprocessor: Option<PostProcessor>,
) -> Result<()> {
    let num_row = input.nrows();
    let num_target = model.num_target as usize;
    let max_class = model.max_num_class() as usize;
    let width = num_target * max_class;

    // Accumulate into a row-major [row][target][class] scratch buffer so
    // each worker owns a contiguous slice; multi-target output is
    // transposed to [target][row][class] at the end.
    let mut scratch = vec![I::zero(); num_row * width];

    let row_iter = input.outer_iter().zip(scratch.chunks_mut(width)).enumerate();
    parallelism.maybe_par_bridge_try_for_each(row_iter, |(_row_id, (row, row_acc))| {
        for (tree_id, tree) in preset.trees.iter().enumerate() {
            let leaf_id = evaluate_tree(tree, row)?;
            route_leaf(model, tree, tree_id, leaf_id, row_acc, max_class)?;
        }
        Ok::<(), Error>(())
    })?;

    // Averaging happens before base scores are added.
    if model.average_tree_output {
        let counts = contribution_counts(model, max_class);
        for row_acc in scratch.chunks_mut(width) {
            for (cell, &count) in row_acc.iter_mut().zip(&counts) {
                if count > 0 {
                    *cell = *cell / I::from_f64(count as f64);
                }
            }
        }
    }

    for row_acc in scratch.chunks_mut(width) {
        for t in 0..num_target {
            for c in 0..model.num_class[t] as usize {
                row_acc[t * max_class + c] =
                    row_acc[t * max_class + c] + I::from_f64(model.base_scores[t * max_class + c]);
            }
        }
    }

    if let Some(postprocessor) = postprocessor {
        for row_acc in scratch.chunks_mut(width) {
            for t in 0..num_target {
                let classes = model.num_class[t] as usize;
                let row = &mut row_acc[t * max_class..t * max_class + classes];
                if postprocessor.is_rowwise() {
                    postprocessor.apply_row(model.sigmoid_alpha, row);
                } else {
                    for x in row.iter_mut() {
                        *x = postprocessor.apply_scalar(model.sigmoid_alpha, model.ratio_c, *x);
                    }
                }
            }
        }
    }

    if num_target == 1 {
        output.copy_from_slice(&scratch);
    } else {
        // [row][target][class] -> [target][row][class]
        for row_id in 0..num_row {
            for t in 0..num_target {
                for c in 0..max_class {
                    output[(t * num_row + row_id) * max_class + c] =
                        scratch[(row_id * num_target + t) * max_class + c];
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Leaf-id prediction
// =============================================================================

fn predict_leaf_id<I: MatchedElement>(
    preset: &ModelPreset<I, I>,
    input: ArrayView2<'_, I>,
    output: &mut [I],
    parallelism: Parallelism,
) -> Result<()> {
    let num_tree = preset.trees.len();
    if num_tree == 0 {
        return Ok(());
    }
    let row_iter = input.outer_iter().zip(output.chunks_mut(num_tree));
    parallelism.maybe_par_bridge_try_for_each(row_iter, |(row, out_row)| {
        for (tree_id, tree) in preset.trees.iter().enumerate() {
            let leaf_id = evaluate_tree(tree, row)?;
            out_row[tree_id] = I::from_f64(leaf_id as f64);
        }
        Ok::<(), Error>(())
    })
}

// =============================================================================
// Per-tree scores
// =============================================================================

fn predict_score_per_tree<I: MatchedElement>(
    model: &Model,
    preset: &ModelPreset<I, I>,
    input: ArrayView2<'_, I>,
    output: &mut [I],
    parallelism: Parallelism,
) -> Result<()> {
    let num_tree = preset.trees.len();
    let max_class = model.max_num_class() as usize;
    let shape = model.leaf_vector_shape;
    output.fill(I::zero());
    if num_tree == 0 {
        return Ok(());
    }

    let row_iter = input.outer_iter().zip(output.chunks_mut(num_tree * max_class));
    parallelism.maybe_par_bridge_try_for_each(row_iter, |(row, out_row)| {
        for (tree_id, tree) in preset.trees.iter().enumerate() {
            let leaf_id = evaluate_tree(tree, row)?;
            if tree.has_leaf_vector(leaf_id) {
                if shape[0] != 1 {
                    return Err(Error::Validation(
                        "per-tree scores require single-target leaf vectors".into(),
                    ));
                }
                let leaf = tree.leaf_vector(leaf_id);
                out_row[tree_id * max_class..tree_id * max_class + leaf.len()]
                    .copy_from_slice(leaf);
            } else {
                let class = model.class_id[tree_id].max(0) as usize;
                out_row[tree_id * max_class + class] = tree.leaf_value(leaf_id);
            }
        }
        Ok::<(), Error>(())
    })
}
