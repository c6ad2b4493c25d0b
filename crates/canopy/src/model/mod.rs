//! The tree-ensemble model: typed tree storage plus ensemble-wide metadata.
//!
//! A [`Model`] owns a [`ModelVariant`], a closed tagged union over the four
//! legal `(threshold, leaf output)` type pairs. Generic code is written once
//! per pair; dispatch is a match over the tag.
//!
//! A model is mutated only by the builder during construction or by the
//! deserializer during loading. Once committed it is read-only; shared
//! references are safe for concurrent prediction, dumping and serialization.

pub mod json;
pub mod tree;

pub use tree::Tree;

use crate::error::{Error, Result};
use crate::types::{LeafElement, TaskType, ThresholdElement, TypeInfo};

/// Version of the exchange format written by this crate.
pub const VERSION_MAJOR: i32 = 4;
pub const VERSION_MINOR: i32 = 3;
pub const VERSION_PATCH: i32 = 0;

/// Version triple recorded in a model object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

/// Typed portion of the model: the member trees.
#[derive(Debug, Clone, Default)]
pub struct ModelPreset<T, L> {
    pub trees: Vec<Tree<T, L>>,
}

impl<T: ThresholdElement, L: LeafElement> ModelPreset<T, L> {
    pub fn threshold_type(&self) -> TypeInfo {
        T::TYPE_INFO
    }

    pub fn leaf_output_type(&self) -> TypeInfo {
        L::TYPE_INFO
    }

    pub fn num_tree(&self) -> usize {
        self.trees.len()
    }

    /// Truncate the ensemble to the first `limit` trees.
    pub fn set_tree_limit(&mut self, limit: usize) {
        self.trees.truncate(limit);
    }
}

/// Closed union over the legal `(threshold, leaf output)` type pairs.
///
/// The `u32`-leaf pairs exist for leaf-id interchange; only the matched
/// float pairs support builder construction and prediction.
#[derive(Debug, Clone)]
pub enum ModelVariant {
    Float32(ModelPreset<f32, f32>),
    Float32LeafUInt32(ModelPreset<f32, u32>),
    Float64(ModelPreset<f64, f64>),
    Float64LeafUInt32(ModelPreset<f64, u32>),
}

impl ModelVariant {
    /// Realize the variant for a `(threshold, leaf output)` pair.
    pub fn from_types(threshold_type: TypeInfo, leaf_output_type: TypeInfo) -> Result<Self> {
        match (threshold_type, leaf_output_type) {
            (TypeInfo::Float32, TypeInfo::Float32) => Ok(ModelVariant::Float32(Default::default())),
            (TypeInfo::Float32, TypeInfo::UInt32) => {
                Ok(ModelVariant::Float32LeafUInt32(Default::default()))
            }
            (TypeInfo::Float64, TypeInfo::Float64) => Ok(ModelVariant::Float64(Default::default())),
            (TypeInfo::Float64, TypeInfo::UInt32) => {
                Ok(ModelVariant::Float64LeafUInt32(Default::default()))
            }
            _ => Err(Error::Validation(format!(
                "unsupported type combination: threshold={threshold_type}, \
                 leaf_output={leaf_output_type}"
            ))),
        }
    }

    pub fn threshold_type(&self) -> TypeInfo {
        match self {
            ModelVariant::Float32(_) | ModelVariant::Float32LeafUInt32(_) => TypeInfo::Float32,
            ModelVariant::Float64(_) | ModelVariant::Float64LeafUInt32(_) => TypeInfo::Float64,
        }
    }

    pub fn leaf_output_type(&self) -> TypeInfo {
        match self {
            ModelVariant::Float32(_) => TypeInfo::Float32,
            ModelVariant::Float64(_) => TypeInfo::Float64,
            ModelVariant::Float32LeafUInt32(_) | ModelVariant::Float64LeafUInt32(_) => {
                TypeInfo::UInt32
            }
        }
    }

    pub fn num_tree(&self) -> usize {
        match self {
            ModelVariant::Float32(p) => p.num_tree(),
            ModelVariant::Float32LeafUInt32(p) => p.num_tree(),
            ModelVariant::Float64(p) => p.num_tree(),
            ModelVariant::Float64LeafUInt32(p) => p.num_tree(),
        }
    }

    fn set_tree_limit(&mut self, limit: usize) {
        match self {
            ModelVariant::Float32(p) => p.set_tree_limit(limit),
            ModelVariant::Float32LeafUInt32(p) => p.set_tree_limit(limit),
            ModelVariant::Float64(p) => p.set_tree_limit(limit),
            ModelVariant::Float64LeafUInt32(p) => p.set_tree_limit(limit),
        }
    }
}

/// Element types that form a matched `(threshold, leaf output)` pair and can
/// therefore access a typed [`ModelPreset`] inside a [`Model`].
///
/// Implemented for `f32` and `f64` only; the mismatched `u32`-leaf variants
/// have no matched element type.
pub trait MatchedElement: ThresholdElement {
    fn preset_of(model: &Model) -> Option<&ModelPreset<Self, Self>>;
    fn preset_of_mut(model: &mut Model) -> Option<&mut ModelPreset<Self, Self>>;
}

impl MatchedElement for f32 {
    fn preset_of(model: &Model) -> Option<&ModelPreset<f32, f32>> {
        match &model.variant {
            ModelVariant::Float32(p) => Some(p),
            _ => None,
        }
    }

    fn preset_of_mut(model: &mut Model) -> Option<&mut ModelPreset<f32, f32>> {
        match &mut model.variant {
            ModelVariant::Float32(p) => Some(p),
            _ => None,
        }
    }
}

impl MatchedElement for f64 {
    fn preset_of(model: &Model) -> Option<&ModelPreset<f64, f64>> {
        match &model.variant {
            ModelVariant::Float64(p) => Some(p),
            _ => None,
        }
    }

    fn preset_of_mut(model: &mut Model) -> Option<&mut ModelPreset<f64, f64>> {
        match &mut model.variant {
            ModelVariant::Float64(p) => Some(p),
            _ => None,
        }
    }
}

/// A committed tree-ensemble model.
#[derive(Debug, Clone)]
pub struct Model {
    pub(crate) variant: ModelVariant,

    /// Number of features; all split indices lie in `0..num_feature`.
    pub num_feature: i32,
    pub task_type: TaskType,
    /// Whether accumulated tree outputs are averaged rather than summed.
    pub average_tree_output: bool,

    pub num_target: u32,
    /// Per-target class count; length equals `num_target`.
    pub num_class: Vec<u32>,
    /// Shape of leaf vectors: `[1 | num_target, 1 | max_num_class]`.
    pub leaf_vector_shape: [u32; 2],
    /// Per-tree target routing; `-1` means "all targets".
    pub target_id: Vec<i32>,
    /// Per-tree class routing; `-1` means "all classes".
    pub class_id: Vec<i32>,

    /// Name of the post-processing function applied by default prediction.
    pub postprocessor: String,
    pub sigmoid_alpha: f32,
    pub ratio_c: f32,
    /// Base scores laid out row-major `[target][class]`.
    pub base_scores: Vec<f64>,
    /// Free-form JSON attributes, opaque to the core.
    pub attributes: String,

    pub(crate) major_ver: i32,
    pub(crate) minor_ver: i32,
    pub(crate) patch_ver: i32,
}

impl Model {
    /// Create an empty model for the given type pair, stamped with the
    /// current format version.
    pub fn new(threshold_type: TypeInfo, leaf_output_type: TypeInfo) -> Result<Self> {
        Ok(Self {
            variant: ModelVariant::from_types(threshold_type, leaf_output_type)?,
            num_feature: 0,
            task_type: TaskType::Regressor,
            average_tree_output: false,
            num_target: 1,
            num_class: vec![1],
            leaf_vector_shape: [1, 1],
            target_id: Vec::new(),
            class_id: Vec::new(),
            postprocessor: "identity".to_string(),
            sigmoid_alpha: 1.0,
            ratio_c: 1.0,
            base_scores: vec![0.0],
            attributes: String::new(),
            major_ver: VERSION_MAJOR,
            minor_ver: VERSION_MINOR,
            patch_ver: VERSION_PATCH,
        })
    }

    #[inline]
    pub fn variant(&self) -> &ModelVariant {
        &self.variant
    }

    #[inline]
    pub fn threshold_type(&self) -> TypeInfo {
        self.variant.threshold_type()
    }

    #[inline]
    pub fn leaf_output_type(&self) -> TypeInfo {
        self.variant.leaf_output_type()
    }

    #[inline]
    pub fn num_tree(&self) -> usize {
        self.variant.num_tree()
    }

    /// Truncate the ensemble to the first `limit` trees.
    ///
    /// Used by front-end loaders; the per-tree routing arrays are truncated
    /// to match.
    pub fn set_tree_limit(&mut self, limit: usize) {
        self.variant.set_tree_limit(limit);
        self.target_id.truncate(limit);
        self.class_id.truncate(limit);
    }

    /// Version of the crate that produced this model object.
    pub fn version(&self) -> Version {
        Version { major: self.major_ver, minor: self.minor_ver, patch: self.patch_ver }
    }

    /// Largest class count across targets.
    pub(crate) fn max_num_class(&self) -> u32 {
        self.num_class.iter().copied().max().unwrap_or(1)
    }
}

/// Concatenate models into one by appending their trees in order.
///
/// All inputs must agree on the type pair and on every piece of ensemble
/// metadata; the first model's metadata is carried over.
pub fn concatenate(models: &[&Model]) -> Result<Model> {
    let first = models
        .first()
        .ok_or_else(|| Error::Validation("cannot concatenate an empty model list".into()))?;

    for (i, m) in models.iter().enumerate().skip(1) {
        if m.threshold_type() != first.threshold_type()
            || m.leaf_output_type() != first.leaf_output_type()
        {
            return Err(Error::Validation(format!(
                "model {i} has type pair ({}, {}), expected ({}, {})",
                m.threshold_type(),
                m.leaf_output_type(),
                first.threshold_type(),
                first.leaf_output_type()
            )));
        }
        if m.num_feature != first.num_feature
            || m.task_type != first.task_type
            || m.average_tree_output != first.average_tree_output
            || m.num_target != first.num_target
            || m.num_class != first.num_class
            || m.leaf_vector_shape != first.leaf_vector_shape
        {
            return Err(Error::Validation(format!(
                "model {i} has task metadata incompatible with the first model"
            )));
        }
        if m.postprocessor != first.postprocessor
            || m.sigmoid_alpha != first.sigmoid_alpha
            || m.ratio_c != first.ratio_c
            || m.base_scores != first.base_scores
        {
            return Err(Error::Validation(format!(
                "model {i} has a post-processing setup incompatible with the first model"
            )));
        }
    }

    let mut out = (*first).clone();
    out.target_id.clear();
    out.class_id.clear();

    match &mut out.variant {
        ModelVariant::Float32(p) => p.trees.clear(),
        ModelVariant::Float32LeafUInt32(p) => p.trees.clear(),
        ModelVariant::Float64(p) => p.trees.clear(),
        ModelVariant::Float64LeafUInt32(p) => p.trees.clear(),
    }

    for m in models {
        out.target_id.extend_from_slice(&m.target_id);
        out.class_id.extend_from_slice(&m.class_id);
        match (&mut out.variant, &m.variant) {
            (ModelVariant::Float32(dst), ModelVariant::Float32(src)) => {
                dst.trees.extend(src.trees.iter().cloned());
            }
            (ModelVariant::Float32LeafUInt32(dst), ModelVariant::Float32LeafUInt32(src)) => {
                dst.trees.extend(src.trees.iter().cloned());
            }
            (ModelVariant::Float64(dst), ModelVariant::Float64(src)) => {
                dst.trees.extend(src.trees.iter().cloned());
            }
            (ModelVariant::Float64LeafUInt32(dst), ModelVariant::Float64LeafUInt32(src)) => {
                dst.trees.extend(src.trees.iter().cloned());
            }
            _ => unreachable!("type pairs verified above"),
        }
    }

    Ok(out)
}
