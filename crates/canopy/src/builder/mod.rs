//! Stateful model construction API.
//!
//! The builder drives tree construction through a small state machine and
//! rejects every malformed call sequence at the earliest possible call:
//!
//! ```text
//! ExpectTree --start_tree--> ExpectNode --start_node--> ExpectDetail
//! ExpectDetail --(leaf_scalar | leaf_vector | numerical_test |
//!                 categorical_test)--> NodeComplete
//! NodeComplete --end_node--> ExpectNode --end_tree--> ExpectTree
//! ExpectTree --commit_model--> ModelComplete
//! ```
//!
//! Node identifiers are caller-chosen keys (arbitrary, possibly sparse
//! nonnegative integers); children are recorded by key and rewritten to
//! dense internal ids when the tree ends. A builder instance must be used by
//! a single actor; parallel construction happens by building independent
//! models and [concatenating](crate::model::concatenate) them.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{MatchedElement, Model, Tree};
use crate::types::{Operator, TaskType, TypeInfo};

// =============================================================================
// Metadata
// =============================================================================

/// Ensemble-wide task metadata, validated at construction.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub num_feature: i32,
    pub task_type: TaskType,
    pub average_tree_output: bool,
    pub num_target: u32,
    pub num_class: Vec<u32>,
    pub leaf_vector_shape: [u32; 2],
}

impl Metadata {
    pub fn new(
        num_feature: i32,
        task_type: TaskType,
        average_tree_output: bool,
        num_target: u32,
        num_class: Vec<u32>,
        leaf_vector_shape: [u32; 2],
    ) -> Result<Self> {
        if num_target == 0 {
            return Err(Error::Validation("num_target must be at least 1".into()));
        }
        if num_class.len() != num_target as usize {
            return Err(Error::Validation(format!(
                "num_class must have length equal to num_target ({num_target}), got {}",
                num_class.len()
            )));
        }
        if num_class.iter().any(|&c| c == 0) {
            return Err(Error::Validation("all elements of num_class must be at least 1".into()));
        }
        if leaf_vector_shape[0] != 1 && leaf_vector_shape[0] != num_target {
            return Err(Error::Validation(format!(
                "leaf_vector_shape[0] must be 1 or num_target ({num_target}), got {}",
                leaf_vector_shape[0]
            )));
        }
        let max_num_class = num_class.iter().copied().max().unwrap_or(1);
        if leaf_vector_shape[1] != 1 && leaf_vector_shape[1] != max_num_class {
            return Err(Error::Validation(format!(
                "leaf_vector_shape[1] must be 1 or max_num_class ({max_num_class}), got {}",
                leaf_vector_shape[1]
            )));
        }
        Ok(Self {
            num_feature,
            task_type,
            average_tree_output,
            num_target,
            num_class,
            leaf_vector_shape,
        })
    }

    fn max_num_class(&self) -> u32 {
        self.num_class.iter().copied().max().unwrap_or(1)
    }
}

// =============================================================================
// TreeAnnotation
// =============================================================================

/// Per-tree output routing: which `(target, class)` each tree contributes to.
#[derive(Debug, Clone)]
pub struct TreeAnnotation {
    pub num_tree: u32,
    pub target_id: Vec<i32>,
    pub class_id: Vec<i32>,
}

impl TreeAnnotation {
    pub fn new(num_tree: u32, target_id: Vec<i32>, class_id: Vec<i32>) -> Result<Self> {
        if target_id.len() != num_tree as usize {
            return Err(Error::Validation(format!(
                "target_id must have length equal to num_tree ({num_tree}), got {}",
                target_id.len()
            )));
        }
        if class_id.len() != num_tree as usize {
            return Err(Error::Validation(format!(
                "class_id must have length equal to num_tree ({num_tree}), got {}",
                class_id.len()
            )));
        }
        Ok(Self { num_tree, target_id, class_id })
    }
}

// =============================================================================
// PostProcessorFunc
// =============================================================================

/// Post-processor selection, with an optional JSON configuration blob.
///
/// Recognized configuration keys: `sigmoid_alpha` (for `"sigmoid"` and
/// `"multiclass_ova"`) and `ratio_c` (for `"exponential_standard_ratio"`).
/// Unknown keys are ignored; malformed JSON is a fatal error.
#[derive(Debug, Clone)]
pub struct PostProcessorFunc {
    pub name: String,
    pub config_json: Option<String>,
}

impl PostProcessorFunc {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), config_json: None }
    }

    pub fn with_config(name: impl Into<String>, config_json: impl Into<String>) -> Self {
        Self { name: name.into(), config_json: Some(config_json.into()) }
    }

    /// Resolve `(sigmoid_alpha, ratio_c)` from the configuration.
    fn resolve_params(&self) -> Result<(f32, f32)> {
        let mut sigmoid_alpha = 1.0f32;
        let mut ratio_c = 1.0f32;
        if let Some(json) = &self.config_json {
            let config: serde_json::Value = serde_json::from_str(json)
                .map_err(|e| Error::Parse(format!("bad post-processor config: {e}")))?;
            if self.name == "sigmoid" || self.name == "multiclass_ova" {
                if let Some(alpha) = config.get("sigmoid_alpha").and_then(|v| v.as_f64()) {
                    sigmoid_alpha = alpha as f32;
                }
            }
            if self.name == "exponential_standard_ratio" {
                if let Some(c) = config.get("ratio_c").and_then(|v| v.as_f64()) {
                    ratio_c = c as f32;
                }
            }
        }
        Ok((sigmoid_alpha, ratio_c))
    }
}

// =============================================================================
// Leaf output values
// =============================================================================

/// Typed leaf-vector payload handed to [`ModelBuilder::leaf_vector`].
#[derive(Debug, Clone)]
pub enum LeafValues {
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl LeafValues {
    fn len(&self) -> usize {
        match self {
            LeafValues::Float32(v) => v.len(),
            LeafValues::Float64(v) => v.len(),
        }
    }
}

impl From<Vec<f32>> for LeafValues {
    fn from(values: Vec<f32>) -> Self {
        LeafValues::Float32(values)
    }
}

impl From<Vec<f64>> for LeafValues {
    fn from(values: Vec<f64>) -> Self {
        LeafValues::Float64(values)
    }
}

/// Element types the builder can construct models for.
trait BuilderElement: MatchedElement {
    fn take_leaf_values(values: LeafValues) -> Result<Vec<Self>>;
}

impl BuilderElement for f32 {
    fn take_leaf_values(values: LeafValues) -> Result<Vec<f32>> {
        match values {
            LeafValues::Float32(v) => Ok(v),
            LeafValues::Float64(_) => {
                Err(Error::TypeMismatch { expected: TypeInfo::Float32, got: TypeInfo::Float64 })
            }
        }
    }
}

impl BuilderElement for f64 {
    fn take_leaf_values(values: LeafValues) -> Result<Vec<f64>> {
        match values {
            LeafValues::Float64(v) => Ok(v),
            LeafValues::Float32(_) => {
                Err(Error::TypeMismatch { expected: TypeInfo::Float64, got: TypeInfo::Float32 })
            }
        }
    }
}

// =============================================================================
// State machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    ExpectTree,
    ExpectNode,
    ExpectDetail,
    NodeComplete,
    ModelComplete,
}

impl BuilderState {
    fn as_str(self) -> &'static str {
        match self {
            BuilderState::ExpectTree => "ExpectTree",
            BuilderState::ExpectNode => "ExpectNode",
            BuilderState::ExpectDetail => "ExpectDetail",
            BuilderState::NodeComplete => "NodeComplete",
            BuilderState::ModelComplete => "ModelComplete",
        }
    }
}

// =============================================================================
// ModelBuilder
// =============================================================================

/// Builder for one [`Model`]; see the module docs for the call protocol.
pub struct ModelBuilder {
    inner: BuilderInner,
}

enum BuilderInner {
    Float32(BuilderImpl<f32>),
    Float64(BuilderImpl<f64>),
}

impl ModelBuilder {
    /// Start building a model for the given type pair.
    ///
    /// Only the matched pairs `(float32, float32)` and `(float64, float64)`
    /// are constructible.
    pub fn new(
        threshold_type: TypeInfo,
        leaf_output_type: TypeInfo,
        metadata: &Metadata,
        tree_annotation: &TreeAnnotation,
        postprocessor: &PostProcessorFunc,
        base_scores: Vec<f64>,
        attributes: Option<String>,
    ) -> Result<Self> {
        if leaf_output_type != threshold_type {
            return Err(Error::TypeMismatch { expected: threshold_type, got: leaf_output_type });
        }
        let inner = match threshold_type {
            TypeInfo::Float32 => BuilderInner::Float32(BuilderImpl::new(
                metadata,
                tree_annotation,
                postprocessor,
                base_scores,
                attributes,
            )?),
            TypeInfo::Float64 => BuilderInner::Float64(BuilderImpl::new(
                metadata,
                tree_annotation,
                postprocessor,
                base_scores,
                attributes,
            )?),
            other => {
                return Err(Error::Validation(format!(
                    "threshold type must be float32 or float64, got {other}"
                )))
            }
        };
        Ok(Self { inner })
    }

    pub fn start_tree(&mut self) -> Result<()> {
        match &mut self.inner {
            BuilderInner::Float32(b) => b.start_tree(),
            BuilderInner::Float64(b) => b.start_tree(),
        }
    }

    pub fn end_tree(&mut self) -> Result<()> {
        match &mut self.inner {
            BuilderInner::Float32(b) => b.end_tree(),
            BuilderInner::Float64(b) => b.end_tree(),
        }
    }

    /// Begin a node identified by a caller-chosen nonnegative key.
    pub fn start_node(&mut self, node_key: i32) -> Result<()> {
        match &mut self.inner {
            BuilderInner::Float32(b) => b.start_node(node_key),
            BuilderInner::Float64(b) => b.start_node(node_key),
        }
    }

    pub fn end_node(&mut self) -> Result<()> {
        match &mut self.inner {
            BuilderInner::Float32(b) => b.end_node(),
            BuilderInner::Float64(b) => b.end_node(),
        }
    }

    /// Declare the current node as a numerical test.
    pub fn numerical_test(
        &mut self,
        split_index: u32,
        threshold: f64,
        default_left: bool,
        op: Operator,
        left_child_key: i32,
        right_child_key: i32,
    ) -> Result<()> {
        match &mut self.inner {
            BuilderInner::Float32(b) => {
                b.numerical_test(split_index, threshold, default_left, op, left_child_key, right_child_key)
            }
            BuilderInner::Float64(b) => {
                b.numerical_test(split_index, threshold, default_left, op, left_child_key, right_child_key)
            }
        }
    }

    /// Declare the current node as a categorical test.
    pub fn categorical_test(
        &mut self,
        split_index: u32,
        default_left: bool,
        category_list: &[u32],
        category_list_right_child: bool,
        left_child_key: i32,
        right_child_key: i32,
    ) -> Result<()> {
        match &mut self.inner {
            BuilderInner::Float32(b) => b.categorical_test(
                split_index,
                default_left,
                category_list,
                category_list_right_child,
                left_child_key,
                right_child_key,
            ),
            BuilderInner::Float64(b) => b.categorical_test(
                split_index,
                default_left,
                category_list,
                category_list_right_child,
                left_child_key,
                right_child_key,
            ),
        }
    }

    /// Declare the current node as a leaf with a scalar output.
    pub fn leaf_scalar(&mut self, leaf_value: f64) -> Result<()> {
        match &mut self.inner {
            BuilderInner::Float32(b) => b.leaf_scalar(leaf_value),
            BuilderInner::Float64(b) => b.leaf_scalar(leaf_value),
        }
    }

    /// Declare the current node as a leaf with a vector output.
    ///
    /// The element type must match the model's leaf output type and the
    /// length must equal `leaf_vector_shape[0] * leaf_vector_shape[1]`.
    pub fn leaf_vector(&mut self, values: impl Into<LeafValues>) -> Result<()> {
        let values = values.into();
        match &mut self.inner {
            BuilderInner::Float32(b) => b.leaf_vector(values),
            BuilderInner::Float64(b) => b.leaf_vector(values),
        }
    }

    pub fn gain(&mut self, gain: f64) -> Result<()> {
        match &mut self.inner {
            BuilderInner::Float32(b) => b.stat("gain", |t, nid| t.set_gain(nid, gain)),
            BuilderInner::Float64(b) => b.stat("gain", |t, nid| t.set_gain(nid, gain)),
        }
    }

    pub fn data_count(&mut self, data_count: u64) -> Result<()> {
        match &mut self.inner {
            BuilderInner::Float32(b) => b.stat("data_count", |t, nid| t.set_data_count(nid, data_count)),
            BuilderInner::Float64(b) => b.stat("data_count", |t, nid| t.set_data_count(nid, data_count)),
        }
    }

    pub fn sum_hess(&mut self, sum_hess: f64) -> Result<()> {
        match &mut self.inner {
            BuilderInner::Float32(b) => b.stat("sum_hess", |t, nid| t.set_sum_hess(nid, sum_hess)),
            BuilderInner::Float64(b) => b.stat("sum_hess", |t, nid| t.set_sum_hess(nid, sum_hess)),
        }
    }

    /// Finish construction and yield the committed, immutable model.
    pub fn commit_model(self) -> Result<Model> {
        match self.inner {
            BuilderInner::Float32(b) => b.commit_model(),
            BuilderInner::Float64(b) => b.commit_model(),
        }
    }
}

// =============================================================================
// Typed implementation
// =============================================================================

struct BuilderImpl<T: BuilderElement> {
    expected_num_tree: u32,
    model: Model,
    current_tree: Tree<T, T>,
    /// Caller-chosen key -> internal dense id, per tree.
    node_id_map: HashMap<i32, i32>,
    current_node_id: i32,
    current_node_key: i32,
    state: BuilderState,
}

impl<T: BuilderElement> BuilderImpl<T> {
    fn new(
        metadata: &Metadata,
        tree_annotation: &TreeAnnotation,
        postprocessor: &PostProcessorFunc,
        base_scores: Vec<f64>,
        attributes: Option<String>,
    ) -> Result<Self> {
        let mut model = Model::new(T::TYPE_INFO, T::TYPE_INFO)?;

        model.num_feature = metadata.num_feature;
        model.task_type = metadata.task_type;
        model.average_tree_output = metadata.average_tree_output;
        model.num_target = metadata.num_target;
        model.num_class = metadata.num_class.clone();
        model.leaf_vector_shape = metadata.leaf_vector_shape;

        let num_target = metadata.num_target as i32;
        for (i, &target) in tree_annotation.target_id.iter().enumerate() {
            if target < -1 || target >= num_target {
                return Err(Error::Validation(format!(
                    "target_id[{i}] = {target} out of range (num_target = {num_target})"
                )));
            }
        }
        for (i, &class) in tree_annotation.class_id.iter().enumerate() {
            let target = tree_annotation.target_id[i];
            let bound = if target >= 0 {
                metadata.num_class[target as usize]
            } else {
                metadata.max_num_class()
            } as i32;
            if class < -1 || class >= bound {
                return Err(Error::Validation(format!(
                    "class_id[{i}] = {class} out of range (num_class = {bound})"
                )));
            }
        }
        model.target_id = tree_annotation.target_id.clone();
        model.class_id = tree_annotation.class_id.clone();

        model.postprocessor = postprocessor.name.clone();
        let (sigmoid_alpha, ratio_c) = postprocessor.resolve_params()?;
        model.sigmoid_alpha = sigmoid_alpha;
        model.ratio_c = ratio_c;

        let expected_scores = metadata.num_target as usize * metadata.max_num_class() as usize;
        if base_scores.len() != expected_scores {
            return Err(Error::Validation(format!(
                "base_scores must have length num_target * max_num_class ({expected_scores}), \
                 got {}",
                base_scores.len()
            )));
        }
        model.base_scores = base_scores;
        if let Some(attributes) = attributes {
            model.attributes = attributes;
        }

        Ok(Self {
            expected_num_tree: tree_annotation.num_tree,
            model,
            current_tree: Tree::new(),
            node_id_map: HashMap::new(),
            current_node_id: -1,
            current_node_key: -1,
            state: BuilderState::ExpectTree,
        })
    }

    fn check_state(&self, call: &'static str, expected: BuilderState) -> Result<()> {
        if self.state != expected {
            return Err(Error::BuilderState { call, state: self.state.as_str() });
        }
        Ok(())
    }

    fn start_tree(&mut self) -> Result<()> {
        self.check_state("start_tree", BuilderState::ExpectTree)?;
        self.current_tree = Tree::new();
        self.node_id_map.clear();
        self.state = BuilderState::ExpectNode;
        Ok(())
    }

    fn end_tree(&mut self) -> Result<()> {
        self.check_state("end_tree", BuilderState::ExpectNode)?;
        if self.current_tree.num_nodes() == 0 {
            return Err(Error::Structural("tree must contain at least one node".into()));
        }

        // Rewrite recorded child keys to internal dense ids.
        for nid in 0..self.current_tree.num_nodes() {
            if self.current_tree.is_leaf(nid) {
                continue;
            }
            let left_key = self.current_tree.left_child(nid);
            let right_key = self.current_tree.right_child(nid);
            let left = *self.node_id_map.get(&left_key).ok_or_else(|| {
                Error::Structural(format!(
                    "node {nid} references undefined node key {left_key}"
                ))
            })?;
            let right = *self.node_id_map.get(&right_key).ok_or_else(|| {
                Error::Structural(format!(
                    "node {nid} references undefined node key {right_key}"
                ))
            })?;
            self.current_tree.set_children(nid, left, right);
        }

        // Rejects orphaned nodes, shared parents and cycles.
        self.current_tree.validate()?;

        let tree = std::mem::take(&mut self.current_tree);
        let preset = T::preset_of_mut(&mut self.model)
            .ok_or_else(|| Error::TypeMismatch { expected: T::TYPE_INFO, got: TypeInfo::Invalid })?;
        preset.trees.push(tree);

        self.node_id_map.clear();
        self.state = BuilderState::ExpectTree;
        Ok(())
    }

    fn start_node(&mut self, node_key: i32) -> Result<()> {
        self.check_state("start_node", BuilderState::ExpectNode)?;
        if node_key < 0 {
            return Err(Error::Validation(format!("node key must be nonnegative, got {node_key}")));
        }
        if self.node_id_map.contains_key(&node_key) {
            return Err(Error::Validation(format!("node key {node_key} used twice in one tree")));
        }
        let node_id = self.current_tree.alloc_node();
        self.node_id_map.insert(node_key, node_id);
        self.current_node_id = node_id;
        self.current_node_key = node_key;
        self.state = BuilderState::ExpectDetail;
        Ok(())
    }

    fn end_node(&mut self) -> Result<()> {
        self.check_state("end_node", BuilderState::NodeComplete)?;
        self.state = BuilderState::ExpectNode;
        Ok(())
    }

    fn check_child_keys(&self, left_child_key: i32, right_child_key: i32) -> Result<()> {
        if left_child_key < 0 || right_child_key < 0 {
            return Err(Error::Validation(format!(
                "child keys must be nonnegative, got ({left_child_key}, {right_child_key})"
            )));
        }
        if left_child_key == right_child_key {
            return Err(Error::Validation(format!(
                "left and right child keys must differ, got {left_child_key} twice"
            )));
        }
        if left_child_key == self.current_node_key || right_child_key == self.current_node_key {
            return Err(Error::Validation(format!(
                "node key {} cannot be its own child",
                self.current_node_key
            )));
        }
        Ok(())
    }

    fn numerical_test(
        &mut self,
        split_index: u32,
        threshold: f64,
        default_left: bool,
        op: Operator,
        left_child_key: i32,
        right_child_key: i32,
    ) -> Result<()> {
        self.check_state("numerical_test", BuilderState::ExpectDetail)?;
        self.check_child_keys(left_child_key, right_child_key)?;
        self.current_tree.set_numerical_split(
            self.current_node_id,
            split_index,
            T::from_f64(threshold),
            default_left,
            op,
        )?;
        // Children are recorded as keys here and translated in end_tree.
        self.current_tree.set_children(self.current_node_id, left_child_key, right_child_key);
        self.state = BuilderState::NodeComplete;
        Ok(())
    }

    fn categorical_test(
        &mut self,
        split_index: u32,
        default_left: bool,
        category_list: &[u32],
        category_list_right_child: bool,
        left_child_key: i32,
        right_child_key: i32,
    ) -> Result<()> {
        self.check_state("categorical_test", BuilderState::ExpectDetail)?;
        self.check_child_keys(left_child_key, right_child_key)?;
        self.current_tree.set_categorical_split(
            self.current_node_id,
            split_index,
            default_left,
            category_list,
            category_list_right_child,
        )?;
        self.current_tree.set_children(self.current_node_id, left_child_key, right_child_key);
        self.state = BuilderState::NodeComplete;
        Ok(())
    }

    fn leaf_scalar(&mut self, leaf_value: f64) -> Result<()> {
        self.check_state("leaf_scalar", BuilderState::ExpectDetail)?;
        if self.model.leaf_vector_shape != [1, 1] {
            return Err(Error::Validation(format!(
                "scalar leaves require leaf_vector_shape [1, 1], model has {:?}",
                self.model.leaf_vector_shape
            )));
        }
        self.current_tree.set_leaf(self.current_node_id, T::from_f64(leaf_value));
        self.state = BuilderState::NodeComplete;
        Ok(())
    }

    fn leaf_vector(&mut self, values: LeafValues) -> Result<()> {
        self.check_state("leaf_vector", BuilderState::ExpectDetail)?;
        let shape = self.model.leaf_vector_shape;
        let expected_len = shape[0] as usize * shape[1] as usize;
        if values.len() != expected_len {
            return Err(Error::Validation(format!(
                "leaf vector must have length leaf_vector_shape[0] * leaf_vector_shape[1] \
                 ({expected_len}), got {}",
                values.len()
            )));
        }
        let values = T::take_leaf_values(values)?;
        self.current_tree.set_leaf_vector(self.current_node_id, &values);
        self.state = BuilderState::NodeComplete;
        Ok(())
    }

    /// Optional stats may arrive while the node detail is pending or right
    /// after it, but not once the node has ended.
    fn stat(
        &mut self,
        call: &'static str,
        apply: impl FnOnce(&mut Tree<T, T>, i32),
    ) -> Result<()> {
        if self.state != BuilderState::ExpectDetail && self.state != BuilderState::NodeComplete {
            return Err(Error::BuilderState { call, state: self.state.as_str() });
        }
        apply(&mut self.current_tree, self.current_node_id);
        Ok(())
    }

    fn commit_model(self) -> Result<Model> {
        self.check_state("commit_model", BuilderState::ExpectTree)?;
        let num_tree = self.model.num_tree();
        if num_tree != self.expected_num_tree as usize {
            return Err(Error::Validation(format!(
                "expected {} trees but got {num_tree}",
                self.expected_num_tree
            )));
        }
        // Consuming the builder is the transition to ModelComplete: no
        // further calls are possible on a moved-out value.
        Ok(self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_builder() -> ModelBuilder {
        let metadata =
            Metadata::new(1, TaskType::BinaryClf, false, 1, vec![1], [1, 1]).unwrap();
        let annotation = TreeAnnotation::new(1, vec![0], vec![0]).unwrap();
        ModelBuilder::new(
            TypeInfo::Float32,
            TypeInfo::Float32,
            &metadata,
            &annotation,
            &PostProcessorFunc::new("sigmoid"),
            vec![0.0],
            None,
        )
        .unwrap()
    }

    #[test]
    fn metadata_validation() {
        assert!(Metadata::new(1, TaskType::Regressor, false, 0, vec![], [1, 1]).is_err());
        assert!(Metadata::new(1, TaskType::Regressor, false, 2, vec![1], [1, 1]).is_err());
        assert!(Metadata::new(1, TaskType::MultiClf, false, 1, vec![0], [1, 1]).is_err());
        assert!(Metadata::new(1, TaskType::MultiClf, false, 1, vec![3], [2, 1]).is_err());
        assert!(Metadata::new(1, TaskType::MultiClf, false, 1, vec![3], [1, 2]).is_err());
        assert!(Metadata::new(1, TaskType::MultiClf, false, 1, vec![3], [1, 3]).is_ok());
    }

    #[test]
    fn annotation_validation() {
        assert!(TreeAnnotation::new(2, vec![0], vec![0, 0]).is_err());
        assert!(TreeAnnotation::new(2, vec![0, 0], vec![0]).is_err());
        assert!(TreeAnnotation::new(2, vec![0, 0], vec![0, 0]).is_ok());
    }

    #[test]
    fn builder_rejects_mismatched_types() {
        let metadata =
            Metadata::new(1, TaskType::Regressor, false, 1, vec![1], [1, 1]).unwrap();
        let annotation = TreeAnnotation::new(1, vec![0], vec![0]).unwrap();
        let result = ModelBuilder::new(
            TypeInfo::Float32,
            TypeInfo::Float64,
            &metadata,
            &annotation,
            &PostProcessorFunc::new("identity"),
            vec![0.0],
            None,
        );
        assert!(matches!(result, Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn builder_rejects_out_of_range_annotation() {
        let metadata =
            Metadata::new(1, TaskType::MultiClf, false, 1, vec![3], [1, 1]).unwrap();
        let annotation = TreeAnnotation::new(1, vec![1], vec![0]).unwrap();
        let result = ModelBuilder::new(
            TypeInfo::Float32,
            TypeInfo::Float32,
            &metadata,
            &annotation,
            &PostProcessorFunc::new("softmax"),
            vec![0.0, 0.0, 0.0],
            None,
        );
        assert!(result.is_err());

        let annotation = TreeAnnotation::new(1, vec![0], vec![3]).unwrap();
        let result = ModelBuilder::new(
            TypeInfo::Float32,
            TypeInfo::Float32,
            &metadata,
            &annotation,
            &PostProcessorFunc::new("softmax"),
            vec![0.0, 0.0, 0.0],
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_wrong_base_score_len() {
        let metadata =
            Metadata::new(1, TaskType::MultiClf, false, 1, vec![3], [1, 1]).unwrap();
        let annotation = TreeAnnotation::new(1, vec![0], vec![0]).unwrap();
        let result = ModelBuilder::new(
            TypeInfo::Float32,
            TypeInfo::Float32,
            &metadata,
            &annotation,
            &PostProcessorFunc::new("softmax"),
            vec![0.0],
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn postprocessor_config_parsing() {
        let func = PostProcessorFunc::with_config("sigmoid", r#"{"sigmoid_alpha": 2.5}"#);
        assert_eq!(func.resolve_params().unwrap(), (2.5, 1.0));

        let func =
            PostProcessorFunc::with_config("exponential_standard_ratio", r#"{"ratio_c": 0.5}"#);
        assert_eq!(func.resolve_params().unwrap(), (1.0, 0.5));

        // Unknown keys are ignored.
        let func = PostProcessorFunc::with_config("sigmoid", r#"{"unknown": 1}"#);
        assert_eq!(func.resolve_params().unwrap(), (1.0, 1.0));

        // Config for a different post-processor is ignored.
        let func = PostProcessorFunc::with_config("identity", r#"{"sigmoid_alpha": 2.5}"#);
        assert_eq!(func.resolve_params().unwrap(), (1.0, 1.0));

        let func = PostProcessorFunc::with_config("sigmoid", "{not json");
        assert!(matches!(func.resolve_params(), Err(Error::Parse(_))));
    }

    #[test]
    fn duplicate_node_key_rejected() {
        let mut builder = scalar_builder();
        builder.start_tree().unwrap();
        builder.start_node(0).unwrap();
        builder.leaf_scalar(0.0).unwrap();
        builder.end_node().unwrap();
        assert!(builder.start_node(0).is_err());
    }

    #[test]
    fn negative_node_key_rejected() {
        let mut builder = scalar_builder();
        builder.start_tree().unwrap();
        assert!(builder.start_node(-1).is_err());
    }
}
