//! Versioned binary serialization of models.
//!
//! One logical field sequence is shared by two transports: a framed buffer
//! ([`Frame`]) suitable for zero-copy interchange, and a length-prefixed byte
//! stream for persistence. The sequence reserves three extension slots
//! (per model, per tree, per node) of self-describing optional fields so
//! that older readers can skip additions by count.
//!
//! Version compatibility: readers accept same-major input plus the 3.9
//! bridge; a newer minor version logs a warning and skips unknown optional
//! fields; any other major version is rejected.

pub mod frame;
pub mod stream;

pub use frame::Frame;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::tree::Tree;
use crate::model::{Model, ModelVariant, VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH};
use crate::types::{LeafElement, Operator, TaskType, ThresholdElement, TreeNodeType, TypeInfo};

// =============================================================================
// Wire primitives
// =============================================================================

/// Fixed-size little-endian wire primitive.
///
/// `FORMAT` follows the Python buffer-protocol convention and identifies the
/// element type of a [`Frame`].
pub(crate) trait WireScalar: Sized + Copy {
    const FORMAT: &'static str;
    const SIZE: usize;

    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Result<Self>;
}

macro_rules! impl_wire_numeric {
    ($ty:ty, $format:literal) => {
        impl WireScalar for $ty {
            const FORMAT: &'static str = $format;
            const SIZE: usize = std::mem::size_of::<$ty>();

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Result<Self> {
                let arr = bytes
                    .try_into()
                    .map_err(|_| Error::Serialization("truncated scalar".into()))?;
                Ok(<$ty>::from_le_bytes(arr))
            }
        }
    };
}

impl_wire_numeric!(i32, "=l");
impl_wire_numeric!(u32, "=L");
impl_wire_numeric!(u64, "=Q");
impl_wire_numeric!(f32, "=f");
impl_wire_numeric!(f64, "=d");

impl WireScalar for u8 {
    const FORMAT: &'static str = "=B";
    const SIZE: usize = 1;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self);
    }

    fn read_le(bytes: &[u8]) -> Result<Self> {
        bytes.first().copied().ok_or_else(|| Error::Serialization("truncated scalar".into()))
    }
}

impl WireScalar for bool {
    const FORMAT: &'static str = "=?";
    const SIZE: usize = 1;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_le(bytes: &[u8]) -> Result<Self> {
        Ok(u8::read_le(bytes)? != 0)
    }
}

impl WireScalar for TypeInfo {
    const FORMAT: &'static str = "=B";
    const SIZE: usize = 1;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_le(bytes: &[u8]) -> Result<Self> {
        TypeInfo::from_u8(u8::read_le(bytes)?)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl WireScalar for TaskType {
    const FORMAT: &'static str = "=B";
    const SIZE: usize = 1;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_le(bytes: &[u8]) -> Result<Self> {
        TaskType::from_u8(u8::read_le(bytes)?)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl WireScalar for TreeNodeType {
    const FORMAT: &'static str = "=B";
    const SIZE: usize = 1;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_le(bytes: &[u8]) -> Result<Self> {
        TreeNodeType::from_u8(u8::read_le(bytes)?)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl WireScalar for Operator {
    const FORMAT: &'static str = "=b";
    const SIZE: usize = 1;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as i8 as u8);
    }

    fn read_le(bytes: &[u8]) -> Result<Self> {
        Operator::from_i8(u8::read_le(bytes)? as i8)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

// =============================================================================
// Transport traits
// =============================================================================

/// Write half of a transport: receives the logical field sequence.
pub(crate) trait SerializerSink {
    fn scalar<T: WireScalar>(&mut self, value: T) -> Result<()>;
    fn array<T: WireScalar>(&mut self, values: &[T]) -> Result<()>;
    fn string(&mut self, value: &str) -> Result<()>;
}

/// Read half of a transport: yields the logical field sequence in order.
pub(crate) trait SerializerSource {
    fn scalar<T: WireScalar>(&mut self) -> Result<T>;
    fn array<T: WireScalar>(&mut self) -> Result<Vec<T>>;
    fn string(&mut self) -> Result<String>;
    /// Skip one self-describing optional field (name + payload).
    fn skip_optional_field(&mut self) -> Result<()>;
}

// =============================================================================
// Version compatibility
// =============================================================================

fn check_version(major: i32, minor: i32, patch: i32) -> Result<()> {
    let bridge = major == 3 && minor == 9;
    if major != VERSION_MAJOR && !bridge {
        return Err(Error::Serialization(format!(
            "cannot load a model produced by format version {major}.{minor}.{patch}; \
             this build reads {VERSION_MAJOR}.x and the 3.9 bridge only"
        )));
    }
    if major == VERSION_MAJOR && minor > VERSION_MINOR {
        log::warn!(
            "loading a model produced by a newer format version \
             ({major}.{minor}.{patch} > {VERSION_MAJOR}.{VERSION_MINOR}.{VERSION_PATCH}); \
             unknown optional fields will be skipped"
        );
    }
    Ok(())
}

// =============================================================================
// Engine: model header
// =============================================================================

pub(crate) fn serialize_model(model: &Model, sink: &mut impl SerializerSink) -> Result<()> {
    // Header: version and type tags. The writer always stamps its own
    // version, regardless of where the model object came from.
    sink.scalar(VERSION_MAJOR)?;
    sink.scalar(VERSION_MINOR)?;
    sink.scalar(VERSION_PATCH)?;
    sink.scalar(model.threshold_type())?;
    sink.scalar(model.leaf_output_type())?;
    sink.scalar(model.num_tree() as u64)?;

    sink.scalar(model.num_feature)?;
    sink.scalar(model.task_type)?;
    sink.scalar(model.average_tree_output)?;
    sink.scalar(model.num_target)?;
    sink.array(&model.num_class)?;
    sink.array(&model.leaf_vector_shape)?;
    sink.array(&model.target_id)?;
    sink.array(&model.class_id)?;
    sink.string(&model.postprocessor)?;
    sink.scalar(model.sigmoid_alpha)?;
    sink.scalar(model.ratio_c)?;
    sink.array(&model.base_scores)?;
    sink.string(&model.attributes)?;

    // Extension slot 1: per-model optional fields.
    sink.scalar(0i32)?;

    match &model.variant {
        ModelVariant::Float32(p) => serialize_trees(&p.trees, sink),
        ModelVariant::Float32LeafUInt32(p) => serialize_trees(&p.trees, sink),
        ModelVariant::Float64(p) => serialize_trees(&p.trees, sink),
        ModelVariant::Float64LeafUInt32(p) => serialize_trees(&p.trees, sink),
    }
}

pub(crate) fn deserialize_model(source: &mut impl SerializerSource) -> Result<Model> {
    let major: i32 = source.scalar()?;
    let minor: i32 = source.scalar()?;
    let patch: i32 = source.scalar()?;
    check_version(major, minor, patch)?;

    let threshold_type: TypeInfo = source.scalar()?;
    let leaf_output_type: TypeInfo = source.scalar()?;
    let mut model = Model::new(threshold_type, leaf_output_type)?;
    model.major_ver = major;
    model.minor_ver = minor;
    model.patch_ver = patch;

    let num_tree: u64 = source.scalar()?;

    model.num_feature = source.scalar()?;
    model.task_type = source.scalar()?;
    model.average_tree_output = source.scalar()?;
    model.num_target = source.scalar()?;
    model.num_class = source.array()?;
    let shape: Vec<u32> = source.array()?;
    if shape.len() != 2 {
        return Err(Error::Serialization(format!(
            "leaf_vector_shape must have 2 elements, got {}",
            shape.len()
        )));
    }
    model.leaf_vector_shape = [shape[0], shape[1]];
    model.target_id = source.array()?;
    model.class_id = source.array()?;
    model.postprocessor = source.string()?;
    model.sigmoid_alpha = source.scalar()?;
    model.ratio_c = source.scalar()?;
    model.base_scores = source.array()?;
    model.attributes = source.string()?;

    let num_opt_field_per_model: i32 = source.scalar()?;
    for _ in 0..num_opt_field_per_model {
        source.skip_optional_field()?;
    }

    match &mut model.variant {
        ModelVariant::Float32(p) => deserialize_trees(num_tree, &mut p.trees, source)?,
        ModelVariant::Float32LeafUInt32(p) => deserialize_trees(num_tree, &mut p.trees, source)?,
        ModelVariant::Float64(p) => deserialize_trees(num_tree, &mut p.trees, source)?,
        ModelVariant::Float64LeafUInt32(p) => deserialize_trees(num_tree, &mut p.trees, source)?,
    }
    Ok(model)
}

// =============================================================================
// Engine: trees
// =============================================================================

fn serialize_trees<T, L>(trees: &[Tree<T, L>], sink: &mut impl SerializerSink) -> Result<()>
where
    T: ThresholdElement + WireScalar,
    L: LeafElement + WireScalar,
{
    for tree in trees {
        serialize_tree(tree, sink)?;
    }
    Ok(())
}

fn serialize_tree<T, L>(tree: &Tree<T, L>, sink: &mut impl SerializerSink) -> Result<()>
where
    T: ThresholdElement + WireScalar,
    L: LeafElement + WireScalar,
{
    sink.scalar(tree.num_nodes)?;
    sink.scalar(tree.has_categorical_split)?;
    sink.array(&tree.node_type)?;
    sink.array(&tree.cleft)?;
    sink.array(&tree.cright)?;
    sink.array(&tree.split_index)?;
    sink.array(&tree.default_left)?;
    sink.array(&tree.leaf_value)?;
    sink.array(&tree.threshold)?;
    sink.array(&tree.cmp)?;
    sink.array(&tree.category_list_right_child)?;
    sink.array(&tree.leaf_vector)?;
    sink.array(&tree.leaf_vector_begin)?;
    sink.array(&tree.leaf_vector_end)?;
    sink.array(&tree.category_list)?;
    sink.array(&tree.category_list_begin)?;
    sink.array(&tree.category_list_end)?;
    sink.array(&tree.data_count)?;
    sink.array(&tree.data_count_present)?;
    sink.array(&tree.sum_hess)?;
    sink.array(&tree.sum_hess_present)?;
    sink.array(&tree.gain)?;
    sink.array(&tree.gain_present)?;

    // Extension slots 2 and 3: per-tree and per-node optional fields.
    sink.scalar(0i32)?;
    sink.scalar(0i32)?;
    Ok(())
}

fn deserialize_trees<T, L>(
    num_tree: u64,
    trees: &mut Vec<Tree<T, L>>,
    source: &mut impl SerializerSource,
) -> Result<()>
where
    T: ThresholdElement + WireScalar,
    L: LeafElement + WireScalar,
{
    trees.clear();
    trees.reserve(num_tree as usize);
    for _ in 0..num_tree {
        trees.push(deserialize_tree(source)?);
    }
    Ok(())
}

fn deserialize_tree<T, L>(source: &mut impl SerializerSource) -> Result<Tree<T, L>>
where
    T: ThresholdElement + WireScalar,
    L: LeafElement + WireScalar,
{
    let mut tree = Tree::<T, L>::default();
    tree.num_nodes = source.scalar()?;
    tree.has_categorical_split = source.scalar()?;
    tree.node_type = source.array()?;
    tree.cleft = source.array()?;
    tree.cright = source.array()?;
    tree.split_index = source.array()?;
    tree.default_left = source.array()?;
    tree.leaf_value = source.array()?;
    tree.threshold = source.array()?;
    tree.cmp = source.array()?;
    tree.category_list_right_child = source.array()?;
    tree.leaf_vector = source.array()?;
    tree.leaf_vector_begin = source.array()?;
    tree.leaf_vector_end = source.array()?;
    tree.category_list = source.array()?;
    tree.category_list_begin = source.array()?;
    tree.category_list_end = source.array()?;
    tree.data_count = source.array()?;
    tree.data_count_present = source.array()?;
    tree.sum_hess = source.array()?;
    tree.sum_hess_present = source.array()?;
    tree.gain = source.array()?;
    tree.gain_present = source.array()?;

    let n_nodes = tree.num_nodes as usize;
    let per_node_lengths = [
        ("node_type", tree.node_type.len()),
        ("left_child", tree.cleft.len()),
        ("right_child", tree.cright.len()),
        ("split_index", tree.split_index.len()),
        ("default_left", tree.default_left.len()),
        ("leaf_value", tree.leaf_value.len()),
        ("threshold", tree.threshold.len()),
        ("comparison_op", tree.cmp.len()),
        ("category_list_right_child", tree.category_list_right_child.len()),
        ("leaf_vector_begin", tree.leaf_vector_begin.len()),
        ("leaf_vector_end", tree.leaf_vector_end.len()),
        ("category_list_begin", tree.category_list_begin.len()),
        ("category_list_end", tree.category_list_end.len()),
        ("data_count", tree.data_count.len()),
        ("data_count_present", tree.data_count_present.len()),
        ("sum_hess", tree.sum_hess.len()),
        ("sum_hess_present", tree.sum_hess_present.len()),
        ("gain", tree.gain.len()),
        ("gain_present", tree.gain_present.len()),
    ];
    for (name, len) in per_node_lengths {
        if len != n_nodes {
            return Err(Error::Serialization(format!(
                "tree column {name} has {len} entries, expected {n_nodes}"
            )));
        }
    }

    let num_opt_field_per_tree: i32 = source.scalar()?;
    for _ in 0..num_opt_field_per_tree {
        source.skip_optional_field()?;
    }
    let num_opt_field_per_node: i32 = source.scalar()?;
    for _ in 0..num_opt_field_per_node {
        source.skip_optional_field()?;
    }

    Ok(tree)
}

// =============================================================================
// Public Model API
// =============================================================================

impl Model {
    /// Export the model as a sequence of typed frames.
    pub fn to_frames(&self) -> Result<Vec<Frame>> {
        let mut sink = frame::FrameSink::new();
        serialize_model(self, &mut sink)?;
        Ok(sink.into_frames())
    }

    /// Reconstruct a model from a frame sequence produced by
    /// [`to_frames`](Self::to_frames).
    pub fn from_frames(frames: &[Frame]) -> Result<Model> {
        let mut source = frame::FrameSource::new(frames);
        let model = deserialize_model(&mut source)?;
        source.finish()?;
        Ok(model)
    }

    /// Serialize the model onto a byte stream.
    pub fn serialize_to_stream<W: Write>(&self, sink: &mut W) -> Result<()> {
        let mut stream_sink = stream::StreamSink::new(sink);
        serialize_model(self, &mut stream_sink)
    }

    /// Reconstruct a model from a byte stream produced by
    /// [`serialize_to_stream`](Self::serialize_to_stream).
    pub fn deserialize_from_stream<R: Read>(source: &mut R) -> Result<Model> {
        let mut stream_source = stream::StreamSource::new(source);
        deserialize_model(&mut stream_source)
    }

    /// Serialize the model into a file.
    pub fn serialize_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.serialize_to_stream(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Load a model from a file written by
    /// [`serialize_to_file`](Self::serialize_to_file).
    pub fn deserialize_from_file<P: AsRef<Path>>(path: P) -> Result<Model> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::deserialize_from_stream(&mut reader)
    }
}
