//! Closed enum tables shared across the crate, plus the element traits that
//! tie threshold/leaf storage types to their runtime [`TypeInfo`] tags.
//!
//! Every enum here has a fixed wire encoding (the discriminant) and a
//! canonical string form. Both are part of the model exchange contract and
//! must not be reordered.

use crate::error::Error;

// =============================================================================
// TypeInfo
// =============================================================================

/// Runtime tag for the numeric types used by thresholds and leaf outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeInfo {
    Invalid = 0,
    UInt32 = 1,
    Float32 = 2,
    Float64 = 3,
}

impl TypeInfo {
    /// Canonical string form, e.g. `"float32"`.
    pub fn as_str(self) -> &'static str {
        match self {
            TypeInfo::Invalid => "invalid",
            TypeInfo::UInt32 => "uint32",
            TypeInfo::Float32 => "float32",
            TypeInfo::Float64 => "float64",
        }
    }

    /// Parse the canonical string form.
    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "invalid" => Ok(TypeInfo::Invalid),
            "uint32" => Ok(TypeInfo::UInt32),
            "float32" => Ok(TypeInfo::Float32),
            "float64" => Ok(TypeInfo::Float64),
            _ => Err(Error::Validation(format!("unknown type name: {s}"))),
        }
    }

    /// Decode from the wire tag.
    pub fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(TypeInfo::Invalid),
            1 => Ok(TypeInfo::UInt32),
            2 => Ok(TypeInfo::Float32),
            3 => Ok(TypeInfo::Float64),
            _ => Err(Error::Validation(format!("unknown type tag: {value}"))),
        }
    }
}

impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Operator
// =============================================================================

/// Comparison operator attached to a numerical test node.
///
/// Traversal evaluates `feature OP threshold` and goes left on `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i8)]
pub enum Operator {
    /// Placeholder for nodes without a comparison (leaves).
    #[default]
    None = 0,
    Eq = 1,
    Lt = 2,
    Le = 3,
    Gt = 4,
    Ge = 5,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::None => "none",
            Operator::Eq => "==",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "==" => Ok(Operator::Eq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            _ => Err(Error::Validation(format!("unknown operator: {s}"))),
        }
    }

    pub fn from_i8(value: i8) -> Result<Self, Error> {
        match value {
            0 => Ok(Operator::None),
            1 => Ok(Operator::Eq),
            2 => Ok(Operator::Lt),
            3 => Ok(Operator::Le),
            4 => Ok(Operator::Gt),
            5 => Ok(Operator::Ge),
            _ => Err(Error::Validation(format!("unknown operator tag: {value}"))),
        }
    }
}

// =============================================================================
// TreeNodeType
// =============================================================================

/// Discriminant for the three node kinds a tree can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TreeNodeType {
    #[default]
    Leaf = 0,
    NumericalTest = 1,
    CategoricalTest = 2,
}

impl TreeNodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            TreeNodeType::Leaf => "leaf_node",
            TreeNodeType::NumericalTest => "numerical_test_node",
            TreeNodeType::CategoricalTest => "categorical_test_node",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "leaf_node" => Ok(TreeNodeType::Leaf),
            "numerical_test_node" => Ok(TreeNodeType::NumericalTest),
            "categorical_test_node" => Ok(TreeNodeType::CategoricalTest),
            _ => Err(Error::Validation(format!("unknown node type: {s}"))),
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(TreeNodeType::Leaf),
            1 => Ok(TreeNodeType::NumericalTest),
            2 => Ok(TreeNodeType::CategoricalTest),
            _ => Err(Error::Validation(format!("unknown node type tag: {value}"))),
        }
    }
}

// =============================================================================
// TaskType
// =============================================================================

/// Kind of learning task the ensemble was trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TaskType {
    BinaryClf = 0,
    #[default]
    Regressor = 1,
    MultiClf = 2,
    /// Ranking ensembles score like regressors but keep a distinct tag
    /// so that downstream consumers can distinguish the two.
    LearningToRank = 3,
    IsolationForest = 4,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::BinaryClf => "kBinaryClf",
            TaskType::Regressor => "kRegressor",
            TaskType::MultiClf => "kMultiClf",
            TaskType::LearningToRank => "kLearningToRank",
            TaskType::IsolationForest => "kIsolationForest",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "kBinaryClf" => Ok(TaskType::BinaryClf),
            "kRegressor" => Ok(TaskType::Regressor),
            "kMultiClf" => Ok(TaskType::MultiClf),
            "kLearningToRank" => Ok(TaskType::LearningToRank),
            "kIsolationForest" => Ok(TaskType::IsolationForest),
            _ => Err(Error::Validation(format!("unknown task type: {s}"))),
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(TaskType::BinaryClf),
            1 => Ok(TaskType::Regressor),
            2 => Ok(TaskType::MultiClf),
            3 => Ok(TaskType::LearningToRank),
            4 => Ok(TaskType::IsolationForest),
            _ => Err(Error::Validation(format!("unknown task type tag: {value}"))),
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Element traits
// =============================================================================

/// Numeric type usable as a leaf output: `f32`, `f64` or `u32`.
pub trait LeafElement:
    Copy + Default + PartialEq + Send + Sync + serde::Serialize + std::fmt::Debug + 'static
{
    const TYPE_INFO: TypeInfo;

    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
}

/// Numeric type usable as a split threshold: `f32` or `f64`.
///
/// Also serves as the input element type for prediction, which is why it
/// carries the full float interface.
pub trait ThresholdElement: LeafElement + num_traits::Float {
    /// Mantissa width in bits; bounds the largest integer the type can
    /// represent exactly, which caps valid category values.
    const MANTISSA_DIGITS: u32;
}

impl LeafElement for f32 {
    const TYPE_INFO: TypeInfo = TypeInfo::Float32;

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl LeafElement for f64 {
    const TYPE_INFO: TypeInfo = TypeInfo::Float64;

    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }
}

impl LeafElement for u32 {
    const TYPE_INFO: TypeInfo = TypeInfo::UInt32;

    fn from_f64(value: f64) -> Self {
        value as u32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl ThresholdElement for f32 {
    const MANTISSA_DIGITS: u32 = f32::MANTISSA_DIGITS;
}

impl ThresholdElement for f64 {
    const MANTISSA_DIGITS: u32 = f64::MANTISSA_DIGITS;
}
