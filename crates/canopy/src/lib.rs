//! canopy: a universal exchange format and reference inference engine for
//! decision-tree ensembles.
//!
//! Models built by gradient boosting or random-forest trainers are captured
//! in a single typed container, round-tripped through a versioned binary
//! format, and evaluated with a NaN-aware, row-parallel prediction engine.
//!
//! # Key Types
//!
//! - [`Model`] / [`Tree`] - Typed tree-ensemble storage
//! - [`ModelBuilder`] - Stateful construction with strict call-order checks
//! - [`Configuration`] / [`predict`] - Prediction engine entry points
//! - [`Frame`] - Zero-copy framed interchange
//!
//! # Building a Model
//!
//! Drive the [`ModelBuilder`] through `start_tree` / `start_node` /
//! `numerical_test` / `leaf_scalar` / `end_node` / `end_tree` and commit.
//! See the [`builder`] module for the full call protocol.
//!
//! # Loading XGBoost Models
//!
//! Use [`compat::xgboost::load_xgboost_model`] to import JSON checkpoints.

pub mod builder;
pub mod compat;
pub mod error;
pub mod model;
pub mod predict;
pub mod serializer;
pub mod types;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Core model types
pub use model::{concatenate, Model, ModelPreset, ModelVariant, Tree, Version};

// Builder surface (most callers construct models through these)
pub use builder::{LeafValues, Metadata, ModelBuilder, PostProcessorFunc, TreeAnnotation};

// Prediction engine
pub use predict::{get_output_shape, predict, Configuration, PredictKind};

// Interchange
pub use serializer::Frame;

// Enum tables and the crate-wide error type
pub use error::Error;
pub use types::{Operator, TaskType, TreeNodeType, TypeInfo};

// Shared utilities
pub use utils::{run_with_threads, Parallelism};
