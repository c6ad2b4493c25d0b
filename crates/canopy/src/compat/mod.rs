//! Front-end loaders for foreign model formats.
//!
//! Loaders parse a foreign checkpoint and drive the
//! [`ModelBuilder`](crate::builder::ModelBuilder) exactly like any other
//! caller; they hold no special access to model internals.

pub mod xgboost;

pub use xgboost::{load_xgboost_model, parse_xgboost_json};
