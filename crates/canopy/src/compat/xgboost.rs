//! XGBoost JSON model loader.
//!
//! Parses the XGBoost >= 1.7 JSON checkpoint format into mirror structs and
//! replays it through the model builder. Supported scope: `gbtree` boosters
//! with scalar leaves, single-target models (multi-class via grove-per-class).
//!
//! XGBoost serializes most numeric parameters as strings (`"num_nodes":
//! "3"`), which the mirror structs absorb with `DisplayFromStr`.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use crate::builder::{Metadata, ModelBuilder, PostProcessorFunc, TreeAnnotation};
use crate::error::{Error, Result};
use crate::model::Model;
use crate::types::{Operator, TaskType, TypeInfo};

// =============================================================================
// Mirror structs for the checkpoint JSON
// =============================================================================

#[derive(Debug, Deserialize)]
struct XgbCheckpoint {
    learner: Learner,
}

#[derive(Debug, Deserialize)]
struct Learner {
    gradient_booster: GradientBooster,
    learner_model_param: LearnerModelParam,
    objective: Objective,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "name")]
enum GradientBooster {
    #[serde(rename = "gbtree")]
    Gbtree { model: TreeModel },
    #[serde(rename = "dart")]
    Dart,
    #[serde(rename = "gblinear")]
    Gblinear,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    #[serde_as(as = "DisplayFromStr")]
    base_score: f64,
    #[serde_as(as = "DisplayFromStr")]
    num_class: i64,
    #[serde_as(as = "DisplayFromStr")]
    num_feature: i32,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_num_target")]
    num_target: u32,
}

fn default_num_target() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct Objective {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TreeModel {
    trees: Vec<XgbTree>,
    tree_info: Vec<i32>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct XgbTree {
    tree_param: TreeParam,
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f64>,
    default_left: Vec<u8>,
    #[serde(default)]
    split_type: Vec<u8>,
    #[serde(default)]
    loss_changes: Vec<f64>,
    #[serde(default)]
    sum_hessian: Vec<f64>,
    #[serde(default)]
    categories: Vec<u32>,
    #[serde(default)]
    categories_nodes: Vec<i32>,
    #[serde(default)]
    categories_segments: Vec<u32>,
    #[serde(default)]
    categories_sizes: Vec<u32>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct TreeParam {
    #[serde_as(as = "DisplayFromStr")]
    num_nodes: i32,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_size_leaf_vector")]
    size_leaf_vector: u32,
}

fn default_size_leaf_vector() -> u32 {
    1
}

// =============================================================================
// Objective mapping
// =============================================================================

/// Post-processor name implied by an XGBoost objective.
fn postprocessor_for_objective(objective: &str) -> Result<&'static str> {
    match objective {
        "multi:softmax" | "multi:softprob" => Ok("softmax"),
        "reg:logistic" | "binary:logistic" => Ok("sigmoid"),
        "count:poisson" | "reg:gamma" | "reg:tweedie" | "survival:cox" | "survival:aft" => {
            Ok("exponential")
        }
        "binary:hinge" => Ok("hinge"),
        "reg:squarederror" | "reg:linear" | "reg:squaredlogerror" | "reg:pseudohubererror"
        | "binary:logitraw" | "rank:pairwise" | "rank:ndcg" | "rank:map" => Ok("identity"),
        _ => Err(Error::Validation(format!("unrecognized XGBoost objective: {objective}"))),
    }
}

fn task_type_for_objective(objective: &str) -> TaskType {
    if objective.starts_with("binary:") {
        TaskType::BinaryClf
    } else if objective.starts_with("multi:") {
        TaskType::MultiClf
    } else if objective.starts_with("rank:") {
        TaskType::LearningToRank
    } else {
        TaskType::Regressor
    }
}

/// XGBoost stores `base_score` in output space; the accumulator works in
/// margin space.
fn base_score_to_margin(postprocessor: &str, base_score: f64) -> f64 {
    match postprocessor {
        "sigmoid" => {
            let p = base_score.clamp(1e-7, 1.0 - 1e-7);
            -(1.0 / p - 1.0).ln()
        }
        "exponential" => base_score.max(1e-7).ln(),
        _ => base_score,
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Load an XGBoost JSON model from a file.
///
/// `config_json` is reserved for loader options and currently accepts an
/// empty object.
pub fn load_xgboost_model<P: AsRef<Path>>(path: P, config_json: &str) -> Result<Model> {
    let _config: serde_json::Value = serde_json::from_str(config_json)
        .map_err(|e| Error::Parse(format!("bad loader config: {e}")))?;
    let payload = fs::read_to_string(path)?;
    parse_xgboost_json(&payload)
}

/// Parse an XGBoost JSON checkpoint held in memory.
pub fn parse_xgboost_json(payload: &str) -> Result<Model> {
    let checkpoint: XgbCheckpoint = serde_json::from_str(payload)
        .map_err(|e| Error::Parse(format!("bad XGBoost checkpoint: {e}")))?;
    convert(&checkpoint)
}

fn convert(checkpoint: &XgbCheckpoint) -> Result<Model> {
    let learner = &checkpoint.learner;
    let tree_model = match &learner.gradient_booster {
        GradientBooster::Gbtree { model } => model,
        GradientBooster::Dart => {
            return Err(Error::Validation("dart boosters are not supported".into()))
        }
        GradientBooster::Gblinear => {
            return Err(Error::Validation("gblinear boosters are not supported".into()))
        }
    };

    let params = &learner.learner_model_param;
    if params.num_target != 1 {
        return Err(Error::Validation("multi-target XGBoost models are not supported".into()));
    }
    for tree in &tree_model.trees {
        if tree.tree_param.size_leaf_vector > 1 {
            return Err(Error::Validation(
                "vector-leaf XGBoost models are not supported".into(),
            ));
        }
    }

    let objective = learner.objective.name.as_str();
    let postprocessor = postprocessor_for_objective(objective)?;
    let task_type = task_type_for_objective(objective);
    let num_class = params.num_class.max(1) as u32;
    let num_tree = tree_model.trees.len() as u32;
    if tree_model.tree_info.len() != tree_model.trees.len() {
        return Err(Error::Parse(format!(
            "tree_info has {} entries for {} trees",
            tree_model.tree_info.len(),
            tree_model.trees.len()
        )));
    }

    let (target_id, class_id) = if num_class > 1 {
        // Grove per class: tree_info names the class each tree boosts.
        let class_id = tree_model.tree_info.clone();
        (vec![0i32; num_tree as usize], class_id)
    } else {
        (vec![0i32; num_tree as usize], vec![0i32; num_tree as usize])
    };

    let margin = base_score_to_margin(postprocessor, params.base_score);
    let base_scores = vec![margin; num_class as usize];

    let metadata =
        Metadata::new(params.num_feature, task_type, false, 1, vec![num_class], [1, 1])?;
    let annotation = TreeAnnotation::new(num_tree, target_id, class_id)?;
    let mut builder = ModelBuilder::new(
        TypeInfo::Float32,
        TypeInfo::Float32,
        &metadata,
        &annotation,
        &PostProcessorFunc::new(postprocessor),
        base_scores,
        None,
    )?;

    for tree in &tree_model.trees {
        build_tree(&mut builder, tree)?;
    }
    builder.commit_model()
}

fn build_tree(builder: &mut ModelBuilder, tree: &XgbTree) -> Result<()> {
    let num_nodes = tree.tree_param.num_nodes;
    let columns = [
        ("left_children", tree.left_children.len()),
        ("right_children", tree.right_children.len()),
        ("split_indices", tree.split_indices.len()),
        ("split_conditions", tree.split_conditions.len()),
        ("default_left", tree.default_left.len()),
    ];
    for (name, len) in columns {
        if len != num_nodes as usize {
            return Err(Error::Parse(format!(
                "tree column {name} has {len} entries, expected {num_nodes}"
            )));
        }
    }

    builder.start_tree()?;
    for nid in 0..num_nodes {
        let idx = nid as usize;
        builder.start_node(nid)?;
        let left = tree.left_children[idx];
        let right = tree.right_children[idx];
        if left == -1 {
            // Leaves keep their output in split_conditions.
            builder.leaf_scalar(tree.split_conditions[idx])?;
        } else if tree.split_type.get(idx).copied().unwrap_or(0) == 1 {
            let categories = categorical_list(tree, nid)?;
            builder.categorical_test(
                tree.split_indices[idx],
                tree.default_left[idx] != 0,
                &categories,
                true,
                left,
                right,
            )?;
            if let Some(&gain) = tree.loss_changes.get(idx) {
                builder.gain(gain)?;
            }
        } else {
            builder.numerical_test(
                tree.split_indices[idx],
                tree.split_conditions[idx],
                tree.default_left[idx] != 0,
                Operator::Lt,
                left,
                right,
            )?;
            if let Some(&gain) = tree.loss_changes.get(idx) {
                builder.gain(gain)?;
            }
        }
        if let Some(&hess) = tree.sum_hessian.get(nid as usize) {
            builder.sum_hess(hess)?;
        }
        builder.end_node()?;
    }
    builder.end_tree()
}

/// Resolve the category list of a categorical split node.
///
/// The checkpoint stores one packed list for the whole tree plus per-node
/// `(segment, size)` entries keyed by `categories_nodes`.
fn categorical_list(tree: &XgbTree, nid: i32) -> Result<Vec<u32>> {
    let slot = tree
        .categories_nodes
        .iter()
        .position(|&n| n == nid)
        .ok_or_else(|| Error::Parse(format!("node {nid} has no category segment")))?;
    let start = tree.categories_segments[slot] as usize;
    let size = tree.categories_sizes[slot] as usize;
    let end = start + size;
    if end > tree.categories.len() {
        return Err(Error::Parse(format!(
            "category segment [{start}, {end}) out of bounds ({} categories)",
            tree.categories.len()
        )));
    }
    Ok(tree.categories[start..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::{predict, Configuration, PredictKind};

    /// A two-tree regression checkpoint in the XGBoost >= 1.7 layout.
    fn regression_checkpoint() -> String {
        r#"{
          "learner": {
            "gradient_booster": {
              "name": "gbtree",
              "model": {
                "tree_info": [0, 0],
                "trees": [
                  {
                    "tree_param": {"num_nodes": "3", "size_leaf_vector": "1"},
                    "left_children": [1, -1, -1],
                    "right_children": [2, -1, -1],
                    "split_indices": [0, 0, 0],
                    "split_conditions": [0.5, 1.0, 2.0],
                    "default_left": [1, 0, 0],
                    "loss_changes": [10.0, 0.0, 0.0],
                    "sum_hessian": [30.0, 10.0, 20.0]
                  },
                  {
                    "tree_param": {"num_nodes": "1", "size_leaf_vector": "1"},
                    "left_children": [-1],
                    "right_children": [-1],
                    "split_indices": [0],
                    "split_conditions": [0.25],
                    "default_left": [0]
                  }
                ]
              }
            },
            "learner_model_param": {
              "base_score": "5E-1",
              "num_class": "0",
              "num_feature": "2",
              "num_target": "1"
            },
            "objective": {"name": "reg:squarederror"}
          },
          "version": [2, 0, 0]
        }"#
        .to_string()
    }

    #[test]
    fn parses_regression_checkpoint() {
        let model = parse_xgboost_json(&regression_checkpoint()).unwrap();
        assert_eq!(model.num_tree(), 2);
        assert_eq!(model.num_feature, 2);
        assert_eq!(model.task_type, TaskType::Regressor);
        assert_eq!(model.postprocessor, "identity");
        assert_eq!(model.num_class, vec![1]);
        assert_eq!(model.base_scores, vec![0.5]);
    }

    #[test]
    fn loaded_model_predicts() {
        let model = parse_xgboost_json(&regression_checkpoint()).unwrap();
        let config = Configuration { pred_kind: PredictKind::Raw, nthread: 1 };
        let mut output = vec![0.0f32; 1];

        // Row [0.0, 0.0]: tree 0 goes left (0.0 < 0.5) -> 1.0; tree 1 -> 0.25.
        predict(&model, &[0.0f32, 0.0], 1, &mut output, &config).unwrap();
        assert!((output[0] - (0.5 + 1.0 + 0.25)).abs() < 1e-6);

        // Row [1.0, 0.0]: tree 0 goes right -> 2.0.
        predict(&model, &[1.0f32, 0.0], 1, &mut output, &config).unwrap();
        assert!((output[0] - (0.5 + 2.0 + 0.25)).abs() < 1e-6);
    }

    #[test]
    fn binary_logistic_base_score_lands_in_margin_space() {
        let payload = regression_checkpoint()
            .replace("reg:squarederror", "binary:logistic");
        let model = parse_xgboost_json(&payload).unwrap();
        assert_eq!(model.postprocessor, "sigmoid");
        assert_eq!(model.task_type, TaskType::BinaryClf);
        // logit(0.5) = 0
        assert!(model.base_scores[0].abs() < 1e-9);
    }

    #[test]
    fn unknown_objective_is_rejected() {
        let payload = regression_checkpoint().replace("reg:squarederror", "reg:mystery");
        assert!(parse_xgboost_json(&payload).is_err());
    }

    #[test]
    fn unsupported_boosters_are_rejected() {
        let payload = r#"{
          "learner": {
            "gradient_booster": {"name": "gblinear"},
            "learner_model_param": {
              "base_score": "0", "num_class": "0", "num_feature": "1", "num_target": "1"
            },
            "objective": {"name": "reg:squarederror"}
          }
        }"#;
        assert!(matches!(parse_xgboost_json(payload), Err(Error::Validation(_))));
    }

    #[test]
    fn malformed_checkpoint_is_a_parse_error() {
        assert!(matches!(parse_xgboost_json("{"), Err(Error::Parse(_))));
    }
}
