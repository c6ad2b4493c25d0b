//! Deterministic JSON rendering of a model.
//!
//! The dump is schema-stable: field names, ordering and the set of keys per
//! node kind never change, which makes the output usable as an equality
//! oracle. `pretty` toggles whitespace only.
//!
//! Determinism comes from serde struct serialization (fields emit in
//! declaration order) and `serde_json`'s shortest-roundtrip float formatting.

use serde::Serialize;

use super::tree::Tree;
use super::{Model, ModelVariant};
use crate::types::{LeafElement, ThresholdElement, TreeNodeType};

#[derive(Serialize)]
struct ModelDump<'a> {
    num_feature: i32,
    task_type: &'static str,
    average_tree_output: bool,
    num_target: u32,
    num_class: &'a [u32],
    leaf_vector_shape: [u32; 2],
    target_id: &'a [i32],
    class_id: &'a [i32],
    postprocessor: &'a str,
    sigmoid_alpha: f32,
    ratio_c: f32,
    base_scores: &'a [f64],
    attributes: &'a str,
    trees: Vec<TreeDump>,
}

#[derive(Serialize)]
struct TreeDump {
    num_nodes: i32,
    has_categorical_split: bool,
    nodes: Vec<NodeDump>,
}

/// One node, with the key set depending on the node kind.
///
/// The optional statistics keys appear only on nodes that carry them.
#[derive(Serialize)]
#[serde(untagged)]
enum NodeDump {
    Leaf {
        node_type: &'static str,
        leaf_value: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        data_count: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sum_hess: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        gain: Option<f64>,
    },
    NumericalTest {
        node_type: &'static str,
        split_feature_id: u32,
        default_left: bool,
        comparison_op: &'static str,
        threshold: serde_json::Value,
        left_child: i32,
        right_child: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        data_count: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sum_hess: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        gain: Option<f64>,
    },
    CategoricalTest {
        node_type: &'static str,
        split_feature_id: u32,
        default_left: bool,
        category_list: Vec<u32>,
        category_list_right_child: bool,
        left_child: i32,
        right_child: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        data_count: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sum_hess: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        gain: Option<f64>,
    },
}

fn to_value<V: Serialize>(value: V) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

fn dump_tree<T: ThresholdElement, L: LeafElement>(tree: &Tree<T, L>) -> TreeDump {
    let mut nodes = Vec::with_capacity(tree.num_nodes() as usize);
    for nid in 0..tree.num_nodes() {
        let data_count = tree.has_data_count(nid).then(|| tree.data_count(nid));
        let sum_hess = tree.has_sum_hess(nid).then(|| tree.sum_hess(nid));
        let gain = tree.has_gain(nid).then(|| tree.gain(nid));
        let node = match tree.node_type(nid) {
            TreeNodeType::Leaf => {
                let leaf_value = if tree.has_leaf_vector(nid) {
                    to_value(tree.leaf_vector(nid))
                } else {
                    to_value(tree.leaf_value(nid))
                };
                NodeDump::Leaf {
                    node_type: TreeNodeType::Leaf.as_str(),
                    leaf_value,
                    data_count,
                    sum_hess,
                    gain,
                }
            }
            TreeNodeType::NumericalTest => NodeDump::NumericalTest {
                node_type: TreeNodeType::NumericalTest.as_str(),
                split_feature_id: tree.split_index(nid),
                default_left: tree.default_left(nid),
                comparison_op: tree.comparison_op(nid).as_str(),
                threshold: to_value(tree.threshold(nid)),
                left_child: tree.left_child(nid),
                right_child: tree.right_child(nid),
                data_count,
                sum_hess,
                gain,
            },
            TreeNodeType::CategoricalTest => NodeDump::CategoricalTest {
                node_type: TreeNodeType::CategoricalTest.as_str(),
                split_feature_id: tree.split_index(nid),
                default_left: tree.default_left(nid),
                category_list: tree.category_list(nid).to_vec(),
                category_list_right_child: tree.category_list_right_child(nid),
                left_child: tree.left_child(nid),
                right_child: tree.right_child(nid),
                data_count,
                sum_hess,
                gain,
            },
        };
        nodes.push(node);
    }
    TreeDump {
        num_nodes: tree.num_nodes(),
        has_categorical_split: tree.has_categorical_split(),
        nodes,
    }
}

impl Model {
    /// Render the model as deterministic JSON.
    ///
    /// `pretty` switches between compact and indented output; the content is
    /// otherwise identical.
    pub fn dump_as_json(&self, pretty: bool) -> String {
        let trees = match &self.variant {
            ModelVariant::Float32(p) => p.trees.iter().map(dump_tree).collect(),
            ModelVariant::Float32LeafUInt32(p) => p.trees.iter().map(dump_tree).collect(),
            ModelVariant::Float64(p) => p.trees.iter().map(dump_tree).collect(),
            ModelVariant::Float64LeafUInt32(p) => p.trees.iter().map(dump_tree).collect(),
        };
        let dump = ModelDump {
            num_feature: self.num_feature,
            task_type: self.task_type.as_str(),
            average_tree_output: self.average_tree_output,
            num_target: self.num_target,
            num_class: &self.num_class,
            leaf_vector_shape: self.leaf_vector_shape,
            target_id: &self.target_id,
            class_id: &self.class_id,
            postprocessor: &self.postprocessor,
            sigmoid_alpha: self.sigmoid_alpha,
            ratio_c: self.ratio_c,
            base_scores: &self.base_scores,
            attributes: &self.attributes,
            trees,
        };
        let rendered = if pretty {
            serde_json::to_string_pretty(&dump)
        } else {
            serde_json::to_string(&dump)
        };
        // Serialize-only view structs over plain data cannot fail.
        rendered.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Model, ModelVariant, Tree};
    use crate::types::{Operator, TypeInfo};

    fn stump_model() -> Model {
        let mut model = Model::new(TypeInfo::Float32, TypeInfo::Float32).unwrap();
        model.num_feature = 2;
        model.target_id = vec![0];
        model.class_id = vec![0];
        let mut tree: Tree<f32, f32> = Tree::new();
        tree.init();
        let (left, right) = tree.add_children(0);
        tree.set_numerical_split(0, 0, 0.0, true, Operator::Lt).unwrap();
        tree.set_leaf(left, 1.0);
        tree.set_leaf(right, 2.0);
        match &mut model.variant {
            ModelVariant::Float32(p) => p.trees.push(tree),
            _ => unreachable!(),
        }
        model
    }

    #[test]
    fn dump_contains_expected_keys() {
        let dump = stump_model().dump_as_json(false);
        let parsed: serde_json::Value = serde_json::from_str(&dump).unwrap();
        assert_eq!(parsed["num_feature"], 2);
        assert_eq!(parsed["task_type"], "kRegressor");
        assert_eq!(parsed["postprocessor"], "identity");
        assert_eq!(parsed["trees"][0]["num_nodes"], 3);
        let root = &parsed["trees"][0]["nodes"][0];
        assert_eq!(root["node_type"], "numerical_test_node");
        assert_eq!(root["comparison_op"], "<");
        assert_eq!(root["threshold"], 0.0);
        assert_eq!(root["left_child"], 1);
        assert_eq!(root["right_child"], 2);
        let leaf = &parsed["trees"][0]["nodes"][1];
        assert_eq!(leaf["node_type"], "leaf_node");
        assert_eq!(leaf["leaf_value"], 1.0);
        assert!(leaf.get("threshold").is_none());
    }

    #[test]
    fn pretty_toggles_whitespace_only() {
        let model = stump_model();
        let compact = model.dump_as_json(false);
        let pretty = model.dump_as_json(true);
        assert_ne!(compact, pretty);
        let a: serde_json::Value = serde_json::from_str(&compact).unwrap();
        let b: serde_json::Value = serde_json::from_str(&pretty).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn stats_emitted_only_when_present() {
        let mut model = stump_model();
        match &mut model.variant {
            ModelVariant::Float32(p) => {
                p.trees[0].set_gain(0, 7.5);
                p.trees[0].set_data_count(0, 42);
            }
            _ => unreachable!(),
        }
        let parsed: serde_json::Value =
            serde_json::from_str(&model.dump_as_json(false)).unwrap();
        let root = &parsed["trees"][0]["nodes"][0];
        assert_eq!(root["gain"], 7.5);
        assert_eq!(root["data_count"], 42);
        let leaf = &parsed["trees"][0]["nodes"][1];
        assert!(leaf.get("gain").is_none());
    }
}
