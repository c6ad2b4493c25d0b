//! Single-row tree traversal.
//!
//! Starts at the root and follows test nodes until a leaf is reached.
//! A missing (NaN) feature takes the node's default child; otherwise the
//! node's test (numerical comparison or category-list membership) picks the
//! branch. Traversal is bounded by the node count, so a corrupted tree with
//! a cycle fails instead of spinning.

use ndarray::ArrayView1;

use crate::error::{Error, Result};
use crate::model::Tree;
use crate::types::{LeafElement, Operator, ThresholdElement, TreeNodeType};

/// Walk `row` through `tree` and return the id of the reached leaf.
pub(crate) fn evaluate_tree<T, L>(tree: &Tree<T, L>, row: ArrayView1<'_, T>) -> Result<i32>
where
    T: ThresholdElement,
    L: LeafElement,
{
    let mut node = 0i32;
    let mut steps = 0i32;
    while !tree.is_leaf(node) {
        steps += 1;
        if steps > tree.num_nodes() {
            return Err(Error::Structural(format!(
                "tree traversal did not terminate after {} steps; the tree contains a cycle",
                tree.num_nodes()
            )));
        }
        let split_index = tree.split_index(node) as usize;
        let fvalue = *row.get(split_index).ok_or_else(|| {
            Error::Validation(format!(
                "split feature index {split_index} out of range (row has {} features)",
                row.len()
            ))
        })?;

        node = if fvalue.is_nan() {
            tree.default_child(node)
        } else if tree.node_type(node) == TreeNodeType::CategoricalTest {
            next_node_categorical(
                fvalue,
                tree.category_list(node),
                tree.category_list_right_child(node),
                tree.left_child(node),
                tree.right_child(node),
            )
        } else {
            next_node(
                fvalue,
                tree.threshold(node),
                tree.comparison_op(node),
                tree.left_child(node),
                tree.right_child(node),
            )?
        };
    }
    Ok(node)
}

/// Resolve a numerical test: go left when `fvalue OP threshold` holds.
#[inline]
fn next_node<T: ThresholdElement>(
    fvalue: T,
    threshold: T,
    op: Operator,
    left_child: i32,
    right_child: i32,
) -> Result<i32> {
    let cond = match op {
        Operator::Lt => fvalue < threshold,
        Operator::Le => fvalue <= threshold,
        Operator::Eq => fvalue == threshold,
        Operator::Gt => fvalue > threshold,
        Operator::Ge => fvalue >= threshold,
        Operator::None => {
            return Err(Error::Validation(
                "numerical test node carries no comparison operator".into(),
            ))
        }
    };
    Ok(if cond { left_child } else { right_child })
}

/// Resolve a categorical test via category-list membership.
///
/// A feature value names a valid category only if it is a nonnegative whole
/// number exactly representable in both `T`'s mantissa and `u32`. Anything
/// else counts as "not matched".
#[inline]
fn next_node_categorical<T: ThresholdElement>(
    fvalue: T,
    category_list: &[u32],
    category_list_right_child: bool,
    left_child: i32,
    right_child: i32,
) -> i32 {
    let value = fvalue.to_f64();
    let max_representable = (u32::MAX as f64).min((T::MANTISSA_DIGITS as f64).exp2());
    let matched = if value < 0.0 || value.abs() > max_representable || value.trunc() != value {
        false
    } else {
        category_list.binary_search(&(value as u32)).is_ok()
    };
    if category_list_right_child {
        if matched {
            right_child
        } else {
            left_child
        }
    } else if matched {
        left_child
    } else {
        right_child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn numerical_stump(op: Operator, default_left: bool) -> Tree<f32, f32> {
        let mut tree = Tree::new();
        tree.init();
        let (left, right) = tree.add_children(0);
        tree.set_numerical_split(0, 0, 0.0, default_left, op).unwrap();
        tree.set_leaf(left, 1.0);
        tree.set_leaf(right, 2.0);
        tree
    }

    #[test]
    fn comparison_operators() {
        let cases = [
            (Operator::Lt, -1.0f32, 1),
            (Operator::Lt, 0.0, 2),
            (Operator::Le, 0.0, 1),
            (Operator::Le, 0.1, 2),
            (Operator::Eq, 0.0, 1),
            (Operator::Eq, 0.5, 2),
            (Operator::Gt, 0.5, 1),
            (Operator::Gt, 0.0, 2),
            (Operator::Ge, 0.0, 1),
            (Operator::Ge, -0.5, 2),
        ];
        for (op, value, expected) in cases {
            let tree = numerical_stump(op, true);
            let row = arr1(&[value]);
            assert_eq!(
                evaluate_tree(&tree, row.view()).unwrap(),
                expected,
                "op {op:?} value {value}"
            );
        }
    }

    #[test]
    fn nan_takes_default_child_regardless_of_operator() {
        for op in [Operator::Lt, Operator::Le, Operator::Eq, Operator::Gt, Operator::Ge] {
            let tree = numerical_stump(op, true);
            let row = arr1(&[f32::NAN]);
            assert_eq!(evaluate_tree(&tree, row.view()).unwrap(), 1, "op {op:?}");

            let tree = numerical_stump(op, false);
            assert_eq!(evaluate_tree(&tree, row.view()).unwrap(), 2, "op {op:?}");
        }
    }

    #[test]
    fn missing_operator_is_fatal() {
        let mut tree: Tree<f32, f32> = Tree::new();
        tree.init();
        let (left, right) = tree.add_children(0);
        tree.set_numerical_split(0, 0, 0.0, true, Operator::Lt).unwrap();
        tree.set_leaf(left, 1.0);
        tree.set_leaf(right, 2.0);
        tree.cmp[0] = Operator::None;
        let row = arr1(&[0.5f32]);
        assert!(matches!(evaluate_tree(&tree, row.view()), Err(Error::Validation(_))));
    }

    #[test]
    fn out_of_range_feature_is_fatal() {
        let mut tree: Tree<f32, f32> = Tree::new();
        tree.init();
        let (left, right) = tree.add_children(0);
        tree.set_numerical_split(0, 3, 0.0, true, Operator::Lt).unwrap();
        tree.set_leaf(left, 1.0);
        tree.set_leaf(right, 2.0);
        let row = arr1(&[0.5f32]);
        assert!(matches!(evaluate_tree(&tree, row.view()), Err(Error::Validation(_))));
    }

    #[test]
    fn cycle_is_detected() {
        let mut tree: Tree<f32, f32> = Tree::new();
        tree.init();
        let (left, right) = tree.add_children(0);
        tree.set_numerical_split(0, 0, 0.0, true, Operator::Lt).unwrap();
        tree.set_leaf(left, 1.0);
        tree.set_leaf(right, 2.0);
        // Corrupt the structure: the root loops back to itself.
        tree.set_children(0, 0, 0);
        let row = arr1(&[0.5f32]);
        assert!(matches!(evaluate_tree(&tree, row.view()), Err(Error::Structural(_))));
    }

    #[test]
    fn categorical_membership() {
        let mut tree: Tree<f32, f32> = Tree::new();
        tree.init();
        let (left, right) = tree.add_children(0);
        tree.set_categorical_split(0, 0, true, &[2, 5, 7], true).unwrap();
        tree.set_leaf(left, 0.0);
        tree.set_leaf(right, 1.0);

        let expect_child = |value: f32, child: i32| {
            let row = arr1(&[value]);
            assert_eq!(evaluate_tree(&tree, row.view()).unwrap(), child, "value {value}");
        };

        expect_child(5.0, 2); // matched, list names the right child
        expect_child(3.0, 1); // not in list
        expect_child(5.5, 1); // non-integer values never match
        expect_child(2.9999, 1);
        expect_child(-1.0, 1); // negative values never match
        expect_child(f32::NAN, 1); // missing takes the default (left) child
    }

    #[test]
    fn categorical_list_left_child_orientation() {
        let mut tree: Tree<f32, f32> = Tree::new();
        tree.init();
        let (left, right) = tree.add_children(0);
        tree.set_categorical_split(0, 0, false, &[1, 3], false).unwrap();
        tree.set_leaf(left, 0.0);
        tree.set_leaf(right, 1.0);

        let row = arr1(&[1.0f32]);
        assert_eq!(evaluate_tree(&tree, row.view()).unwrap(), 1); // matched -> left
        let row = arr1(&[2.0f32]);
        assert_eq!(evaluate_tree(&tree, row.view()).unwrap(), 2); // unmatched -> right
    }

    #[test]
    fn huge_values_never_match() {
        let mut tree: Tree<f64, f64> = Tree::new();
        tree.init();
        let (left, right) = tree.add_children(0);
        tree.set_categorical_split(0, 0, true, &[2], true).unwrap();
        tree.set_leaf(left, 0.0);
        tree.set_leaf(right, 1.0);

        let row = arr1(&[1.0e300f64]);
        assert_eq!(evaluate_tree(&tree, row.view()).unwrap(), 1);
    }
}
