//! Column-oriented decision-tree storage and its mutation API.
//!
//! A [`Tree`] keeps one flat array per node field, indexed by a dense
//! internal node id in `0..num_nodes`. Child links are `i32` indices with
//! `-1` marking "no child" (leaves), which keeps the structure cycle-free by
//! construction and makes serialization a sequence of array copies.
//!
//! Variable-length per-node data (leaf vectors, category lists) lives in
//! shared pools with per-node `begin`/`end` offsets.

use crate::error::{Error, Result};
use crate::types::{LeafElement, Operator, ThresholdElement, TreeNodeType};

/// Feature indices must leave the top bit free.
const MAX_SPLIT_INDEX: u32 = (1 << 31) - 1;

/// A single decision tree with typed thresholds and leaf outputs.
#[derive(Debug, Clone, Default)]
pub struct Tree<T, L> {
    pub(crate) num_nodes: i32,
    pub(crate) node_type: Vec<TreeNodeType>,
    pub(crate) cleft: Vec<i32>,
    pub(crate) cright: Vec<i32>,
    pub(crate) split_index: Vec<i32>,
    pub(crate) default_left: Vec<bool>,
    pub(crate) leaf_value: Vec<L>,
    pub(crate) threshold: Vec<T>,
    pub(crate) cmp: Vec<Operator>,
    pub(crate) category_list_right_child: Vec<bool>,

    // Leaf-vector pool
    pub(crate) leaf_vector: Vec<L>,
    pub(crate) leaf_vector_begin: Vec<u64>,
    pub(crate) leaf_vector_end: Vec<u64>,

    // Category-list pool
    pub(crate) category_list: Vec<u32>,
    pub(crate) category_list_begin: Vec<u64>,
    pub(crate) category_list_end: Vec<u64>,

    // Per-node optional statistics
    pub(crate) data_count: Vec<u64>,
    pub(crate) data_count_present: Vec<bool>,
    pub(crate) sum_hess: Vec<f64>,
    pub(crate) sum_hess_present: Vec<bool>,
    pub(crate) gain: Vec<f64>,
    pub(crate) gain_present: Vec<bool>,

    pub(crate) has_categorical_split: bool,
}

impl<T: ThresholdElement, L: LeafElement> Tree<T, L> {
    /// Create an empty tree. Call [`init`](Self::init) before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize with a single root node, set as a leaf with zero output.
    pub fn init(&mut self) {
        *self = Self::default();
        let root = self.alloc_node();
        self.set_leaf(root, L::default());
    }

    /// Append a default-initialized node and return its id.
    ///
    /// All parallel arrays grow by one; pool offsets start empty.
    pub(crate) fn alloc_node(&mut self) -> i32 {
        let nid = self.num_nodes;
        self.num_nodes += 1;

        self.node_type.push(TreeNodeType::Leaf);
        self.cleft.push(-1);
        self.cright.push(-1);
        self.split_index.push(0);
        self.default_left.push(false);
        self.leaf_value.push(L::default());
        self.threshold.push(T::default());
        self.cmp.push(Operator::None);
        self.category_list_right_child.push(false);
        self.leaf_vector_begin.push(0);
        self.leaf_vector_end.push(0);
        self.category_list_begin.push(0);
        self.category_list_end.push(0);
        self.data_count.push(0);
        self.data_count_present.push(false);
        self.sum_hess.push(0.0);
        self.sum_hess_present.push(false);
        self.gain.push(0.0);
        self.gain_present.push(false);

        nid
    }

    /// Allocate two children for `nid` and wire them up.
    pub fn add_children(&mut self, nid: i32) -> (i32, i32) {
        let left = self.alloc_node();
        let right = self.alloc_node();
        self.cleft[nid as usize] = left;
        self.cright[nid as usize] = right;
        (left, right)
    }

    /// Overwrite the child links of `nid`.
    ///
    /// Used by the model builder, which records caller-chosen node keys here
    /// and rewrites them to internal ids when the tree is finished.
    pub(crate) fn set_children(&mut self, nid: i32, left: i32, right: i32) {
        self.cleft[nid as usize] = left;
        self.cright[nid as usize] = right;
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Number of nodes currently allocated.
    #[inline]
    pub fn num_nodes(&self) -> i32 {
        self.num_nodes
    }

    #[inline]
    pub fn node_type(&self, nid: i32) -> TreeNodeType {
        self.node_type[nid as usize]
    }

    #[inline]
    pub fn is_leaf(&self, nid: i32) -> bool {
        self.node_type[nid as usize] == TreeNodeType::Leaf
    }

    #[inline]
    pub fn left_child(&self, nid: i32) -> i32 {
        self.cleft[nid as usize]
    }

    #[inline]
    pub fn right_child(&self, nid: i32) -> i32 {
        self.cright[nid as usize]
    }

    /// Child taken when the split feature is missing (NaN).
    #[inline]
    pub fn default_child(&self, nid: i32) -> i32 {
        if self.default_left[nid as usize] {
            self.cleft[nid as usize]
        } else {
            self.cright[nid as usize]
        }
    }

    #[inline]
    pub fn split_index(&self, nid: i32) -> u32 {
        self.split_index[nid as usize] as u32
    }

    #[inline]
    pub fn default_left(&self, nid: i32) -> bool {
        self.default_left[nid as usize]
    }

    #[inline]
    pub fn leaf_value(&self, nid: i32) -> L {
        self.leaf_value[nid as usize]
    }

    /// Leaf vector of `nid`; empty when no vector was set.
    #[inline]
    pub fn leaf_vector(&self, nid: i32) -> &[L] {
        let begin = self.leaf_vector_begin[nid as usize] as usize;
        let end = self.leaf_vector_end[nid as usize] as usize;
        &self.leaf_vector[begin..end]
    }

    #[inline]
    pub fn has_leaf_vector(&self, nid: i32) -> bool {
        self.leaf_vector_begin[nid as usize] != self.leaf_vector_end[nid as usize]
    }

    #[inline]
    pub fn threshold(&self, nid: i32) -> T {
        self.threshold[nid as usize]
    }

    #[inline]
    pub fn comparison_op(&self, nid: i32) -> Operator {
        self.cmp[nid as usize]
    }

    /// Sorted, deduplicated category list of `nid`; empty for non-categorical
    /// nodes.
    #[inline]
    pub fn category_list(&self, nid: i32) -> &[u32] {
        let begin = self.category_list_begin[nid as usize] as usize;
        let end = self.category_list_end[nid as usize] as usize;
        &self.category_list[begin..end]
    }

    /// Whether the category list of `nid` describes the right child.
    #[inline]
    pub fn category_list_right_child(&self, nid: i32) -> bool {
        self.category_list_right_child[nid as usize]
    }

    #[inline]
    pub fn has_categorical_split(&self) -> bool {
        self.has_categorical_split
    }

    #[inline]
    pub fn has_data_count(&self, nid: i32) -> bool {
        self.data_count_present[nid as usize]
    }

    #[inline]
    pub fn data_count(&self, nid: i32) -> u64 {
        self.data_count[nid as usize]
    }

    #[inline]
    pub fn has_sum_hess(&self, nid: i32) -> bool {
        self.sum_hess_present[nid as usize]
    }

    #[inline]
    pub fn sum_hess(&self, nid: i32) -> f64 {
        self.sum_hess[nid as usize]
    }

    #[inline]
    pub fn has_gain(&self, nid: i32) -> bool {
        self.gain_present[nid as usize]
    }

    #[inline]
    pub fn gain(&self, nid: i32) -> f64 {
        self.gain[nid as usize]
    }

    // =========================================================================
    // Setters
    // =========================================================================

    /// Turn `nid` into a numerical test node.
    pub fn set_numerical_split(
        &mut self,
        nid: i32,
        split_index: u32,
        threshold: T,
        default_left: bool,
        cmp: Operator,
    ) -> Result<()> {
        if split_index >= MAX_SPLIT_INDEX {
            return Err(Error::Validation(format!(
                "split index {split_index} too large (must be below {MAX_SPLIT_INDEX})"
            )));
        }
        let idx = nid as usize;
        self.node_type[idx] = TreeNodeType::NumericalTest;
        self.split_index[idx] = split_index as i32;
        self.threshold[idx] = threshold;
        self.default_left[idx] = default_left;
        self.cmp[idx] = cmp;
        self.category_list_right_child[idx] = false;
        Ok(())
    }

    /// Turn `nid` into a categorical test node.
    ///
    /// The categories are appended at the tail of the shared pool, sorted in
    /// place and deduplicated. All nodes allocated after `nid` must still
    /// have empty category extents, so the pool offsets stay monotonic.
    pub fn set_categorical_split(
        &mut self,
        nid: i32,
        split_index: u32,
        default_left: bool,
        category_list: &[u32],
        category_list_right_child: bool,
    ) -> Result<()> {
        if split_index >= MAX_SPLIT_INDEX {
            return Err(Error::Validation(format!(
                "split index {split_index} too large (must be below {MAX_SPLIT_INDEX})"
            )));
        }
        let tail = self.category_list.len() as u64;
        for later in (nid as usize + 1)..self.num_nodes as usize {
            if self.category_list_begin[later] != self.category_list_end[later] {
                return Err(Error::Structural(format!(
                    "cannot assign categories to node {nid}: node {later} already owns \
                     a later segment of the category pool"
                )));
            }
        }

        let mut segment = category_list.to_vec();
        segment.sort_unstable();
        segment.dedup();
        let begin = tail;
        let end = begin + segment.len() as u64;
        self.category_list.extend(segment);

        let idx = nid as usize;
        self.category_list_begin[idx] = begin;
        self.category_list_end[idx] = end;
        self.node_type[idx] = TreeNodeType::CategoricalTest;
        self.split_index[idx] = split_index as i32;
        self.default_left[idx] = default_left;
        self.category_list_right_child[idx] = category_list_right_child;
        self.has_categorical_split = true;
        Ok(())
    }

    /// Demote `nid` to a leaf with a scalar output, clearing its children.
    pub fn set_leaf(&mut self, nid: i32, value: L) {
        let idx = nid as usize;
        self.leaf_value[idx] = value;
        self.cleft[idx] = -1;
        self.cright[idx] = -1;
        self.node_type[idx] = TreeNodeType::Leaf;
    }

    /// Demote `nid` to a leaf with a vector output.
    pub fn set_leaf_vector(&mut self, nid: i32, values: &[L]) {
        let begin = self.leaf_vector.len() as u64;
        self.leaf_vector.extend_from_slice(values);
        let end = self.leaf_vector.len() as u64;
        let idx = nid as usize;
        self.leaf_vector_begin[idx] = begin;
        self.leaf_vector_end[idx] = end;
        self.cleft[idx] = -1;
        self.cright[idx] = -1;
        self.node_type[idx] = TreeNodeType::Leaf;
    }

    pub fn set_data_count(&mut self, nid: i32, data_count: u64) {
        self.data_count[nid as usize] = data_count;
        self.data_count_present[nid as usize] = true;
    }

    pub fn set_sum_hess(&mut self, nid: i32, sum_hess: f64) {
        self.sum_hess[nid as usize] = sum_hess;
        self.sum_hess_present[nid as usize] = true;
    }

    pub fn set_gain(&mut self, nid: i32, gain: f64) {
        self.gain[nid as usize] = gain;
        self.gain_present[nid as usize] = true;
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check the structural invariants of this tree.
    ///
    /// Walks from the root with an iterative colored DFS and rejects
    /// out-of-bounds children, self-loops, nodes reached twice (shared
    /// parents or cycles) and nodes never reached at all (orphans).
    pub fn validate(&self) -> Result<()> {
        let n_nodes = self.num_nodes as usize;
        if n_nodes == 0 {
            return Err(Error::Structural("tree has no nodes".into()));
        }

        // 0 = unvisited, 1 = visiting, 2 = done
        let mut color = vec![0u8; n_nodes];
        let mut stack: Vec<(i32, u8)> = vec![(0, 0)];

        while let Some((node, phase)) = stack.pop() {
            let idx = node as usize;
            match phase {
                0 => {
                    match color[idx] {
                        0 => {}
                        1 => {
                            return Err(Error::Structural(format!(
                                "cycle detected at node {node}"
                            )))
                        }
                        _ => {
                            return Err(Error::Structural(format!(
                                "node {node} is reachable through more than one path"
                            )))
                        }
                    }
                    color[idx] = 1;
                    stack.push((node, 1));

                    if !self.is_leaf(node) {
                        let left = self.cleft[idx];
                        let right = self.cright[idx];
                        if left == node || right == node {
                            return Err(Error::Structural(format!(
                                "node {node} is its own child"
                            )));
                        }
                        for child in [left, right] {
                            if child < 0 || child as usize >= n_nodes {
                                return Err(Error::Structural(format!(
                                    "node {node} has out-of-bounds child {child} \
                                     (tree has {n_nodes} nodes)"
                                )));
                            }
                        }
                        stack.push((right, 0));
                        stack.push((left, 0));
                    }
                }
                _ => {
                    color[idx] = 2;
                }
            }
        }

        if let Some(orphan) = color.iter().position(|&c| c == 0) {
            return Err(Error::Structural(format!(
                "node {orphan} is not reachable from the root"
            )));
        }

        // Pool offsets must be in-bounds and ordered.
        for nid in 0..n_nodes {
            let (lb, le) = (self.leaf_vector_begin[nid], self.leaf_vector_end[nid]);
            if lb > le || le > self.leaf_vector.len() as u64 {
                return Err(Error::Structural(format!(
                    "node {nid} has invalid leaf-vector extent [{lb}, {le})"
                )));
            }
            let (cb, ce) = (self.category_list_begin[nid], self.category_list_end[nid]);
            if cb > ce || ce > self.category_list.len() as u64 {
                return Err(Error::Structural(format!(
                    "node {nid} has invalid category-list extent [{cb}, {ce})"
                )));
            }
        }

        Ok(())
    }
}
