//! Fixed-capacity node storage for calibration trees.

use crate::error::TuningError;

/// Most children a node may carry (the LED level mixes three).
pub const MAX_CHILD_NODES: usize = 3;

/// Most interpolation ratios a node stores.
pub const MAX_INTERPOLATION_ITEMS: usize = 2;

/// Index of a node inside its [`CalibrationTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A tree node borrowing the calibration data of its level.
#[derive(Debug, Clone, Copy)]
pub struct TreeNode<N> {
    /// Typed view of the dataset table (or leaf record) this node covers
    pub data: N,
    /// Depth in the tree, root is 0
    pub level: usize,
    children: [NodeId; MAX_CHILD_NODES],
    child_count: usize,
    ratios: [f32; MAX_INTERPOLATION_ITEMS],
}

impl<N> TreeNode<N> {
    fn new(data: N, level: usize) -> Self {
        Self {
            data,
            level,
            children: [NodeId::default(); MAX_CHILD_NODES],
            child_count: 0,
            ratios: [0.0; MAX_INTERPOLATION_ITEMS],
        }
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children[..self.child_count]
    }

    pub fn ratios(&self) -> [f32; MAX_INTERPOLATION_ITEMS] {
        self.ratios
    }
}

/// Arena of tree nodes with index-based child links.
///
/// Storage is an inline array of `CAP` nodes, so a tree lives wherever its
/// owner does and a build never allocates. Slot 0 always holds the root;
/// slots at or past `len` are stale copies of it.
#[derive(Debug, Clone)]
pub struct CalibrationTree<N, const CAP: usize> {
    nodes: [TreeNode<N>; CAP],
    len: usize,
}

impl<N: Copy, const CAP: usize> CalibrationTree<N, CAP> {
    /// Arena holding only `root`. Fails when `CAP` leaves no room for it.
    pub fn new(root: N) -> Result<Self, TuningError> {
        if CAP == 0 {
            return Err(TuningError::CapacityExceeded { capacity: CAP });
        }
        Ok(Self {
            nodes: [TreeNode::new(root, 0); CAP],
            len: 1,
        })
    }

    /// Append a detached node.
    pub fn push(&mut self, data: N, level: usize) -> Result<NodeId, TuningError> {
        if self.len >= CAP {
            return Err(TuningError::CapacityExceeded { capacity: CAP });
        }
        self.nodes[self.len] = TreeNode::new(data, level);
        self.len += 1;
        Ok(NodeId(self.len - 1))
    }
}

impl<N, const CAP: usize> CalibrationTree<N, CAP> {
    /// Link `child` under `parent`.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<(), TuningError> {
        let node = &mut self.nodes[parent.0];
        if node.child_count >= MAX_CHILD_NODES {
            return Err(TuningError::TooManyChildren {
                level: node.level,
                count: node.child_count + 1,
                max: MAX_CHILD_NODES,
            });
        }
        node.children[node.child_count] = child;
        node.child_count += 1;
        Ok(())
    }

    pub fn set_ratios(&mut self, id: NodeId, ratios: [f32; MAX_INTERPOLATION_ITEMS]) {
        self.nodes[id.0].ratios = ratios;
    }

    pub fn node(&self, id: NodeId) -> &TreeNode<N> {
        &self.nodes[id.0]
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Nodes in use, root included.
    pub fn node_count(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        CAP
    }
}
