//! Level-by-level tree construction.
//!
//! A module describes its trigger dimensions as a table of [`Level`]s, each
//! pairing a search strategy with the most children that level may attach.
//! [`build`] starts from the root view of the dataset and asks each level's
//! strategy to expand every node at that depth. Nodes at depth
//! `levels.len()` are leaves and must carry a calibration record.

use iq_math::{locate, LocateResult, Region};
use tracing::debug;

use super::arena::{CalibrationTree, NodeId, MAX_CHILD_NODES, MAX_INTERPOLATION_ITEMS};
use crate::error::TuningError;

/// One trigger dimension of a module's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level<S> {
    pub search: S,
    pub max_children: usize,
}

impl<S> Level<S> {
    pub const fn new(search: S, max_children: usize) -> Self {
        Self {
            search,
            max_children,
        }
    }
}

/// Worst-case node count of a tree described by `levels`.
///
/// Sums the cumulative product of branching factors, root included:
/// `1 + b1 + b1*b2 + ...`.
pub const fn tree_capacity<S>(levels: &[Level<S>]) -> usize {
    let mut total = 1;
    let mut width = 1;
    let mut i = 0;
    while i < levels.len() {
        width *= levels[i].max_children;
        total += width;
        i += 1;
    }
    total
}

/// Children produced by expanding one node.
#[derive(Debug, Clone)]
pub struct Expansion<N> {
    children: [Option<N>; MAX_CHILD_NODES],
    count: usize,
    ratios: [f32; MAX_INTERPOLATION_ITEMS],
}

impl<N> Expansion<N> {
    /// Exact match on a single region.
    pub fn single(child: N) -> Self {
        Self {
            children: [Some(child), None, None],
            count: 1,
            ratios: [0.0; MAX_INTERPOLATION_ITEMS],
        }
    }

    /// Bracketing pair weighted by `ratio` towards `second`.
    pub fn pair(first: N, second: N, ratio: f32) -> Self {
        Self {
            children: [Some(first), Some(second), None],
            count: 2,
            ratios: [ratio, 0.0],
        }
    }

    /// One child for a single-region hit, two for a bracket.
    pub fn from_locate(hit: LocateResult, mut child_at: impl FnMut(usize) -> N) -> Self {
        if hit.is_blend() {
            Self::pair(child_at(hit.start_index), child_at(hit.end_index), hit.ratio)
        } else {
            Self::single(child_at(hit.start_index))
        }
    }

    /// Mix in one more child weighted by `ratio`.
    ///
    /// The weight goes into the ratio slot of the current last child, so a
    /// single child becomes a pair and a pair becomes a three-way blend.
    /// Returns the child back when the node is already full.
    pub fn try_push_mixed(&mut self, child: N, ratio: f32) -> Result<(), N> {
        if self.count == 0 || self.count >= MAX_CHILD_NODES {
            return Err(child);
        }
        self.ratios[self.count - 1] = ratio;
        self.children[self.count] = Some(child);
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn ratios(&self) -> [f32; MAX_INTERPOLATION_ITEMS] {
        self.ratios
    }

    pub fn children(&self) -> impl Iterator<Item = &N> {
        self.children.iter().flatten()
    }

    /// Convert child views, keeping ratios.
    pub fn map<M>(self, mut f: impl FnMut(N) -> M) -> Expansion<M> {
        let [a, b, c] = self.children;
        Expansion {
            children: [a.map(&mut f), b.map(&mut f), c.map(&mut f)],
            count: self.count,
            ratios: self.ratios,
        }
    }

    fn into_parts(self) -> (impl Iterator<Item = N>, [f32; MAX_INTERPOLATION_ITEMS]) {
        (self.children.into_iter().flatten(), self.ratios)
    }
}

/// Search strategy for one trigger dimension.
///
/// Implementations are small closed enums, one variant per dimension, that
/// read the node's region table, pick the trigger axis and attach children.
pub trait LevelSearch<N, T> {
    fn expand(&self, level: usize, node: &N, triggers: &T) -> Result<Expansion<N>, TuningError>;
}

/// Region lookup that tags failures with the level being expanded.
pub fn locate_at(
    level: usize,
    regions: &[Region],
    value: f32,
) -> Result<LocateResult, TuningError> {
    locate(regions, value).map_err(|source| TuningError::Locate { level, source })
}

/// Build the calibration tree for one frame.
///
/// The arena holds `CAP` nodes inline. `CAP` must cover
/// [`tree_capacity`] of `levels`, so a table that could overflow the arena
/// is rejected before any node is placed.
///
/// # Arguments
/// * `levels` - Strategy table, one entry per trigger dimension
/// * `root` - Root view of the module's calibration dataset
/// * `triggers` - Trigger values resolved for this frame
///
/// # Returns
/// * `Ok(CalibrationTree)` - Tree whose deepest nodes are leaf records
/// * `Err(TuningError)` - Lookup failure, empty expansion or capacity overflow
pub fn build<N, T, S, const CAP: usize>(
    levels: &[Level<S>],
    root: N,
    triggers: &T,
) -> Result<CalibrationTree<N, CAP>, TuningError>
where
    N: Copy,
    S: LevelSearch<N, T>,
{
    if levels.is_empty() {
        return Err(TuningError::EmptyLevelTable);
    }
    if tree_capacity(levels) > CAP {
        return Err(TuningError::CapacityExceeded { capacity: CAP });
    }

    let mut tree = CalibrationTree::new(root)?;
    let root = tree.root();
    expand_node(&mut tree, levels, root, triggers)?;

    debug!(
        nodes = tree.node_count(),
        capacity = tree.capacity(),
        "Calibration tree built"
    );
    Ok(tree)
}

fn expand_node<N, T, S, const CAP: usize>(
    tree: &mut CalibrationTree<N, CAP>,
    levels: &[Level<S>],
    id: NodeId,
    triggers: &T,
) -> Result<(), TuningError>
where
    N: Copy,
    S: LevelSearch<N, T>,
{
    let level = tree.node(id).level;
    let Some(entry) = levels.get(level) else {
        return Ok(());
    };

    let expansion = entry.search.expand(level, &tree.node(id).data, triggers)?;
    if expansion.is_empty() {
        return Err(TuningError::EmptyExpansion { level });
    }
    if expansion.len() > entry.max_children {
        return Err(TuningError::TooManyChildren {
            level,
            count: expansion.len(),
            max: entry.max_children,
        });
    }

    let (children, ratios) = expansion.into_parts();
    tree.set_ratios(id, ratios);
    for child in children {
        let child_id = tree.push(child, level + 1)?;
        tree.attach(id, child_id)?;
        expand_node(tree, levels, child_id, triggers)?;
    }
    Ok(())
}
