use std::borrow::Cow;

use super::arena::{CalibrationTree, NodeId};
use crate::error::TuningError;
use crate::interpolate::{interpolate, FieldInterpolate};

/// Collapse a built tree into the single record at its root.
///
/// Children are merged before their parent. A node with one child takes the
/// child's record unchanged; two children blend with the node's first ratio;
/// three children first blend the second and third with the node's second
/// ratio, then blend the first child with that result using the first ratio.
///
/// `leaf_of` returns the calibration record a leaf node points at. Leaf
/// records are borrowed until an interpolation needs an owned copy, so two
/// branches that land on the same record are detected by identity and copied
/// instead of blended.
pub fn merge<'a, N, R, F, const CAP: usize>(
    tree: &CalibrationTree<N, CAP>,
    leaf_of: F,
) -> Result<R, TuningError>
where
    R: FieldInterpolate + 'a,
    F: Fn(&N) -> Option<&'a R>,
{
    merge_node(tree, tree.root(), &leaf_of).map(Cow::into_owned)
}

fn merge_node<'a, N, R, F, const CAP: usize>(
    tree: &CalibrationTree<N, CAP>,
    id: NodeId,
    leaf_of: &F,
) -> Result<Cow<'a, R>, TuningError>
where
    R: FieldInterpolate + 'a,
    F: Fn(&N) -> Option<&'a R>,
{
    let node = tree.node(id);
    let [primary, secondary] = node.ratios();

    match *node.children() {
        [] => leaf_of(&node.data)
            .map(Cow::Borrowed)
            .ok_or(TuningError::MissingLeafRecord { node: id.index() }),
        [only] => merge_node(tree, only, leaf_of),
        [first, second] => {
            let a = merge_node(tree, first, leaf_of)?;
            let b = merge_node(tree, second, leaf_of)?;
            blend(&a, &b, primary)
        }
        [first, second, third] => {
            let b = merge_node(tree, second, leaf_of)?;
            let c = merge_node(tree, third, leaf_of)?;
            let mixed = blend(&b, &c, secondary)?;
            let a = merge_node(tree, first, leaf_of)?;
            blend(&a, &mixed, primary)
        }
        _ => Err(TuningError::TooManyChildren {
            level: node.level,
            count: node.children().len(),
            max: super::arena::MAX_CHILD_NODES,
        }),
    }
}

fn blend<'a, R: FieldInterpolate>(
    a: &Cow<'a, R>,
    b: &Cow<'a, R>,
    ratio: f32,
) -> Result<Cow<'a, R>, TuningError> {
    interpolate(&**a, &**b, ratio).map(Cow::Owned)
}
