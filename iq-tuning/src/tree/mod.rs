//! Calibration tree construction and merging.
//!
//! A module's calibration data is a nest of region tables, one per trigger
//! dimension. For each frame the engine builds a tree whose root views the
//! whole dataset, whose inner nodes view the sub-tables selected at each
//! level, and whose leaves point at calibration records. Merging the tree
//! bottom-up yields the single record for the current triggers.
//!
//! - [`arena`] - index-based node storage with a precomputed bound
//! - [`builder`] - strategy table driven expansion
//! - [`merger`] - post-order interpolation back to the root

pub mod arena;
pub mod builder;
pub mod merger;

pub use arena::{CalibrationTree, NodeId, TreeNode, MAX_CHILD_NODES, MAX_INTERPOLATION_ITEMS};
pub use builder::{build, locate_at, tree_capacity, Expansion, Level, LevelSearch};
pub use merger::merge;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TuningError;
    use crate::interpolate::FieldInterpolate;
    use iq_math::{lerp, Region};

    #[derive(Debug, Clone, PartialEq)]
    struct Sample {
        x: f32,
    }

    impl FieldInterpolate for Sample {
        fn blend(a: &Self, b: &Self, ratio: f32) -> Self {
            Sample {
                x: lerp(a.x, b.x, ratio),
            }
        }
    }

    #[derive(Debug)]
    struct Zone {
        region: Region,
        record: Sample,
    }

    #[derive(Debug, Clone, Copy)]
    enum Node<'a> {
        Root(&'a [Zone]),
        Leaf(&'a Sample),
    }

    #[derive(Debug, Clone, Copy)]
    enum Search {
        Lux,
        /// Always mixes a third record in at a fixed weight
        Mixed(f32),
    }

    impl<'a> LevelSearch<Node<'a>, f32> for Search {
        fn expand(
            &self,
            level: usize,
            node: &Node<'a>,
            lux: &f32,
        ) -> Result<Expansion<Node<'a>>, TuningError> {
            let Node::Root(zones) = *node else {
                return Err(TuningError::UnexpectedNode {
                    level,
                    found: "leaf",
                });
            };
            let regions: Vec<Region> = zones.iter().map(|z| z.region).collect();
            let hit = locate_at(level, &regions, *lux)?;
            let mut expansion = Expansion::from_locate(hit, |i| Node::Leaf(&zones[i].record));
            if let Search::Mixed(weight) = *self {
                let last = &zones[zones.len() - 1].record;
                let _ = expansion.try_push_mixed(Node::Leaf(last), weight);
            }
            Ok(expansion)
        }
    }

    fn leaf<'a>(node: &Node<'a>) -> Option<&'a Sample> {
        match *node {
            Node::Leaf(record) => Some(record),
            Node::Root(_) => None,
        }
    }

    fn two_zones() -> Vec<Zone> {
        vec![
            Zone {
                region: Region::new(0.0, 50.0),
                record: Sample { x: 10.0 },
            },
            Zone {
                region: Region::new(50.0, 100.0),
                record: Sample { x: 20.0 },
            },
        ]
    }

    #[test]
    fn test_two_region_lux_scenario() {
        let zones = two_zones();
        let levels = [Level::new(Search::Lux, 2)];
        let tree = build::<_, _, _, 3>(&levels, Node::Root(&zones), &75.0).unwrap();

        assert_eq!(tree.node_count(), 3);
        let root = tree.node(tree.root());
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.ratios()[0], 0.5);

        let merged = merge(&tree, leaf).unwrap();
        assert_eq!(merged, Sample { x: 15.0 });
    }

    #[test]
    fn test_exact_hit_copies_record() {
        let zones = two_zones();
        let levels = [Level::new(Search::Lux, 2)];
        let tree = build::<_, _, _, 3>(&levels, Node::Root(&zones), &20.0).unwrap();
        assert_eq!(tree.node_count(), 2);
        assert_eq!(merge(&tree, leaf).unwrap(), Sample { x: 10.0 });
    }

    #[test]
    fn test_three_way_blend_order() {
        let mut zones = two_zones();
        zones.push(Zone {
            region: Region::new(200.0, 300.0),
            record: Sample { x: 40.0 },
        });
        let levels = [Level::new(Search::Mixed(0.5), 3)];
        let tree = build::<_, _, _, 4>(&levels, Node::Root(&zones), &75.0).unwrap();

        // tmp = lerp(20, 40, 0.5) = 30, result = lerp(10, 30, 0.5) = 20
        assert_eq!(tree.node(tree.root()).children().len(), 3);
        assert_eq!(merge(&tree, leaf).unwrap(), Sample { x: 20.0 });
    }

    #[test]
    fn test_same_record_is_copied() {
        let zones = vec![Zone {
            region: Region::new(0.0, 50.0),
            record: Sample { x: 3.0 },
        }];
        // A single zone mixed with itself: identity short-circuits the blend
        let levels = [Level::new(Search::Mixed(0.3), 2)];
        let tree = build::<_, _, _, 3>(&levels, Node::Root(&zones), &10.0).unwrap();
        assert_eq!(tree.node(tree.root()).children().len(), 2);
        assert_eq!(merge(&tree, leaf).unwrap(), Sample { x: 3.0 });
    }

    #[test]
    fn test_level_limit_enforced() {
        let mut zones = two_zones();
        zones.push(Zone {
            region: Region::new(200.0, 300.0),
            record: Sample { x: 40.0 },
        });
        let levels = [Level::new(Search::Mixed(0.5), 2)];
        let result = build::<_, _, _, 3>(&levels, Node::Root(&zones), &75.0);
        assert!(matches!(
            result,
            Err(TuningError::TooManyChildren {
                level: 0,
                count: 3,
                max: 2
            })
        ));
    }

    #[test]
    fn test_empty_region_table_fails_build() {
        let zones: Vec<Zone> = Vec::new();
        let levels = [Level::new(Search::Lux, 2)];
        let result = build::<_, _, _, 3>(&levels, Node::Root(&zones), &10.0);
        assert!(matches!(result, Err(TuningError::Locate { level: 0, .. })));
    }

    #[test]
    fn test_undersized_arena_rejected_before_build() {
        let zones = two_zones();
        // Two mixed levels need 1 + 3 + 9 nodes
        let levels = [Level::new(Search::Mixed(0.5), 3); 2];
        let result = build::<_, _, _, 12>(&levels, Node::Root(&zones), &10.0);
        assert!(matches!(
            result,
            Err(TuningError::CapacityExceeded { capacity: 12 })
        ));
    }

    #[test]
    fn test_empty_level_table_rejected() {
        let zones = two_zones();
        let levels: [Level<Search>; 0] = [];
        assert!(matches!(
            build::<_, _, _, 1>(&levels, Node::Root(&zones), &10.0),
            Err(TuningError::EmptyLevelTable)
        ));
    }

    #[test]
    fn test_leaf_without_record_fails_merge() {
        let zones = two_zones();
        let tree = CalibrationTree::<_, 1>::new(Node::Root(&zones)).unwrap();
        assert!(matches!(
            merge(&tree, leaf),
            Err(TuningError::MissingLeafRecord { node: 0 })
        ));
    }
}
