use iq_math::LocateError;
use thiserror::Error;

/// Errors that abort a module's calculation for one frame.
#[derive(Error, Debug)]
pub enum TuningError {
    /// Region lookup rejected a level's region table.
    #[error("region lookup failed at level {level}: {source}")]
    Locate {
        /// Tree depth of the level being expanded.
        level: usize,
        #[source]
        source: LocateError,
    },

    /// The strategy table is empty; there is nothing to search.
    #[error("level table is empty")]
    EmptyLevelTable,

    /// Building the tree would need more nodes than the arena holds.
    #[error("calibration tree needs more than {capacity} nodes")]
    CapacityExceeded {
        /// Precomputed arena capacity.
        capacity: usize,
    },

    /// A level produced more children than its table entry allows.
    #[error("level {level} produced {count} children, limit is {max}")]
    TooManyChildren {
        /// Tree depth of the level.
        level: usize,
        /// Children produced.
        count: usize,
        /// Limit declared in the level table.
        max: usize,
    },

    /// A level search produced no children for a non-leaf node.
    #[error("level {level} produced no children")]
    EmptyExpansion {
        /// Tree depth of the level.
        level: usize,
    },

    /// A level search was handed a node from a different level.
    #[error("level {level} cannot expand a {found} node")]
    UnexpectedNode {
        /// Tree depth of the level.
        level: usize,
        /// Kind of node that was found.
        found: &'static str,
    },

    /// A node at the leaf depth does not carry a calibration record.
    #[error("leaf node {node} has no calibration record")]
    MissingLeafRecord {
        /// Arena index of the node.
        node: usize,
    },

    /// Interpolation was asked for a weight outside `[0, 1]`.
    #[error("interpolation ratio {0} is outside [0, 1]")]
    RatioOutOfRange(f32),

    /// Module configuration could not be read or written.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for TuningError {
    fn from(e: std::io::Error) -> Self {
        TuningError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for TuningError {
    fn from(e: serde_json::Error) -> Self {
        TuningError::Config(e.to_string())
    }
}
