//! Error types for topology validation, path sampling and persistence

use thiserror::Error;

use crate::sim::{BoardId, BucketId};

/// Failures of simulation operations.
///
/// Validation errors leave the topology exactly as it was. The two
/// configuration errors (`InfiniteTopology`, `UncoveredColumn`) come out of
/// path sampling and abort the spawn of that one ball.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("board {0:?} does not exist")]
    UnknownBoard(BoardId),
    #[error("bucket {bucket:?} does not exist on board {board:?}")]
    UnknownBucket { board: BoardId, bucket: BucketId },
    #[error("peg ({row}, {index}) does not exist on a board with {rows} rows")]
    UnknownPeg { row: usize, index: usize, rows: usize },
    #[error("probability {0} must be within [0, 1]")]
    InvalidProbability(f32),
    #[error("spawn rate {0} must be finite and positive")]
    InvalidSpawnRate(f32),
    #[error("speed multiplier {0} must be finite and non-negative")]
    InvalidSpeed(f32),
    #[error("a board needs at least one row (got {0})")]
    InvalidRows(usize),
    #[error("cannot remove the last row of a board")]
    TooFewRows,
    #[error("bucket width must be at least 1")]
    ZeroWidth,
    #[error("width {width} from column {start} exceeds the {columns} available columns")]
    WidthExceedsColumns {
        start: usize,
        width: usize,
        columns: usize,
    },
    #[error("entry peg {entry} does not exist on a board with {pegs} pegs")]
    InvalidEntry { entry: usize, pegs: usize },
    #[error("board graph never reaches a sink bucket (path re-enters board {0:?})")]
    InfiniteTopology(BoardId),
    #[error("no bucket covers output column {column} of board {board:?}")]
    UncoveredColumn { board: BoardId, column: usize },
}

/// Failures at the named-configuration boundary
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no configuration named {0:?}")]
    UnknownConfiguration(String),
    #[error("bucket output points at board {target}, which is not in the configuration")]
    DanglingOutput { target: usize },
    #[error("configuration does not describe a valid workspace: {0}")]
    Restore(#[from] SimError),
}
