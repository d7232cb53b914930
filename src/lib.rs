//! Galton Sim - chained Galton board simulation core
//!
//! Core modules:
//! - `sim`: Board topology, path sampling, ball animation and bucket accumulation
//! - `renderer`: Flat mesh/UV/colour buffers for a rendering collaborator
//! - `persistence`: Named workspace snapshots
//! - `settings`: Runtime configuration

pub mod error;
pub mod persistence;
pub mod renderer;
pub mod settings;
pub mod sim;

pub use error::{PersistenceError, SimError};
pub use settings::Settings;

use glam::Vec2;

/// Simulation configuration constants
pub mod consts {
    /// Height of a board's bucket region, in grid units
    pub const BUCKET_DEPTH: f32 = 3.0;
    /// Vertical gap above the root peg, in grid units
    pub const TOP_MARGIN: f32 = 1.0;
    /// Gap between the bottom peg row and the top of the buckets, in grid units
    pub const COLUMN_GAP: f32 = 0.5;
    /// Vertical distance between peg rows, in grid units
    pub const ROW_HEIGHT: f32 = 0.866_025_4; // sqrt(3) / 2

    /// Segment length below which a move counts as an immediate arrival
    pub const ARRIVAL_EPSILON: f32 = 1e-5;

    /// Peg triangle half-size, in grid units
    pub const PEG_SIZE: f32 = 0.2;
    /// Ball quad half-size, in grid units
    pub const BALL_SIZE: f32 = 0.15;

    /// Depth layers handed to the renderer
    pub const Z_BOARD: f32 = 0.0;
    pub const Z_BUCKET: f32 = 0.0005;
    pub const Z_BALL: f32 = 0.001;
}

/// Number of pegs in a triangular board of `rows` rows
#[inline]
pub const fn triangular(rows: usize) -> usize {
    rows * (rows + 1) / 2
}

/// Flat peg index for grid coordinate (row, index-in-row)
#[inline]
pub const fn grid_to_index(row: usize, index: usize) -> usize {
    triangular(row) + index
}

/// Grid coordinate (row, index-in-row) for a flat peg index
#[inline]
pub fn index_to_grid(peg: usize) -> (usize, usize) {
    // Largest row with triangular(row) <= peg
    let row = (((1.0 + 8.0 * peg as f64).sqrt() - 1.0) / 2.0).floor() as usize;
    // Guard against floating error at exact triangular numbers
    let row = if triangular(row + 1) <= peg {
        row + 1
    } else if triangular(row) > peg {
        row - 1
    } else {
        row
    };
    (row, peg - triangular(row))
}

/// Move `from` toward `to` by at most `max_dist`. Returns the new point and
/// whether `to` was reached.
#[inline]
pub fn lerp_toward(from: Vec2, to: Vec2, max_dist: f32) -> (Vec2, bool) {
    let delta = to - from;
    let dist = delta.length();
    if dist <= max_dist + consts::ARRIVAL_EPSILON {
        (to, true)
    } else {
        (from + delta * (max_dist / dist), false)
    }
}
