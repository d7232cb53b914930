//! Deterministic simulation module
//!
//! Board topology, path sampling, ball animation and bucket accumulation.
//! This module must stay pure and deterministic:
//! - Seeded RNG only
//! - Stable iteration order (arena order for boards, spawn order for balls)
//! - No rendering or platform dependencies

pub mod ball;
pub mod board;
pub mod liquid;
pub mod state;
pub mod tick;
pub mod topology;

pub use ball::{Advance, Ball, Boards, ScriptedDraws, UniformSource, sample_path};
pub use board::{Board, Distribution};
pub use liquid::{
    EMPTY_COLOUR, LiquidBar, LiquidSegment, TagPalette, UNTAGGED_COLOUR, liquefied_balls_by_tag,
    liquid_bar_structure,
};
pub use state::{SimEvent, SimPhase, Simulation};
pub use tick::{TickInput, TopologyEdit, tick};
pub use topology::{
    BallId, BallSet, BoardId, Bucket, BucketId, Column, ColumnEnd, LogicalLocation, NodeRef,
    Output, Peg,
};
