//! Board topology nodes
//!
//! Pegs, output columns and buckets are the three kinds of location a ball
//! can sit at. They share one capability set ([`LogicalLocation`]) and are
//! addressed by value through [`NodeRef`], never by pointer, so a removed
//! board or bucket simply fails to resolve.

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::SimError;

slotmap::new_key_type! {
    /// Stable handle for a board in the simulation arena.
    pub struct BoardId;
}

/// Identifier of a ball, unique for the lifetime of a simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BallId(pub u32);

/// Identifier of a bucket, unique within its board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketId(pub u32);

/// Address of a location a ball can occupy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// Peg by flat triangular index
    Peg { board: BoardId, peg: usize },
    /// Top of an implicit output column
    ColumnTop { board: BoardId, column: usize },
    /// Bottom of an implicit output column, just above its bucket
    ColumnBottom { board: BoardId, column: usize },
    Bucket { board: BoardId, bucket: BucketId },
}

impl NodeRef {
    pub fn board(&self) -> BoardId {
        match *self {
            NodeRef::Peg { board, .. }
            | NodeRef::ColumnTop { board, .. }
            | NodeRef::ColumnBottom { board, .. }
            | NodeRef::Bucket { board, .. } => board,
        }
    }

    pub fn is_bucket(&self) -> bool {
        matches!(self, NodeRef::Bucket { .. })
    }
}

/// Balls resident at a location, with the tag each carried on arrival.
///
/// The tag is captured at registration so a bucket can still colour a ball
/// after the ball itself has settled and left the live set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BallSet {
    balls: BTreeMap<BallId, Option<String>>,
}

impl BallSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ball. Returns false if it was already present.
    pub fn insert(&mut self, id: BallId, tag: Option<String>) -> bool {
        self.balls.insert(id, tag).is_none()
    }

    pub fn remove(&mut self, id: BallId) -> bool {
        self.balls.remove(&id).is_some()
    }

    pub fn contains(&self, id: BallId) -> bool {
        self.balls.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.balls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balls.is_empty()
    }

    pub fn clear(&mut self) {
        self.balls.clear();
    }

    /// Keep only the balls for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(BallId) -> bool) {
        self.balls.retain(|&id, _| keep(id));
    }

    /// Tag of every resident ball, in ball id order
    pub fn tags(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.balls.values().map(|t| t.as_deref())
    }
}

/// Capabilities shared by every node kind
pub trait LogicalLocation {
    fn world_pos(&self) -> Vec2;

    fn balls(&self) -> &BallSet;

    fn balls_mut(&mut self) -> &mut BallSet;

    /// Tags this location has stamped onto balls, oldest first
    fn given_tags(&self) -> &[String];

    fn set_given_tags(&mut self, tags: Vec<String>);

    fn clear_given_tags(&mut self) {
        self.set_given_tags(Vec::new());
    }

    /// Tag applied to balls arriving here, if any
    fn tag(&self) -> Option<&str> {
        None
    }
}

fn check_probability(probability: f32) -> Result<f32, SimError> {
    if (0.0..=1.0).contains(&probability) {
        Ok(probability)
    } else {
        Err(SimError::InvalidProbability(probability))
    }
}

/// A branching node with a left-fall probability
#[derive(Debug, Clone)]
pub struct Peg {
    row: usize,
    index: usize,
    probability: f32,
    pub(crate) world_pos: Vec2,
    balls: BallSet,
    given_tags: Vec<String>,
}

impl Peg {
    pub fn new(row: usize, index: usize, probability: f32) -> Result<Self, SimError> {
        Ok(Self {
            row,
            index,
            probability: check_probability(probability)?,
            world_pos: Vec2::ZERO,
            balls: BallSet::new(),
            given_tags: Vec::new(),
        })
    }

    /// Peg splitting evenly
    pub(crate) fn even(row: usize, index: usize) -> Self {
        Self {
            row,
            index,
            probability: 0.5,
            world_pos: Vec2::ZERO,
            balls: BallSet::new(),
            given_tags: Vec::new(),
        }
    }

    /// Grid coordinate (row, index-in-row); the root peg is (0, 0)
    pub fn grid_pos(&self) -> (usize, usize) {
        (self.row, self.index)
    }

    pub fn left_prob(&self) -> f32 {
        self.probability
    }

    pub fn right_prob(&self) -> f32 {
        1.0 - self.probability
    }

    pub fn set_probability(&mut self, probability: f32) -> Result<(), SimError> {
        self.probability = check_probability(probability)?;
        Ok(())
    }

    /// Output column a left fall lands in, if this peg is on the bottom row
    pub fn left_column(&self, rows: usize) -> Option<usize> {
        (self.row + 1 == rows).then_some(self.index)
    }

    /// Output column a right fall lands in, if this peg is on the bottom row
    pub fn right_column(&self, rows: usize) -> Option<usize> {
        (self.row + 1 == rows).then_some(self.index + 1)
    }
}

impl LogicalLocation for Peg {
    fn world_pos(&self) -> Vec2 {
        self.world_pos
    }

    fn balls(&self) -> &BallSet {
        &self.balls
    }

    fn balls_mut(&mut self) -> &mut BallSet {
        &mut self.balls
    }

    fn given_tags(&self) -> &[String] {
        &self.given_tags
    }

    fn set_given_tags(&mut self, tags: Vec<String>) {
        self.given_tags = tags;
    }
}

/// One end of an output column. Purely positional apart from its residents.
#[derive(Debug, Clone, Default)]
pub struct ColumnEnd {
    pub(crate) world_pos: Vec2,
    balls: BallSet,
    given_tags: Vec<String>,
}

impl LogicalLocation for ColumnEnd {
    fn world_pos(&self) -> Vec2 {
        self.world_pos
    }

    fn balls(&self) -> &BallSet {
        &self.balls
    }

    fn balls_mut(&mut self) -> &mut BallSet {
        &mut self.balls
    }

    fn given_tags(&self) -> &[String] {
        &self.given_tags
    }

    fn set_given_tags(&mut self, tags: Vec<String>) {
        self.given_tags = tags;
    }
}

/// Implicit output slot below the bottom peg row
#[derive(Debug, Clone, Default)]
pub struct Column {
    pub index: usize,
    pub top: ColumnEnd,
    pub bottom: ColumnEnd,
}

impl Column {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }
}

/// Where a pass-through bucket sends its balls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    pub board: BoardId,
    /// Flat peg index balls enter the target board at
    pub entry: usize,
}

/// Collects balls from a contiguous run of output columns
#[derive(Debug, Clone)]
pub struct Bucket {
    id: BucketId,
    pub(crate) start_column: usize,
    pub(crate) width: usize,
    pub(crate) output: Option<Output>,
    tag: Option<String>,
    pub(crate) world_pos: Vec2,
    balls: BallSet,
    given_tags: Vec<String>,
}

impl Bucket {
    pub fn new(id: BucketId, start_column: usize, width: usize) -> Self {
        Self {
            id,
            start_column,
            width,
            output: None,
            tag: None,
            world_pos: Vec2::ZERO,
            balls: BallSet::new(),
            given_tags: Vec::new(),
        }
    }

    pub fn id(&self) -> BucketId {
        self.id
    }

    pub fn start_column(&self) -> usize {
        self.start_column
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// One past the last covered column
    pub fn end_column(&self) -> usize {
        self.start_column + self.width
    }

    pub fn covers(&self, column: usize) -> bool {
        (self.start_column..self.end_column()).contains(&column)
    }

    pub fn output(&self) -> Option<Output> {
        self.output
    }

    /// A sink bucket has no onward output and terminates paths
    pub fn is_sink(&self) -> bool {
        self.output.is_none()
    }

    pub fn set_tag(&mut self, tag: Option<String>) {
        self.tag = tag.filter(|t| !t.is_empty());
    }

    /// Stamp this bucket's tag onto an arriving ball's tag, recording it in
    /// the given-tag history. Returns the ball's tag after arrival.
    pub fn stamp(&mut self, ball_tag: Option<String>) -> Option<String> {
        match &self.tag {
            Some(tag) => {
                if !self.given_tags.iter().any(|t| t == tag) {
                    self.given_tags.push(tag.clone());
                }
                Some(tag.clone())
            }
            None => ball_tag,
        }
    }
}

impl LogicalLocation for Bucket {
    fn world_pos(&self) -> Vec2 {
        self.world_pos
    }

    fn balls(&self) -> &BallSet {
        &self.balls
    }

    fn balls_mut(&mut self) -> &mut BallSet {
        &mut self.balls
    }

    fn given_tags(&self) -> &[String] {
        &self.given_tags
    }

    fn set_given_tags(&mut self, tags: Vec<String>) {
        self.given_tags = tags;
    }

    fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}
