//! Balls: path sampling and animation along the sampled path
//!
//! A ball's whole route is drawn once, when it spawns, against the topology
//! and probabilities in effect at that instant. Later probability edits only
//! affect balls sampled afterwards. The animator then walks the ball along
//! that fixed route, a fraction of a segment at a time.

use glam::Vec2;
use rand::Rng;
use rand_pcg::Pcg32;
use slotmap::SlotMap;

use super::board::Board;
use super::topology::{BallId, BoardId, LogicalLocation, NodeRef};
use crate::error::SimError;
use crate::{index_to_grid, lerp_toward};

/// Arena of boards, addressed by stable handles
pub type Boards = SlotMap<BoardId, Board>;

/// One uniform draw in [0, 1) per peg visit
pub trait UniformSource {
    fn next_unit(&mut self) -> f32;
}

impl UniformSource for Pcg32 {
    fn next_unit(&mut self) -> f32 {
        self.random::<f32>()
    }
}

/// Replays a fixed sequence of draws, cycling when exhausted
#[derive(Debug, Clone)]
pub struct ScriptedDraws {
    draws: Vec<f32>,
    next: usize,
}

impl ScriptedDraws {
    pub fn new(draws: impl Into<Vec<f32>>) -> Self {
        Self {
            draws: draws.into(),
            next: 0,
        }
    }
}

impl UniformSource for ScriptedDraws {
    fn next_unit(&mut self) -> f32 {
        if self.draws.is_empty() {
            return 0.5;
        }
        let value = self.draws[self.next % self.draws.len()];
        self.next += 1;
        value
    }
}

/// Sample a full route from `start` to a sink bucket.
///
/// Entering a board the path has already crossed means the board graph has
/// a cycle, which is reported instead of looping.
pub fn sample_path<S: UniformSource + ?Sized>(
    boards: &Boards,
    start: NodeRef,
    rng: &mut S,
) -> Result<Vec<NodeRef>, SimError> {
    let mut path = vec![start];
    let mut crossed = vec![start.board()];
    let mut current = start;

    loop {
        let board_id = current.board();
        let board = boards
            .get(board_id)
            .ok_or(SimError::UnknownBoard(board_id))?;

        let next = match current {
            NodeRef::Bucket { bucket, .. } => {
                let bucket = board.bucket(bucket).ok_or(SimError::UnknownBucket {
                    board: board_id,
                    bucket,
                })?;
                let Some(output) = bucket.output() else {
                    return Ok(path);
                };
                if crossed.contains(&output.board) {
                    return Err(SimError::InfiniteTopology(output.board));
                }
                crossed.push(output.board);
                let target = boards
                    .get(output.board)
                    .ok_or(SimError::UnknownBoard(output.board))?;
                let entry = if output.entry < target.peg_count() {
                    output.entry
                } else {
                    0
                };
                NodeRef::Peg {
                    board: output.board,
                    peg: entry,
                }
            }
            NodeRef::Peg { peg, .. } => {
                let unknown = || {
                    let (row, index) = index_to_grid(peg);
                    SimError::UnknownPeg {
                        row,
                        index,
                        rows: board.rows(),
                    }
                };
                let node = board.peg_at(peg).ok_or_else(unknown)?;
                let take_left = rng.next_unit() < node.left_prob();
                let child = if take_left {
                    board.left_child(peg)
                } else {
                    board.right_child(peg)
                };
                match child {
                    Some(child) => NodeRef::Peg {
                        board: board_id,
                        peg: child,
                    },
                    None => {
                        let column = if take_left {
                            node.left_column(board.rows())
                        } else {
                            node.right_column(board.rows())
                        }
                        .ok_or_else(unknown)?;
                        NodeRef::ColumnTop {
                            board: board_id,
                            column,
                        }
                    }
                }
            }
            NodeRef::ColumnTop { column, .. } => NodeRef::ColumnBottom {
                board: board_id,
                column,
            },
            NodeRef::ColumnBottom { column, .. } => {
                // Resolved now rather than cached on the peg
                let bucket =
                    board
                        .bucket_for_column(column)
                        .ok_or(SimError::UncoveredColumn {
                            board: board_id,
                            column,
                        })?;
                NodeRef::Bucket {
                    board: board_id,
                    bucket: bucket.id(),
                }
            }
        };
        path.push(next);
        current = next;
    }
}

/// Outcome of advancing a ball for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Still travelling
    Moving,
    /// Held at the boundary of a closed board's bucket
    Suspended,
    /// Resting in its sink bucket
    Settled,
    /// Its path refers to a node that no longer exists
    Stale,
}

/// A ball travelling along its pre-sampled path
#[derive(Debug, Clone)]
pub struct Ball {
    pub id: BallId,
    pub pos: Vec2,
    pub tag: Option<String>,
    path: Vec<NodeRef>,
    /// Index of the last node fully reached
    cursor: usize,
}

impl Ball {
    /// Sample a path from `start` and register the new ball there
    pub fn spawn<S: UniformSource + ?Sized>(
        id: BallId,
        start: NodeRef,
        boards: &mut Boards,
        rng: &mut S,
    ) -> Result<Self, SimError> {
        let path = sample_path(boards, start, rng)?;
        let pos = resolve_pos(boards, &start).ok_or(SimError::UnknownBoard(start.board()))?;
        let ball = Self {
            id,
            pos,
            tag: None,
            path,
            cursor: 0,
        };
        if let Some(loc) = resolve_mut(boards, &start) {
            loc.balls_mut().insert(id, None);
        }
        Ok(ball)
    }

    pub fn path(&self) -> &[NodeRef] {
        &self.path
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Node the ball last reached
    pub fn current_node(&self) -> NodeRef {
        self.path[self.cursor]
    }

    pub fn next_node(&self) -> Option<NodeRef> {
        self.path.get(self.cursor + 1).copied()
    }

    /// Whether the ball has reached the last node of its path
    pub fn is_terminal(&self) -> bool {
        self.cursor + 1 >= self.path.len()
    }

    /// Move a fraction `f` of the current segment's length toward the next
    /// node, carrying leftover budget across every node reached this call.
    pub fn advance(&mut self, boards: &mut Boards, f: f32) -> Advance {
        let mut budget = f.max(0.0);
        loop {
            if self.is_terminal() {
                return Advance::Settled;
            }
            let current = self.path[self.cursor];
            let next = self.path[self.cursor + 1];
            let (Some(from), Some(to)) = (resolve_pos(boards, &current), resolve_pos(boards, &next))
            else {
                self.abandon(boards);
                return Advance::Stale;
            };

            let segment = (to - from).length();
            let remaining = (to - self.pos).length();
            let (pos, reached) = lerp_toward(self.pos, to, budget * segment);
            self.pos = pos;
            if !reached {
                return Advance::Moving;
            }

            if next.is_bucket() && !boards.get(next.board()).is_some_and(Board::is_open) {
                return Advance::Suspended;
            }

            // Degenerate segments cost nothing
            let used = if segment > crate::consts::ARRIVAL_EPSILON {
                remaining / segment
            } else {
                0.0
            };
            budget = (budget - used).max(0.0);

            if let Some(loc) = resolve_mut(boards, &current) {
                loc.balls_mut().remove(self.id);
            }
            if let NodeRef::Bucket { board, bucket } = next {
                if let Some(bucket) = boards.get_mut(board).and_then(|b| b.bucket_mut(bucket)) {
                    self.tag = bucket.stamp(self.tag.take());
                }
            }
            if let Some(loc) = resolve_mut(boards, &next) {
                loc.balls_mut().insert(self.id, self.tag.clone());
            }
            self.cursor += 1;
        }
    }

    /// Drop out of whatever node still holds this ball
    pub(crate) fn abandon(&mut self, boards: &mut Boards) {
        let current = self.path[self.cursor];
        if let Some(loc) = resolve_mut(boards, &current) {
            loc.balls_mut().remove(self.id);
        }
    }
}

fn resolve_pos(boards: &Boards, node: &NodeRef) -> Option<Vec2> {
    boards
        .get(node.board())
        .and_then(|b| b.location(node))
        .map(|loc| loc.world_pos())
}

fn resolve_mut<'a>(
    boards: &'a mut Boards,
    node: &NodeRef,
) -> Option<&'a mut dyn LogicalLocation> {
    boards
        .get_mut(node.board())
        .and_then(|b| b.location_mut(node))
}
