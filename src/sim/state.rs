//! Simulation context and board wiring
//!
//! One `Simulation` owns everything a run needs: the board arena, the live
//! balls, the seeded RNG and the spawn clock. Every topology mutation goes
//! through here so bucket outputs and board inputs stay in step.

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::ball::{Advance, Ball, Boards, UniformSource};
use super::board::{Board, Distribution};
use super::liquid::{LiquidBar, TagPalette, liquid_bar_structure};
use super::topology::{BallId, BoardId, Bucket, BucketId, LogicalLocation, NodeRef, Output};
use crate::error::SimError;
use crate::settings::Settings;

/// Current phase of the simulation clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimPhase {
    /// No balls, empty buckets, clock disarmed
    #[default]
    Stopped,
    /// Spawning and advancing balls
    Running,
    /// Everything frozen in place
    Paused,
}

/// Things that happened during a tick, drained by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    PhaseChanged { from: SimPhase, to: SimPhase },
    BoardAdded(BoardId),
    BoardRemoved(BoardId),
    Spawned { ball: BallId, board: BoardId },
    /// The board graph could not route a new ball to a sink
    SpawnFailed { board: BoardId, error: SimError },
    Settled { ball: BallId, board: BoardId, bucket: BucketId },
    /// A ball's route referenced a node that was edited away
    StaleBall { ball: BallId },
    /// A bucket overflowed and the shared capacity grew
    BucketsEnlarged { capacity: f32 },
    EditRejected { error: SimError },
}

/// The simulation context
#[derive(Debug, Clone)]
pub struct Simulation {
    pub(crate) settings: Settings,
    pub(crate) boards: Boards,
    /// Balls still travelling, in spawn order
    pub(crate) balls: Vec<Ball>,
    pub(crate) rng: Pcg32,
    pub(crate) phase: SimPhase,
    pub(crate) spawn_rate: f32,
    pub(crate) speed: f32,
    /// Ball count a full bar represents
    pub(crate) capacity: f32,
    /// Seconds until the next spawn batch
    pub(crate) time_till_next: f32,
    /// Balls spawned since the last stop or bucket clear
    pub(crate) spawned: usize,
    pub(crate) palette: TagPalette,
    pub(crate) events: Vec<SimEvent>,
    next_ball: u32,
}

impl Simulation {
    pub fn new(settings: Settings) -> Result<Self, SimError> {
        settings.validate()?;
        Ok(Self {
            boards: Boards::with_key(),
            balls: Vec::new(),
            rng: Pcg32::seed_from_u64(settings.seed),
            phase: SimPhase::Stopped,
            spawn_rate: settings.spawn_rate,
            speed: settings.speed,
            capacity: settings.effective_capacity(),
            time_till_next: 0.0,
            spawned: 0,
            palette: TagPalette::new(),
            events: Vec::new(),
            next_ball: 1,
            settings,
        })
    }

    // === Accessors ===

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn phase(&self) -> SimPhase {
        self.phase
    }

    pub fn spawn_rate(&self) -> f32 {
        self.spawn_rate
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn capacity(&self) -> f32 {
        self.capacity
    }

    pub fn time_till_next(&self) -> f32 {
        self.time_till_next
    }

    /// Seconds between spawn batches at the current rate
    pub fn spawn_interval(&self) -> f32 {
        1.0 / (self.spawn_rate * self.spawn_rate)
    }

    pub fn spawned(&self) -> usize {
        self.spawned
    }

    pub fn boards(&self) -> &Boards {
        &self.boards
    }

    pub fn board(&self, id: BoardId) -> Result<&Board, SimError> {
        self.boards.get(id).ok_or(SimError::UnknownBoard(id))
    }

    fn board_mut(&mut self, id: BoardId) -> Result<&mut Board, SimError> {
        self.boards.get_mut(id).ok_or(SimError::UnknownBoard(id))
    }

    pub fn bucket(&self, board: BoardId, bucket: BucketId) -> Result<&Bucket, SimError> {
        self.board(board)?
            .bucket(bucket)
            .ok_or(SimError::UnknownBucket { board, bucket })
    }

    fn bucket_mut(&mut self, board: BoardId, bucket: BucketId) -> Result<&mut Bucket, SimError> {
        self.board_mut(board)?
            .bucket_mut(bucket)
            .ok_or(SimError::UnknownBucket { board, bucket })
    }

    /// Live balls, in spawn order
    pub fn balls(&self) -> &[Ball] {
        &self.balls
    }

    pub fn palette(&self) -> &TagPalette {
        &self.palette
    }

    /// Take every event raised since the last drain
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    // === Board lifecycle ===

    /// Add a board of the given shape. Returns its handle.
    pub fn add_board(
        &mut self,
        rows: usize,
        shape: Distribution,
        position: Vec2,
    ) -> Result<BoardId, SimError> {
        let mut board =
            Board::with_distribution(rows, shape, position, self.settings.board_size)?;
        let id = self.boards.insert_with_key(|id| {
            board.set_id(id);
            board
        });
        log::info!("Added {} board with {rows} rows", shape.as_str());
        self.events.push(SimEvent::BoardAdded(id));
        Ok(id)
    }

    /// Remove a board after detaching every connection into and out of it.
    /// Balls routed through it go stale on their next advance.
    pub fn remove_board(&mut self, id: BoardId) -> Result<Board, SimError> {
        let board = self.board(id)?;
        let outbound: Vec<(BucketId, Output)> = board
            .buckets()
            .iter()
            .filter_map(|b| b.output().map(|o| (b.id(), o)))
            .collect();
        let inbound = board.inputs().to_vec();

        for (bucket, output) in outbound {
            if let Some(target) = self.boards.get_mut(output.board) {
                target.detach_input(id, bucket);
            }
        }
        for (source, bucket) in inbound {
            if let Some(bucket) = self
                .boards
                .get_mut(source)
                .and_then(|b| b.bucket_mut(bucket))
            {
                bucket.output = None;
            }
        }

        let board = self.boards.remove(id).ok_or(SimError::UnknownBoard(id))?;
        log::info!("Removed board with {} rows", board.rows());
        self.events.push(SimEvent::BoardRemoved(id));
        Ok(board)
    }

    pub fn add_row(&mut self, id: BoardId) -> Result<(), SimError> {
        self.board_mut(id)?.add_row();
        Ok(())
    }

    /// Remove a board's bottom row, detaching the output of a bucket that
    /// disappears with it and re-pointing inbound entries past the new
    /// peg count at the root.
    pub fn remove_row(&mut self, id: BoardId) -> Result<(), SimError> {
        let removed = self.board_mut(id)?.remove_row()?;
        self.detach_outputs(id, &removed);

        let board = self.board(id)?;
        let pegs = board.peg_count();
        for (source, bucket) in board.inputs().to_vec() {
            if let Some(bucket) = self
                .boards
                .get_mut(source)
                .and_then(|b| b.bucket_mut(bucket))
            {
                if let Some(output) = bucket.output.as_mut() {
                    if output.entry >= pegs {
                        output.entry = 0;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn move_board(&mut self, id: BoardId, position: Vec2) -> Result<(), SimError> {
        self.board_mut(id)?.move_to(position);
        Ok(())
    }

    pub fn resize_board(&mut self, id: BoardId, size: Vec2) -> Result<(), SimError> {
        self.board_mut(id)?.resize(size);
        Ok(())
    }

    pub fn set_board_open(&mut self, id: BoardId, open: bool) -> Result<(), SimError> {
        self.board_mut(id)?.set_open(open);
        log::debug!("Board {}", if open { "opened" } else { "closed" });
        Ok(())
    }

    pub fn set_board_distribution(
        &mut self,
        id: BoardId,
        shape: Distribution,
    ) -> Result<(), SimError> {
        self.board_mut(id)?.apply_distribution(shape);
        Ok(())
    }

    // === Peg and bucket edits ===

    pub fn set_peg_probability(
        &mut self,
        board: BoardId,
        row: usize,
        index: usize,
        probability: f32,
    ) -> Result<(), SimError> {
        self.board_mut(board)?.set_probability(row, index, probability)
    }

    /// Set or clear a bucket's tag. A new tag gets its palette colour now.
    pub fn set_bucket_tag(
        &mut self,
        board: BoardId,
        bucket: BucketId,
        tag: Option<String>,
    ) -> Result<(), SimError> {
        self.bucket_mut(board, bucket)?.set_tag(tag.clone());
        if let Some(tag) = tag.as_deref().filter(|t| !t.is_empty()) {
            self.palette.colour(Some(tag));
        }
        Ok(())
    }

    pub fn set_bucket_width(
        &mut self,
        board: BoardId,
        bucket: BucketId,
        width: usize,
    ) -> Result<(), SimError> {
        let removed = self.board_mut(board)?.set_bucket_width(bucket, width)?;
        self.detach_outputs(board, &removed);
        Ok(())
    }

    /// Route a bucket into `target`, entering at flat peg index `entry`
    pub fn set_bucket_output(
        &mut self,
        board: BoardId,
        bucket: BucketId,
        target: BoardId,
        entry: usize,
    ) -> Result<(), SimError> {
        self.bucket(board, bucket)?;
        let pegs = self.board(target)?.peg_count();
        if entry >= pegs {
            return Err(SimError::InvalidEntry { entry, pegs });
        }
        self.clear_bucket_output(board, bucket)?;
        self.bucket_mut(board, bucket)?.output = Some(Output {
            board: target,
            entry,
        });
        self.board_mut(target)?.attach_input(board, bucket);
        Ok(())
    }

    /// Make a bucket a sink again
    pub fn clear_bucket_output(&mut self, board: BoardId, bucket: BucketId) -> Result<(), SimError> {
        if let Some(old) = self.bucket_mut(board, bucket)?.output.take() {
            if let Some(target) = self.boards.get_mut(old.board) {
                target.detach_input(board, bucket);
            }
        }
        Ok(())
    }

    fn detach_outputs(&mut self, board: BoardId, removed: &[Bucket]) {
        for bucket in removed {
            if let Some(output) = bucket.output() {
                if let Some(target) = self.boards.get_mut(output.board) {
                    target.detach_input(board, bucket.id());
                }
            }
        }
    }

    /// Forget which tags a bucket has handed out
    pub fn clear_given_tags(&mut self, board: BoardId, bucket: BucketId) -> Result<(), SimError> {
        self.bucket_mut(board, bucket)?.clear_given_tags();
        Ok(())
    }

    /// Empty every bucket's resident set. Balls still travelling are kept.
    pub fn clear_buckets(&mut self) {
        let live: Vec<BallId> = self.balls.iter().map(|b| b.id).collect();
        for (_, board) in self.boards.iter_mut() {
            for bucket in board.buckets_mut() {
                bucket.balls_mut().retain(|id| live.contains(&id));
            }
        }
        self.spawned = self.balls.len();
        self.capacity = self.settings.effective_capacity();
    }

    // === Spawning and advancing ===

    /// Boards nothing feeds into, in arena order
    pub fn entry_points(&self) -> Vec<BoardId> {
        self.boards
            .iter()
            .filter(|(_, board)| !board.has_inputs())
            .map(|(id, _)| id)
            .collect()
    }

    /// Spawn one ball at every entry point using the simulation RNG
    pub fn spawn(&mut self) -> usize {
        let mut rng = self.rng.clone();
        let spawned = self.spawn_with(&mut rng);
        self.rng = rng;
        spawned
    }

    /// Spawn one ball at every entry point, drawing from `source`.
    /// A board whose graph can't reach a sink gets a `SpawnFailed` event.
    pub fn spawn_with<S: UniformSource + ?Sized>(&mut self, source: &mut S) -> usize {
        let mut count = 0;
        for board in self.entry_points() {
            let id = BallId(self.next_ball);
            let start = NodeRef::Peg { board, peg: 0 };
            match Ball::spawn(id, start, &mut self.boards, source) {
                Ok(ball) => {
                    log::debug!("Spawned ball {} with {} path nodes", id.0, ball.path().len());
                    self.next_ball += 1;
                    self.spawned += 1;
                    self.balls.push(ball);
                    self.events.push(SimEvent::Spawned { ball: id, board });
                    count += 1;
                }
                Err(error) => {
                    log::error!("Spawn aborted: {error}");
                    self.events.push(SimEvent::SpawnFailed { board, error });
                }
            }
        }
        count
    }

    /// Advance every live ball by fraction `f` of a segment. Settled and
    /// stale balls leave the live list, then capacity grows to fit the
    /// fullest bucket.
    pub fn advance_balls(&mut self, f: f32) {
        let boards = &mut self.boards;
        let events = &mut self.events;
        self.balls.retain_mut(|ball| match ball.advance(boards, f) {
            Advance::Moving | Advance::Suspended => true,
            Advance::Settled => {
                if let NodeRef::Bucket { board, bucket } = ball.current_node() {
                    events.push(SimEvent::Settled {
                        ball: ball.id,
                        board,
                        bucket,
                    });
                }
                false
            }
            Advance::Stale => {
                log::warn!("Ball {} dropped: its route no longer exists", ball.id.0);
                events.push(SimEvent::StaleBall { ball: ball.id });
                false
            }
        });
        self.enforce_capacity();
    }

    /// Grow the shared capacity until every bucket fits
    pub fn enforce_capacity(&mut self) {
        let fullest = self
            .boards
            .values()
            .flat_map(|b| b.buckets())
            .map(|b| b.balls().len())
            .max()
            .unwrap_or(0) as f32;
        if fullest <= self.capacity {
            return;
        }
        let factor = self.settings.effective_enlarge_factor();
        while fullest > self.capacity {
            self.capacity *= factor;
        }
        log::info!("Buckets enlarged to capacity {}", self.capacity);
        self.events.push(SimEvent::BucketsEnlarged {
            capacity: self.capacity,
        });
    }

    /// Drop every ball and empty every node, keeping tag history
    pub(crate) fn discard_balls(&mut self) {
        for ball in &mut self.balls {
            ball.abandon(&mut self.boards);
        }
        self.balls.clear();
        for (_, board) in self.boards.iter_mut() {
            for bucket in board.buckets_mut() {
                bucket.balls_mut().clear();
            }
        }
        self.spawned = 0;
        self.capacity = self.settings.effective_capacity();
    }

    // === Queries ===

    /// Balls resting in sink buckets across all boards
    pub fn sink_resident_total(&self) -> usize {
        self.boards
            .values()
            .flat_map(|b| b.buckets())
            .filter(|b| b.is_sink())
            .map(|b| b.balls().len())
            .sum()
    }

    /// Stacked bar for one bucket at the current capacity
    pub fn liquid_bar(&self, board: BoardId, bucket: BucketId) -> Result<LiquidBar, SimError> {
        let bucket = self.bucket(board, bucket)?;
        Ok(liquid_bar_structure(bucket, self.capacity, &self.palette))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ball::ScriptedDraws;

    fn sim() -> Simulation {
        Simulation::new(Settings::default()).unwrap()
    }

    fn first_bucket(sim: &Simulation, board: BoardId) -> BucketId {
        sim.board(board).unwrap().buckets()[0].id()
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = Settings {
            speed: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(
            Simulation::new(settings),
            Err(SimError::InvalidSpeed(_))
        ));
    }

    #[test]
    fn test_entry_points_skip_fed_boards() {
        let mut sim = sim();
        let top = sim.add_board(2, Distribution::Binomial, Vec2::ZERO).unwrap();
        let below = sim
            .add_board(2, Distribution::Binomial, Vec2::new(0.0, -12.0))
            .unwrap();
        assert_eq!(sim.entry_points(), vec![top, below]);

        let bucket = first_bucket(&sim, top);
        sim.set_bucket_output(top, bucket, below, 0).unwrap();
        assert_eq!(sim.entry_points(), vec![top]);
        assert_eq!(sim.board(below).unwrap().inputs(), [(top, bucket)]);
    }

    #[test]
    fn test_output_rejects_missing_entry_peg() {
        let mut sim = sim();
        let a = sim.add_board(1, Distribution::Binomial, Vec2::ZERO).unwrap();
        let b = sim.add_board(2, Distribution::Binomial, Vec2::X * 20.0).unwrap();
        let bucket = first_bucket(&sim, a);
        assert_eq!(
            sim.set_bucket_output(a, bucket, b, 3),
            Err(SimError::InvalidEntry { entry: 3, pegs: 3 })
        );
        assert!(sim.bucket(a, bucket).unwrap().is_sink());
        assert!(!sim.board(b).unwrap().has_inputs());
    }

    #[test]
    fn test_rewiring_detaches_old_target() {
        let mut sim = sim();
        let a = sim.add_board(1, Distribution::Binomial, Vec2::ZERO).unwrap();
        let b = sim.add_board(1, Distribution::Binomial, Vec2::X * 20.0).unwrap();
        let c = sim.add_board(1, Distribution::Binomial, Vec2::X * 40.0).unwrap();
        let bucket = first_bucket(&sim, a);

        sim.set_bucket_output(a, bucket, b, 0).unwrap();
        sim.set_bucket_output(a, bucket, c, 0).unwrap();
        assert!(!sim.board(b).unwrap().has_inputs());
        assert_eq!(sim.board(c).unwrap().inputs(), [(a, bucket)]);

        sim.clear_bucket_output(a, bucket).unwrap();
        assert!(!sim.board(c).unwrap().has_inputs());
        assert!(sim.bucket(a, bucket).unwrap().is_sink());
    }

    #[test]
    fn test_remove_board_detaches_both_directions() {
        let mut sim = sim();
        let a = sim.add_board(1, Distribution::Binomial, Vec2::ZERO).unwrap();
        let b = sim.add_board(1, Distribution::Binomial, Vec2::X * 20.0).unwrap();
        let c = sim.add_board(1, Distribution::Binomial, Vec2::X * 40.0).unwrap();
        let into_b = first_bucket(&sim, a);
        let out_of_b = first_bucket(&sim, b);
        sim.set_bucket_output(a, into_b, b, 0).unwrap();
        sim.set_bucket_output(b, out_of_b, c, 0).unwrap();

        sim.remove_board(b).unwrap();
        assert!(sim.bucket(a, into_b).unwrap().is_sink());
        assert!(!sim.board(c).unwrap().has_inputs());
        assert_eq!(sim.board(b).unwrap_err(), SimError::UnknownBoard(b));
        assert_eq!(sim.entry_points(), vec![a, c]);
    }

    #[test]
    fn test_remove_row_resets_inbound_entry() {
        let mut sim = sim();
        let a = sim.add_board(1, Distribution::Binomial, Vec2::ZERO).unwrap();
        let b = sim.add_board(3, Distribution::Binomial, Vec2::X * 20.0).unwrap();
        let bucket = first_bucket(&sim, a);
        sim.set_bucket_output(a, bucket, b, 5).unwrap();

        sim.remove_row(b).unwrap();
        let output = sim.bucket(a, bucket).unwrap().output().unwrap();
        assert_eq!(output.entry, 0);
    }

    #[test]
    fn test_remove_row_detaches_lost_bucket() {
        let mut sim = sim();
        let a = sim.add_board(2, Distribution::Binomial, Vec2::ZERO).unwrap();
        let b = sim.add_board(1, Distribution::Binomial, Vec2::X * 20.0).unwrap();
        let last = sim.board(a).unwrap().bucket_for_column(2).unwrap().id();
        sim.set_bucket_output(a, last, b, 0).unwrap();

        sim.remove_row(a).unwrap();
        assert!(sim.bucket(a, last).is_err());
        assert!(!sim.board(b).unwrap().has_inputs());
    }

    #[test]
    fn test_widening_detaches_swallowed_buckets() {
        let mut sim = sim();
        let a = sim.add_board(2, Distribution::Binomial, Vec2::ZERO).unwrap();
        let b = sim.add_board(1, Distribution::Binomial, Vec2::X * 20.0).unwrap();
        let first = sim.board(a).unwrap().bucket_for_column(0).unwrap().id();
        let second = sim.board(a).unwrap().bucket_for_column(1).unwrap().id();
        sim.set_bucket_output(a, second, b, 0).unwrap();

        sim.set_bucket_width(a, first, 2).unwrap();
        assert!(!sim.board(b).unwrap().has_inputs());
        assert_eq!(
            sim.set_bucket_width(a, first, 4),
            Err(SimError::WidthExceedsColumns {
                start: 0,
                width: 4,
                columns: 3
            })
        );
    }

    #[test]
    fn test_cyclic_graph_fails_spawn_without_adding_balls() {
        let mut sim = sim();
        let a = sim.add_board(1, Distribution::Binomial, Vec2::ZERO).unwrap();
        let b = sim.add_board(1, Distribution::Binomial, Vec2::X * 20.0).unwrap();
        let c = sim.add_board(1, Distribution::Binomial, Vec2::X * 40.0).unwrap();
        // a feeds the b <-> c loop
        let feeds: Vec<_> = sim.board(a).unwrap().buckets().iter().map(|k| k.id()).collect();
        for bucket in feeds {
            sim.set_bucket_output(a, bucket, b, 0).unwrap();
        }
        for (from, to) in [(b, c), (c, b)] {
            let ids: Vec<_> = sim.board(from).unwrap().buckets().iter().map(|k| k.id()).collect();
            for bucket in ids {
                sim.set_bucket_output(from, bucket, to, 0).unwrap();
            }
        }
        sim.drain_events();

        assert_eq!(sim.spawn(), 0);
        assert!(sim.balls().is_empty());
        assert!(sim.board(a).unwrap().peg_at(0).unwrap().balls().is_empty());
        assert!(matches!(
            sim.drain_events().as_slice(),
            [SimEvent::SpawnFailed {
                error: SimError::InfiniteTopology(_),
                ..
            }]
        ));
    }

    #[test]
    fn test_two_balls_split_left_and_right() {
        let mut sim = sim();
        let b = sim.add_board(1, Distribution::Binomial, Vec2::ZERO).unwrap();
        let mut draws = ScriptedDraws::new([0.3, 0.7]);
        assert_eq!(sim.spawn_with(&mut draws), 1);
        assert_eq!(sim.spawn_with(&mut draws), 1);
        sim.advance_balls(100.0);

        let board = sim.board(b).unwrap();
        assert_eq!(board.bucket_for_column(0).unwrap().balls().len(), 1);
        assert_eq!(board.bucket_for_column(1).unwrap().balls().len(), 1);
        assert!(sim.balls().is_empty());
        assert_eq!(sim.sink_resident_total(), 2);
    }

    #[test]
    fn test_probability_edit_only_affects_later_balls() {
        let mut sim = sim();
        let b = sim.add_board(3, Distribution::Binomial, Vec2::ZERO).unwrap();
        for _ in 0..10 {
            sim.spawn();
        }
        let before: Vec<Vec<NodeRef>> = sim.balls().iter().map(|ball| ball.path().to_vec()).collect();

        for row in 0..3 {
            for index in 0..=row {
                sim.set_peg_probability(b, row, index, 0.0).unwrap();
            }
        }
        sim.spawn();

        let after: Vec<Vec<NodeRef>> = sim.balls().iter().map(|ball| ball.path().to_vec()).collect();
        assert_eq!(&after[..10], &before[..]);
        // Probability 0 always falls right, into the last column
        assert!(after[10].contains(&NodeRef::ColumnTop { board: b, column: 3 }));
    }

    #[test]
    fn test_overflow_enlarges_capacity() {
        let settings = Settings {
            bucket_capacity: 2.0,
            enlarge_factor: 2.0,
            ..Default::default()
        };
        let mut sim = Simulation::new(settings).unwrap();
        let b = sim.add_board(1, Distribution::Binomial, Vec2::ZERO).unwrap();
        sim.set_peg_probability(b, 0, 0, 1.0).unwrap();
        for _ in 0..5 {
            sim.spawn();
        }
        sim.advance_balls(100.0);

        assert_eq!(sim.capacity(), 8.0);
        let enlarged: Vec<SimEvent> = sim
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, SimEvent::BucketsEnlarged { .. }))
            .collect();
        assert_eq!(enlarged, vec![SimEvent::BucketsEnlarged { capacity: 8.0 }]);
        let left = first_bucket(&sim, b);
        let bar = sim.liquid_bar(b, left).unwrap();
        assert!((bar.filled() - 5.0 / 8.0).abs() < 1e-6);

        // Already fits, nothing to report
        sim.enforce_capacity();
        assert!(sim.drain_events().is_empty());
    }

    #[test]
    fn test_tagged_bucket_colours_bar() {
        let mut sim = sim();
        let b = sim.add_board(1, Distribution::Binomial, Vec2::ZERO).unwrap();
        sim.set_peg_probability(b, 0, 0, 1.0).unwrap();
        let left = first_bucket(&sim, b);
        sim.set_bucket_tag(b, left, Some("red".into())).unwrap();
        sim.spawn();
        sim.advance_balls(100.0);

        let bar = sim.liquid_bar(b, left).unwrap();
        assert_eq!(bar.segments.len(), 1);
        assert_eq!(bar.segments[0].tag.as_deref(), Some("red"));
        assert_eq!(bar.segments[0].colour, sim.palette().peek(Some("red")));
    }

    #[test]
    fn test_clear_buckets_keeps_tag_history() {
        let mut sim = sim();
        let b = sim.add_board(1, Distribution::Binomial, Vec2::ZERO).unwrap();
        sim.set_peg_probability(b, 0, 0, 1.0).unwrap();
        let left = first_bucket(&sim, b);
        sim.set_bucket_tag(b, left, Some("red".into())).unwrap();
        sim.spawn();
        sim.advance_balls(100.0);

        sim.clear_buckets();
        let bucket = sim.bucket(b, left).unwrap();
        assert!(bucket.balls().is_empty());
        assert_eq!(bucket.given_tags(), ["red".to_string()]);
        assert_eq!(sim.spawned(), 0);

        sim.clear_given_tags(b, left).unwrap();
        assert!(sim.bucket(b, left).unwrap().given_tags().is_empty());
    }

    #[test]
    fn test_removed_board_makes_live_balls_stale() {
        let mut sim = sim();
        let a = sim.add_board(1, Distribution::Binomial, Vec2::ZERO).unwrap();
        let b = sim.add_board(2, Distribution::Binomial, Vec2::X * 20.0).unwrap();
        let feeds: Vec<_> = sim.board(a).unwrap().buckets().iter().map(|k| k.id()).collect();
        for bucket in feeds {
            sim.set_bucket_output(a, bucket, b, 0).unwrap();
        }
        sim.spawn();
        sim.remove_board(b).unwrap();
        sim.drain_events();

        sim.advance_balls(100.0);
        assert!(sim.balls().is_empty());
        assert!(matches!(sim.drain_events().as_slice(), [SimEvent::StaleBall { .. }]));
    }
}
