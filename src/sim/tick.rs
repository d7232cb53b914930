//! Per-frame simulation tick
//!
//! Advances the simulation by one frame of elapsed time. Topology edits
//! queued on the input are applied first, while no ball is mid-advance.

use glam::Vec2;

use super::board::Distribution;
use super::state::{SimEvent, SimPhase, Simulation};
use super::topology::{BoardId, BucketId};
use crate::error::SimError;

/// A structural or probability edit, applied between ticks
#[derive(Debug, Clone, PartialEq)]
pub enum TopologyEdit {
    AddBoard {
        rows: usize,
        shape: Distribution,
        position: Vec2,
    },
    RemoveBoard(BoardId),
    AddRow(BoardId),
    RemoveRow(BoardId),
    MoveBoard {
        board: BoardId,
        position: Vec2,
    },
    SetBoardOpen {
        board: BoardId,
        open: bool,
    },
    SetDistribution {
        board: BoardId,
        shape: Distribution,
    },
    SetPegProbability {
        board: BoardId,
        row: usize,
        index: usize,
        probability: f32,
    },
    SetBucketTag {
        board: BoardId,
        bucket: BucketId,
        tag: Option<String>,
    },
    SetBucketWidth {
        board: BoardId,
        bucket: BucketId,
        width: usize,
    },
    /// Route into `(target board, entry peg)`, or make the bucket a sink
    SetBucketOutput {
        board: BoardId,
        bucket: BucketId,
        output: Option<(BoardId, usize)>,
    },
    ClearGivenTags {
        board: BoardId,
        bucket: BucketId,
    },
    ClearBuckets,
}

/// Input for a single tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    pub run: bool,
    pub pause: bool,
    pub stop: bool,
    /// Spawn one batch now, regardless of the spawn clock
    pub spawn: bool,
    /// New spawn-rate slider value
    pub spawn_rate: Option<f32>,
    /// New speed multiplier
    pub speed: Option<f32>,
    /// Edits from the selection/drag collaborator, applied in order
    pub edits: Vec<TopologyEdit>,
}

/// Advance the simulation by `dt` seconds
pub fn tick(sim: &mut Simulation, input: &TickInput, dt: f32) {
    for edit in &input.edits {
        if let Err(error) = sim.apply_edit(edit.clone()) {
            log::warn!("Edit rejected: {error}");
            sim.events.push(SimEvent::EditRejected { error });
        }
    }

    if let Some(rate) = input.spawn_rate {
        if let Err(error) = sim.set_spawn_rate(rate) {
            log::warn!("{error}");
        }
    }
    if let Some(speed) = input.speed {
        if let Err(error) = sim.set_speed(speed) {
            log::warn!("{error}");
        }
    }

    if input.stop {
        sim.stop();
    }
    if input.run {
        sim.run();
    }
    if input.pause {
        sim.pause();
    }
    if input.spawn {
        sim.spawn();
    }

    if sim.phase != SimPhase::Running {
        return;
    }
    let dt = dt.max(0.0);

    sim.time_till_next -= dt;
    if sim.time_till_next <= 0.0 {
        sim.spawn();
        sim.time_till_next = sim.spawn_interval();
    }

    sim.advance_balls(dt * sim.speed);
}

impl Simulation {
    /// Start or resume the clock. From Stopped the first batch spawns on
    /// the next tick.
    pub fn run(&mut self) {
        match self.phase {
            SimPhase::Running => return,
            SimPhase::Stopped => self.time_till_next = 0.0,
            SimPhase::Paused => {}
        }
        self.set_phase(SimPhase::Running);
    }

    pub fn pause(&mut self) {
        if self.phase == SimPhase::Running {
            self.set_phase(SimPhase::Paused);
        }
    }

    /// Discard every ball and reset accumulation
    pub fn stop(&mut self) {
        self.discard_balls();
        self.time_till_next = 0.0;
        if self.phase != SimPhase::Stopped {
            self.set_phase(SimPhase::Stopped);
        }
    }

    fn set_phase(&mut self, to: SimPhase) {
        let from = self.phase;
        self.phase = to;
        log::info!("Simulation {from:?} -> {to:?}");
        self.events.push(SimEvent::PhaseChanged { from, to });
    }

    /// Change the rate slider. The remaining countdown is rescaled by
    /// `old² / new²` so the elapsed share of the interval is kept.
    pub fn set_spawn_rate(&mut self, rate: f32) -> Result<(), SimError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(SimError::InvalidSpawnRate(rate));
        }
        let old = self.spawn_rate;
        self.time_till_next *= (old * old) / (rate * rate);
        self.spawn_rate = rate;
        Ok(())
    }

    pub fn set_speed(&mut self, speed: f32) -> Result<(), SimError> {
        if !(speed.is_finite() && speed >= 0.0) {
            return Err(SimError::InvalidSpeed(speed));
        }
        self.speed = speed;
        Ok(())
    }

    /// Apply one queued edit
    pub fn apply_edit(&mut self, edit: TopologyEdit) -> Result<(), SimError> {
        match edit {
            TopologyEdit::AddBoard {
                rows,
                shape,
                position,
            } => self.add_board(rows, shape, position).map(|_| ()),
            TopologyEdit::RemoveBoard(board) => self.remove_board(board).map(|_| ()),
            TopologyEdit::AddRow(board) => self.add_row(board),
            TopologyEdit::RemoveRow(board) => self.remove_row(board),
            TopologyEdit::MoveBoard { board, position } => self.move_board(board, position),
            TopologyEdit::SetBoardOpen { board, open } => self.set_board_open(board, open),
            TopologyEdit::SetDistribution { board, shape } => {
                self.set_board_distribution(board, shape)
            }
            TopologyEdit::SetPegProbability {
                board,
                row,
                index,
                probability,
            } => self.set_peg_probability(board, row, index, probability),
            TopologyEdit::SetBucketTag { board, bucket, tag } => {
                self.set_bucket_tag(board, bucket, tag)
            }
            TopologyEdit::SetBucketWidth {
                board,
                bucket,
                width,
            } => self.set_bucket_width(board, bucket, width),
            TopologyEdit::SetBucketOutput {
                board,
                bucket,
                output: Some((target, entry)),
            } => self.set_bucket_output(board, bucket, target, entry),
            TopologyEdit::SetBucketOutput {
                board,
                bucket,
                output: None,
            } => self.clear_bucket_output(board, bucket),
            TopologyEdit::ClearGivenTags { board, bucket } => self.clear_given_tags(board, bucket),
            TopologyEdit::ClearBuckets => {
                self.clear_buckets();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::sim::topology::LogicalLocation;
    use proptest::prelude::*;

    const DT: f32 = 1.0 / 60.0;

    fn sim_with_board(rows: usize) -> (Simulation, BoardId) {
        let mut sim = Simulation::new(Settings::default()).unwrap();
        let board = sim.add_board(rows, Distribution::Binomial, Vec2::ZERO).unwrap();
        (sim, board)
    }

    fn run_input() -> TickInput {
        TickInput {
            run: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_stopped_sim_does_not_spawn() {
        let (mut sim, _) = sim_with_board(3);
        tick(&mut sim, &TickInput::default(), DT);
        assert_eq!(sim.phase(), SimPhase::Stopped);
        assert!(sim.balls().is_empty());
    }

    #[test]
    fn test_run_spawns_on_first_tick_then_waits_an_interval() {
        let (mut sim, _) = sim_with_board(3);
        tick(&mut sim, &run_input(), DT);
        assert_eq!(sim.phase(), SimPhase::Running);
        assert_eq!(sim.spawned(), 1);
        assert!((sim.time_till_next() - 1.0).abs() < 1e-6);

        // 0.5s later: still waiting
        for _ in 0..30 {
            tick(&mut sim, &TickInput::default(), DT);
        }
        assert_eq!(sim.spawned(), 1);

        for _ in 0..31 {
            tick(&mut sim, &TickInput::default(), DT);
        }
        assert_eq!(sim.spawned(), 2);
    }

    #[test]
    fn test_interval_is_inverse_square_of_rate() {
        let (mut sim, _) = sim_with_board(1);
        sim.set_spawn_rate(2.0).unwrap();
        assert!((sim.spawn_interval() - 0.25).abs() < 1e-6);
        assert_eq!(sim.set_spawn_rate(0.0), Err(SimError::InvalidSpawnRate(0.0)));
        assert_eq!(sim.spawn_rate(), 2.0);
    }

    #[test]
    fn test_rate_change_rescales_remaining_countdown() {
        let (mut sim, _) = sim_with_board(1);
        tick(&mut sim, &run_input(), 0.0);
        tick(&mut sim, &TickInput::default(), 0.4);
        assert!((sim.time_till_next() - 0.6).abs() < 1e-5);

        sim.set_spawn_rate(2.0).unwrap();
        assert!((sim.time_till_next() - 0.15).abs() < 1e-5);
        sim.set_spawn_rate(1.0).unwrap();
        assert!((sim.time_till_next() - 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_pause_freezes_and_resume_keeps_countdown() {
        let (mut sim, _) = sim_with_board(4);
        tick(&mut sim, &run_input(), DT);
        tick(&mut sim, &TickInput::default(), 0.1);
        let pos = sim.balls()[0].pos;
        let countdown = sim.time_till_next();

        tick(
            &mut sim,
            &TickInput {
                pause: true,
                ..Default::default()
            },
            DT,
        );
        for _ in 0..100 {
            tick(&mut sim, &TickInput::default(), DT);
        }
        assert_eq!(sim.phase(), SimPhase::Paused);
        assert_eq!(sim.balls()[0].pos, pos);
        assert_eq!(sim.time_till_next(), countdown);

        tick(&mut sim, &run_input(), 0.0);
        assert_eq!(sim.phase(), SimPhase::Running);
        assert_eq!(sim.time_till_next(), countdown);
        assert_eq!(sim.spawned(), 1);
    }

    #[test]
    fn test_stop_discards_balls_and_accumulation() {
        let (mut sim, board) = sim_with_board(2);
        let first = sim.board(board).unwrap().buckets()[0].id();
        sim.set_bucket_tag(board, first, Some("t".into())).unwrap();
        sim.set_peg_probability(board, 0, 0, 1.0).unwrap();
        sim.set_peg_probability(board, 1, 0, 1.0).unwrap();
        tick(&mut sim, &run_input(), DT);
        for _ in 0..600 {
            tick(&mut sim, &TickInput::default(), DT);
        }
        assert!(sim.sink_resident_total() > 0);

        tick(
            &mut sim,
            &TickInput {
                stop: true,
                ..Default::default()
            },
            DT,
        );
        assert_eq!(sim.phase(), SimPhase::Stopped);
        assert!(sim.balls().is_empty());
        assert_eq!(sim.sink_resident_total(), 0);
        assert_eq!(sim.capacity(), sim.settings().effective_capacity());
        let b = sim.board(board).unwrap();
        assert!(b.pegs().iter().all(|p| p.balls().is_empty()));
        // Tag history survives a stop
        assert_eq!(b.bucket(first).unwrap().given_tags(), ["t".to_string()]);
    }

    #[test]
    fn test_rejected_edit_leaves_topology_untouched() {
        let (mut sim, board) = sim_with_board(1);
        sim.drain_events();
        let input = TickInput {
            edits: vec![
                TopologyEdit::RemoveRow(board),
                TopologyEdit::AddRow(board),
            ],
            ..Default::default()
        };
        tick(&mut sim, &input, DT);
        assert_eq!(sim.board(board).unwrap().rows(), 2);
        assert_eq!(
            sim.drain_events(),
            vec![SimEvent::EditRejected {
                error: SimError::TooFewRows
            }]
        );
    }

    #[test]
    fn test_edits_apply_before_spawning() {
        let (mut sim, board) = sim_with_board(1);
        let input = TickInput {
            run: true,
            edits: vec![TopologyEdit::SetPegProbability {
                board,
                row: 0,
                index: 0,
                probability: 0.0,
            }],
            ..Default::default()
        };
        tick(&mut sim, &input, DT);
        let path = sim.balls()[0].path();
        assert_eq!(path[1], crate::sim::NodeRef::ColumnTop { board, column: 1 });
    }

    #[test]
    fn test_closed_board_holds_balls_until_reopened() {
        let (mut sim, board) = sim_with_board(1);
        sim.set_board_open(board, false).unwrap();
        tick(&mut sim, &run_input(), DT);
        sim.set_speed(1000.0).unwrap();
        tick(&mut sim, &TickInput::default(), DT);
        assert_eq!(sim.balls().len(), 1);
        assert_eq!(sim.sink_resident_total(), 0);

        sim.set_board_open(board, true).unwrap();
        tick(&mut sim, &TickInput::default(), DT);
        assert!(sim.balls().is_empty());
        assert_eq!(sim.sink_resident_total(), 1);
    }

    #[test]
    fn test_determinism() {
        let (mut a, _) = sim_with_board(5);
        let (mut b, _) = sim_with_board(5);
        tick(&mut a, &run_input(), DT);
        tick(&mut b, &run_input(), DT);
        for _ in 0..300 {
            tick(&mut a, &TickInput::default(), DT);
            tick(&mut b, &TickInput::default(), DT);
        }
        let paths = |sim: &Simulation| -> Vec<Vec<crate::sim::NodeRef>> {
            sim.balls().iter().map(|ball| ball.path().to_vec()).collect()
        };
        assert_eq!(paths(&a), paths(&b));
        assert_eq!(a.sink_resident_total(), b.sink_resident_total());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_spawned_minus_live_equals_sink_residents(
            seed in any::<u64>(),
            rows in 1usize..6,
            rate in 1.0f32..6.0,
            frames in 1usize..400,
        ) {
            let settings = Settings { seed, spawn_rate: rate, ..Default::default() };
            let mut sim = Simulation::new(settings).unwrap();
            let top = sim.add_board(rows, Distribution::Binomial, Vec2::ZERO).unwrap();
            let below = sim.add_board(rows, Distribution::Uniform, Vec2::new(0.0, -12.0)).unwrap();
            let feed = sim.board(top).unwrap().buckets()[0].id();
            sim.set_bucket_output(top, feed, below, 0).unwrap();

            tick(&mut sim, &run_input(), DT);
            for _ in 0..frames {
                tick(&mut sim, &TickInput::default(), DT);
                prop_assert_eq!(sim.spawned() - sim.balls().len(), sim.sink_resident_total());
            }
        }

        #[test]
        fn prop_bars_never_overflow(
            seed in any::<u64>(),
            frames in 1usize..600,
        ) {
            let settings = Settings { seed, spawn_rate: 8.0, bucket_capacity: 1.0, ..Default::default() };
            let mut sim = Simulation::new(settings).unwrap();
            let board = sim.add_board(2, Distribution::Binomial, Vec2::ZERO).unwrap();
            tick(&mut sim, &run_input(), DT);
            for _ in 0..frames {
                tick(&mut sim, &TickInput::default(), DT);
            }
            for bucket in sim.board(board).unwrap().buckets() {
                let bar = sim.liquid_bar(board, bucket.id()).unwrap();
                prop_assert!(bar.filled() <= 1.0 + 1e-6);
            }
        }
    }
}
