//! Galton Sim headless driver
//!
//! Builds a two-board chain, runs it for a while at a fixed frame rate and
//! logs how the balls distributed. Pass a settings JSON path to override
//! the defaults.

use glam::Vec2;

use galton_sim::Settings;
use galton_sim::renderer::build_buffers;
use galton_sim::sim::{Distribution, SimEvent, Simulation, TickInput, tick};

const FRAME_DT: f32 = 1.0 / 60.0;
const RUN_SECONDS: f32 = 30.0;

fn main() {
    env_logger::init();
    log::info!("Galton Sim (headless) starting...");

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(path),
        None => Settings::default(),
    };

    if let Err(e) = run(settings) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(settings: Settings) -> Result<(), galton_sim::SimError> {
    let rows = settings.default_rows;
    let mut sim = Simulation::new(settings)?;
    let top = sim.add_board(rows, Distribution::Binomial, Vec2::ZERO)?;
    let below = sim.add_board(rows, Distribution::Uniform, Vec2::new(0.0, -12.0))?;

    // The middle bucket of the top board feeds the lower board
    let middle = sim.board(top)?.bucket_for_column(rows / 2).map(|b| b.id());
    if let Some(middle) = middle {
        sim.set_bucket_tag(top, middle, Some("middle".into()))?;
        sim.set_bucket_output(top, middle, below, 0)?;
    }

    let start = TickInput {
        run: true,
        ..Default::default()
    };
    tick(&mut sim, &start, FRAME_DT);

    let idle = TickInput::default();
    let frames = (RUN_SECONDS / FRAME_DT) as usize;
    let mut enlarged = 0;
    for _ in 0..frames {
        tick(&mut sim, &idle, FRAME_DT);
        for event in sim.drain_events() {
            match event {
                SimEvent::BucketsEnlarged { .. } => enlarged += 1,
                SimEvent::SpawnFailed { error, .. } => log::error!("{error}"),
                _ => {}
            }
        }
    }

    for (name, id) in [("top", top), ("below", below)] {
        let counts: Vec<usize> = sim
            .board(id)?
            .buckets()
            .iter()
            .map(|b| galton_sim::sim::LogicalLocation::balls(b).len())
            .collect();
        log::info!("{name} buckets: {counts:?}");
    }
    log::info!(
        "{} spawned, {} in flight, capacity {} after {enlarged} enlarges",
        sim.spawned(),
        sim.balls().len(),
        sim.capacity()
    );
    log::info!("Frame mesh: {} vertices", build_buffers(&sim).vertex_count());
    Ok(())
}
