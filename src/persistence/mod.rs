//! Named workspace configurations
//!
//! A configuration is a snapshot of the board graph: every board with its
//! peg probabilities and buckets (width, tag and output). Balls and bucket
//! contents are not part of it. Boards are referenced by their position in
//! the snapshot, so handles never leak into saved files.

use std::collections::BTreeMap;
use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{PersistenceError, SimError};
use crate::settings::Settings;
use crate::sim::{BoardId, Distribution, Simulation};

/// Format version written into every library file
pub const LIBRARY_VERSION: u32 = 1;

/// One bucket of a saved board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    pub start_column: usize,
    pub width: usize,
    #[serde(default)]
    pub tag: Option<String>,
    /// `(board index in the snapshot, entry peg)`
    #[serde(default)]
    pub output: Option<(usize, usize)>,
}

/// One saved board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub rows: usize,
    pub position: Vec2,
    pub size: Vec2,
    #[serde(default = "default_open")]
    pub open: bool,
    /// Set when the probabilities still follow a preset
    #[serde(default)]
    pub shape: Option<Distribution>,
    /// Left probability per peg, in flat index order
    pub probabilities: Vec<f32>,
    pub buckets: Vec<BucketSnapshot>,
}

fn default_open() -> bool {
    true
}

/// The saved board graph of a whole workspace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub boards: Vec<BoardSnapshot>,
}

impl WorkspaceSnapshot {
    /// Capture the topology of a running simulation
    pub fn capture(sim: &Simulation) -> Self {
        let order: Vec<BoardId> = sim.boards().keys().collect();
        let index_of = |id: BoardId| order.iter().position(|&b| b == id);

        let boards = sim
            .boards()
            .values()
            .map(|board| BoardSnapshot {
                rows: board.rows(),
                position: board.position(),
                size: board.size(),
                open: board.is_open(),
                shape: board.shape(),
                probabilities: board.pegs().iter().map(|p| p.left_prob()).collect(),
                buckets: board
                    .buckets()
                    .iter()
                    .map(|bucket| BucketSnapshot {
                        start_column: bucket.start_column(),
                        width: bucket.width(),
                        tag: crate::sim::LogicalLocation::tag(bucket).map(str::to_string),
                        output: bucket
                            .output()
                            .and_then(|o| index_of(o.board).map(|i| (i, o.entry))),
                    })
                    .collect(),
            })
            .collect();
        Self { boards }
    }

    /// Build a fresh, stopped simulation with this topology
    pub fn restore(&self, settings: Settings) -> Result<Simulation, PersistenceError> {
        let mut sim = Simulation::new(settings)?;
        let mut ids = Vec::with_capacity(self.boards.len());

        for saved in &self.boards {
            let shape = saved.shape.unwrap_or_default();
            let id = sim.add_board(saved.rows, shape, saved.position)?;
            sim.resize_board(id, saved.size)?;
            sim.set_board_open(id, saved.open)?;
            if saved.shape.is_none() {
                for (peg, &p) in saved.probabilities.iter().enumerate() {
                    let (row, index) = crate::index_to_grid(peg);
                    sim.set_peg_probability(id, row, index, p)?;
                }
            }
            for bucket in &saved.buckets {
                let columns = sim.board(id)?.column_count();
                let bucket_id = sim
                    .board(id)?
                    .bucket_for_column(bucket.start_column)
                    .map(|b| b.id())
                    .ok_or(SimError::WidthExceedsColumns {
                        start: bucket.start_column,
                        width: bucket.width,
                        columns,
                    })?;
                sim.set_bucket_width(id, bucket_id, bucket.width)?;
                sim.set_bucket_tag(id, bucket_id, bucket.tag.clone())?;
            }
            ids.push(id);
        }

        // Outputs once every target exists
        for (saved, &id) in self.boards.iter().zip(&ids) {
            for bucket in &saved.buckets {
                let Some((target, entry)) = bucket.output else {
                    continue;
                };
                let target = ids
                    .get(target)
                    .copied()
                    .ok_or(PersistenceError::DanglingOutput { target })?;
                let bucket_id = sim
                    .board(id)?
                    .bucket_for_column(bucket.start_column)
                    .map(|b| b.id())
                    .ok_or(SimError::UncoveredColumn {
                        board: id,
                        column: bucket.start_column,
                    })?;
                sim.set_bucket_output(id, bucket_id, target, entry)?;
            }
        }

        sim.drain_events();
        Ok(sim)
    }
}

/// Workspace snapshots keyed by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigurationLibrary {
    pub version: u32,
    configurations: BTreeMap<String, WorkspaceSnapshot>,
}

impl ConfigurationLibrary {
    pub fn new() -> Self {
        Self {
            version: LIBRARY_VERSION,
            configurations: BTreeMap::new(),
        }
    }

    /// Store the current topology under `name`, replacing any previous one
    pub fn save_current(&mut self, name: impl Into<String>, sim: &Simulation) {
        let name = name.into();
        let snapshot = WorkspaceSnapshot::capture(sim);
        log::info!("Saved configuration {name:?} ({} boards)", snapshot.boards.len());
        self.configurations.insert(name, snapshot);
    }

    pub fn get(&self, name: &str) -> Result<&WorkspaceSnapshot, PersistenceError> {
        self.configurations
            .get(name)
            .ok_or_else(|| PersistenceError::UnknownConfiguration(name.to_string()))
    }

    /// Build a simulation from the named configuration
    pub fn load(&self, name: &str, settings: Settings) -> Result<Simulation, PersistenceError> {
        let sim = self.get(name)?.restore(settings)?;
        log::info!("Loaded configuration {name:?}");
        Ok(sim)
    }

    pub fn remove(&mut self, name: &str) -> Option<WorkspaceSnapshot> {
        self.configurations.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configurations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        let library: Self = serde_json::from_str(json)?;
        if library.version > LIBRARY_VERSION {
            log::warn!(
                "Configuration library version {} is newer than {LIBRARY_VERSION}",
                library.version
            );
        }
        Ok(library)
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let library = Self::from_json(&json)?;
        log::info!(
            "Loaded {} configurations from {}",
            library.len(),
            path.as_ref().display()
        );
        Ok(library)
    }

    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }
}
