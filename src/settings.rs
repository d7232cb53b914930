//! Simulation settings
//!
//! Persisted as JSON next to the named configurations. Missing or malformed
//! files fall back to defaults.

use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{PersistenceError, SimError};
use crate::sim::Distribution;

/// Runtime configuration for a simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Spawning ===
    /// Spawn-rate slider value; the spawn interval is `1 / spawn_rate²` seconds
    pub spawn_rate: f32,
    /// Path segments travelled per second
    pub speed: f32,

    // === Buckets ===
    /// Ball count a bucket's bar shows as full, before any enlarge
    pub bucket_capacity: f32,
    /// Factor the capacity grows by when a bucket overflows
    pub enlarge_factor: f32,

    // === Boards ===
    /// Rows for newly added boards
    pub default_rows: usize,
    /// Shape for newly added boards
    pub default_distribution: Distribution,
    /// World-space width and height of newly added boards
    pub board_size: Vec2,

    /// RNG seed for path sampling
    pub seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spawn_rate: 1.0,
            speed: 4.0,

            bucket_capacity: 10.0,
            enlarge_factor: 2.0,

            default_rows: 6,
            default_distribution: Distribution::Binomial,
            board_size: Vec2::new(8.0, 10.0),

            seed: 0x6a17_0b0a,
        }
    }
}

impl Settings {
    /// Check every value the simulation relies on
    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.spawn_rate.is_finite() && self.spawn_rate > 0.0) {
            return Err(SimError::InvalidSpawnRate(self.spawn_rate));
        }
        if !(self.speed.is_finite() && self.speed >= 0.0) {
            return Err(SimError::InvalidSpeed(self.speed));
        }
        if self.default_rows == 0 {
            return Err(SimError::InvalidRows(self.default_rows));
        }
        Ok(())
    }

    /// Capacity clamped to something a bar can be divided by
    pub fn effective_capacity(&self) -> f32 {
        if self.bucket_capacity.is_finite() {
            self.bucket_capacity.max(1.0)
        } else {
            1.0
        }
    }

    /// Enlarge factor clamped so enlarging always makes progress
    pub fn effective_enlarge_factor(&self) -> f32 {
        if self.enlarge_factor.is_finite() {
            self.enlarge_factor.max(1.1)
        } else {
            2.0
        }
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::info!("Using default settings ({e})");
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self, PersistenceError> {
        let json = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        log::info!("Settings saved to {}", path.as_ref().display());
        Ok(())
    }
}
