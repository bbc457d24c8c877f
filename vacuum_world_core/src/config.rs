use serde::{Deserialize, Serialize};

use crate::Position;

/// Errors raised when a [`WorldConfig`] cannot produce a valid world.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Grid dimensions must be non-zero, got ({width}, {height})")]
    EmptyGrid { width: usize, height: usize },
    #[error("Grid of ({width}, {height}) cells is too large")]
    GridTooLarge { width: usize, height: usize },
    #[error("{name} probability must be within [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("Start position ({x}, {y}) is out of bounds for grid size ({width}, {height})")]
    StartOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
}

/// Parameters for randomly generating a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub width: usize,
    pub height: usize,
    /// Chance that a non-obstacle cell starts dirty.
    pub dirt_probability: f64,
    /// Chance that a cell is an obstacle. Rolled before dirt.
    pub obstacle_probability: f64,
    /// Where the agent starts. This cell is always clean floor.
    pub start: Position,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 20,
            height: 15,
            dirt_probability: 0.3,
            obstacle_probability: 0.1,
            start: Position::new(0, 0),
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyGrid {
                width: self.width,
                height: self.height,
            });
        }
        if self.width.checked_mul(self.height).is_none() {
            return Err(ConfigError::GridTooLarge {
                width: self.width,
                height: self.height,
            });
        }
        check_probability("Dirt", self.dirt_probability)?;
        check_probability("Obstacle", self.obstacle_probability)?;
        if self.start.x >= self.width || self.start.y >= self.height {
            return Err(ConfigError::StartOutOfBounds {
                x: self.start.x,
                y: self.start.y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidProbability { name, value })
    }
}
