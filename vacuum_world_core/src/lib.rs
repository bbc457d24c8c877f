use serde::{Deserialize, Serialize};

pub mod agent;
pub mod config;
pub mod environment;
pub mod map;
pub mod search;
pub mod simulation;

pub use agent::{Agent, AgentKind, AgentPhase};
pub use config::{ConfigError, WorldConfig};
pub use environment::{
    Action, ActionResult, Environment, MapError, Perception, Tile, load_environment_from_string,
};
pub use search::{Algorithm, SearchResult, Trace};
pub use simulation::{RunStats, Simulation, StepReport};

/// Represents a 2D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Returns the manhattan distance between two positions.
    pub fn manhattan_distance(&self, other: &Position) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}
