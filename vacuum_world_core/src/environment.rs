use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    Position,
    config::{ConfigError, WorldConfig},
    map::{Grid, GridError},
};

/// The state of a single cell in the environment grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tile {
    #[default]
    Clean,
    Dirty,
    Obstacle,
}

/// Represents actions an agent can decide to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Clean,
    MoveTo(Position),
    Wait,
}

/// Represents the outcome of applying an agent's action to the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    Cleaned,
    Moved {
        from: Position,
        to: Position,
    },
    Waited,
    /// The action was valid to request but changed nothing.
    Rejected(&'static str),
}

impl ActionResult {
    /// Whether the action changed the world: a tile became clean or the agent moved.
    pub fn had_effect(&self) -> bool {
        matches!(self, ActionResult::Cleaned | ActionResult::Moved { .. })
    }
}

/// Read-only snapshot of what the agent senses at the start of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Perception {
    pub position: Position,
    pub tile: Tile,
    /// Walkable 4-neighbours in up, right, down, left order.
    pub neighbors: Vec<Position>,
    pub all_clean: bool,
}

/// The grid world: tiles, the agent's position and the dirt counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    tiles: Grid<Tile>,
    agent: Position,
    total_dirt: usize,
    cleaned_dirt: usize,
}

/// Neighbour offsets in enumeration order: up, right, down, left.
const DIRECTIONS: [(isize, isize); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

impl Environment {
    /// Randomly generates a world from `config`.
    ///
    /// Every cell except the start is rolled independently: obstacle first,
    /// then dirt. Reachability of the dirt is not checked.
    pub fn generate<R: Rng>(config: &WorldConfig, rng: &mut R) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::populate(config, rng))
    }

    /// Rolls the tiles for a config that has already been validated.
    pub(crate) fn populate<R: Rng>(config: &WorldConfig, rng: &mut R) -> Self {
        let start = config.start;
        let tiles = Grid::from_generator(config.width, config.height, |x, y| {
            if (Position { x, y }) == start {
                Tile::Clean
            } else if rng.random::<f64>() < config.obstacle_probability {
                Tile::Obstacle
            } else if rng.random::<f64>() < config.dirt_probability {
                Tile::Dirty
            } else {
                Tile::Clean
            }
        });

        let environment = Self::from_tiles(tiles, start);
        trace!(
            width = config.width,
            height = config.height,
            total_dirt = environment.total_dirt,
            "Generated environment"
        );
        environment
    }

    /// Builds an environment from a prepared tile grid.
    ///
    /// The start cell is forced to clean floor so the agent never stands on
    /// an obstacle.
    fn from_tiles(mut tiles: Grid<Tile>, start: Position) -> Self {
        tiles[start] = Tile::Clean;
        let total_dirt = tiles.iter().filter(|t| **t == Tile::Dirty).count();
        Environment {
            tiles,
            agent: start,
            total_dirt,
            cleaned_dirt: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.tiles.width()
    }

    pub fn height(&self) -> usize {
        self.tiles.height()
    }

    pub fn tiles(&self) -> &Grid<Tile> {
        &self.tiles
    }

    pub fn agent_position(&self) -> Position {
        self.agent
    }

    pub fn total_dirt(&self) -> usize {
        self.total_dirt
    }

    pub fn cleaned_dirt(&self) -> usize {
        self.cleaned_dirt
    }

    /// Returns the tile at `(x, y)`. Anything outside the grid is an obstacle.
    pub fn tile_at(&self, x: usize, y: usize) -> Tile {
        self.tiles.get(x, y).copied().unwrap_or(Tile::Obstacle)
    }

    pub fn is_walkable(&self, x: usize, y: usize) -> bool {
        self.tile_at(x, y) != Tile::Obstacle
    }

    /// Walkable orthogonal neighbours of `(x, y)` in up, right, down, left order.
    pub fn neighbors(&self, x: usize, y: usize) -> Vec<Position> {
        let mut neighbors = Vec::with_capacity(DIRECTIONS.len());
        for (dx, dy) in DIRECTIONS {
            let (Some(nx), Some(ny)) = (x.checked_add_signed(dx), y.checked_add_signed(dy)) else {
                continue;
            };
            if self.is_walkable(nx, ny) {
                neighbors.push(Position { x: nx, y: ny });
            }
        }
        neighbors
    }

    /// Moves the agent to `(x, y)` if that cell is walkable.
    ///
    /// Adjacency is not enforced here; policies only ever request neighbours.
    pub fn move_agent(&mut self, x: usize, y: usize) -> bool {
        if self.is_walkable(x, y) {
            self.agent = Position { x, y };
            true
        } else {
            false
        }
    }

    /// Cleans the agent's tile. Returns `false` and does nothing unless it was dirty.
    pub fn clean_current_tile(&mut self) -> bool {
        let tile = &mut self.tiles[self.agent];
        if *tile == Tile::Dirty {
            *tile = Tile::Clean;
            self.cleaned_dirt += 1;
            true
        } else {
            false
        }
    }

    /// All dirty cells in row-major order.
    pub fn dirty_tiles(&self) -> Vec<Position> {
        self.tiles
            .enumerate()
            .filter_map(|(pos, tile)| (*tile == Tile::Dirty).then_some(pos))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.cleaned_dirt >= self.total_dirt
    }

    /// Percentage of the initial dirt that has been cleaned. `100.0` if there was none.
    pub fn cleanliness_percentage(&self) -> f64 {
        if self.total_dirt == 0 {
            return 100.0;
        }
        self.cleaned_dirt as f64 / self.total_dirt as f64 * 100.0
    }

    /// Takes the per-step snapshot handed to agents.
    pub fn perceive(&self) -> Perception {
        let Position { x, y } = self.agent;
        Perception {
            position: self.agent,
            tile: self.tile_at(x, y),
            neighbors: self.neighbors(x, y),
            all_clean: self.is_complete(),
        }
    }

    /// Applies a single action to the world.
    pub fn process_action(&mut self, action: Action) -> ActionResult {
        match action {
            Action::Wait => ActionResult::Waited,
            Action::Clean => {
                if self.clean_current_tile() {
                    ActionResult::Cleaned
                } else {
                    ActionResult::Rejected("Current tile is not dirty.")
                }
            }
            Action::MoveTo(target) => {
                let from = self.agent;
                if self.move_agent(target.x, target.y) {
                    ActionResult::Moved { from, to: target }
                } else {
                    ActionResult::Rejected("Target cell is not walkable.")
                }
            }
        }
    }
}

/// Errors produced while parsing a map layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("Map string is empty.")]
    Empty,
    #[error("Map has zero width.")]
    ZeroWidth,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    InconsistentWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown map code '{code}' at position ({x}, {y}).")]
    UnknownCode { code: String, x: usize, y: usize },
    #[error("Multiple start positions ('ST') found.")]
    MultipleStarts,
    #[error("No start position ('ST') found in map.")]
    MissingStart,
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Loads an environment from a whitespace separated token map.
///
/// Codes: `ST` start, `BL` clean floor, `DT` dirty floor, `WL`/`WA` obstacle.
pub fn load_environment_from_string(map_string: &str) -> Result<Environment, MapError> {
    let lines: Vec<&str> = map_string.trim().lines().collect();
    if lines.is_empty() {
        return Err(MapError::Empty);
    }

    let height = lines.len();
    let mut width = 0;
    let mut parsed_rows: Vec<Vec<&str>> = Vec::with_capacity(height);

    for (y, line) in lines.iter().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if y == 0 {
            width = tokens.len();
            if width == 0 {
                return Err(MapError::ZeroWidth);
            }
        } else if tokens.len() != width {
            return Err(MapError::InconsistentWidth {
                row: y,
                expected: width,
                found: tokens.len(),
            });
        }
        parsed_rows.push(tokens);
    }

    let mut tiles: Grid<Tile> = Grid::new(width, height);
    let mut start_position: Option<Position> = None;

    for (y, row_tokens) in parsed_rows.iter().enumerate() {
        for (x, token) in row_tokens.iter().enumerate() {
            let tile = match *token {
                "ST" => {
                    if start_position.is_some() {
                        return Err(MapError::MultipleStarts);
                    }
                    start_position = Some(Position { x, y });
                    Tile::Clean
                }
                "BL" => Tile::Clean,
                "DT" => Tile::Dirty,
                "WL" | "WA" => Tile::Obstacle,
                unknown => {
                    return Err(MapError::UnknownCode {
                        code: unknown.to_string(),
                        x,
                        y,
                    });
                }
            };
            tiles.set(x, y, tile)?;
        }
    }

    let start = start_position.ok_or(MapError::MissingStart)?;
    Ok(Environment::from_tiles(tiles, start))
}
