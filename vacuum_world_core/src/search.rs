//! Path search over the walkable cells of a grid.
//!
//! All three algorithms share one shape: expand a frontier, remember the
//! predecessor of every discovered cell, stop the first time the goal is
//! expanded and walk the predecessor links back to the start. They differ
//! only in the frontier discipline.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet, VecDeque},
};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{Position, environment::Environment};

/// Adjacency the search algorithms walk over.
pub trait Topology {
    /// Cells reachable in one step from `at`, in a fixed order.
    fn neighbors_of(&self, at: Position) -> Vec<Position>;
}

impl Topology for Environment {
    fn neighbors_of(&self, at: Position) -> Vec<Position> {
        self.neighbors(at.x, at.y)
    }
}

/// Whether a search records its frontier at every iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Trace {
    Off,
    #[default]
    Frontier,
}

impl Trace {
    fn enabled(self) -> bool {
        self == Trace::Frontier
    }
}

/// Outcome of a single search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// Cells from the one after `start` up to and including `goal`.
    pub path: Vec<Position>,
    /// Number of hops in `path`.
    pub path_cost: usize,
    pub found: bool,
    pub nodes_expanded: usize,
    /// Cells whose neighbours were fully expanded.
    pub explored: HashSet<Position>,
    /// Frontier contents captured before each pop. Empty with [`Trace::Off`].
    pub frontier_history: Vec<HashSet<Position>>,
}

impl SearchResult {
    fn trivial() -> Self {
        SearchResult {
            found: true,
            ..Default::default()
        }
    }
}

/// The available search strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// FIFO frontier. Shortest path in hops.
    BreadthFirst,
    /// LIFO frontier. Finds some path, not necessarily a short one.
    DepthFirst,
    /// Priority frontier ordered by `g + manhattan`. Shortest path in hops.
    AStar,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::BreadthFirst => "BFS",
            Algorithm::DepthFirst => "DFS",
            Algorithm::AStar => "A*",
        }
    }

    /// Runs the search with frontier tracing enabled.
    pub fn search<T: Topology + ?Sized>(
        self,
        world: &T,
        start: Position,
        goal: Position,
    ) -> SearchResult {
        self.search_with(world, start, goal, Trace::Frontier)
    }

    #[tracing::instrument(level = "trace", skip(world))]
    pub fn search_with<T: Topology + ?Sized>(
        self,
        world: &T,
        start: Position,
        goal: Position,
        trace: Trace,
    ) -> SearchResult {
        let result = match self {
            Algorithm::BreadthFirst => bfs(world, start, goal, trace),
            Algorithm::DepthFirst => dfs(world, start, goal, trace),
            Algorithm::AStar => astar(world, start, goal, trace),
        };
        trace!(
            found = result.found,
            nodes_expanded = result.nodes_expanded,
            path_cost = result.path_cost,
            "Search finished"
        );
        result
    }
}

/// Breadth-first search.
pub fn bfs<T: Topology + ?Sized>(
    world: &T,
    start: Position,
    goal: Position,
    trace: Trace,
) -> SearchResult {
    if start == goal {
        return SearchResult::trivial();
    }

    let mut result = SearchResult::default();
    let mut frontier = VecDeque::from([start]);
    let mut came_from: HashMap<Position, Position> = HashMap::new();
    let mut discovered = HashSet::from([start]);

    while !frontier.is_empty() {
        if trace.enabled() {
            result
                .frontier_history
                .push(frontier.iter().copied().collect());
        }
        let Some(current) = frontier.pop_front() else {
            break;
        };
        result.explored.insert(current);
        result.nodes_expanded += 1;

        if current == goal {
            return finish(result, &came_from, start, goal);
        }

        for neighbor in world.neighbors_of(current) {
            if discovered.insert(neighbor) {
                came_from.insert(neighbor, current);
                frontier.push_back(neighbor);
            }
        }
    }

    result
}

/// Depth-first search.
///
/// Predecessors are fixed when a cell is first discovered, so the returned
/// path follows the discovery tree.
pub fn dfs<T: Topology + ?Sized>(
    world: &T,
    start: Position,
    goal: Position,
    trace: Trace,
) -> SearchResult {
    if start == goal {
        return SearchResult::trivial();
    }

    let mut result = SearchResult::default();
    let mut frontier = vec![start];
    let mut came_from: HashMap<Position, Position> = HashMap::new();
    let mut discovered = HashSet::from([start]);

    while !frontier.is_empty() {
        if trace.enabled() {
            result
                .frontier_history
                .push(frontier.iter().copied().collect());
        }
        let Some(current) = frontier.pop() else {
            break;
        };
        // Stale entry.
        if !result.explored.insert(current) {
            continue;
        }
        result.nodes_expanded += 1;

        if current == goal {
            return finish(result, &came_from, start, goal);
        }

        for neighbor in world.neighbors_of(current) {
            if !result.explored.contains(&neighbor) && discovered.insert(neighbor) {
                came_from.insert(neighbor, current);
                frontier.push(neighbor);
            }
        }
    }

    result
}

/// Frontier entry for [`astar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    f_score: usize,
    h_score: usize,
    /// Insertion counter, makes equal priorities pop in a reproducible order.
    seq: usize,
    position: Position,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.h_score.cmp(&self.h_score))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* search with the manhattan distance heuristic.
///
/// Improved cells are pushed again instead of being updated in place; the
/// outdated entries are dropped when popped.
pub fn astar<T: Topology + ?Sized>(
    world: &T,
    start: Position,
    goal: Position,
    trace: Trace,
) -> SearchResult {
    if start == goal {
        return SearchResult::trivial();
    }

    let mut result = SearchResult::default();
    let mut frontier = BinaryHeap::new();
    let mut came_from: HashMap<Position, Position> = HashMap::new();
    let mut g_score: HashMap<Position, usize> = HashMap::from([(start, 0)]);
    let mut seq = 0;

    let h_start = manhattan(start, goal);
    frontier.push(Candidate {
        f_score: h_start,
        h_score: h_start,
        seq,
        position: start,
    });

    while !frontier.is_empty() {
        if trace.enabled() {
            result
                .frontier_history
                .push(frontier.iter().map(|c| c.position).collect());
        }
        let Some(Candidate {
            position: current, ..
        }) = frontier.pop()
        else {
            break;
        };
        if !result.explored.insert(current) {
            continue;
        }
        result.nodes_expanded += 1;

        if current == goal {
            return finish(result, &came_from, start, goal);
        }

        let current_g = g_score[&current];
        for neighbor in world.neighbors_of(current) {
            if result.explored.contains(&neighbor) {
                continue;
            }
            let tentative_g = current_g + 1;
            if g_score.get(&neighbor).is_none_or(|&g| tentative_g < g) {
                g_score.insert(neighbor, tentative_g);
                came_from.insert(neighbor, current);
                let h_score = manhattan(neighbor, goal);
                seq += 1;
                frontier.push(Candidate {
                    f_score: tentative_g + h_score,
                    h_score,
                    seq,
                    position: neighbor,
                });
            }
        }
    }

    result
}

/// Manhattan distance, the A* heuristic.
pub fn manhattan(a: Position, b: Position) -> usize {
    a.manhattan_distance(&b)
}

/// The dirty cell with the smallest manhattan distance from `from`.
///
/// Ties go to the earliest cell in row-major order. Obstacles are ignored, so
/// the result may be unreachable.
pub fn nearest_dirty_tile(world: &Environment, from: Position) -> Option<Position> {
    world
        .dirty_tiles()
        .into_iter()
        .min_by_key(|pos| manhattan(from, *pos))
}

fn finish(
    mut result: SearchResult,
    came_from: &HashMap<Position, Position>,
    start: Position,
    goal: Position,
) -> SearchResult {
    result.path = reconstruct_path(came_from, start, goal);
    result.path_cost = result.path.len();
    result.found = true;
    result
}

/// Walks predecessor links from `goal` back to `start`. `start` is not included.
fn reconstruct_path(
    came_from: &HashMap<Position, Position>,
    start: Position,
    goal: Position,
) -> Vec<Position> {
    let mut path = Vec::new();
    let mut current = goal;
    while current != start {
        path.push(current);
        match came_from.get(&current) {
            Some(&prev) => current = prev,
            None => break,
        }
    }
    path.reverse();
    path
}
