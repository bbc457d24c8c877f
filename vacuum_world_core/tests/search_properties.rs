use std::collections::VecDeque;

use proptest::prelude::*;
use vacuum_world_core::{
    Action, Algorithm, Environment, Position, Tile, Trace, load_environment_from_string,
};

/// A random layout with a walkable start and goal.
#[derive(Debug, Clone)]
struct Layout {
    width: usize,
    height: usize,
    tiles: Vec<Tile>,
    start: usize,
    goal: usize,
}

impl Layout {
    fn position(&self, index: usize) -> Position {
        Position::new(index % self.width, index / self.width)
    }

    fn map_string(&self) -> String {
        let mut rows = Vec::with_capacity(self.height);
        for y in 0..self.height {
            let row: Vec<&str> = (0..self.width)
                .map(|x| {
                    let index = y * self.width + x;
                    if index == self.start {
                        return "ST";
                    }
                    match self.tiles[index] {
                        Tile::Clean => "BL",
                        Tile::Dirty => "DT",
                        Tile::Obstacle => "WL",
                    }
                })
                .collect();
            rows.push(row.join(" "));
        }
        rows.join("\n")
    }

    fn environment(&self) -> Environment {
        load_environment_from_string(&self.map_string()).unwrap()
    }

    /// Hop distances from `from` by plain breadth-first flood fill over the tile vector.
    fn oracle_distances(&self, from: usize) -> Vec<Option<usize>> {
        let walkable = |i: usize| i == self.start || self.tiles[i] != Tile::Obstacle;
        let mut dist = vec![None; self.tiles.len()];
        let mut queue = VecDeque::from([from]);
        dist[from] = Some(0);
        while let Some(i) = queue.pop_front() {
            let (x, y) = (i % self.width, i / self.width);
            let mut adjacent = Vec::new();
            if y > 0 {
                adjacent.push(i - self.width);
            }
            if x + 1 < self.width {
                adjacent.push(i + 1);
            }
            if y + 1 < self.height {
                adjacent.push(i + self.width);
            }
            if x > 0 {
                adjacent.push(i - 1);
            }
            for j in adjacent {
                if walkable(j) && dist[j].is_none() {
                    dist[j] = Some(dist[i].unwrap_or(0) + 1);
                    queue.push_back(j);
                }
            }
        }
        dist
    }
}

fn tile_strategy() -> impl Strategy<Value = Tile> {
    prop_oneof![
        3 => Just(Tile::Obstacle),
        2 => Just(Tile::Dirty),
        5 => Just(Tile::Clean),
    ]
}

fn layout_strategy() -> impl Strategy<Value = Layout> {
    (1usize..9, 1usize..9).prop_flat_map(|(width, height)| {
        let cells = width * height;
        (
            prop::collection::vec(tile_strategy(), cells),
            0..cells,
            0..cells,
        )
            .prop_map(move |(mut tiles, start, goal)| {
                tiles[start] = Tile::Clean;
                if tiles[goal] == Tile::Obstacle {
                    tiles[goal] = Tile::Dirty;
                }
                Layout {
                    width,
                    height,
                    tiles,
                    start,
                    goal,
                }
            })
    })
}

fn assert_contiguous(env: &Environment, start: Position, path: &[Position]) {
    let mut prev = start;
    for &step in path {
        assert!(env.is_walkable(step.x, step.y));
        assert_eq!(prev.manhattan_distance(&step), 1);
        prev = step;
    }
}

proptest! {
    #[test]
    fn bfs_matches_oracle_distance(layout in layout_strategy()) {
        let env = layout.environment();
        let start = layout.position(layout.start);
        let goal = layout.position(layout.goal);
        let expected = layout.oracle_distances(layout.start)[layout.goal];

        let result = Algorithm::BreadthFirst.search(&env, start, goal);
        prop_assert_eq!(result.found, expected.is_some());
        if let Some(distance) = expected {
            prop_assert_eq!(result.path_cost, distance);
            prop_assert_eq!(result.path.len(), distance);
            assert_contiguous(&env, start, &result.path);
        }
    }

    #[test]
    fn astar_is_as_short_as_bfs(layout in layout_strategy()) {
        let env = layout.environment();
        let start = layout.position(layout.start);
        let goal = layout.position(layout.goal);

        let bfs = Algorithm::BreadthFirst.search(&env, start, goal);
        let astar = Algorithm::AStar.search(&env, start, goal);
        prop_assert_eq!(astar.found, bfs.found);
        if astar.found {
            prop_assert_eq!(astar.path_cost, bfs.path_cost);
            prop_assert_eq!(astar.path.last(), bfs.path.last());
            assert_contiguous(&env, start, &astar.path);
        }
    }

    #[test]
    fn dfs_finds_some_path_when_one_exists(layout in layout_strategy()) {
        let env = layout.environment();
        let start = layout.position(layout.start);
        let goal = layout.position(layout.goal);

        let bfs = Algorithm::BreadthFirst.search(&env, start, goal);
        let dfs = Algorithm::DepthFirst.search(&env, start, goal);
        prop_assert_eq!(dfs.found, bfs.found);
        if dfs.found {
            prop_assert!(dfs.path_cost >= bfs.path_cost);
            assert_contiguous(&env, start, &dfs.path);
            if start != goal {
                prop_assert_eq!(dfs.path.last(), Some(&goal));
            }
        }
    }

    #[test]
    fn failed_search_expands_whole_component(layout in layout_strategy()) {
        let env = layout.environment();
        let start = layout.position(layout.start);
        let goal = layout.position(layout.goal);
        let distances = layout.oracle_distances(layout.start);
        if distances[layout.goal].is_some() {
            return Ok(());
        }
        let component = distances.iter().filter(|d| d.is_some()).count();

        for algorithm in [Algorithm::BreadthFirst, Algorithm::DepthFirst, Algorithm::AStar] {
            let result = algorithm.search(&env, start, goal);
            prop_assert!(!result.found);
            prop_assert!(result.path.is_empty());
            prop_assert_eq!(result.nodes_expanded, component);
        }
    }

    #[test]
    fn frontier_tracing_never_changes_results(layout in layout_strategy()) {
        let env = layout.environment();
        let start = layout.position(layout.start);
        let goal = layout.position(layout.goal);

        for algorithm in [Algorithm::BreadthFirst, Algorithm::DepthFirst, Algorithm::AStar] {
            let traced = algorithm.search_with(&env, start, goal, Trace::Frontier);
            let quiet = algorithm.search_with(&env, start, goal, Trace::Off);
            prop_assert_eq!(&traced.path, &quiet.path);
            prop_assert_eq!(traced.found, quiet.found);
            prop_assert_eq!(traced.nodes_expanded, quiet.nodes_expanded);
        }
    }

    #[test]
    fn world_invariants_hold_under_any_actions(
        layout in layout_strategy(),
        actions in prop::collection::vec((0u8..3, 0usize..10, 0usize..10), 0..60),
    ) {
        let mut env = layout.environment();
        for (kind, x, y) in actions {
            let action = match kind {
                0 => Action::Clean,
                1 => Action::MoveTo(Position::new(x, y)),
                _ => Action::Wait,
            };
            env.process_action(action);

            let here = env.agent_position();
            prop_assert!(env.cleaned_dirt() <= env.total_dirt());
            prop_assert_ne!(env.tile_at(here.x, here.y), Tile::Obstacle);
            prop_assert!(here.x < env.width() && here.y < env.height());
        }
    }
}
