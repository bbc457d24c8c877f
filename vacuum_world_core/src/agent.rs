use std::collections::{HashSet, VecDeque};

use rand::{SeedableRng, rngs::StdRng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Position,
    environment::{Action, Environment, Perception, Tile},
    search::{Algorithm, SearchResult, nearest_dirty_tile},
};

/// What an agent did on its most recent decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentPhase {
    /// No decision yet, or a single unplanned step.
    #[default]
    Idle,
    Cleaning,
    /// Took the next hop of a previously planned path.
    FollowingPath,
    /// Ran a search this step and took the first hop of the new path.
    Planning,
    Waiting,
}

/// Trait defining the behavior of a cleaning agent.
///
/// Agents decide which action to take from a [`Perception`] and a read-only
/// view of the environment. `&mut self` lets them keep per-run memory such
/// as a cached path.
pub trait Agent {
    fn name(&self) -> &'static str;

    /// Takes the snapshot this agent decides on.
    fn perceive(&self, environment: &Environment) -> Perception {
        environment.perceive()
    }

    /// Determines the action to perform. Any search runs to completion here.
    fn act(&mut self, environment: &Environment, perception: &Perception) -> Action;

    /// Forgets everything learned during the current run.
    fn reset(&mut self);

    fn phase(&self) -> AgentPhase;

    /// The search run by the last call to `act`, if it ran one.
    fn last_search(&self) -> Option<&SearchResult> {
        None
    }

    /// Drops any cached path. Called when a move from the path was rejected.
    fn discard_plan(&mut self) {}
}

/// The fixed, ordered set of available agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    Reactive,
    Mapping,
    Utility,
    GoalDirected,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Reactive,
        AgentKind::Mapping,
        AgentKind::Utility,
        AgentKind::GoalDirected,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            AgentKind::Reactive => 0,
            AgentKind::Mapping => 1,
            AgentKind::Utility => 2,
            AgentKind::GoalDirected => 3,
        }
    }

    /// Builds a fresh agent of this kind. `seed` feeds any random choices it makes.
    pub fn build(self, seed: u64) -> Box<dyn Agent> {
        match self {
            AgentKind::Reactive => Box::new(RandomWalker::new(seed)),
            AgentKind::Mapping => Box::new(MappingAgent::new(Algorithm::BreadthFirst, seed)),
            AgentKind::Utility => Box::new(UtilityAgent::new()),
            AgentKind::GoalDirected => Box::new(GoalAgent::new()),
        }
    }
}

/// Memoryless agent: cleans if dirty, otherwise steps to a random neighbour.
#[derive(Debug)]
pub struct RandomWalker {
    rng: StdRng,
    phase: AgentPhase,
}

impl RandomWalker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            phase: AgentPhase::Idle,
        }
    }
}

impl Agent for RandomWalker {
    fn name(&self) -> &'static str {
        "Reactive"
    }

    fn act(&mut self, _environment: &Environment, perception: &Perception) -> Action {
        if perception.tile == Tile::Dirty {
            self.phase = AgentPhase::Cleaning;
            return Action::Clean;
        }
        if perception.all_clean {
            self.phase = AgentPhase::Waiting;
            return Action::Wait;
        }

        match perception.neighbors.choose(&mut self.rng) {
            Some(&next) => {
                self.phase = AgentPhase::Idle;
                Action::MoveTo(next)
            }
            None => {
                self.phase = AgentPhase::Waiting;
                Action::Wait
            }
        }
    }

    fn reset(&mut self) {
        self.phase = AgentPhase::Idle;
    }

    fn phase(&self) -> AgentPhase {
        self.phase
    }
}

/// Remembers the tiles it cleaned and plans to the nearest dirt.
///
/// When nothing reachable is dirty it wanders, preferring neighbours it has
/// not cleaned before.
#[derive(Debug)]
pub struct MappingAgent {
    algorithm: Algorithm,
    cleaned: HashSet<Position>,
    current_plan: VecDeque<Position>,
    rng: StdRng,
    phase: AgentPhase,
    last_search: Option<SearchResult>,
}

impl MappingAgent {
    pub fn new(algorithm: Algorithm, seed: u64) -> Self {
        Self {
            algorithm,
            cleaned: HashSet::new(),
            current_plan: VecDeque::new(),
            rng: StdRng::seed_from_u64(seed),
            phase: AgentPhase::Idle,
            last_search: None,
        }
    }

    pub fn cleaned_tiles(&self) -> &HashSet<Position> {
        &self.cleaned
    }

    pub fn pending_steps(&self) -> usize {
        self.current_plan.len()
    }

    fn wander(&mut self, perception: &Perception) -> Action {
        let unvisited: Vec<Position> = perception
            .neighbors
            .iter()
            .filter(|n| !self.cleaned.contains(n))
            .copied()
            .collect();
        let choice = unvisited
            .choose(&mut self.rng)
            .or_else(|| perception.neighbors.choose(&mut self.rng))
            .copied();

        match choice {
            Some(next) => {
                self.phase = AgentPhase::Idle;
                Action::MoveTo(next)
            }
            None => {
                self.phase = AgentPhase::Waiting;
                Action::Wait
            }
        }
    }
}

impl Agent for MappingAgent {
    fn name(&self) -> &'static str {
        match self.algorithm {
            Algorithm::BreadthFirst => "Mapped-Avoidance (BFS)",
            Algorithm::DepthFirst => "Mapped-Avoidance (DFS)",
            Algorithm::AStar => "Mapped-Avoidance (A*)",
        }
    }

    fn act(&mut self, environment: &Environment, perception: &Perception) -> Action {
        self.last_search = None;

        if perception.tile == Tile::Dirty {
            self.cleaned.insert(perception.position);
            self.current_plan.clear();
            self.phase = AgentPhase::Cleaning;
            return Action::Clean;
        }
        if perception.all_clean {
            self.current_plan.clear();
            self.phase = AgentPhase::Waiting;
            return Action::Wait;
        }

        if let Some(next) = self.current_plan.pop_front() {
            self.phase = AgentPhase::FollowingPath;
            return Action::MoveTo(next);
        }

        if let Some(target) = nearest_dirty_tile(environment, perception.position) {
            let result = self
                .algorithm
                .search(environment, perception.position, target);
            if result.found {
                self.current_plan.extend(result.path.iter().copied());
            }
            self.last_search = Some(result);

            if let Some(next) = self.current_plan.pop_front() {
                debug!(
                    "Planned {} steps to {:?} with {}",
                    self.current_plan.len() + 1,
                    target,
                    self.algorithm.name()
                );
                self.phase = AgentPhase::Planning;
                return Action::MoveTo(next);
            }
            debug!("Nearest dirty tile {:?} is unreachable, wandering", target);
        }

        self.wander(perception)
    }

    fn reset(&mut self) {
        self.cleaned.clear();
        self.current_plan.clear();
        self.phase = AgentPhase::Idle;
        self.last_search = None;
    }

    fn phase(&self) -> AgentPhase {
        self.phase
    }

    fn last_search(&self) -> Option<&SearchResult> {
        self.last_search.as_ref()
    }

    fn discard_plan(&mut self) {
        self.current_plan.clear();
    }
}

/// Always heads for the nearest dirty tile along an A* path, and replans
/// whenever its goal stops being dirty.
#[derive(Debug, Default)]
pub struct UtilityAgent {
    current_plan: VecDeque<Position>,
    current_goal: Option<Position>,
    phase: AgentPhase,
    last_search: Option<SearchResult>,
}

impl UtilityAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_goal(&self) -> Option<Position> {
        self.current_goal
    }

    fn clear_plan(&mut self) {
        self.current_plan.clear();
        self.current_goal = None;
    }
}

impl Agent for UtilityAgent {
    fn name(&self) -> &'static str {
        "Utility-Optimal (A*)"
    }

    fn act(&mut self, environment: &Environment, perception: &Perception) -> Action {
        self.last_search = None;

        if perception.tile == Tile::Dirty {
            self.clear_plan();
            self.phase = AgentPhase::Cleaning;
            return Action::Clean;
        }

        // 1. Follow existing plan while its goal is still worth reaching
        if let Some(goal) = self.current_goal {
            if environment.tile_at(goal.x, goal.y) != Tile::Dirty {
                debug!("Goal {:?} is no longer dirty, replanning", goal);
                self.clear_plan();
            } else if let Some(next) = self.current_plan.pop_front() {
                self.phase = AgentPhase::FollowingPath;
                return Action::MoveTo(next);
            }
        }

        // 2. Plan to the nearest dirty tile
        if let Some(target) = nearest_dirty_tile(environment, perception.position) {
            let result = Algorithm::AStar.search(environment, perception.position, target);
            if result.found {
                self.current_plan.extend(result.path.iter().copied());
                self.current_goal = Some(target);
            }
            self.last_search = Some(result);

            if let Some(next) = self.current_plan.pop_front() {
                debug!(
                    "Planned {} steps to {:?}",
                    self.current_plan.len() + 1,
                    target
                );
                self.phase = AgentPhase::Planning;
                return Action::MoveTo(next);
            }
            debug!("Nearest dirty tile {:?} is unreachable", target);
        }

        // 3. Nothing known to be dirty and reachable
        self.current_goal = None;
        self.phase = AgentPhase::Waiting;
        Action::Wait
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn phase(&self) -> AgentPhase {
        self.phase
    }

    fn last_search(&self) -> Option<&SearchResult> {
        self.last_search.as_ref()
    }

    fn discard_plan(&mut self) {
        self.clear_plan();
    }
}

/// Targets the first dirty tile in row-major order and reaches it with a
/// depth-first search.
#[derive(Debug, Default)]
pub struct GoalAgent {
    current_plan: VecDeque<Position>,
    phase: AgentPhase,
    last_search: Option<SearchResult>,
}

impl GoalAgent {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Agent for GoalAgent {
    fn name(&self) -> &'static str {
        "Goal-Directed (DFS)"
    }

    fn act(&mut self, environment: &Environment, perception: &Perception) -> Action {
        self.last_search = None;

        if perception.tile == Tile::Dirty {
            self.current_plan.clear();
            self.phase = AgentPhase::Cleaning;
            return Action::Clean;
        }

        if let Some(next) = self.current_plan.pop_front() {
            self.phase = AgentPhase::FollowingPath;
            return Action::MoveTo(next);
        }

        if let Some(&target) = environment.dirty_tiles().first() {
            let result = Algorithm::DepthFirst.search(environment, perception.position, target);
            if result.found {
                self.current_plan.extend(result.path.iter().copied());
            }
            self.last_search = Some(result);

            if let Some(next) = self.current_plan.pop_front() {
                debug!(
                    "Planned {} steps to {:?}",
                    self.current_plan.len() + 1,
                    target
                );
                self.phase = AgentPhase::Planning;
                return Action::MoveTo(next);
            }
            debug!("First dirty tile {:?} is unreachable", target);
        }

        self.phase = AgentPhase::Waiting;
        Action::Wait
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn phase(&self) -> AgentPhase {
        self.phase
    }

    fn last_search(&self) -> Option<&SearchResult> {
        self.last_search.as_ref()
    }

    fn discard_plan(&mut self) {
        self.current_plan.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::load_environment_from_string;

    fn p(x: usize, y: usize) -> Position {
        Position::new(x, y)
    }

    /// One perceive, act, apply cycle.
    fn step(agent: &mut dyn Agent, env: &mut Environment) -> Action {
        let perception = agent.perceive(env);
        let action = agent.act(env, &perception);
        env.process_action(action);
        action
    }

    fn all_agents() -> Vec<Box<dyn Agent>> {
        AgentKind::ALL.iter().map(|kind| kind.build(11)).collect()
    }

    #[test]
    fn kind_indices_round_trip() {
        for (i, kind) in AgentKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(AgentKind::from_index(i), Some(*kind));
        }
        assert_eq!(AgentKind::from_index(4), None);
    }

    #[test]
    fn every_agent_cleans_dirty_tile_first() {
        for mut agent in all_agents() {
            let mut env = load_environment_from_string("ST DT").unwrap();
            env.move_agent(1, 0);
            let perception = env.perceive();
            assert_eq!(
                agent.act(&env, &perception),
                Action::Clean,
                "{}",
                agent.name()
            );
            assert_eq!(agent.phase(), AgentPhase::Cleaning);
            assert!(agent.last_search().is_none());
        }
    }

    #[test]
    fn every_agent_waits_on_clean_world() {
        for mut agent in all_agents() {
            let env = load_environment_from_string("ST BL\nBL BL").unwrap();
            let perception = env.perceive();
            assert_eq!(
                agent.act(&env, &perception),
                Action::Wait,
                "{}",
                agent.name()
            );
            assert_eq!(agent.phase(), AgentPhase::Waiting);
        }
    }

    #[test]
    fn random_walker_moves_to_a_neighbor() {
        let env = load_environment_from_string(
            "
            BL BL BL
            BL ST BL
            BL BL DT
            ",
        )
        .unwrap();
        let mut agent = RandomWalker::new(3);
        let perception = env.perceive();
        for _ in 0..20 {
            match agent.act(&env, &perception) {
                Action::MoveTo(next) => assert!(perception.neighbors.contains(&next)),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn random_walker_is_reproducible() {
        let env = load_environment_from_string(
            "
            BL BL BL
            BL ST BL
            BL BL DT
            ",
        )
        .unwrap();
        let perception = env.perceive();
        let mut a = RandomWalker::new(42);
        let mut b = RandomWalker::new(42);
        let run_a: Vec<Action> = (0..16).map(|_| a.act(&env, &perception)).collect();
        let run_b: Vec<Action> = (0..16).map(|_| b.act(&env, &perception)).collect();
        assert_eq!(run_a, run_b);
    }

    #[test]
    fn random_walker_waits_when_boxed_in() {
        let env = load_environment_from_string(
            "
            ST WL DT
            WL BL BL
            ",
        )
        .unwrap();
        let mut agent = RandomWalker::new(0);
        let perception = env.perceive();
        assert_eq!(agent.act(&env, &perception), Action::Wait);
    }

    #[test]
    fn mapping_agent_plans_then_follows() {
        let mut env = load_environment_from_string(
            "
            ST BL BL
            BL BL BL
            BL BL DT
            ",
        )
        .unwrap();
        let mut agent = MappingAgent::new(Algorithm::BreadthFirst, 0);

        assert_eq!(step(&mut agent, &mut env), Action::MoveTo(p(1, 0)));
        assert_eq!(agent.phase(), AgentPhase::Planning);
        assert_eq!(agent.last_search().map(|r| r.path_cost), Some(4));
        assert_eq!(agent.pending_steps(), 3);

        assert_eq!(step(&mut agent, &mut env), Action::MoveTo(p(2, 0)));
        assert_eq!(agent.phase(), AgentPhase::FollowingPath);
        assert!(agent.last_search().is_none());

        step(&mut agent, &mut env);
        step(&mut agent, &mut env);
        assert_eq!(env.agent_position(), p(2, 2));
        assert_eq!(step(&mut agent, &mut env), Action::Clean);
        assert!(agent.cleaned_tiles().contains(&p(2, 2)));
        assert!(env.is_complete());
        assert_eq!(step(&mut agent, &mut env), Action::Wait);
    }

    #[test]
    fn mapping_agent_can_plan_with_astar() {
        let env = load_environment_from_string(
            "
            ST BL BL
            BL BL BL
            BL BL DT
            ",
        )
        .unwrap();
        let mut agent = MappingAgent::new(Algorithm::AStar, 0);
        assert_eq!(agent.name(), "Mapped-Avoidance (A*)");
        let perception = env.perceive();
        assert!(matches!(agent.act(&env, &perception), Action::MoveTo(_)));
        assert_eq!(agent.last_search().map(|r| r.path_cost), Some(4));
    }

    #[test]
    fn mapping_agent_avoids_cleaned_tiles_when_dirt_unreachable() {
        let mut env = load_environment_from_string(
            "
            BL ST DT WL DT
            ",
        )
        .unwrap();
        let mut agent = MappingAgent::new(Algorithm::BreadthFirst, 5);

        assert_eq!(step(&mut agent, &mut env), Action::MoveTo(p(2, 0)));
        assert_eq!(step(&mut agent, &mut env), Action::Clean);
        // (4, 0) is walled off; the only unvisited neighbour is (1, 0).
        assert_eq!(step(&mut agent, &mut env), Action::MoveTo(p(1, 0)));
        assert_eq!(agent.phase(), AgentPhase::Idle);
        assert!(agent.last_search().is_some_and(|r| !r.found));
    }

    #[test]
    fn mapping_agent_reset_forgets_memory() {
        let mut env = load_environment_from_string("ST DT BL BL DT").unwrap();
        let mut agent = MappingAgent::new(Algorithm::BreadthFirst, 1);
        step(&mut agent, &mut env);
        step(&mut agent, &mut env);
        step(&mut agent, &mut env);
        assert!(!agent.cleaned_tiles().is_empty());
        assert!(agent.pending_steps() > 0);

        agent.reset();
        assert!(agent.cleaned_tiles().is_empty());
        assert_eq!(agent.pending_steps(), 0);
        assert_eq!(agent.phase(), AgentPhase::Idle);
    }

    #[test]
    fn utility_agent_replans_when_goal_goes_stale() {
        let mut env = load_environment_from_string(
            "
            ST BL DT
            BL BL BL
            DT BL BL
            ",
        )
        .unwrap();
        let mut agent = UtilityAgent::new();

        assert_eq!(step(&mut agent, &mut env), Action::MoveTo(p(1, 0)));
        assert_eq!(agent.current_goal(), Some(p(2, 0)));

        // Something else cleans the goal behind the agent's back.
        env.move_agent(2, 0);
        env.clean_current_tile();
        env.move_agent(1, 0);

        let perception = env.perceive();
        assert!(matches!(agent.act(&env, &perception), Action::MoveTo(_)));
        assert_eq!(agent.phase(), AgentPhase::Planning);
        assert_eq!(agent.current_goal(), Some(p(0, 2)));
        assert_eq!(agent.last_search().map(|r| r.path_cost), Some(3));
    }

    #[test]
    fn utility_agent_waits_behind_wall() {
        let mut env = load_environment_from_string(
            "
            ST BL WL DT
            BL BL WL BL
            ",
        )
        .unwrap();
        let mut agent = UtilityAgent::new();
        for _ in 0..10 {
            assert_eq!(step(&mut agent, &mut env), Action::Wait);
            assert_eq!(agent.current_goal(), None);
        }
        assert!(!env.is_complete());
    }

    #[test]
    fn goal_agent_targets_first_dirty_tile_not_nearest() {
        let env = load_environment_from_string(
            "
            ST BL BL BL DT
            BL DT BL BL BL
            ",
        )
        .unwrap();
        let mut agent = GoalAgent::new();
        let perception = env.perceive();
        assert!(matches!(agent.act(&env, &perception), Action::MoveTo(_)));
        let search = agent.last_search().unwrap();
        assert!(search.found);
        assert_eq!(search.path.last(), Some(&p(4, 0)));
    }

    #[test]
    fn goal_agent_waits_when_first_dirt_unreachable() {
        let env = load_environment_from_string(
            "
            ST BL WL DT
            DT BL WL BL
            ",
        )
        .unwrap();
        let mut agent = GoalAgent::new();
        let perception = env.perceive();
        assert_eq!(agent.act(&env, &perception), Action::Wait);
        assert!(agent.last_search().is_some_and(|r| !r.found));
    }

    #[test]
    fn discard_plan_forces_replanning() {
        let env = load_environment_from_string("ST BL BL DT").unwrap();
        let mut agent = GoalAgent::new();
        let perception = env.perceive();
        agent.act(&env, &perception);
        agent.discard_plan();
        agent.act(&env, &perception);
        assert_eq!(agent.phase(), AgentPhase::Planning);
    }
}
