use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Position,
    agent::{Agent, AgentKind, AgentPhase},
    config::{ConfigError, WorldConfig},
    environment::{Action, ActionResult, Environment, Perception},
    search::SearchResult,
};

/// Where a fresh world comes from on reset.
#[derive(Debug, Clone)]
enum WorldSource {
    Random(WorldConfig),
    Fixed(Environment),
}

/// Counters for the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Actions applied, including waits and rejected actions.
    pub ticks: usize,
    /// Successful moves.
    pub steps_taken: usize,
    pub tiles_cleaned: usize,
    pub waits: usize,
}

impl RunStats {
    /// Tiles cleaned per step taken, as a percentage.
    pub fn efficiency(&self) -> f64 {
        self.tiles_cleaned as f64 / self.steps_taken.max(1) as f64 * 100.0
    }
}

/// What happened during one [`Simulation::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub action: Action,
    /// Whether a tile got cleaned or the agent moved.
    pub effect: bool,
    pub complete: bool,
}

/// Drives one agent through one world, one step at a time.
///
/// All randomness comes from a single seeded generator, which hands out an
/// independent seed for every generated world and every agent built.
pub struct Simulation {
    source: WorldSource,
    environment: Environment,
    kind: AgentKind,
    agent: Box<dyn Agent>,
    rng: StdRng,
    stats: RunStats,
    complete: bool,
}

impl Simulation {
    /// Creates a simulation over a randomly generated world.
    pub fn new(config: WorldConfig, kind: AgentKind, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let environment = generate_world(&config, &mut rng);
        let agent = kind.build(rng.random());
        info!(
            width = config.width,
            height = config.height,
            total_dirt = environment.total_dirt(),
            agent = agent.name(),
            "Simulation created"
        );

        Ok(Simulation {
            source: WorldSource::Random(config),
            environment,
            kind,
            agent,
            rng,
            stats: RunStats::default(),
            complete: false,
        })
    }

    /// Creates a simulation over a fixed layout. Reset restores this layout.
    pub fn with_environment(environment: Environment, kind: AgentKind, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let agent = kind.build(rng.random());
        info!(
            width = environment.width(),
            height = environment.height(),
            total_dirt = environment.total_dirt(),
            agent = agent.name(),
            "Simulation created from fixed layout"
        );

        Simulation {
            source: WorldSource::Fixed(environment.clone()),
            environment,
            kind,
            agent,
            rng,
            stats: RunStats::default(),
            complete: false,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn agent_kind(&self) -> AgentKind {
        self.kind
    }

    pub fn agent_name(&self) -> &'static str {
        self.agent.name()
    }

    pub fn agent_phase(&self) -> AgentPhase {
        self.agent.phase()
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// True once the agent has waited on a fully cleaned world.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn perceive(&self) -> Perception {
        self.agent.perceive(&self.environment)
    }

    pub fn dirty_tiles(&self) -> Vec<Position> {
        self.environment.dirty_tiles()
    }

    pub fn cleanliness_percentage(&self) -> f64 {
        self.environment.cleanliness_percentage()
    }

    /// The search the agent ran during the last step, if any.
    pub fn last_search(&self) -> Option<&SearchResult> {
        self.agent.last_search()
    }

    /// Runs one perceive, act, apply cycle. Does nothing once complete.
    pub fn step(&mut self) -> StepReport {
        if self.complete {
            return StepReport {
                action: Action::Wait,
                effect: false,
                complete: true,
            };
        }

        let perception = self.agent.perceive(&self.environment);
        let action = self.agent.act(&self.environment, &perception);
        let effect = self.apply(action);

        if action == Action::Wait && self.environment.is_complete() {
            self.complete = true;
            info!(
                steps = self.stats.steps_taken,
                cleaned = self.environment.cleaned_dirt(),
                efficiency = self.stats.efficiency(),
                "Cleaning complete"
            );
        }

        StepReport {
            action,
            effect,
            complete: self.complete,
        }
    }

    /// Applies `action` to the world and returns whether it had an effect.
    pub fn apply(&mut self, action: Action) -> bool {
        let result = self.environment.process_action(action);
        self.stats.ticks += 1;

        match &result {
            ActionResult::Cleaned => {
                self.stats.tiles_cleaned += 1;
                debug!("Cleaned tile at {:?}", self.environment.agent_position());
            }
            ActionResult::Moved { .. } => self.stats.steps_taken += 1,
            ActionResult::Waited => self.stats.waits += 1,
            ActionResult::Rejected(reason) => {
                if matches!(action, Action::MoveTo(_)) {
                    self.agent.discard_plan();
                }
                debug!(?action, reason, "Action had no effect");
            }
        }

        result.had_effect()
    }

    /// Steps until complete or `max_steps` steps have run. Returns the number of steps run.
    pub fn run(&mut self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps && !self.complete {
            self.step();
            steps += 1;
        }
        steps
    }

    /// Switches to the agent at `index` in [`AgentKind::ALL`] and starts a new run.
    ///
    /// Returns `false`, changing nothing, if the index is out of range.
    pub fn select_agent(&mut self, index: usize) -> bool {
        let Some(kind) = AgentKind::from_index(index) else {
            warn!(index, "No agent at index");
            return false;
        };
        self.kind = kind;
        self.agent = kind.build(self.rng.random());
        self.restart();
        info!("Selected: {}", self.agent.name());
        true
    }

    /// Starts a new run with a fresh world and a blank agent memory.
    pub fn reset(&mut self) {
        self.agent.reset();
        self.restart();
        info!("Simulation reset");
    }

    fn restart(&mut self) {
        self.environment = match &self.source {
            WorldSource::Random(config) => generate_world(config, &mut self.rng),
            WorldSource::Fixed(layout) => layout.clone(),
        };
        self.stats = RunStats::default();
        self.complete = false;
    }
}

/// Generates a world from an already validated config.
fn generate_world(config: &WorldConfig, rng: &mut StdRng) -> Environment {
    let mut world_rng = StdRng::seed_from_u64(rng.random());
    Environment::populate(config, &mut world_rng)
}
