use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    agent::{Agent, AgentIdentifier},
    error::TraderResult,
    gym::trading::{action::Action, state::State},
};

/// Replays a fixed sequence of actions, then repeats a fallback.
///
/// Used as a deterministic baseline and in scenario tests.
#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    script: Vec<Action>,
    fallback: Action,
    cursor: usize,
}

impl ScriptedAgent {
    pub fn new(script: Vec<Action>, fallback: Action) -> Self {
        Self {
            script,
            fallback,
            cursor: 0,
        }
    }

    /// Opens a long on the first bar and holds it until liquidation.
    pub fn buy_and_hold() -> Self {
        Self::new(vec![Action::OpenLong], Action::Hold)
    }
}

impl Agent for ScriptedAgent {
    fn act(&mut self, _state: &State) -> TraderResult<Action> {
        let action = self
            .script
            .get(self.cursor)
            .copied()
            .unwrap_or(self.fallback);
        self.cursor += 1;
        Ok(action)
    }

    fn identifier(&self) -> AgentIdentifier {
        AgentIdentifier::Named("Scripted".to_string())
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

/// Uniformly random policy with an injected seed.
#[derive(Debug, Clone)]
pub struct RandomAgent {
    seed: u64,
    rng: StdRng,
}

impl RandomAgent {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomAgent {
    fn act(&mut self, _state: &State) -> TraderResult<Action> {
        Action::from_index(self.rng.random_range(0..4))
    }

    fn identifier(&self) -> AgentIdentifier {
        AgentIdentifier::Random
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}
