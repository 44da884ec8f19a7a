pub mod config;
pub mod dqn;
pub mod layers;
pub mod network;
pub mod optimizer;
pub mod replay;
pub mod scripted;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    error::TraderResult,
    gym::trading::{action::Action, state::State},
};

/// Identifies an agent in logs and metrics.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Display,
    Default,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentIdentifier {
    /// A custom user-defined agent.
    #[strum(to_string = "{0}")]
    Named(String),

    Dqn,

    #[default]
    Random,
}

pub trait Agent {
    /// Decide on an action for the current observation.
    fn act(&mut self, state: &State) -> TraderResult<Action>;

    /// Optional agent name for logging/debugging.
    fn identifier(&self) -> AgentIdentifier {
        AgentIdentifier::Named("UnnamedAgent: override Agent::identifier()".to_string())
    }

    /// Reset internal state at the end of an episode. Default is no-op.
    fn reset(&mut self) {}
}

impl Agent for Box<dyn Agent> {
    fn act(&mut self, state: &State) -> TraderResult<Action> {
        (**self).act(state)
    }

    fn identifier(&self) -> AgentIdentifier {
        (**self).identifier()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}
