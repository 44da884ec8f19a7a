use serde::{Deserialize, Serialize};

use crate::{
    error::TraderResult,
    gym::trading::{
        action::Action,
        env::Step,
        state::State,
    },
    impl_add_sub_primitive, impl_from_primitive, impl_neg_primitive,
};

pub mod trading;

/// Per-step reward handed to the agent.
///
/// Expressed as fractional portfolio change divided by the configured reward
/// scaling, optionally shaped by volatility and drawdown terms.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Reward(pub f64);
impl_from_primitive!(Reward, f64);
impl_add_sub_primitive!(Reward, f64);
impl_neg_primitive!(Reward, f64);

/// Gym-style episodic environment.
pub trait Env {
    /// Starts a new episode and returns its initial observation.
    fn reset(&mut self) -> TraderResult<State>;

    /// Applies `action` and advances time by one bar.
    fn step(&mut self, action: Action) -> TraderResult<Step>;
}

/// Lifecycle of an [`Env`].
///
/// ```md
/// Current State | Call    | Next State | Notes
/// --------------|---------|------------|--------------------------------------
/// `Ready`       | step()  | error      | `reset()` must come first
/// `Running`     | step()  | Running    | Continue within episode
/// `Running`     | step()  | Done       | Last bar reached, position liquidated
/// `Done`        | step()  | Done       | No-op, reports `done = true`
/// any           | reset() | Running    | Start a fresh episode
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    Ready,
    Running,
    Done,
}

impl EnvStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}
