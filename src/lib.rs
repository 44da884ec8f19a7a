//! Reinforcement-learning trading core.
//!
//! A raw OHLCV table is normalized into a bounded feature matrix, replayed bar
//! by bar by an episodic [`Environment`](gym::trading::env::Environment) and
//! traded by a Double-DQN agent whose Q-network fuses a convolutional and a
//! recurrent view of the market window. The [`Trainer`](trainer::Trainer)
//! drives the loop and checkpoints the best model.

pub mod agent;
pub mod data;
pub mod error;
pub mod gym;
pub mod io;
pub mod math;
pub mod prelude;
pub mod trainer;

mod macros;
