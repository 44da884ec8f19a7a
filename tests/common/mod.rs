#![allow(dead_code)]

use polars::{df, prelude::DataFrame};
use rl_trader::prelude::*;

/// OHLCV table whose close follows `close_at(i)`, with an ascending timestamp.
pub fn ohlcv(n: usize, close_at: impl Fn(usize) -> f64) -> DataFrame {
    let close: Vec<f64> = (0..n).map(close_at).collect();
    df!(
        "timestamp" => (0..n as i64).map(|i| 1_700_000_000 + i * 60).collect::<Vec<_>>(),
        "open" => close.clone(),
        "high" => close.iter().map(|c| c * 1.001).collect::<Vec<_>>(),
        "low" => close.iter().map(|c| c * 0.999).collect::<Vec<_>>(),
        "close" => close,
        "volume" => (0..n).map(|i| 1_000.0 + (i % 7) as f64 * 10.0).collect::<Vec<_>>(),
        "rsi_14" => (0..n).map(|i| 30.0 + (i % 40) as f64).collect::<Vec<_>>(),
    )
    .expect("valid synthetic table")
}

pub fn rising(n: usize) -> DataFrame {
    ohlcv(n, |i| 100.0 + i as f64 * 0.5)
}

pub fn flat(n: usize) -> DataFrame {
    ohlcv(n, |_| 100.0)
}

pub fn wavy(n: usize) -> DataFrame {
    ohlcv(n, |i| 100.0 + (i as f64 * 0.15).sin() * 4.0 + i as f64 * 0.02)
}

pub fn small_agent_config() -> AgentConfig {
    AgentConfig::default()
        .with_batch_size(8)
        .with_replay_capacity(64)
        .with_update_frequency(4)
        .with_epsilon_decay(0.98)
        .with_shape(NetworkShape {
            conv_filters: 4,
            kernel_size: 3,
            recurrent_units: 6,
            hidden_units: 12,
            dropout: 0.1,
        })
}

pub fn dims_of(env: &Environment) -> InputDims {
    InputDims::new(env.window_size(), env.feature_count())
}
