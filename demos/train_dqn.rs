use std::{env, path::PathBuf, time::Instant};

use anyhow::{Context, Result};
use polars::{df, prelude::DataFrame};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rl_trader::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();

    let episodes: usize = env::args()
        .nth(1)
        .map(|s| s.parse())
        .transpose()
        .context("episodes must be a positive integer")?
        .unwrap_or(20);
    let checkpoint_dir = PathBuf::from("demos/checkpoints");

    let mut rng = StdRng::seed_from_u64(42);
    let train_df = random_walk(1_500, &mut rng)?;
    let test_df = random_walk(500, &mut rng)?;

    let env_cfg = EnvConfig::default().with_window_size(30);
    let model_name = format!("dqn-{}", &env_cfg.hash()?[..12]);
    let train_env = Environment::new(&train_df, env_cfg.clone())?;
    let mut test_env = Environment::new(&test_df, env_cfg)?;

    let dims = InputDims::new(train_env.window_size(), train_env.feature_count());
    let agent = DqnAgent::with_seed(AgentConfig::default(), dims, 7)?;
    let trainer_cfg = TrainerConfig::default()
        .with_checkpoint_dir(&checkpoint_dir)
        .with_model_name(&model_name)
        .with_show_progress(true);
    let mut trainer = Trainer::new(train_env, agent, trainer_cfg)?;

    match trainer.resume(&checkpoint_dir, &model_name, StdRng::seed_from_u64(7)) {
        Ok(()) => info!(model = %model_name, "Continuing from checkpoint"),
        Err(e) if e.is_recoverable() => warn!(error = %e, "Starting from fresh weights"),
        Err(e) => return Err(e.into()),
    }

    let start = Instant::now();
    trainer.train(episodes)?;
    let train_time = start.elapsed();

    let result = trainer.test(&mut test_env)?;
    let mut buy_and_hold = ScriptedAgent::buy_and_hold();
    let benchmark = test_env.evaluate_agent(&mut buy_and_hold)?;

    println!("\n--- Training ---");
    println!("{}", trainer.metrics_df()?);
    println!("Training time:            {train_time:?}");
    println!("\n--- Held-out evaluation ---");
    println!("DQN return:               {:.2}%", result.total_return_pct);
    println!("DQN trades:               {}", result.trades);
    println!("DQN win rate:             {:.2}", result.win_rate);
    println!("Buy & hold return:        {:.2}%", benchmark.total_return_pct);

    Ok(())
}

fn random_walk(n: usize, rng: &mut StdRng) -> Result<DataFrame> {
    let mut close = Vec::with_capacity(n);
    let mut price = 100.0_f64;
    for i in 0..n {
        let drift = (i as f64 / 50.0).sin() * 0.001;
        price *= 1.0 + drift + rng.random_range(-0.01..0.01);
        close.push(price);
    }
    let df = df!(
        "timestamp" => (0..n as i64).collect::<Vec<_>>(),
        "open" => close.iter().map(|c| c * 0.999).collect::<Vec<_>>(),
        "high" => close.iter().map(|c| c * 1.004).collect::<Vec<_>>(),
        "low" => close.iter().map(|c| c * 0.996).collect::<Vec<_>>(),
        "close" => close,
        "volume" => (0..n).map(|_| rng.random_range(500.0..1_500.0)).collect::<Vec<f64>>(),
    )?;
    Ok(df)
}

// ================================================================================================
// Tracing Configuration
// ================================================================================================

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let in_container = env::var("CONTAINER").is_ok();

    if in_container {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_current_span(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}
