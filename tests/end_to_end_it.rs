use rl_trader::prelude::*;

mod common;

#[test]
fn buy_and_hold_profits_on_a_rising_market() {
    let cfg = EnvConfig::default()
        .with_fee_percent(0.0)
        .with_use_risk_adjustment(false);
    let mut env = Environment::new(&common::rising(200), cfg).unwrap();
    let mut agent = ScriptedAgent::buy_and_hold();

    let summary = env.evaluate_agent(&mut agent).unwrap();

    assert!(summary.final_portfolio_value > 10_000.0);
    assert!(summary.total_return_pct > 0.0);
    assert_eq!(summary.trades, 1);
    assert_eq!(summary.win_rate, 1.0);
    assert_eq!(env.ledger().trades()[0].exit_reason, ExitReason::EndOfEpisode);
}

#[test]
fn round_trip_on_a_flat_market_costs_exactly_the_fees() {
    let mut env = Environment::new(&common::flat(200), EnvConfig::default()).unwrap();
    let mut state = env.reset().unwrap();
    let mut script = ScriptedAgent::buy_and_hold();
    let mut rewards = Vec::new();

    loop {
        let action = script.act(&state).unwrap();
        let step = env.step(action).unwrap();
        rewards.push(f64::from(step.reward));
        state = step.state;
        if step.done {
            break;
        }
    }

    // 0.1% on 10_000 at entry and at exit
    assert!((env.portfolio_value() - 9_980.0).abs() < 1e-9);
    assert!((env.ledger().fees_paid() - 20.0).abs() < 1e-9);
    assert!(rewards[0] < 0.0);
    assert!(rewards.iter().all(|r| *r <= 0.0));
    assert!(env.position().is_none());
}

#[test]
fn holding_leaves_the_balance_untouched() {
    let mut env = Environment::new(&common::wavy(150), EnvConfig::default()).unwrap();
    let mut agent = ScriptedAgent::new(Vec::new(), Action::Hold);

    let summary = env.evaluate_agent(&mut agent).unwrap();

    assert_eq!(summary.final_portfolio_value, 10_000.0);
    assert_eq!(summary.trades, 0);
    assert_eq!(summary.max_drawdown_pct, 0.0);
}

#[test]
fn stepping_past_the_end_stays_done() {
    let mut env = Environment::new(&common::wavy(80), EnvConfig::default()).unwrap();
    let mut agent = RandomAgent::new(3);
    env.evaluate_agent(&mut agent).unwrap();
    let value = env.portfolio_value();

    let step = env.step(Action::OpenLong).unwrap();
    assert!(step.done);
    assert_eq!(step.reward, Reward(0.0));
    assert_eq!(env.portfolio_value(), value);
    assert!(env.status().is_done());
}

#[test]
fn missing_close_column_fails_fast() {
    let df = common::flat(100).drop("close").unwrap();
    let err = Environment::new(&df, EnvConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingColumn);
    assert!(!err.is_recoverable());
}

#[test]
fn short_training_run_keeps_memory_bounded() {
    let cfg = EnvConfig::default()
        .with_window_size(16)
        .with_volatility_window(8);
    let env = Environment::new(&common::wavy(90), cfg).unwrap();
    let agent =
        DqnAgent::with_seed(common::small_agent_config(), common::dims_of(&env), 11).unwrap();
    let mut trainer = Trainer::new(env, agent, TrainerConfig::default()).unwrap();

    let metrics = trainer.train(3).unwrap();

    assert_eq!(metrics.len(), 3);
    assert_eq!(trainer.agent().memory().len(), 64);
    assert!(trainer.history().learn_steps() > 0);
    assert!(trainer.history().losses.iter().all(|l| l.is_finite()));
    assert!(metrics.iter().all(|m| m.final_portfolio_value.is_finite()));
    assert!(metrics[2].epsilon < metrics[0].epsilon);

    let holdout_cfg = EnvConfig::default()
        .with_window_size(16)
        .with_volatility_window(8);
    let mut holdout = Environment::new(&common::rising(60), holdout_cfg).unwrap();
    let test = trainer.test(&mut holdout).unwrap();
    assert_eq!(test.epsilon, 0.0);
    assert_eq!(test.steps, 60 - 1 - 16);
}
