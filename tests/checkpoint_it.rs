use std::fs;

use rand::{SeedableRng, rngs::StdRng};
use rl_trader::prelude::*;

mod common;

fn trained() -> (Trainer, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let cfg = EnvConfig::default()
        .with_window_size(12)
        .with_volatility_window(6);
    let env = Environment::new(&common::wavy(60), cfg).unwrap();
    let agent =
        DqnAgent::with_seed(common::small_agent_config(), common::dims_of(&env), 5).unwrap();
    let config = TrainerConfig::default()
        .with_checkpoint_dir(dir.path())
        .with_model_name("wavy");
    let mut trainer = Trainer::new(env, agent, config).unwrap();
    trainer.train(2).unwrap();
    (trainer, dir)
}

#[test]
fn saved_agent_predicts_identically_after_load() {
    let (trainer, dir) = trained();
    let history = trainer.history().clone();
    trainer.agent().save(dir.path(), "latest", &history).unwrap();

    let (loaded, loaded_history) =
        DqnAgent::load(dir.path(), "latest", StdRng::seed_from_u64(0)).unwrap();

    assert_eq!(loaded_history, history);
    assert_eq!(loaded.params().config, trainer.agent().params().config);
    assert_eq!(loaded.epsilon(), trainer.agent().epsilon());
    assert_eq!(loaded.learn_steps(), trainer.agent().learn_steps());
    assert_eq!(loaded.main_network(), trainer.agent().main_network());
    assert_eq!(loaded.target_network(), trainer.agent().target_network());
    assert!(loaded.memory().is_empty());

    let state = trainer.agent().memory().iter().last().unwrap().next_state.clone();
    assert_eq!(
        loaded.q_values(&state).unwrap(),
        trainer.agent().q_values(&state).unwrap()
    );
}

#[test]
fn params_file_is_human_readable_json() {
    let (_trainer, dir) = trained();
    let params = fs::read_to_string(dir.path().join("wavy.params.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&params).unwrap();
    assert_eq!(value["config"]["gamma"], 0.95);
    assert_eq!(value["config"]["double_dqn"], true);
    assert!(value["learn_steps"].is_u64());
}

#[test]
fn corrupt_weights_are_a_recoverable_error() {
    let (mut trainer, dir) = trained();
    fs::write(dir.path().join("wavy.weights.postcard"), b"not a network").unwrap();

    let err = DqnAgent::load(dir.path(), "wavy", StdRng::seed_from_u64(0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CheckpointIo);
    assert!(err.is_recoverable());

    let err = trainer
        .resume(dir.path(), "wavy", StdRng::seed_from_u64(0))
        .unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(trainer.train(1).unwrap().len(), 1);
}
