use std::path::Path;

use chrono::{DateTime, Utc};
use ndarray::Array1;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumString};
use tracing::debug;

use crate::{
    agent::{
        Agent, AgentIdentifier,
        config::{AgentConfig, InputDims},
        network::QNetwork,
        optimizer::Adam,
        replay::{Batch, ReplayBuffer, Transition},
    },
    error::{AgentError, TraderResult},
    gym::trading::{action::Action, state::State},
    io::{self, CheckpointPaths, CheckpointPart, checkpoint_error},
    math::stats::argmax,
    trainer::metrics::TrainingHistory,
};

/// Whether the agent explores and applies dropout.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// Outcome of one learning step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearnReport {
    /// Mean Huber loss over the batch.
    pub loss: f64,
    /// Mean of the largest predicted Q-value per sampled state.
    pub mean_q: f64,
    /// Exploration rate after decay.
    pub epsilon: f64,
}

/// Hyperparameters and counters persisted next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentParams {
    pub config: AgentConfig,
    pub dims: InputDims,
    pub epsilon: f64,
    pub learn_steps: u64,
    pub target_updates: u64,
    pub saved_at: DateTime<Utc>,
}

/// Main network, target network and optimizer state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentWeights {
    pub main: QNetwork,
    pub target: QNetwork,
    pub optimizer: Adam,
}

/// Epsilon-greedy Deep Q-learning agent with a lagged target network.
///
/// With `double_dqn` enabled the main network selects the next action and the
/// target network evaluates it. Otherwise the target network's maximum is used
/// directly.
#[derive(Debug, Clone)]
pub struct DqnAgent {
    config: AgentConfig,
    dims: InputDims,
    main: QNetwork,
    target: QNetwork,
    optimizer: Adam,
    memory: ReplayBuffer,
    rng: StdRng,
    epsilon: f64,
    mode: Mode,
    learn_steps: u64,
    target_updates: u64,
}

// ================================================================================================
// Building
// ================================================================================================

impl DqnAgent {
    /// Builds an agent whose networks are initialized from `rng`.
    ///
    /// The target network starts as a hard copy of the main network.
    pub fn new(config: AgentConfig, dims: InputDims, mut rng: StdRng) -> TraderResult<Self> {
        config.validate_for(dims)?;
        let main = QNetwork::new(dims, config.shape(), &mut rng);
        let mut target = QNetwork::new(dims, config.shape(), &mut rng);
        target.soft_update(&main, 1.0);
        let optimizer = Adam::new(config.learning_rate(), &main);

        debug!(
            parameters = main.parameter_count(),
            window = dims.window_size,
            features = dims.feature_count,
            "DQN agent initialized"
        );

        Ok(Self {
            memory: ReplayBuffer::new(config.replay_capacity()),
            epsilon: config.epsilon(),
            mode: Mode::Train,
            learn_steps: 0,
            target_updates: 0,
            dims,
            main,
            target,
            optimizer,
            rng,
            config,
        })
    }

    pub fn with_seed(config: AgentConfig, dims: InputDims, seed: u64) -> TraderResult<Self> {
        Self::new(config, dims, StdRng::seed_from_u64(seed))
    }

    /// Restores an agent from persisted parts. The replay memory starts empty.
    pub fn from_parts(
        params: AgentParams,
        weights: AgentWeights,
        rng: StdRng,
    ) -> TraderResult<Self> {
        params.config.validate_for(params.dims)?;
        for net in [&weights.main, &weights.target] {
            if net.dims() != params.dims || net.shape() != params.config.shape() {
                return Err(AgentError::ShapeMismatch {
                    expected: format!("{:?} {:?}", params.dims, params.config.shape()),
                    actual: format!("{:?} {:?}", net.dims(), net.shape()),
                }
                .into());
            }
        }

        Ok(Self {
            memory: ReplayBuffer::new(params.config.replay_capacity()),
            epsilon: params.epsilon.clamp(params.config.epsilon_min(), 1.0),
            mode: Mode::Train,
            learn_steps: params.learn_steps,
            target_updates: params.target_updates,
            dims: params.dims,
            main: weights.main,
            target: weights.target,
            optimizer: weights.optimizer,
            rng,
            config: params.config,
        })
    }
}

// ================================================================================================
// Accessors
// ================================================================================================

impl DqnAgent {
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn dims(&self) -> InputDims {
        self.dims
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn learn_steps(&self) -> u64 {
        self.learn_steps
    }

    pub fn target_updates(&self) -> u64 {
        self.target_updates
    }

    pub fn memory(&self) -> &ReplayBuffer {
        &self.memory
    }

    pub fn main_network(&self) -> &QNetwork {
        &self.main
    }

    pub fn target_network(&self) -> &QNetwork {
        &self.target
    }

    pub fn params(&self) -> AgentParams {
        AgentParams {
            config: self.config.clone(),
            dims: self.dims,
            epsilon: self.epsilon,
            learn_steps: self.learn_steps,
            target_updates: self.target_updates,
            saved_at: Utc::now(),
        }
    }

    pub fn weights(&self) -> AgentWeights {
        AgentWeights {
            main: self.main.clone(),
            target: self.target.clone(),
            optimizer: self.optimizer.clone(),
        }
    }
}

// ================================================================================================
// Acting
// ================================================================================================

impl DqnAgent {
    pub fn q_values(&self, state: &State) -> TraderResult<Array1<f64>> {
        self.main.forward(state)
    }

    pub fn greedy_action(&self, state: &State) -> TraderResult<Action> {
        let q = self.q_values(state)?;
        Action::from_index(argmax(&q.to_vec()))
    }

    /// Epsilon-greedy in [`Mode::Train`], greedy in [`Mode::Eval`].
    pub fn select_action(&mut self, state: &State) -> TraderResult<Action> {
        self.main.check_input(state)?;
        if self.mode == Mode::Train && self.rng.random::<f64>() < self.epsilon {
            return Action::from_index(self.rng.random_range(0..Action::COUNT));
        }
        self.greedy_action(state)
    }

    pub fn remember(&mut self, transition: Transition) {
        self.memory.push(transition);
    }
}

impl Agent for DqnAgent {
    fn act(&mut self, state: &State) -> TraderResult<Action> {
        self.select_action(state)
    }

    fn identifier(&self) -> AgentIdentifier {
        if self.config.double_dqn() {
            AgentIdentifier::Dqn
        } else {
            AgentIdentifier::Named("StandardDqn".to_string())
        }
    }
}

// ================================================================================================
// Learning
// ================================================================================================

impl DqnAgent {
    /// TD targets `r + (1 − done)·γ·Q_target(s', a*)` for every sample.
    ///
    /// `a*` is chosen by the main network under Double DQN and by the target
    /// network otherwise. Terminal samples reduce to exactly `r`.
    pub fn compute_targets(&self, batch: &Batch) -> TraderResult<Vec<f64>> {
        let gamma = self.config.gamma();
        let mut targets = Vec::with_capacity(batch.len());

        for i in 0..batch.len() {
            let reward = batch.rewards[i];
            if batch.dones[i] {
                targets.push(reward);
                continue;
            }

            let next = &batch.next_states[i];
            let target_q = self.target.forward(next)?;
            let future = if self.config.double_dqn() {
                let best = argmax(&self.main.forward(next)?.to_vec());
                target_q[best]
            } else {
                target_q.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            };

            let y = reward + gamma * future;
            targets.push(if y.is_finite() { y } else { reward });
        }
        Ok(targets)
    }

    /// Samples a batch and takes one gradient step on the main network.
    ///
    /// Returns `None` while the replay memory holds fewer than `batch_size`
    /// transitions.
    pub fn learn(&mut self) -> TraderResult<Option<LearnReport>> {
        let batch_size = self.config.batch_size();
        if !self.memory.can_sample(batch_size) {
            return Ok(None);
        }

        let batch = self.memory.sample(batch_size, &mut self.rng);
        let targets = self.compute_targets(&batch)?;
        let (loss, mean_q) = self.fit(&batch, &targets)?;

        self.decay_epsilon();
        self.learn_steps += 1;
        if self.learn_steps % self.config.update_frequency() == 0 {
            self.update_target(self.config.tau());
        }

        debug!(
            step = self.learn_steps,
            loss,
            mean_q,
            epsilon = self.epsilon,
            "Learning step"
        );
        Ok(Some(LearnReport {
            loss,
            mean_q,
            epsilon: self.epsilon,
        }))
    }

    /// Blends the target network toward the main network.
    pub fn update_target(&mut self, tau: f64) {
        self.target.soft_update(&self.main, tau);
        self.target_updates += 1;
    }

    fn decay_epsilon(&mut self) {
        self.epsilon = (self.epsilon * self.config.epsilon_decay()).max(self.config.epsilon_min());
    }

    /// Regresses `Q_main(s, a)` toward the targets with a Huber loss. Only the
    /// taken action's column differs from the prediction, so only it carries
    /// gradient.
    fn fit(&mut self, batch: &Batch, targets: &[f64]) -> TraderResult<(f64, f64)> {
        let n = batch.len();
        let delta = self.config.huber_delta();
        let scale = 1.0 / (n * Action::COUNT) as f64;

        let mut grads = self.main.zeros_like();
        let mut loss = 0.0;
        let mut q_sum = 0.0;

        for i in 0..n {
            let state = &batch.states[i];
            let (q, cache) = self.main.forward_train(state, &mut self.rng)?;
            q_sum += q.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            let mut target = q.clone();
            target[batch.actions[i].index()] = targets[i];
            let err = &q - &target;

            loss += err.iter().map(|e| huber(*e, delta)).sum::<f64>() * scale;
            let dq = err.mapv(|e| huber_grad(e, delta) * scale);
            self.main.backward(state, &cache, dq.view(), &mut grads);
        }

        grads.clip_global_norm(self.config.max_grad_norm());
        self.optimizer.step(&mut self.main, &grads);

        let mean_q = q_sum / n.max(1) as f64;
        Ok((loss, if mean_q.is_finite() { mean_q } else { 0.0 }))
    }
}

// ================================================================================================
// Persistence
// ================================================================================================

impl DqnAgent {
    /// Writes weights, parameters and `history` as three sibling files.
    #[tracing::instrument(skip(self, history), fields(dir = %dir.display()))]
    pub fn save(
        &self,
        dir: &Path,
        name: &str,
        history: &TrainingHistory,
    ) -> TraderResult<CheckpointPaths> {
        let paths = CheckpointPaths::new(dir, name);

        io::write(&paths.weights, &self.weights(), CheckpointPart::Weights.format())
            .map_err(|e| checkpoint_error(&paths.weights, e))?;
        io::write(&paths.params, &self.params(), CheckpointPart::Params.format())
            .map_err(|e| checkpoint_error(&paths.params, e))?;
        io::write(&paths.history, history, CheckpointPart::History.format())
            .map_err(|e| checkpoint_error(&paths.history, e))?;

        debug!(name, learn_steps = self.learn_steps, "Checkpoint saved");
        Ok(paths)
    }

    /// Loads a checkpoint written by [`Self::save`].
    ///
    /// Any failure (missing, truncated or mismatched file) surfaces as a
    /// recoverable checkpoint error.
    #[tracing::instrument(skip(rng), fields(dir = %dir.display()))]
    pub fn load(dir: &Path, name: &str, rng: StdRng) -> TraderResult<(Self, TrainingHistory)> {
        let paths = CheckpointPaths::new(dir, name);
        paths.ensure_exist()?;

        let weights: AgentWeights = io::read(&paths.weights, CheckpointPart::Weights.format())
            .map_err(|e| checkpoint_error(&paths.weights, e))?;
        let params: AgentParams = io::read(&paths.params, CheckpointPart::Params.format())
            .map_err(|e| checkpoint_error(&paths.params, e))?;
        let history: TrainingHistory = io::read(&paths.history, CheckpointPart::History.format())
            .map_err(|e| checkpoint_error(&paths.history, e))?;

        let agent = Self::from_parts(params, weights, rng)
            .map_err(|e| checkpoint_error(&paths.params, e))?;
        debug!(name, learn_steps = agent.learn_steps, "Checkpoint loaded");
        Ok((agent, history))
    }
}

// ================================================================================================
// Loss
// ================================================================================================

pub fn huber(err: f64, delta: f64) -> f64 {
    let a = err.abs();
    if a <= delta {
        0.5 * err * err
    } else {
        delta * (a - 0.5 * delta)
    }
}

pub fn huber_grad(err: f64, delta: f64) -> f64 {
    err.clamp(-delta, delta)
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;
    use crate::{
        agent::config::NetworkShape,
        gym::trading::state::{AccountState, MarketWindow},
    };

    fn dims() -> InputDims {
        InputDims::new(4, 2)
    }

    fn small() -> AgentConfig {
        AgentConfig::default()
            .with_batch_size(4)
            .with_shape(NetworkShape {
                conv_filters: 3,
                kernel_size: 2,
                recurrent_units: 4,
                hidden_units: 6,
                dropout: 0.0,
            })
    }

    fn state(v: f64) -> State {
        State::new(
            MarketWindow::new(Array2::from_elem((4, 2), v)),
            AccountState::flat(),
        )
    }

    /// Makes a network output `bias` regardless of its input.
    fn pin_outputs(net: &mut QNetwork, bias: [f64; 4]) {
        let out = net.output_layer_mut();
        out.weights.fill(0.0);
        out.bias = Array1::from_vec(bias.to_vec());
    }

    fn batch(done: bool) -> Batch {
        [Transition::new(state(0.1), Action::OpenLong, 0.5, state(0.2), done)]
            .into_iter()
            .collect()
    }

    #[test]
    fn terminal_target_is_exactly_the_reward() {
        let agent = DqnAgent::with_seed(small(), dims(), 1).unwrap();
        let targets = agent.compute_targets(&batch(true)).unwrap();
        assert_eq!(targets, vec![0.5]);
    }

    #[test]
    fn double_and_standard_targets_differ_when_networks_disagree() {
        let mut double = DqnAgent::with_seed(small(), dims(), 2).unwrap();
        // main prefers action 0, target prefers action 3
        pin_outputs(&mut double.main, [5.0, 1.0, 0.0, 0.0]);
        pin_outputs(&mut double.target, [1.0, 2.0, 0.0, 10.0]);

        let mut standard = double.clone();
        standard.config = standard.config.clone().with_double_dqn(false);

        let gamma = double.config.gamma();
        let y_double = double.compute_targets(&batch(false)).unwrap()[0];
        let y_standard = standard.compute_targets(&batch(false)).unwrap()[0];

        assert!((y_double - (0.5 + gamma * 1.0)).abs() < 1e-12);
        assert!((y_standard - (0.5 + gamma * 10.0)).abs() < 1e-12);
        assert_ne!(y_double, y_standard);
    }

    #[test]
    fn target_starts_as_copy_of_main() {
        let agent = DqnAgent::with_seed(small(), dims(), 3).unwrap();
        assert_eq!(agent.main_network(), agent.target_network());
    }

    #[test]
    fn learn_waits_for_a_full_batch_then_decays_epsilon() {
        let mut agent = DqnAgent::with_seed(small().with_update_frequency(2), dims(), 4).unwrap();
        for i in 0..3 {
            let s = state(i as f64 * 0.1);
            agent.remember(Transition::new(s.clone(), Action::Hold, 0.1, s, false));
        }
        assert!(agent.learn().unwrap().is_none());
        assert_eq!(agent.epsilon(), 1.0);

        let s = state(0.5);
        agent.remember(Transition::new(s.clone(), Action::OpenShort, -0.2, s, true));

        let mut last = agent.epsilon();
        for _ in 0..5 {
            let report = agent.learn().unwrap().unwrap();
            assert!(report.loss.is_finite());
            assert!(report.epsilon <= last);
            assert!(report.epsilon >= agent.config().epsilon_min());
            last = report.epsilon;
        }
        assert_eq!(agent.learn_steps(), 5);
        assert_eq!(agent.target_updates(), 2);
    }

    #[test]
    fn epsilon_never_drops_below_floor() {
        let cfg = small().with_epsilon_decay(0.5).with_epsilon_min(0.2);
        let mut agent = DqnAgent::with_seed(cfg, dims(), 5).unwrap();
        for _ in 0..20 {
            agent.decay_epsilon();
        }
        assert_eq!(agent.epsilon(), 0.2);
    }

    #[test]
    fn eval_mode_is_greedy() {
        let mut agent = DqnAgent::with_seed(small(), dims(), 6).unwrap();
        pin_outputs(&mut agent.main, [0.0, 0.0, 3.0, 0.0]);
        agent.set_mode(Mode::Eval);
        for _ in 0..20 {
            assert_eq!(agent.act(&state(0.3)).unwrap(), Action::OpenShort);
        }
    }

    #[test]
    fn learning_reduces_loss_on_a_fixed_target() {
        let cfg = small().with_learning_rate(1e-2).with_epsilon_decay(1.0);
        let mut agent = DqnAgent::with_seed(cfg, dims(), 7).unwrap();
        for i in 0..4 {
            let s = state(0.2 * i as f64);
            agent.remember(Transition::new(s.clone(), Action::OpenLong, 1.0, s, true));
        }
        let first = agent.learn().unwrap().unwrap().loss;
        let mut last = first;
        for _ in 0..200 {
            last = agent.learn().unwrap().unwrap().loss;
        }
        assert!(last < first);
    }

    #[test]
    fn checkpoint_restores_epsilon_and_history_bit_for_bit() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = DqnAgent::with_seed(small(), dims(), 8).unwrap();
        let history = TrainingHistory {
            losses: vec![0.05433715331685597, 1.0 / 3.0],
            rewards: vec![-0.1 * 7.0, 2.0_f64.sqrt()],
            q_values: vec![0.1 + 0.2],
            epsilons: vec![0.9604],
        };

        let mut epsilon = 1.0;
        for _ in 0..200 {
            epsilon *= 0.98;
            agent.set_epsilon(epsilon);
            agent.save(dir.path(), "eps", &history).unwrap();

            let (loaded, loaded_history) =
                DqnAgent::load(dir.path(), "eps", StdRng::seed_from_u64(0)).unwrap();
            assert_eq!(loaded.epsilon().to_bits(), epsilon.to_bits());
            assert_eq!(loaded_history, history);
        }
    }

    #[test]
    fn huber_is_quadratic_then_linear() {
        assert_eq!(huber(0.5, 1.0), 0.125);
        assert_eq!(huber(-3.0, 1.0), 2.5);
        assert_eq!(huber_grad(0.5, 1.0), 0.5);
        assert_eq!(huber_grad(-3.0, 1.0), -1.0);
    }
}
