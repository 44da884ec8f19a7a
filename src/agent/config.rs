use serde::{Deserialize, Serialize};

use crate::error::{AgentError, EnvError, TraderResult};

/// Layer widths of the Q-network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkShape {
    /// Number of convolution filters over the time axis.
    pub conv_filters: usize,
    /// Convolution width in bars.
    pub kernel_size: usize,
    /// Hidden size of the recurrent summarizer.
    pub recurrent_units: usize,
    /// Width of the fully connected layer before the output.
    pub hidden_units: usize,
    /// Dropout probability applied after the hidden layer while learning.
    pub dropout: f64,
}

impl Default for NetworkShape {
    fn default() -> Self {
        Self {
            conv_filters: 16,
            kernel_size: 3,
            recurrent_units: 32,
            hidden_units: 64,
            dropout: 0.2,
        }
    }
}

/// Shape of the observations a network is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputDims {
    pub window_size: usize,
    pub feature_count: usize,
    pub account_len: usize,
}

impl InputDims {
    pub fn new(window_size: usize, feature_count: usize) -> Self {
        Self {
            window_size,
            feature_count,
            account_len: crate::gym::trading::state::AccountState::LEN,
        }
    }
}

/// Hyperparameters of a [`DqnAgent`](crate::agent::dqn::DqnAgent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    gamma: f64,
    epsilon: f64,
    epsilon_min: f64,
    epsilon_decay: f64,
    batch_size: usize,
    tau: f64,
    update_frequency: u64,
    double_dqn: bool,
    learning_rate: f64,
    replay_capacity: usize,
    huber_delta: f64,
    max_grad_norm: f64,
    shape: NetworkShape,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.95,
            epsilon: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            batch_size: 32,
            tau: 0.01,
            update_frequency: 10,
            double_dqn: true,
            learning_rate: 1e-3,
            replay_capacity: 10_000,
            huber_delta: 1.0,
            max_grad_norm: 10.0,
            shape: NetworkShape::default(),
        }
    }
}

// ================================================================================================
// Builder Methods
// ================================================================================================

impl AgentConfig {
    pub fn with_gamma(self, gamma: f64) -> Self {
        Self { gamma, ..self }
    }

    pub fn with_epsilon(self, epsilon: f64) -> Self {
        Self { epsilon, ..self }
    }

    pub fn with_epsilon_min(self, epsilon_min: f64) -> Self {
        Self {
            epsilon_min,
            ..self
        }
    }

    pub fn with_epsilon_decay(self, epsilon_decay: f64) -> Self {
        Self {
            epsilon_decay,
            ..self
        }
    }

    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    pub fn with_tau(self, tau: f64) -> Self {
        Self { tau, ..self }
    }

    pub fn with_update_frequency(self, update_frequency: u64) -> Self {
        Self {
            update_frequency,
            ..self
        }
    }

    pub fn with_double_dqn(self, double_dqn: bool) -> Self {
        Self { double_dqn, ..self }
    }

    pub fn with_learning_rate(self, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            ..self
        }
    }

    pub fn with_replay_capacity(self, replay_capacity: usize) -> Self {
        Self {
            replay_capacity,
            ..self
        }
    }

    pub fn with_huber_delta(self, huber_delta: f64) -> Self {
        Self {
            huber_delta,
            ..self
        }
    }

    pub fn with_max_grad_norm(self, max_grad_norm: f64) -> Self {
        Self {
            max_grad_norm,
            ..self
        }
    }

    pub fn with_shape(self, shape: NetworkShape) -> Self {
        Self { shape, ..self }
    }
}

// ================================================================================================
// Accessor Methods
// ================================================================================================

impl AgentConfig {
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Initial exploration rate.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn epsilon_min(&self) -> f64 {
        self.epsilon_min
    }

    pub fn epsilon_decay(&self) -> f64 {
        self.epsilon_decay
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    pub fn update_frequency(&self) -> u64 {
        self.update_frequency
    }

    pub fn double_dqn(&self) -> bool {
        self.double_dqn
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn replay_capacity(&self) -> usize {
        self.replay_capacity
    }

    pub fn huber_delta(&self) -> f64 {
        self.huber_delta
    }

    pub fn max_grad_norm(&self) -> f64 {
        self.max_grad_norm
    }

    pub fn shape(&self) -> NetworkShape {
        self.shape
    }
}

// ================================================================================================
// Validation & Hashing
// ================================================================================================

impl AgentConfig {
    pub fn validate(&self) -> TraderResult<()> {
        fn invalid(msg: String) -> TraderResult<()> {
            Err(AgentError::InvalidConfig(msg).into())
        }

        if !(0.0..=1.0).contains(&self.gamma) {
            return invalid(format!("gamma must be in [0, 1], got {}", self.gamma));
        }
        if !(0.0..=1.0).contains(&self.epsilon_min) || self.epsilon < self.epsilon_min {
            return invalid(format!(
                "expected 0 <= epsilon_min ({}) <= epsilon ({}) <= 1",
                self.epsilon_min, self.epsilon
            ));
        }
        if self.epsilon > 1.0 {
            return invalid(format!("epsilon must be <= 1, got {}", self.epsilon));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return invalid(format!(
                "epsilon_decay must be in (0, 1], got {}",
                self.epsilon_decay
            ));
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".to_string());
        }
        if !(self.tau > 0.0 && self.tau <= 1.0) {
            return invalid(format!("tau must be in (0, 1], got {}", self.tau));
        }
        if self.update_frequency == 0 {
            return invalid("update_frequency must be at least 1".to_string());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }
        if self.replay_capacity < self.batch_size {
            return invalid(format!(
                "replay_capacity ({}) must hold at least one batch ({})",
                self.replay_capacity, self.batch_size
            ));
        }
        if !(self.huber_delta > 0.0 && self.max_grad_norm > 0.0) {
            return invalid("huber_delta and max_grad_norm must be positive".to_string());
        }
        let s = &self.shape;
        if s.conv_filters == 0 || s.kernel_size == 0 || s.recurrent_units == 0 || s.hidden_units == 0
        {
            return invalid(format!("network layers must be non-empty, got {s:?}"));
        }
        if !(0.0..1.0).contains(&s.dropout) {
            return invalid(format!("dropout must be in [0, 1), got {}", s.dropout));
        }
        Ok(())
    }

    /// Checks that the network can be built for `dims`.
    pub fn validate_for(&self, dims: InputDims) -> TraderResult<()> {
        self.validate()?;
        if dims.window_size < self.shape.kernel_size {
            return Err(AgentError::InvalidConfig(format!(
                "window_size {} is shorter than kernel_size {}",
                dims.window_size, self.shape.kernel_size
            ))
            .into());
        }
        if dims.feature_count == 0 {
            return Err(AgentError::InvalidConfig("no input features".to_string()).into());
        }
        Ok(())
    }

    /// Computes a deterministic hash of this configuration.
    pub fn hash(&self) -> TraderResult<String> {
        let mut hasher = blake3::Hasher::new();
        let bytes = postcard::to_stdvec(self).map_err(EnvError::Encoding)?;
        hasher.update(&bytes);
        Ok(format!("{}", hasher.finalize()))
    }
}
