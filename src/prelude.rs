// 1. Traits
pub use crate::agent::Agent;
pub use crate::gym::Env;
pub use crate::math::rolling::StreamingIndicator;

// 2. The Core "Loop" Types
pub use crate::gym::{
    EnvStatus, Reward,
    trading::{
        action::Action,
        config::EnvConfig,
        env::{Environment, Step, StepInfo},
        ledger::{EpisodeSummary, ExitReason, TradeRecord},
        position::{Direction, Position},
        state::{AccountState, MarketWindow, State},
    },
};

// 3. Market Data
pub use crate::data::{market::MarketData, normalizer::FeatureNormalizer};

// 4. Agents
pub use crate::agent::{
    AgentIdentifier,
    config::{AgentConfig, InputDims, NetworkShape},
    dqn::{DqnAgent, LearnReport, Mode},
    replay::{ReplayBuffer, Transition},
    scripted::{RandomAgent, ScriptedAgent},
};

// 5. Training
pub use crate::trainer::{
    Trainer,
    config::TrainerConfig,
    metrics::{EpisodeMetrics, TrainingHistory},
};

// 6. Errors
pub use crate::error::{
    AgentError, DataError, EnvError, ErrorKind, IoError, SystemError, TraderError, TraderResult,
};

// 7. Persistence
pub use crate::io::{CheckpointPaths, SerdeFormat};
