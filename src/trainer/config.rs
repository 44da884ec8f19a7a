use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EnvError, TraderResult};

/// Scheduling and checkpointing options of a [`Trainer`](crate::trainer::Trainer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Learn every `train_every` environment steps.
    train_every: usize,

    /// Transitions to collect before the first learning step.
    /// `None` waits for one full batch.
    warmup: Option<usize>,

    /// Where the best-reward model is written. `None` disables checkpointing.
    checkpoint_dir: Option<PathBuf>,

    /// Base file name of the checkpoint files.
    model_name: String,

    /// Draw an `indicatif` progress bar over episodes.
    show_progress: bool,

    /// Window of the moving average reward reported in logs.
    reward_average_window: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            train_every: 1,
            warmup: None,
            checkpoint_dir: None,
            model_name: "dqn".to_string(),
            show_progress: false,
            reward_average_window: 10,
        }
    }
}

impl TrainerConfig {
    pub fn with_train_every(self, train_every: usize) -> Self {
        Self {
            train_every,
            ..self
        }
    }

    pub fn with_warmup(self, warmup: usize) -> Self {
        Self {
            warmup: Some(warmup),
            ..self
        }
    }

    pub fn with_checkpoint_dir(self, dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: Some(dir.into()),
            ..self
        }
    }

    pub fn with_model_name(self, model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..self
        }
    }

    pub fn with_show_progress(self, show_progress: bool) -> Self {
        Self {
            show_progress,
            ..self
        }
    }

    pub fn with_reward_average_window(self, reward_average_window: usize) -> Self {
        Self {
            reward_average_window,
            ..self
        }
    }
}

impl TrainerConfig {
    pub fn train_every(&self) -> usize {
        self.train_every
    }

    /// Effective warm-up given the agent's batch size.
    pub fn warmup(&self, batch_size: usize) -> usize {
        self.warmup.unwrap_or(batch_size).max(batch_size)
    }

    pub fn checkpoint_dir(&self) -> Option<&Path> {
        self.checkpoint_dir.as_deref()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn show_progress(&self) -> bool {
        self.show_progress
    }

    pub fn reward_average_window(&self) -> usize {
        self.reward_average_window
    }

    pub fn validate(&self) -> TraderResult<()> {
        if self.train_every == 0 {
            return Err(EnvError::InvalidConfig("train_every must be at least 1".to_string()).into());
        }
        if self.model_name.trim().is_empty() {
            return Err(EnvError::InvalidConfig("model_name must not be empty".to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_never_below_batch() {
        let cfg = TrainerConfig::default();
        assert_eq!(cfg.warmup(32), 32);
        assert_eq!(cfg.clone().with_warmup(100).warmup(32), 100);
        assert_eq!(cfg.with_warmup(4).warmup(32), 32);
    }

    #[test]
    fn rejects_zero_cadence_and_blank_name() {
        assert!(TrainerConfig::default().with_train_every(0).validate().is_err());
        assert!(TrainerConfig::default().with_model_name(" ").validate().is_err());
        assert!(TrainerConfig::default().validate().is_ok());
    }
}
