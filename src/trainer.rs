pub mod config;
pub mod metrics;

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::DataFrame;
use rand::rngs::StdRng;
use tracing::{debug, error, info, warn};

use crate::{
    agent::{
        config::InputDims,
        dqn::{DqnAgent, Mode},
        replay::Transition,
    },
    error::{AgentError, EnvError, TraderResult},
    gym::{
        Env,
        trading::{action::Action, env::Environment, state::State},
    },
    io::CheckpointPaths,
    math::{
        rolling::{StreamingIndicator, StreamingSma},
        stats::mean,
    },
    trainer::{
        config::TrainerConfig,
        metrics::{EpisodeMetrics, TrainingHistory, metrics_df},
    },
};

/// Binds one [`Environment`] to one [`DqnAgent`] and runs the episodic
/// `act -> step -> remember -> learn` loop.
#[derive(Debug)]
pub struct Trainer {
    env: Environment,
    agent: DqnAgent,
    config: TrainerConfig,
    history: TrainingHistory,
    metrics: Vec<EpisodeMetrics>,
    best_reward: Option<f64>,
    reward_average: StreamingSma,
}

// ================================================================================================
// Building
// ================================================================================================

impl Trainer {
    /// # Errors
    /// - [`AgentError::ShapeMismatch`] if the agent was built for a different
    ///   window or feature count than the environment produces.
    /// - [`EnvError::InvalidConfig`] if `config` is out of range.
    pub fn new(env: Environment, agent: DqnAgent, config: TrainerConfig) -> TraderResult<Self> {
        config.validate()?;
        check_dims(&env, agent.dims())?;
        Ok(Self {
            reward_average: StreamingSma::new(config.reward_average_window()),
            history: TrainingHistory::default(),
            metrics: Vec::new(),
            best_reward: None,
            env,
            agent,
            config,
        })
    }

    /// Replaces the agent and history with a saved checkpoint.
    ///
    /// On failure the trainer is left untouched, so the caller may go on
    /// training from fresh weights.
    #[tracing::instrument(skip(self, rng), fields(dir = %dir.display()))]
    pub fn resume(&mut self, dir: &Path, name: &str, rng: StdRng) -> TraderResult<()> {
        let (agent, history) = DqnAgent::load(dir, name, rng)?;
        check_dims(&self.env, agent.dims())?;
        self.best_reward = history.best_reward();
        self.agent = agent;
        self.history = history;
        info!(
            name,
            episodes = self.history.episodes(),
            learn_steps = self.agent.learn_steps(),
            "Resumed from checkpoint"
        );
        Ok(())
    }
}

// ================================================================================================
// Accessors
// ================================================================================================

impl Trainer {
    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn agent(&self) -> &DqnAgent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut DqnAgent {
        &mut self.agent
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn metrics(&self) -> &[EpisodeMetrics] {
        &self.metrics
    }

    pub fn best_reward(&self) -> Option<f64> {
        self.best_reward
    }

    pub fn metrics_df(&self) -> TraderResult<DataFrame> {
        metrics_df(&self.metrics)
    }

    pub fn into_agent(self) -> DqnAgent {
        self.agent
    }
}

// ================================================================================================
// Training
// ================================================================================================

impl Trainer {
    /// Runs `episodes` training episodes and returns their metrics.
    #[tracing::instrument(skip(self), fields(model = self.config.model_name()))]
    pub fn train(&mut self, episodes: usize) -> TraderResult<Vec<EpisodeMetrics>> {
        let bar = if self.config.show_progress() {
            Some(progress_bar(episodes as u64)?)
        } else {
            None
        };

        let mut out = Vec::with_capacity(episodes);
        for _ in 0..episodes {
            let metrics = self.run_episode()?;
            let average = self.reward_average.update(metrics.total_reward);

            info!(
                episode = metrics.episode,
                steps = metrics.steps,
                reward = metrics.total_reward,
                average_reward = average,
                portfolio = metrics.final_portfolio_value,
                trades = metrics.trades,
                win_rate = metrics.win_rate,
                epsilon = metrics.epsilon,
                "Episode finished"
            );

            if self.best_reward.is_none_or(|best| metrics.total_reward > best) {
                self.best_reward = Some(metrics.total_reward);
                self.checkpoint();
            }

            if let Some(bar) = &bar {
                bar.set_message(format!(
                    "reward {:.3} | eps {:.3}",
                    metrics.total_reward, metrics.epsilon
                ));
                bar.inc(1);
            }
            self.metrics.push(metrics);
            out.push(metrics);
        }

        if let Some(bar) = bar {
            bar.finish_with_message("Training complete");
        }
        Ok(out)
    }

    fn run_episode(&mut self) -> TraderResult<EpisodeMetrics> {
        let episode = self.history.episodes();
        let warmup = self.config.warmup(self.agent.config().batch_size());
        let train_every = self.config.train_every();

        let mut state = self.env.reset()?;
        let mut total_reward = 0.0;
        let mut steps = 0;
        let mut losses = Vec::new();

        loop {
            let action = self.agent.select_action(&state)?;
            let step = self.env.step(action)?;
            let reward: f64 = step.reward.into();
            total_reward += reward;
            steps += 1;

            self.agent.remember(Transition::new(
                state,
                action,
                reward,
                step.state.clone(),
                step.done,
            ));

            if self.agent.memory().len() >= warmup
                && steps % train_every == 0
                && let Some(report) = self.agent.learn()?
            {
                self.history.record_learn(&report);
                losses.push(report.loss);
            }

            state = step.state;
            if step.done {
                break;
            }
        }

        self.history.record_episode(total_reward);
        let summary = self.env.summary();
        Ok(EpisodeMetrics {
            episode,
            steps,
            total_reward,
            final_portfolio_value: summary.final_portfolio_value,
            total_return_pct: summary.total_return_pct,
            trades: summary.trades,
            win_rate: summary.win_rate,
            max_drawdown_pct: summary.max_drawdown_pct,
            sharpe_ratio: summary.sharpe_ratio,
            epsilon: self.agent.epsilon(),
            mean_loss: mean(&losses),
        })
    }

    /// Saves the current agent as the best model. Failures are logged only.
    fn checkpoint(&self) {
        let Some(dir) = self.config.checkpoint_dir() else {
            return;
        };
        match self
            .agent
            .save(dir, self.config.model_name(), &self.history)
        {
            Ok(CheckpointPaths { weights, .. }) => {
                debug!(path = %weights.display(), "Best model checkpointed");
            }
            Err(e) => {
                error!(error = %e, dir = %dir.display(), "Failed to save checkpoint");
            }
        }
    }
}

// ================================================================================================
// Inference
// ================================================================================================

impl Trainer {
    /// Runs one greedy pass over `env` without learning.
    ///
    /// Exploration and mode are restored afterwards.
    #[tracing::instrument(skip(self, env))]
    pub fn test(&mut self, env: &mut Environment) -> TraderResult<EpisodeMetrics> {
        check_dims(env, self.agent.dims())?;

        let epsilon = self.agent.epsilon();
        let mode = self.agent.mode();
        self.agent.set_epsilon(0.0);
        self.agent.set_mode(Mode::Eval);

        let result = greedy_pass(&mut self.agent, env);

        self.agent.set_epsilon(epsilon);
        self.agent.set_mode(mode);

        let (steps, total_reward) = result?;
        let summary = env.summary();
        if summary.trades == 0 {
            warn!("Test pass finished without a single trade");
        }
        info!(
            steps,
            reward = total_reward,
            portfolio = summary.final_portfolio_value,
            return_pct = summary.total_return_pct,
            "Test pass finished"
        );

        Ok(EpisodeMetrics {
            episode: self.history.episodes(),
            steps,
            total_reward,
            final_portfolio_value: summary.final_portfolio_value,
            total_return_pct: summary.total_return_pct,
            trades: summary.trades,
            win_rate: summary.win_rate,
            max_drawdown_pct: summary.max_drawdown_pct,
            sharpe_ratio: summary.sharpe_ratio,
            epsilon: 0.0,
            mean_loss: None,
        })
    }

    /// Greedy action for an externally built state.
    pub fn predict(&self, state: &State) -> TraderResult<Action> {
        self.agent.greedy_action(state)
    }
}

// ================================================================================================
// Helpers
// ================================================================================================

fn greedy_pass(agent: &mut DqnAgent, env: &mut Environment) -> TraderResult<(usize, f64)> {
    let mut state = env.reset()?;
    let mut steps = 0;
    let mut total_reward = 0.0;
    loop {
        let action = agent.greedy_action(&state)?;
        let step = env.step(action)?;
        total_reward += f64::from(step.reward);
        steps += 1;
        state = step.state;
        if step.done {
            return Ok((steps, total_reward));
        }
    }
}

fn check_dims(env: &Environment, dims: InputDims) -> TraderResult<()> {
    let expected = InputDims::new(env.window_size(), env.feature_count());
    if dims != expected {
        return Err(AgentError::ShapeMismatch {
            expected: format!("{expected:?}"),
            actual: format!("{dims:?}"),
        }
        .into());
    }
    Ok(())
}

fn progress_bar(capacity: u64) -> TraderResult<ProgressBar> {
    let bar = ProgressBar::new(capacity);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta_precise}) {msg}",
            )
            .map_err(EnvError::ProgressBar)?
            .progress_chars("#>-"),
    );
    Ok(bar)
}
