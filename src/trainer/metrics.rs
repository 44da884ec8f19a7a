use polars::{df, prelude::DataFrame};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

use crate::{
    agent::dqn::LearnReport,
    error::{DataError, TraderResult},
};

/// What one training or test episode produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetrics {
    pub episode: usize,
    pub steps: usize,
    pub total_reward: f64,
    pub final_portfolio_value: f64,
    pub total_return_pct: f64,
    pub trades: usize,
    pub win_rate: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub epsilon: f64,
    /// Mean loss of the learning steps taken, `None` if there were none.
    pub mean_loss: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum MetricsCol {
    Episode,
    Steps,
    TotalReward,
    FinalPortfolioValue,
    TotalReturnPct,
    Trades,
    WinRate,
    MaxDrawdownPct,
    SharpeRatio,
    Epsilon,
    MeanLoss,
}

impl MetricsCol {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// One row per episode.
pub fn metrics_df(metrics: &[EpisodeMetrics]) -> TraderResult<DataFrame> {
    let m = metrics;
    let df = df![
        MetricsCol::Episode.as_str()             => m.iter().map(|r| r.episode as u64).collect::<Vec<_>>(),
        MetricsCol::Steps.as_str()               => m.iter().map(|r| r.steps as u64).collect::<Vec<_>>(),
        MetricsCol::TotalReward.as_str()         => m.iter().map(|r| r.total_reward).collect::<Vec<_>>(),
        MetricsCol::FinalPortfolioValue.as_str() => m.iter().map(|r| r.final_portfolio_value).collect::<Vec<_>>(),
        MetricsCol::TotalReturnPct.as_str()      => m.iter().map(|r| r.total_return_pct).collect::<Vec<_>>(),
        MetricsCol::Trades.as_str()              => m.iter().map(|r| r.trades as u64).collect::<Vec<_>>(),
        MetricsCol::WinRate.as_str()             => m.iter().map(|r| r.win_rate).collect::<Vec<_>>(),
        MetricsCol::MaxDrawdownPct.as_str()      => m.iter().map(|r| r.max_drawdown_pct).collect::<Vec<_>>(),
        MetricsCol::SharpeRatio.as_str()         => m.iter().map(|r| r.sharpe_ratio).collect::<Vec<_>>(),
        MetricsCol::Epsilon.as_str()             => m.iter().map(|r| r.epsilon).collect::<Vec<_>>(),
        MetricsCol::MeanLoss.as_str()            => m.iter().map(|r| r.mean_loss).collect::<Vec<_>>(),
    ]
    .map_err(|e| DataError::DataFrame(e.to_string()))?;
    Ok(df)
}

/// Learning trajectories persisted alongside a checkpoint.
///
/// `losses`, `q_values` and `epsilons` hold one entry per learning step,
/// `rewards` one entry per training episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub losses: Vec<f64>,
    pub rewards: Vec<f64>,
    pub q_values: Vec<f64>,
    pub epsilons: Vec<f64>,
}

impl TrainingHistory {
    pub fn record_learn(&mut self, report: &LearnReport) {
        self.losses.push(report.loss);
        self.q_values.push(report.mean_q);
        self.epsilons.push(report.epsilon);
    }

    pub fn record_episode(&mut self, total_reward: f64) {
        self.rewards.push(total_reward);
    }

    pub fn episodes(&self) -> usize {
        self.rewards.len()
    }

    pub fn learn_steps(&self) -> usize {
        self.losses.len()
    }

    pub fn best_reward(&self) -> Option<f64> {
        self.rewards.iter().copied().reduce(f64::max)
    }
}
