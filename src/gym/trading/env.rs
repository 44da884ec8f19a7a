use std::sync::Arc;

use ndarray::Array2;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    agent::Agent,
    data::{market::MarketData, normalizer::FeatureNormalizer},
    error::{DataError, EnvError, TraderResult},
    gym::{
        Env, EnvStatus, Reward,
        trading::{
            action::Action,
            config::EnvConfig,
            ledger::{EpisodeSummary, ExitReason, Ledger, TradeRecord},
            position::{Direction, Position},
            reward::{self, RewardInputs},
            state::{AccountState, MarketWindow, State},
        },
    },
    math::stats::{quantile, safe_div},
};

/// What `step` hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Observation after the transition.
    pub state: State,
    pub reward: Reward,
    pub done: bool,
    pub info: StepInfo,
}

/// Diagnostics of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Bar index the action was executed at.
    pub step: usize,
    pub price: f64,
    pub balance: f64,
    pub portfolio_value: f64,
    /// Signed exposure after the step.
    pub position: f64,
    pub unrealized_pnl: f64,
    pub drawdown_pct: f64,
    /// Fees debited during this step, liquidation included.
    pub fees: f64,
    /// The action was a no-op for the current position.
    pub invalid_action: bool,
    /// The last trade closed during this step, if any.
    pub closed_trade: Option<TradeRecord>,
}

/// Single-instrument episodic trading simulator.
///
/// An episode starts at bar `window_size` and ends on the last bar, where any
/// open position is liquidated at the final close.
#[derive(Debug, Clone)]
pub struct Environment {
    config: EnvConfig,

    // === Shared, immutable after construction ===
    data: Arc<MarketData>,
    features: Arc<Array2<f64>>,
    /// Reference volatility: configured quantile of the volatility history.
    volatility_reference: f64,

    // === Episode state ===
    current_step: usize,
    balance: f64,
    position: Option<Position>,
    unrealized_pnl: f64,
    peak_value: f64,
    ledger: Ledger,
    status: EnvStatus,
}

// ================================================================================================
// Building
// ================================================================================================

impl Environment {
    /// Builds an environment from a raw OHLCV (+ indicators) table.
    ///
    /// # Errors
    /// - [`DataError::MissingColumn`] if a base column is absent.
    /// - [`DataError::InsufficientData`] if there are fewer than `window_size + 2` rows.
    /// - [`EnvError::InvalidConfig`] if `config` fails validation.
    pub fn new(df: &DataFrame, config: EnvConfig) -> TraderResult<Self> {
        config.validate()?;
        let data = MarketData::from_df(df, config.volatility_window())?;
        Self::from_market_data(data, config)
    }

    pub fn from_market_data(data: MarketData, config: EnvConfig) -> TraderResult<Self> {
        config.validate()?;
        if data.len() < config.min_rows() {
            return Err(DataError::InsufficientData {
                rows: data.len(),
                required: config.min_rows(),
            }
            .into());
        }

        let features = FeatureNormalizer::new(config.window_size()).normalize(&data);
        let history: Vec<f64> = data
            .volatility()
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        let volatility_reference =
            quantile(&history, config.volatility_quantile()).unwrap_or(0.0);

        debug!(
            rows = data.len(),
            features = features.ncols(),
            volatility_reference,
            "Environment built"
        );

        Ok(Self {
            current_step: config.window_size(),
            balance: config.initial_balance(),
            peak_value: config.initial_balance(),
            ledger: Ledger::with_capacity(data.len() - config.window_size()),
            position: None,
            unrealized_pnl: 0.0,
            status: EnvStatus::Ready,
            data: Arc::new(data),
            features: Arc::new(features),
            volatility_reference,
            config,
        })
    }
}

// ================================================================================================
// Accessors
// ================================================================================================

impl Environment {
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn data(&self) -> &MarketData {
        &self.data
    }

    /// Normalized `(rows, features)` matrix backing every observation.
    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn feature_count(&self) -> usize {
        self.features.ncols()
    }

    pub fn window_size(&self) -> usize {
        self.config.window_size()
    }

    pub fn status(&self) -> EnvStatus {
        self.status
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.unrealized_pnl
    }

    pub fn portfolio_value(&self) -> f64 {
        self.balance + self.unrealized_pnl
    }

    pub fn current_drawdown(&self) -> f64 {
        drawdown_pct(self.peak_value, self.portfolio_value())
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn summary(&self) -> EpisodeSummary {
        self.ledger
            .summary(self.config.initial_balance(), self.portfolio_value())
    }

    pub fn current_price(&self) -> f64 {
        self.data.close_at(self.current_step)
    }

    /// Actions that change the account given the current position.
    pub fn valid_actions(&self) -> Vec<Action> {
        let mut actions = vec![Action::Hold];
        match self.position.map(|p| p.direction) {
            None => actions.extend([Action::OpenLong, Action::OpenShort]),
            Some(Direction::Long) => actions.extend([Action::OpenShort, Action::Close]),
            Some(Direction::Short) => actions.extend([Action::OpenLong, Action::Close]),
        }
        actions
    }

    /// Current observation, deep-copied.
    pub fn state(&self) -> State {
        let market = MarketWindow::from_features(
            self.features.view(),
            self.current_step,
            self.config.window_size(),
            FeatureNormalizer::NEUTRAL,
        );
        let price = self.current_price();
        let account = match &self.position {
            Some(p) => AccountState {
                position: p.signed_size(),
                unrealized_pnl_ratio: safe_div(
                    self.unrealized_pnl,
                    self.config.initial_balance(),
                    0.0,
                ),
                relative_entry_offset: p.relative_entry_offset(price),
            },
            None => AccountState::flat(),
        };
        State::new(market, account)
    }
}

// ================================================================================================
// Evaluation
// ================================================================================================

impl Environment {
    /// Runs one full greedy episode with `agent` and returns its summary.
    #[tracing::instrument(skip(self, agent), fields(agent = %agent.identifier()))]
    pub fn evaluate_agent<T: Agent>(&mut self, agent: &mut T) -> TraderResult<EpisodeSummary> {
        let mut state = self.reset()?;
        loop {
            let action = agent.act(&state)?;
            let step = self.step(action)?;
            state = step.state;
            if step.done {
                break;
            }
        }
        agent.reset();
        Ok(self.summary())
    }
}

// ================================================================================================
// Env Implementation
// ================================================================================================

impl Env for Environment {
    #[tracing::instrument(skip(self), fields(rows = self.data.len()))]
    fn reset(&mut self) -> TraderResult<State> {
        self.current_step = self.config.window_size();
        self.balance = self.config.initial_balance();
        self.position = None;
        self.unrealized_pnl = 0.0;
        self.peak_value = self.config.initial_balance();
        self.ledger.clear();
        self.status = EnvStatus::Running;
        debug!(start = self.current_step, "Environment reset");
        Ok(self.state())
    }

    fn step(&mut self, action: Action) -> TraderResult<Step> {
        self.check_step_status()?;
        let last = self.data.len() - 1;

        if self.status.is_done() || self.current_step >= last {
            self.status = EnvStatus::Done;
            return Ok(Step {
                state: self.state(),
                reward: Reward(0.0),
                done: true,
                info: self.info(self.current_step, 0.0, false, None),
            });
        }

        // 1. Price at t, mark the open position
        let executed_at = self.current_step;
        let price = self.current_price();
        let value_before = self.portfolio_value();
        self.mark_to_market(price);

        // 2. Apply the action
        let fees_before = self.ledger.fees_paid();
        let (invalid, mut closed_trade) = self.apply_action(action, price);

        // 3. Revalue and track drawdown
        self.mark_to_market(price);
        let value = self.portfolio_value();
        let drawdown = self.track_drawdown(value);

        // 4. Reward
        let mut reward = reward::shaped_reward(
            &self.config,
            RewardInputs {
                value_delta: value - value_before,
                volatility_ratio: self.volatility_ratio(),
                current_drawdown_pct: drawdown,
                max_drawdown_pct: self.ledger.max_drawdown(),
            },
        );

        // 5. Advance time
        self.current_step = (self.current_step + 1).min(last);
        let done = self.current_step >= last;

        if done {
            let final_price = self.current_price();
            self.mark_to_market(final_price);
            if let Some(trade) = self.close_position(final_price, ExitReason::EndOfEpisode) {
                closed_trade = Some(trade);
            }
            let final_value = self.portfolio_value();
            self.track_drawdown(final_value);
            reward += reward::base_reward(&self.config, final_value - value);
            self.status = EnvStatus::Done;

            let summary = self.summary();
            info!(
                final_value,
                trades = summary.trades,
                win_rate = summary.win_rate,
                max_drawdown = summary.max_drawdown_pct,
                "Episode finished"
            );
        }

        let value_after = self.portfolio_value();
        self.ledger
            .record_return(safe_div(value_after - value_before, value_before, 0.0));

        let fees = self.ledger.fees_paid() - fees_before;
        Ok(Step {
            state: self.state(),
            reward,
            done,
            info: self.info(executed_at, fees, invalid, closed_trade),
        })
    }
}

// ================================================================================================
// Accounting
// ================================================================================================

impl Environment {
    fn check_step_status(&self) -> TraderResult<()> {
        if self.status.is_ready() {
            return Err(EnvError::InvalidState(
                "Environment is not started. Call `reset()` before stepping.".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Returns `(invalid, closed_trade)`.
    fn apply_action(&mut self, action: Action, price: f64) -> (bool, Option<TradeRecord>) {
        match (action, action.direction(), self.position.map(|p| p.direction)) {
            (Action::Hold, _, _) => (false, None),

            (_, Some(wanted), Some(held)) if wanted == held => {
                warn!(
                    step = self.current_step,
                    action = action.as_str(),
                    "Position already open in the requested direction, ignoring"
                );
                (true, None)
            }

            (_, Some(wanted), held) => {
                let closed = held.and_then(|_| self.close_position(price, ExitReason::Reversal));
                self.open_position(wanted, price);
                (false, closed)
            }

            (Action::Close, _, Some(_)) => (false, self.close_position(price, ExitReason::Agent)),

            (_, _, None) => {
                warn!(
                    step = self.current_step,
                    action = action.as_str(),
                    "No open position to close, ignoring"
                );
                (true, None)
            }

            // `Close` with a position is handled above; opens always carry a direction.
            (_, None, Some(_)) => (false, None),
        }
    }

    fn open_position(&mut self, direction: Direction, price: f64) {
        let size = reward::position_size(&self.config, self.volatility_ratio());
        let notional = size * self.config.initial_balance();
        let fee = notional * self.config.fee_rate();

        self.balance -= fee;
        self.ledger.record_fee(fee);
        self.position = Some(Position {
            direction,
            size,
            entry_price: price,
            entry_step: self.current_step,
            entry_fee: fee,
        });
        self.unrealized_pnl = 0.0;

        debug!(
            step = self.current_step,
            direction = direction.as_str(),
            size,
            price,
            fee,
            "Position opened"
        );
    }

    fn close_position(&mut self, price: f64, reason: ExitReason) -> Option<TradeRecord> {
        let position = self.position.take()?;
        let initial = self.config.initial_balance();

        let gross = position.unrealized_pnl(price, initial);
        let exit_fee = position.exit_notional(price, initial) * self.config.fee_rate();
        self.balance += gross - exit_fee;
        self.ledger.record_fee(exit_fee);
        self.unrealized_pnl = 0.0;

        let trade = TradeRecord {
            direction: position.direction,
            size: position.size,
            entry_step: position.entry_step,
            exit_step: self.current_step,
            entry_price: position.entry_price,
            exit_price: price,
            fees: position.entry_fee + exit_fee,
            realized_pnl: gross - position.entry_fee - exit_fee,
            exit_reason: reason,
        };
        self.ledger.record_trade(trade);

        debug!(
            step = self.current_step,
            direction = trade.direction.as_str(),
            pnl = trade.realized_pnl,
            reason = reason.as_str(),
            "Position closed"
        );
        Some(trade)
    }

    fn mark_to_market(&mut self, price: f64) {
        self.unrealized_pnl = self
            .position
            .map(|p| p.unrealized_pnl(price, self.config.initial_balance()))
            .unwrap_or(0.0);
    }

    fn track_drawdown(&mut self, value: f64) -> f64 {
        self.peak_value = self.peak_value.max(value);
        let dd = drawdown_pct(self.peak_value, value);
        self.ledger.record_drawdown(dd);
        dd
    }

    fn volatility_ratio(&self) -> f64 {
        reward::volatility_ratio(
            self.data.volatility_at(self.current_step),
            self.volatility_reference,
        )
    }

    fn info(
        &self,
        step: usize,
        fees: f64,
        invalid_action: bool,
        closed_trade: Option<TradeRecord>,
    ) -> StepInfo {
        StepInfo {
            step,
            price: self.data.close_at(step),
            balance: self.balance,
            portfolio_value: self.portfolio_value(),
            position: self.position.map(|p| p.signed_size()).unwrap_or(0.0),
            unrealized_pnl: self.unrealized_pnl,
            drawdown_pct: self.current_drawdown(),
            fees,
            invalid_action,
            closed_trade,
        }
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn drawdown_pct(peak: f64, value: f64) -> f64 {
    if value >= peak {
        0.0
    } else {
        safe_div(peak - value, peak, 0.0) * 100.0
    }
}
