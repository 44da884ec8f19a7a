use polars::{df, prelude::DataFrame};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::{DataError, TraderResult},
    gym::trading::position::Direction,
    math::stats::{safe_div, sharpe_ratio},
};

// ================================================================================================
// Trade Records
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ExitReason {
    /// The agent chose `Close`.
    Agent,
    /// An open in the opposite direction closed the position first.
    Reversal,
    /// Forced liquidation on the last bar.
    EndOfEpisode,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// A closed round trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub direction: Direction,
    pub size: f64,
    pub entry_step: usize,
    pub exit_step: usize,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Entry plus exit fee.
    pub fees: f64,
    /// Gross P&L minus both fees.
    pub realized_pnl: f64,
    pub exit_reason: ExitReason,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.realized_pnl > 0.0
    }

    pub fn holding_steps(&self) -> usize {
        self.exit_step.saturating_sub(self.entry_step)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum TradeCol {
    Direction,
    Size,
    EntryStep,
    ExitStep,
    HoldingSteps,
    EntryPrice,
    ExitPrice,
    Fees,
    RealizedPnl,
    ExitReason,
}

impl TradeCol {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

// ================================================================================================
// Episode Summary
// ================================================================================================

/// Aggregate statistics of one finished (or in-flight) episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub trades: usize,
    pub wins: usize,
    /// Fraction of trades with positive realized P&L, `0.0` without trades.
    pub win_rate: f64,
    pub realized_pnl: f64,
    pub fees_paid: f64,
    pub max_drawdown_pct: f64,
    pub total_return_pct: f64,
    pub sharpe_ratio: f64,
    pub final_portfolio_value: f64,
}

// ================================================================================================
// Ledger
// ================================================================================================

/// Per-episode record: trade log, drawdown samples and step returns.
///
/// Cleared on every `reset`.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    trades: Vec<TradeRecord>,
    drawdowns: Vec<f64>,
    step_returns: Vec<f64>,
    fees_paid: f64,
}

impl Ledger {
    pub fn with_capacity(steps: usize) -> Self {
        Self {
            trades: Vec::new(),
            drawdowns: Vec::with_capacity(steps),
            step_returns: Vec::with_capacity(steps),
            fees_paid: 0.0,
        }
    }

    pub fn clear(&mut self) {
        self.trades.clear();
        self.drawdowns.clear();
        self.step_returns.clear();
        self.fees_paid = 0.0;
    }

    pub fn record_trade(&mut self, trade: TradeRecord) {
        self.trades.push(trade);
    }

    pub fn record_drawdown(&mut self, drawdown_pct: f64) {
        self.drawdowns.push(drawdown_pct);
    }

    pub fn record_return(&mut self, step_return: f64) {
        self.step_returns.push(step_return);
    }

    pub fn record_fee(&mut self, fee: f64) {
        self.fees_paid += fee;
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn drawdowns(&self) -> &[f64] {
        &self.drawdowns
    }

    pub fn step_returns(&self) -> &[f64] {
        &self.step_returns
    }

    pub fn fees_paid(&self) -> f64 {
        self.fees_paid
    }

    pub fn max_drawdown(&self) -> f64 {
        self.drawdowns.iter().copied().fold(0.0, f64::max)
    }

    pub fn realized_pnl(&self) -> f64 {
        self.trades.iter().map(|t| t.realized_pnl).sum()
    }

    pub fn wins(&self) -> usize {
        self.trades.iter().filter(|t| t.is_win()).count()
    }

    pub fn win_rate(&self) -> f64 {
        safe_div(self.wins() as f64, self.trades.len() as f64, 0.0)
    }

    pub fn summary(&self, initial_balance: f64, final_portfolio_value: f64) -> EpisodeSummary {
        EpisodeSummary {
            trades: self.trades.len(),
            wins: self.wins(),
            win_rate: self.win_rate(),
            realized_pnl: self.realized_pnl(),
            fees_paid: self.fees_paid,
            max_drawdown_pct: self.max_drawdown(),
            total_return_pct: safe_div(
                final_portfolio_value - initial_balance,
                initial_balance,
                0.0,
            ) * 100.0,
            sharpe_ratio: sharpe_ratio(&self.step_returns),
            final_portfolio_value,
        }
    }

    /// Trade log as a polars [`DataFrame`], one row per closed trade.
    pub fn trades_df(&self) -> TraderResult<DataFrame> {
        let t = &self.trades;
        let df = df![
            TradeCol::Direction.as_str()   => t.iter().map(|r| r.direction.as_str()).collect::<Vec<_>>(),
            TradeCol::Size.as_str()        => t.iter().map(|r| r.size).collect::<Vec<_>>(),
            TradeCol::EntryStep.as_str()   => t.iter().map(|r| r.entry_step as u64).collect::<Vec<_>>(),
            TradeCol::ExitStep.as_str()    => t.iter().map(|r| r.exit_step as u64).collect::<Vec<_>>(),
            TradeCol::HoldingSteps.as_str() => t.iter().map(|r| r.holding_steps() as u64).collect::<Vec<_>>(),
            TradeCol::EntryPrice.as_str()  => t.iter().map(|r| r.entry_price).collect::<Vec<_>>(),
            TradeCol::ExitPrice.as_str()   => t.iter().map(|r| r.exit_price).collect::<Vec<_>>(),
            TradeCol::Fees.as_str()        => t.iter().map(|r| r.fees).collect::<Vec<_>>(),
            TradeCol::RealizedPnl.as_str() => t.iter().map(|r| r.realized_pnl).collect::<Vec<_>>(),
            TradeCol::ExitReason.as_str()  => t.iter().map(|r| r.exit_reason.as_str()).collect::<Vec<_>>(),
        ]
        .map_err(|e| DataError::DataFrame(e.to_string()))?;
        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(pnl: f64) -> TradeRecord {
        TradeRecord {
            direction: Direction::Long,
            size: 1.0,
            entry_step: 60,
            exit_step: 65,
            entry_price: 100.0,
            exit_price: 101.0,
            fees: 20.0,
            realized_pnl: pnl,
            exit_reason: ExitReason::Agent,
        }
    }

    #[test]
    fn summary_aggregates_trades_and_drawdowns() {
        let mut ledger = Ledger::default();
        ledger.record_trade(trade(80.0));
        ledger.record_trade(trade(-30.0));
        ledger.record_drawdown(1.0);
        ledger.record_drawdown(4.5);
        ledger.record_drawdown(2.0);
        ledger.record_fee(40.0);

        let s = ledger.summary(10_000.0, 10_050.0);
        assert_eq!(s.trades, 2);
        assert_eq!(s.wins, 1);
        assert_eq!(s.win_rate, 0.5);
        assert_eq!(s.realized_pnl, 50.0);
        assert_eq!(s.max_drawdown_pct, 4.5);
        assert!((s.total_return_pct - 0.5).abs() < 1e-12);
        assert_eq!(s.sharpe_ratio, 0.0);
    }

    #[test]
    fn empty_ledger_has_zero_win_rate() {
        let ledger = Ledger::with_capacity(10);
        let s = ledger.summary(10_000.0, 10_000.0);
        assert_eq!(s.trades, 0);
        assert_eq!(s.win_rate, 0.0);
        assert_eq!(s.total_return_pct, 0.0);
    }

    #[test]
    fn trades_df_has_one_row_per_trade() {
        let mut ledger = Ledger::default();
        ledger.record_trade(trade(1.0));
        ledger.record_trade(trade(2.0));
        let df = ledger.trades_df().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 10);
        let pnl = df.column(TradeCol::RealizedPnl.as_str()).unwrap().f64().unwrap();
        assert_eq!(pnl.get(1), Some(2.0));
        let held = df.column(TradeCol::HoldingSteps.as_str()).unwrap().u64().unwrap();
        assert_eq!(held.get(0), Some(5));
    }

    #[test]
    fn clear_resets_everything() {
        let mut ledger = Ledger::default();
        ledger.record_trade(trade(1.0));
        ledger.record_fee(3.0);
        ledger.record_return(0.1);
        ledger.clear();
        assert!(ledger.trades().is_empty());
        assert!(ledger.step_returns().is_empty());
        assert_eq!(ledger.fees_paid(), 0.0);
    }
}
