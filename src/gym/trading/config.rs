use serde::{Deserialize, Serialize};

use crate::error::{EnvError, TraderResult};

/// Configuration blueprint for a trading [`Environment`].
///
/// Monetary amounts are in account currency. `fee_percent` is a percentage,
/// so `0.1` charges 0.1 % of the traded notional on entry and again on exit.
///
/// # Example
///
/// ```
/// # use rl_trader::prelude::*;
/// let cfg = EnvConfig::default()
///     .with_initial_balance(50_000.0)
///     .with_window_size(30)
///     .with_use_risk_adjustment(false);
/// assert!(cfg.validate().is_ok());
/// ```
///
/// [`Environment`]: crate::gym::trading::env::Environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    // ========================================================================
    // Account
    // ========================================================================
    /// Starting cash. Scales every monetary quantity.
    initial_balance: f64,

    /// Percentage fee on entry and exit notional.
    fee_percent: f64,

    /// Fraction of the initial balance committed at full size, in `(0, 1]`.
    max_position_size: f64,

    // ========================================================================
    // Observation
    // ========================================================================
    /// Number of trailing bars in every observation.
    window_size: usize,

    /// Lookback of the rolling standard deviation of returns.
    volatility_window: usize,

    // ========================================================================
    // Reward Shaping
    // ========================================================================
    /// Divisor applied to the fractional portfolio change.
    reward_scaling: f64,

    /// Toggles volatility-based sizing and reward shaping.
    use_risk_adjustment: bool,

    /// Weight of the volatility and drawdown terms.
    risk_weight: f64,

    /// Drawdown (in percent) above which the drawdown penalty applies.
    drawdown_threshold_pct: f64,

    /// Quantile of historical volatility used as the reference level.
    volatility_quantile: f64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            fee_percent: 0.1,
            max_position_size: 1.0,
            window_size: 60,
            volatility_window: 20,
            reward_scaling: 0.01,
            use_risk_adjustment: true,
            risk_weight: 0.1,
            drawdown_threshold_pct: 10.0,
            volatility_quantile: 0.95,
        }
    }
}

// ================================================================================================
// Builder Methods
// ================================================================================================

impl EnvConfig {
    pub fn with_initial_balance(self, initial_balance: f64) -> Self {
        Self {
            initial_balance,
            ..self
        }
    }

    pub fn with_fee_percent(self, fee_percent: f64) -> Self {
        Self {
            fee_percent,
            ..self
        }
    }

    pub fn with_max_position_size(self, max_position_size: f64) -> Self {
        Self {
            max_position_size,
            ..self
        }
    }

    pub fn with_window_size(self, window_size: usize) -> Self {
        Self {
            window_size,
            ..self
        }
    }

    pub fn with_volatility_window(self, volatility_window: usize) -> Self {
        Self {
            volatility_window,
            ..self
        }
    }

    pub fn with_reward_scaling(self, reward_scaling: f64) -> Self {
        Self {
            reward_scaling,
            ..self
        }
    }

    pub fn with_use_risk_adjustment(self, use_risk_adjustment: bool) -> Self {
        Self {
            use_risk_adjustment,
            ..self
        }
    }

    pub fn with_risk_weight(self, risk_weight: f64) -> Self {
        Self {
            risk_weight,
            ..self
        }
    }

    pub fn with_drawdown_threshold_pct(self, drawdown_threshold_pct: f64) -> Self {
        Self {
            drawdown_threshold_pct,
            ..self
        }
    }

    pub fn with_volatility_quantile(self, volatility_quantile: f64) -> Self {
        Self {
            volatility_quantile,
            ..self
        }
    }
}

// ================================================================================================
// Accessor Methods
// ================================================================================================

impl EnvConfig {
    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn fee_percent(&self) -> f64 {
        self.fee_percent
    }

    /// `fee_percent` as a plain fraction.
    pub fn fee_rate(&self) -> f64 {
        self.fee_percent / 100.0
    }

    pub fn max_position_size(&self) -> f64 {
        self.max_position_size
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn volatility_window(&self) -> usize {
        self.volatility_window
    }

    pub fn reward_scaling(&self) -> f64 {
        self.reward_scaling
    }

    pub fn use_risk_adjustment(&self) -> bool {
        self.use_risk_adjustment
    }

    pub fn risk_weight(&self) -> f64 {
        self.risk_weight
    }

    pub fn drawdown_threshold_pct(&self) -> f64 {
        self.drawdown_threshold_pct
    }

    pub fn volatility_quantile(&self) -> f64 {
        self.volatility_quantile
    }

    /// Smallest table that still allows one `step`.
    pub fn min_rows(&self) -> usize {
        self.window_size + 2
    }
}

// ================================================================================================
// Validation & Hashing
// ================================================================================================

impl EnvConfig {
    /// Checks every field against its valid range.
    pub fn validate(&self) -> TraderResult<()> {
        fn invalid(msg: String) -> TraderResult<()> {
            Err(EnvError::InvalidConfig(msg).into())
        }

        if !(self.initial_balance.is_finite() && self.initial_balance > 0.0) {
            return invalid(format!(
                "initial_balance must be positive, got {}",
                self.initial_balance
            ));
        }
        if !(0.0..100.0).contains(&self.fee_percent) {
            return invalid(format!(
                "fee_percent must be in [0, 100), got {}",
                self.fee_percent
            ));
        }
        if !(self.max_position_size > 0.0 && self.max_position_size <= 1.0) {
            return invalid(format!(
                "max_position_size must be in (0, 1], got {}",
                self.max_position_size
            ));
        }
        if self.window_size == 0 {
            return invalid("window_size must be at least 1".to_string());
        }
        if self.volatility_window < 2 {
            return invalid(format!(
                "volatility_window must be at least 2, got {}",
                self.volatility_window
            ));
        }
        if !(self.reward_scaling.is_finite() && self.reward_scaling > 0.0) {
            return invalid(format!(
                "reward_scaling must be positive, got {}",
                self.reward_scaling
            ));
        }
        if !(self.risk_weight.is_finite() && self.risk_weight >= 0.0) {
            return invalid(format!(
                "risk_weight must be non-negative, got {}",
                self.risk_weight
            ));
        }
        if !(self.drawdown_threshold_pct.is_finite() && self.drawdown_threshold_pct >= 0.0) {
            return invalid(format!(
                "drawdown_threshold_pct must be non-negative, got {}",
                self.drawdown_threshold_pct
            ));
        }
        if !(self.volatility_quantile > 0.0 && self.volatility_quantile <= 1.0) {
            return invalid(format!(
                "volatility_quantile must be in (0, 1], got {}",
                self.volatility_quantile
            ));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_are_valid() {
        let cfg = EnvConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.window_size(), 60);
        assert_eq!(cfg.min_rows(), 62);
        assert!((cfg.fee_rate() - 0.001).abs() < 1e-15);
    }

    #[test]
    fn out_of_range_fields_are_rejected() {
        let cases = [
            EnvConfig::default().with_initial_balance(0.0),
            EnvConfig::default().with_fee_percent(-0.1),
            EnvConfig::default().with_max_position_size(1.5),
            EnvConfig::default().with_window_size(0),
            EnvConfig::default().with_reward_scaling(0.0),
            EnvConfig::default().with_volatility_quantile(0.0),
        ];
        for cfg in cases {
            let err = cfg.validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        }
    }

    #[test]
    fn hash_is_stable_and_sensitive() {
        let a = EnvConfig::default();
        let b = EnvConfig::default().with_fee_percent(0.2);
        assert_eq!(a.hash().unwrap(), a.clone().hash().unwrap());
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    }
}
