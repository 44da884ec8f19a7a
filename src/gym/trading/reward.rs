//! Position sizing and reward shaping.
//!
//! Both are driven by the *volatility ratio*: the current rolling volatility
//! relative to a high quantile of volatility over the whole history.

use crate::{
    gym::{Reward, trading::config::EnvConfig},
    math::stats::{EPS, safe_div},
};

/// Floor for the volatility ratio when it divides a positive reward.
pub const MIN_VOLATILITY_RATIO: f64 = 0.1;

/// Smallest position, as a fraction of `max_position_size`.
pub const MIN_SIZE_FRACTION: f64 = 0.1;

/// Current volatility relative to the reference level, in `[0, 1]`.
///
/// No volatility yet reads as calm (`0.0`). A degenerate reference with a
/// live reading is treated as the maximal ratio.
pub fn volatility_ratio(volatility: f64, reference: f64) -> f64 {
    if !volatility.is_finite() || volatility <= EPS {
        return 0.0;
    }
    if !reference.is_finite() || reference <= EPS {
        return 1.0;
    }
    (volatility / reference).min(1.0)
}

/// Fraction of the initial balance to commit for a new position.
pub fn position_size(config: &EnvConfig, volatility_ratio: f64) -> f64 {
    let max = config.max_position_size();
    if !config.use_risk_adjustment() {
        return max;
    }
    let ratio = volatility_ratio.clamp(0.0, 1.0);
    (max * (1.0 - 0.5 * ratio)).max(MIN_SIZE_FRACTION * max)
}

/// Inputs of one reward evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardInputs {
    /// Portfolio value change over the step.
    pub value_delta: f64,
    pub volatility_ratio: f64,
    /// Drawdown at the end of the step, in percent.
    pub current_drawdown_pct: f64,
    /// Largest drawdown seen so far in the episode, in percent.
    pub max_drawdown_pct: f64,
}

/// Fractional portfolio change divided by `reward_scaling`.
pub fn base_reward(config: &EnvConfig, value_delta: f64) -> Reward {
    let pct = safe_div(value_delta, config.initial_balance(), 0.0);
    Reward(safe_div(pct, config.reward_scaling(), 0.0))
}

/// Full shaped reward for a step.
///
/// With risk adjustment enabled, gains are boosted in calm markets and damped
/// in volatile ones, losses are amplified proportionally to volatility, and a
/// penalty proportional to the maximum drawdown applies while the current
/// drawdown exceeds the configured threshold.
pub fn shaped_reward(config: &EnvConfig, inputs: RewardInputs) -> Reward {
    let base = base_reward(config, inputs.value_delta);
    if !config.use_risk_adjustment() {
        return base;
    }

    let w = config.risk_weight();
    let ratio = inputs.volatility_ratio.clamp(0.0, 1.0);
    let volatility_term = if base.0 > 0.0 {
        w * base.0 / ratio.max(MIN_VOLATILITY_RATIO)
    } else if base.0 < 0.0 {
        w * base.0 * (1.0 + ratio)
    } else {
        0.0
    };

    let drawdown_penalty = if inputs.current_drawdown_pct > config.drawdown_threshold_pct() {
        w * inputs.max_drawdown_pct / 100.0
    } else {
        0.0
    };

    let total = base + volatility_term - Reward(drawdown_penalty);
    if total.0.is_finite() { total } else { base }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(value_delta: f64) -> RewardInputs {
        RewardInputs {
            value_delta,
            volatility_ratio: 0.5,
            current_drawdown_pct: 0.0,
            max_drawdown_pct: 0.0,
        }
    }

    #[test]
    fn ratio_guards_degenerate_inputs() {
        assert_eq!(volatility_ratio(0.0, 0.02), 0.0);
        assert_eq!(volatility_ratio(f64::NAN, 0.02), 0.0);
        assert_eq!(volatility_ratio(0.01, 0.0), 1.0);
        assert_eq!(volatility_ratio(0.04, 0.02), 1.0);
        assert!((volatility_ratio(0.01, 0.02) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn size_shrinks_with_volatility_within_bounds() {
        let cfg = EnvConfig::default().with_max_position_size(0.8);
        assert_eq!(position_size(&cfg, 0.0), 0.8);
        assert!((position_size(&cfg, 1.0) - 0.4).abs() < 1e-12);
        assert!(position_size(&cfg, 0.5) < position_size(&cfg, 0.2));

        let plain = cfg.with_use_risk_adjustment(false);
        assert_eq!(position_size(&plain, 1.0), 0.8);
    }

    #[test]
    fn base_reward_is_scaled_fraction() {
        let cfg = EnvConfig::default().with_use_risk_adjustment(false);
        // +100 on 10_000 is 1 %, scaled by 0.01
        assert!((shaped_reward(&cfg, inputs(100.0)).0 - 1.0).abs() < 1e-12);
        assert_eq!(shaped_reward(&cfg, inputs(0.0)).0, 0.0);
    }

    #[test]
    fn risk_terms_keep_sign_and_penalize_drawdown() {
        let cfg = EnvConfig::default();
        let gain = shaped_reward(&cfg, inputs(100.0)).0;
        // 1.0 + 0.1 * 1.0 / 0.5
        assert!((gain - 1.2).abs() < 1e-12);

        let loss = shaped_reward(&cfg, inputs(-100.0)).0;
        // -1.0 + 0.1 * -1.0 * 1.5
        assert!((loss + 1.15).abs() < 1e-12);

        let deep = RewardInputs {
            current_drawdown_pct: 12.0,
            max_drawdown_pct: 15.0,
            ..inputs(0.0)
        };
        assert!((shaped_reward(&cfg, deep).0 + 0.015).abs() < 1e-12);

        let shallow = RewardInputs {
            current_drawdown_pct: 9.0,
            max_drawdown_pct: 15.0,
            ..inputs(0.0)
        };
        assert_eq!(shaped_reward(&cfg, shallow).0, 0.0);
    }
}
