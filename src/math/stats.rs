//! Small numeric helpers shared by the environment and reporting code.
//!
//! Every function here is total: empty inputs and zero denominators resolve to
//! a documented fallback instead of `NaN` or `Inf`.

use ordered_float::OrderedFloat;

/// Threshold under which a denominator is treated as zero.
pub const EPS: f64 = 1e-12;

/// Divides `num` by `den`, returning `fallback` when `den` is (close to) zero
/// or the result is not finite.
pub fn safe_div(num: f64, den: f64, fallback: f64) -> f64 {
    if den.abs() <= EPS {
        return fallback;
    }
    let out = num / den;
    if out.is_finite() { out } else { fallback }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Quantile with linear interpolation between closest ranks.
///
/// Non-finite values are ignored. Returns `None` when no finite values remain.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<OrderedFloat<f64>> = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .map(OrderedFloat)
        .collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_unstable();

    let q = q.clamp(0.0, 1.0);
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo].0 + (sorted[hi].0 - sorted[lo].0) * frac)
}

/// Mean over standard deviation of per-step returns (not annualised).
///
/// Zero variance yields `0.0`: a riskless, returnless series carries no signal.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    match (mean(returns), std_dev(returns)) {
        (Some(m), Some(s)) => safe_div(m, s, 0.0),
        _ => 0.0,
    }
}

/// Index of the largest finite value; ties resolve to the lowest index.
pub fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None::<(usize, OrderedFloat<f64>)>, |best, (i, &v)| match best {
            Some((_, b)) if b >= OrderedFloat(v) => best,
            _ => Some((i, OrderedFloat(v))),
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_div_guards_zero_denominator() {
        assert_eq!(safe_div(1.0, 0.0, 0.5), 0.5);
        assert_eq!(safe_div(1.0, 4.0, 0.5), 0.25);
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let v: Vec<f64> = (1..=5).map(f64::from).collect();
        assert_eq!(quantile(&v, 0.0), Some(1.0));
        assert_eq!(quantile(&v, 1.0), Some(5.0));
        assert_eq!(quantile(&v, 0.5), Some(3.0));
        assert!((quantile(&v, 0.95).unwrap() - 4.8).abs() < 1e-12);
        assert_eq!(quantile(&[f64::NAN], 0.5), None);
    }

    #[test]
    fn sharpe_of_constant_returns_is_zero() {
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01]), 0.0);
        assert_eq!(sharpe_ratio(&[]), 0.0);
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), 1);
        assert_eq!(argmax(&[f64::NAN, -1.0]), 1);
        assert_eq!(argmax(&[]), 0);
    }
}
