use ndarray::Array2;

use crate::{
    data::{columns::FeatureKind, market::MarketData},
    math::{rolling::RollingMinMax, stats::EPS},
};

/// Converts raw OHLCV + indicator columns into a bounded feature matrix.
///
/// Every column is transformed independently according to its [`FeatureKind`]:
///
/// - `PriceLike` and `Unbounded` columns are min-max scaled against their own
///   trailing `window_size` extrema, so the scale adapts over time.
/// - `BoundedOscillator` columns (`0..=100`) are rescaled linearly.
///
/// Rows that cannot be resolved (not enough trailing history, indicator
/// warm-up, a flat window) are filled with [`FeatureNormalizer::NEUTRAL`].
#[derive(Debug, Clone, Copy)]
pub struct FeatureNormalizer {
    window_size: usize,
}

impl FeatureNormalizer {
    /// Fill value for unresolvable cells. Zero would read as "at the window low".
    pub const NEUTRAL: f64 = 0.5;

    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Column labels of [`Self::normalize`]'s output, in order.
    pub fn feature_names<'a>(&self, data: &'a MarketData) -> Vec<&'a str> {
        data.feature_names()
    }

    /// Returns a `(rows, features)` matrix aligned with `data.columns()`.
    pub fn normalize(&self, data: &MarketData) -> Array2<f64> {
        let rows = data.len();
        let cols = data.columns().len();
        let mut out = Array2::from_elem((rows, cols), Self::NEUTRAL);

        for (j, column) in data.columns().iter().enumerate() {
            let normalized = self.normalize_column(column.kind, &column.values);
            for (i, v) in normalized.into_iter().enumerate().take(rows) {
                out[[i, j]] = v;
            }
        }
        out
    }

    pub fn normalize_column(&self, kind: FeatureKind, values: &[f64]) -> Vec<f64> {
        match kind {
            FeatureKind::BoundedOscillator => values
                .iter()
                .map(|v| {
                    if v.is_finite() {
                        (v / 100.0).clamp(0.0, 1.0)
                    } else {
                        Self::NEUTRAL
                    }
                })
                .collect(),
            FeatureKind::PriceLike | FeatureKind::Unbounded => {
                let mut window = RollingMinMax::new(self.window_size);
                values
                    .iter()
                    .map(|&v| match window.update(v) {
                        Some((min, max)) if v.is_finite() && max - min > EPS => {
                            ((v - min) / (max - min)).clamp(0.0, 1.0)
                        }
                        _ => Self::NEUTRAL,
                    })
                    .collect()
            }
        }
    }
}
