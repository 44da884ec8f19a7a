use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

/// The five base columns every input table must carry.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    EnumCount,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OhlcvCol {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl OhlcvCol {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Columns derived internally from `close`; they are always present after loading.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum DerivedCol {
    /// Simple close-to-close return.
    Returns,
    /// Trailing standard deviation of `returns`.
    Volatility,
}

impl DerivedCol {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Column names that order the table in time and never become features.
pub const ORDER_COLUMNS: [&str; 5] = ["timestamp", "datetime", "date", "time", "index"];

/// How a column is brought onto a bounded, comparable scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum FeatureKind {
    /// Prices and price-denominated overlays: trailing min-max to `[0, 1]`.
    PriceLike,
    /// Oscillators already living in `[0, 100]`: linear rescale to `[0, 1]`.
    BoundedOscillator,
    /// Everything else (MACD, returns, volatility, volume, ATR, …): trailing
    /// min-max with each column's own extrema.
    Unbounded,
}

const PRICE_PREFIXES: [&str; 14] = [
    "sma", "ema", "wma", "ma_", "vwap", "bb_", "bollinger", "kc_", "keltner", "donchian",
    "dc_", "psar", "pivot", "ichimoku",
];

const BOUNDED_PREFIXES: [&str; 6] = ["rsi", "stoch", "mfi", "adx", "aroon", "ultosc"];

impl FeatureKind {
    /// Classifies a column by its (case-insensitive) name.
    pub fn classify(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();

        if matches!(lower.as_str(), "open" | "high" | "low" | "close") {
            return Self::PriceLike;
        }
        if PRICE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            return Self::PriceLike;
        }
        if BOUNDED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            return Self::BoundedOscillator;
        }
        Self::Unbounded
    }
}

pub fn is_order_column(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ORDER_COLUMNS.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn classify_by_name() {
        assert_eq!(FeatureKind::classify("close"), FeatureKind::PriceLike);
        assert_eq!(FeatureKind::classify("SMA_20"), FeatureKind::PriceLike);
        assert_eq!(FeatureKind::classify("bb_upper"), FeatureKind::PriceLike);
        assert_eq!(FeatureKind::classify("rsi_14"), FeatureKind::BoundedOscillator);
        assert_eq!(FeatureKind::classify("macd_signal"), FeatureKind::Unbounded);
        assert_eq!(FeatureKind::classify("volume"), FeatureKind::Unbounded);
        assert_eq!(FeatureKind::classify("atr"), FeatureKind::Unbounded);
    }

    #[test]
    fn ohlcv_parses_case_insensitively() {
        assert_eq!(OhlcvCol::from_str("Close").unwrap(), OhlcvCol::Close);
        assert_eq!(OhlcvCol::Volume.as_str(), "volume");
        assert!(is_order_column("Timestamp"));
        assert!(!is_order_column("close"));
    }
}
