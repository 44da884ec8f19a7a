use polars::prelude::{DataFrame, DataType, SortMultipleOptions};
use strum::IntoEnumIterator;

use crate::{
    data::columns::{DerivedCol, FeatureKind, OhlcvCol, is_order_column},
    error::{DataError, SystemError, TraderResult},
    math::{
        rolling::{StreamingIndicator, StreamingStd},
        stats::safe_div,
    },
};

/// A single numeric column of the input table, tagged with how it normalizes.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: FeatureKind,
    pub values: Vec<f64>,
}

/// The time-ordered, numeric view of an input table that the core works on.
///
/// Built once from a polars [`DataFrame`]. Base OHLCV columns are mandatory;
/// any other numeric column is carried along as an optional feature.
/// `returns` and `volatility` are always derived from `close`.
#[derive(Debug, Clone)]
pub struct MarketData {
    columns: Vec<FeatureColumn>,
    close_idx: usize,
    volatility_idx: usize,
    len: usize,
}

impl MarketData {
    /// Extracts and validates the table.
    ///
    /// # Errors
    /// - [`DataError::MissingColumn`] if any of `open, high, low, close, volume` is absent.
    /// - [`DataError::DataFrame`] if a base column holds no finite values at all.
    #[tracing::instrument(skip(df), fields(rows = df.height(), cols = df.width()))]
    pub fn from_df(df: &DataFrame, volatility_window: usize) -> TraderResult<Self> {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let resolve = |wanted: &str| {
            names
                .iter()
                .find(|n| n.eq_ignore_ascii_case(wanted))
                .cloned()
        };

        let mut base = Vec::with_capacity(5);
        for col in OhlcvCol::iter() {
            let name = resolve(col.as_str())
                .ok_or_else(|| DataError::MissingColumn(col.as_str().to_string()))?;
            base.push((col, name));
        }

        let sorted = match names.iter().find(|n| is_order_column(n)) {
            Some(order_col) => df
                .sort([order_col.as_str()], SortMultipleOptions::default())
                .map_err(|e| DataError::DataFrame(e.to_string()))?,
            None => df.clone(),
        };

        let mut columns = Vec::with_capacity(names.len() + 2);
        for (col, name) in &base {
            let mut values = column_as_f64(&sorted, name)?;
            if !fill_gaps(&mut values) {
                return Err(DataError::DataFrame(format!(
                    "column '{name}' contains no finite values"
                ))
                .into());
            }
            columns.push(FeatureColumn {
                name: col.as_str().to_string(),
                kind: FeatureKind::classify(col.as_str()),
                values,
            });
        }

        for name in &names {
            let is_base = base.iter().any(|(_, b)| b == name);
            if is_base || is_order_column(name) || !is_numeric(&sorted, name)? {
                continue;
            }
            columns.push(FeatureColumn {
                name: name.clone(),
                kind: FeatureKind::classify(name),
                values: column_as_f64(&sorted, name)?,
            });
        }

        let close_idx = columns
            .iter()
            .position(|c| c.name == OhlcvCol::Close.as_str())
            .ok_or_else(|| {
                SystemError::InvariantViolation("close column lost during extraction".to_string())
            })?;
        let returns = simple_returns(&columns[close_idx].values);
        let volatility = rolling_std(&returns, volatility_window);

        columns.retain(|c| {
            c.name != DerivedCol::Returns.as_str() && c.name != DerivedCol::Volatility.as_str()
        });
        columns.push(FeatureColumn {
            name: DerivedCol::Returns.as_str().to_string(),
            kind: FeatureKind::Unbounded,
            values: returns,
        });
        columns.push(FeatureColumn {
            name: DerivedCol::Volatility.as_str().to_string(),
            kind: FeatureKind::Unbounded,
            values: volatility,
        });
        let volatility_idx = columns.len() - 1;

        tracing::debug!(
            features = columns.len(),
            "Market data loaded with derived returns and volatility"
        );

        Ok(Self {
            len: sorted.height(),
            columns,
            close_idx,
            volatility_idx,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn feature_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn close(&self) -> &[f64] {
        &self.columns[self.close_idx].values
    }

    /// Close price at `idx`, clamped to the last bar.
    pub fn close_at(&self, idx: usize) -> f64 {
        let close = self.close();
        close[idx.min(close.len().saturating_sub(1))]
    }

    /// Raw volatility series; warm-up rows are `NaN`.
    pub fn volatility(&self) -> &[f64] {
        &self.columns[self.volatility_idx].values
    }

    /// Volatility at `idx`, with warm-up rows reported as `0.0`.
    pub fn volatility_at(&self, idx: usize) -> f64 {
        self.volatility()
            .get(idx)
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }
}

// ================================================================================================
// Helpers
// ================================================================================================

fn is_numeric(df: &DataFrame, name: &str) -> TraderResult<bool> {
    let dtype = df
        .column(name)
        .map_err(|e| DataError::DataFrame(e.to_string()))?
        .dtype()
        .clone();
    Ok(dtype.is_float() || dtype.is_integer())
}

fn column_as_f64(df: &DataFrame, name: &str) -> TraderResult<Vec<f64>> {
    let casted = df
        .column(name)
        .map_err(|e| DataError::DataFrame(e.to_string()))?
        .cast(&DataType::Float64)
        .map_err(|e| DataError::DataFrame(e.to_string()))?;
    let ca = casted
        .f64()
        .map_err(|e| DataError::DataFrame(e.to_string()))?;
    Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Forward-fills non-finite values, back-filling any leading gap with the
/// first finite value. Returns `false` if nothing finite exists.
fn fill_gaps(values: &mut [f64]) -> bool {
    let Some(first) = values.iter().copied().find(|v| v.is_finite()) else {
        return false;
    };
    let mut last = first;
    for v in values.iter_mut() {
        if v.is_finite() {
            last = *v;
        } else {
            *v = last;
        }
    }
    true
}

fn simple_returns(close: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(close.len());
    out.push(0.0);
    out.extend(
        close
            .windows(2)
            .map(|w| safe_div(w[1] - w[0], w[0], 0.0)),
    );
    out.truncate(close.len());
    out
}

fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let mut std = StreamingStd::new(window);
    values
        .iter()
        .map(|v| std.update(*v).unwrap_or(f64::NAN))
        .collect()
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;
    use crate::error::{ErrorKind, TraderError};

    fn table(n: usize) -> DataFrame {
        let close: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        df!(
            "timestamp" => (0..n as i64).rev().collect::<Vec<_>>(),
            "open" => close.clone(),
            "high" => close.iter().map(|c| c + 1.0).collect::<Vec<_>>(),
            "low" => close.iter().map(|c| c - 1.0).collect::<Vec<_>>(),
            "close" => close.clone(),
            "volume" => vec![1_000_i64; n],
            "rsi_14" => vec![55.0; n],
            "note" => vec!["x"; n],
        )
        .unwrap()
    }

    #[test]
    fn missing_base_column_is_fatal() {
        let df = df!(
            "open" => [1.0, 2.0],
            "high" => [1.0, 2.0],
            "low" => [1.0, 2.0],
            "volume" => [1.0, 2.0],
        )
        .unwrap();
        let err = MarketData::from_df(&df, 20).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingColumn);
        assert!(matches!(
            err,
            TraderError::Data(DataError::MissingColumn(ref c)) if c == "close"
        ));
    }

    #[test]
    fn sorts_by_timestamp_and_derives_columns() {
        let data = MarketData::from_df(&table(30), 5).unwrap();
        assert_eq!(data.len(), 30);
        // timestamps were descending, so sorting reverses the close series
        assert_eq!(data.close()[0], 129.0);
        assert_eq!(data.close()[29], 100.0);

        let names = data.feature_names();
        assert_eq!(
            names,
            vec![
                "open", "high", "low", "close", "volume", "rsi_14", "returns", "volatility"
            ]
        );
        assert!(data.volatility()[3].is_nan());
        assert!(data.volatility()[4].is_finite());
        assert_eq!(data.volatility_at(0), 0.0);
    }

    #[test]
    fn gaps_in_close_are_forward_filled() {
        let mut v = vec![f64::NAN, 2.0, f64::NAN, 4.0];
        assert!(fill_gaps(&mut v));
        assert_eq!(v, vec![2.0, 2.0, 2.0, 4.0]);
        assert!(!fill_gaps(&mut [f64::NAN]));
    }

    #[test]
    fn returns_guard_zero_price() {
        assert_eq!(simple_returns(&[0.0, 1.0, 2.0]), vec![0.0, 0.0, 1.0]);
    }
}
