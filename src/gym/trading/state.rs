use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Normalized feature rows for the trailing `window_size` bars, oldest first.
///
/// Owns its data. Once built it is never mutated, so a stored transition can
/// not change when the environment advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketWindow(Array2<f64>);

impl MarketWindow {
    pub fn new(rows: Array2<f64>) -> Self {
        Self(rows)
    }

    /// Copies `window_size` rows ending at `end` (inclusive) out of `features`.
    ///
    /// Rows before the start of history are filled with `fill`.
    pub fn from_features(
        features: ArrayView2<'_, f64>,
        end: usize,
        window_size: usize,
        fill: f64,
    ) -> Self {
        let cols = features.ncols();
        let mut out = Array2::from_elem((window_size, cols), fill);
        let available = (end + 1).min(window_size);
        let src_start = end + 1 - available;
        let dst_start = window_size - available;
        for k in 0..available {
            out.row_mut(dst_start + k)
                .assign(&features.row(src_start + k));
        }
        Self(out)
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.0.view()
    }

    /// Number of time steps.
    pub fn len(&self) -> usize {
        self.0.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.0.nrows() == 0
    }

    pub fn feature_count(&self) -> usize {
        self.0.ncols()
    }
}

/// The agent-visible slice of the account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    /// Signed exposure: negative is short, positive is long, zero is flat.
    pub position: f64,
    /// Unrealized P&L divided by the initial balance.
    pub unrealized_pnl_ratio: f64,
    /// `(price - entry) / entry` of the open position, zero when flat.
    pub relative_entry_offset: f64,
}

impl AccountState {
    pub const LEN: usize = 3;

    pub fn flat() -> Self {
        Self::default()
    }

    pub fn to_array(&self) -> Array1<f64> {
        Array1::from_vec(vec![
            self.position,
            self.unrealized_pnl_ratio,
            self.relative_entry_offset,
        ])
    }
}

/// One observation: the market window plus the account state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub market: MarketWindow,
    pub account: AccountState,
}

impl State {
    pub fn new(market: MarketWindow, account: AccountState) -> Self {
        Self { market, account }
    }

    pub fn is_flat(&self) -> bool {
        self.account.position == 0.0
    }
}
