use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::math::stats::safe_div;

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
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// `+1.0` for long, `-1.0` for short.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }
}

/// An open exposure.
///
/// `size` is a fraction of the initial balance, so the entry notional is
/// `size * initial_balance`. P&L is computed on that notional, which keeps a
/// unit price move worth the same regardless of the instrument's price level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub direction: Direction,
    pub size: f64,
    pub entry_price: f64,
    pub entry_step: usize,
    pub entry_fee: f64,
}

impl Position {
    pub fn notional(&self, initial_balance: f64) -> f64 {
        self.size * initial_balance
    }

    /// Notional at `price`, i.e. what closing would be charged fees on.
    pub fn exit_notional(&self, price: f64, initial_balance: f64) -> f64 {
        let notional = self.notional(initial_balance);
        notional * safe_div(price, self.entry_price, 1.0)
    }

    /// Mark-to-market P&L in account currency, before exit fees.
    pub fn unrealized_pnl(&self, price: f64, initial_balance: f64) -> f64 {
        let move_pct = safe_div(price - self.entry_price, self.entry_price, 0.0);
        self.direction.sign() * move_pct * self.notional(initial_balance)
    }

    /// Signed exposure in `[-max_position_size, max_position_size]`.
    pub fn signed_size(&self) -> f64 {
        self.direction.sign() * self.size
    }

    /// `(price - entry) / entry`, independent of direction.
    pub fn relative_entry_offset(&self, price: f64) -> f64 {
        safe_div(price - self.entry_price, self.entry_price, 0.0)
    }
}
