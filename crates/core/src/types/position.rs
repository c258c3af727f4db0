use serde::{Deserialize, Serialize};

/// Sizes below this are treated as flat.
pub const FLAT_EPSILON: f64 = 1e-9;

/// Net position of the trading session in one market.
///
/// `size` is a fraction of capital in the exchange's own convention (positive
/// when long). `entry_price` is zero exactly when the position is flat.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionState {
    pub size: f64,
    pub entry_price: f64,
    pub trades_count: u64,
}

impl PositionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.size.abs() < FLAT_EPSILON
    }

    /// Adopt the size reported by the exchange.
    ///
    /// Returns `true` when the entry price had to be adopted from `mark_price`
    /// because the exchange reports a position this session never opened.
    pub fn sync_size(&mut self, size: f64, mark_price: f64) -> bool {
        self.size = size;
        if self.is_flat() {
            self.size = 0.0;
            self.entry_price = 0.0;
            false
        } else if self.entry_price == 0.0 {
            self.entry_price = mark_price;
            true
        } else {
            false
        }
    }

    /// Record a confirmed fill moving the position from `previous` to `target`.
    pub fn apply_fill(&mut self, previous: f64, target: f64, price: f64) {
        self.size = target;
        self.trades_count += 1;

        if self.is_flat() {
            self.size = 0.0;
            self.entry_price = 0.0;
        } else if previous.abs() < FLAT_EPSILON || self.entry_price == 0.0 {
            self.entry_price = price;
        }
    }

    /// Unrealized percentage return against the entry price.
    pub fn unrealized_pnl_pct(&self, price: f64) -> Option<f64> {
        if self.is_flat() || self.entry_price == 0.0 {
            return None;
        }
        Some((price - self.entry_price) / self.entry_price)
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        if self.is_flat() || self.entry_price == 0.0 {
            return 0.0;
        }
        (price - self.entry_price) * self.size
    }
}
