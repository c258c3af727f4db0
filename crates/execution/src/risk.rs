use tracing::warn;

use livetrader_core::prelude::*;

/// Stop-loss and take-profit checks against the entry price.
///
/// Thresholds are fractions: `stop_loss = 0.05` exits once the position is
/// down 5% from entry. Stop-loss is checked before take-profit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RiskGuard {
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
}

impl RiskGuard {
    pub fn new(stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        Self { stop_loss, take_profit }
    }

    pub fn from_config(config: &TraderConfig) -> Self {
        Self::new(config.stop_loss, config.take_profit)
    }

    pub fn stop_loss(&self) -> Option<f64> {
        self.stop_loss
    }

    pub fn take_profit(&self) -> Option<f64> {
        self.take_profit
    }

    /// Returns the exit reason when `position` must be closed at `price`.
    pub fn check(&self, position: &PositionState, price: f64) -> Option<ExitReason> {
        let pnl_pct = position.unrealized_pnl_pct(price)?;

        if let Some(stop_loss) = self.stop_loss {
            if pnl_pct <= -stop_loss {
                warn!(
                    entry_price = position.entry_price,
                    price = price,
                    pnl_pct = pnl_pct * 100.0,
                    "Stop-loss triggered"
                );
                return Some(ExitReason::StopLoss);
            }
        }

        if let Some(take_profit) = self.take_profit {
            if pnl_pct >= take_profit {
                warn!(
                    entry_price = position.entry_price,
                    price = price,
                    pnl_pct = pnl_pct * 100.0,
                    "Take-profit triggered"
                );
                return Some(ExitReason::TakeProfit);
            }
        }

        None
    }
}
