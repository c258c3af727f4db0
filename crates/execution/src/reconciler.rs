use tracing::warn;

use livetrader_core::prelude::*;

/// Result of comparing the target position with the actual one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rebalance {
    /// Difference is below the rebalance epsilon.
    InSync,
    /// The order would exceed the notional cap and is not placed.
    Rejected { notional: f64, cap: f64 },
    Order(OrderIntent),
}

/// Turns a target position into the order that reaches it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReconciler {
    epsilon: f64,
    notional_cap: f64,
}

impl PositionReconciler {
    pub fn new(epsilon: f64, initial_capital: f64, max_position_size: f64) -> Self {
        Self {
            epsilon,
            notional_cap: initial_capital * max_position_size,
        }
    }

    pub fn from_config(config: &TraderConfig) -> Self {
        Self::new(config.rebalance_epsilon, config.initial_capital, config.max_position_size)
    }

    pub fn notional_cap(&self) -> f64 {
        self.notional_cap
    }

    pub fn plan(&self, target: f64, actual: f64, price: f64) -> Rebalance {
        let diff = target - actual;
        if diff.abs() < self.epsilon {
            return Rebalance::InSync;
        }

        let side = if diff > 0.0 { OrderSide::Buy } else { OrderSide::Sell };
        let size = diff.abs();
        let notional = size * price;

        if notional > self.notional_cap {
            warn!(
                side = %side,
                size = size,
                price = price,
                notional = notional,
                cap = self.notional_cap,
                "Order notional exceeds cap, skipping rebalance"
            );
            return Rebalance::Rejected {
                notional,
                cap: self.notional_cap,
            };
        }

        Rebalance::Order(OrderIntent { side, size, notional })
    }

    /// The order needed to move from `actual` to `target`, if any.
    pub fn reconcile(&self, target: f64, actual: f64, price: f64) -> Option<OrderIntent> {
        match self.plan(target, actual, price) {
            Rebalance::Order(intent) => Some(intent),
            Rebalance::InSync | Rebalance::Rejected { .. } => None,
        }
    }
}
