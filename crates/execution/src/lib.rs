pub mod history;
pub mod risk;
pub mod reconciler;
pub mod engine;

pub use history::PriceHistory;
pub use risk::RiskGuard;
pub use reconciler::{PositionReconciler, Rebalance};
pub use engine::{IterationOutcome, LiveTrader, LoopExit, StopHandle, TraderState, TraderStatus, TradingSummary};

pub mod prelude {
    pub use super::{
        PriceHistory, RiskGuard, PositionReconciler, Rebalance,
        IterationOutcome, LiveTrader, LoopExit, StopHandle, TraderState, TraderStatus, TradingSummary,
    };
}
