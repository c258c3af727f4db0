use livetrader_core::prelude::*;
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

pub mod simple;
pub mod momentum;

pub type StrategyParams = HashMap<String, Value>;

/// Contract between the trading loop and a signal model.
///
/// Implementations are pure functions of their inputs: the loop owns the
/// price history and the position, and only ever passes copies in.
pub trait Strategy: Send + Sync {
    fn base(&self) -> &StrategyBase;

    fn base_mut(&mut self) -> &mut StrategyBase;

    fn name(&self) -> &str {
        &self.base().name
    }

    fn params(&self) -> &StrategyParams {
        &self.base().params
    }

    fn is_initialized(&self) -> bool {
        self.base().initialized
    }

    /// Called once by the loop before the first iteration.
    fn initialize(&mut self) -> Result<()> {
        let base = self.base_mut();
        base.initialized = true;
        info!(strategy = %base.name, "Strategy initialized");
        Ok(())
    }

    /// One signal per price point; the loop only acts on the last one.
    fn generate_signals(&self, prices: &[f64]) -> Result<Vec<Signal>>;

    /// Desired position as a fraction of capital.
    fn calculate_target_position(&self, signal: Signal, current_position: f64) -> Result<f64>;
}

/// Name, parameters and initialization flag shared by every strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyBase {
    pub name: String,
    pub params: StrategyParams,
    pub initialized: bool,
}

impl StrategyBase {
    pub fn new(name: impl Into<String>, params: StrategyParams) -> Self {
        Self {
            name: name.into(),
            params,
            initialized: false,
        }
    }

    pub fn param_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_f64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                .filter(|v: &f64| v.is_finite())
                .ok_or_else(|| {
                    LiveTraderError::InvalidConfig(format!(
                        "Strategy '{}': parameter '{}' must be a number, got {}",
                        self.name, key, value
                    ))
                }),
        }
    }

    pub fn param_usize(&self, key: &str, default: usize) -> Result<usize> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                .map(|v| v as usize)
                .ok_or_else(|| {
                    LiveTraderError::InvalidConfig(format!(
                        "Strategy '{}': parameter '{}' must be a non-negative integer, got {}",
                        self.name, key, value
                    ))
                }),
        }
    }
}

/// Build a strategy from its configured kind.
pub fn build_strategy(kind: &str, name: &str, params: StrategyParams) -> Result<Box<dyn Strategy>> {
    match kind.to_ascii_lowercase().as_str() {
        "trend" | "trend_following" | "simple_trend" => {
            Ok(Box::new(simple::TrendFollowing::new(name, params)?))
        }
        "momentum" => Ok(Box::new(momentum::Momentum::new(name, params)?)),
        other => Err(LiveTraderError::InvalidConfig(format!(
            "Unknown strategy kind: {}",
            other
        ))),
    }
}

pub(crate) fn validate_long_fraction(base: &StrategyBase, value: f64) -> Result<f64> {
    if value <= 0.0 || value > 1.0 {
        return Err(LiveTraderError::InvalidConfig(format!(
            "Strategy '{}': long_fraction must be in (0, 1], got {}",
            base.name, value
        )));
    }
    Ok(value)
}

pub mod prelude {
    pub use super::{build_strategy, Strategy, StrategyBase, StrategyParams};
    pub use super::simple::*;
    pub use super::momentum::*;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_lookup() {
        let mut params = StrategyParams::new();
        params.insert("threshold".to_string(), json!(0.02));
        params.insert("lookback".to_string(), json!("7"));
        params.insert("bad".to_string(), json!([1, 2]));
        let base = StrategyBase::new("test", params);

        assert_eq!(base.param_f64("threshold", 0.01).unwrap(), 0.02);
        assert_eq!(base.param_f64("missing", 0.01).unwrap(), 0.01);
        assert_eq!(base.param_usize("lookback", 5).unwrap(), 7);
        assert!(base.param_f64("bad", 0.0).is_err());
        assert!(base.param_usize("threshold", 5).is_err());
    }

    #[test]
    fn test_factory() {
        let strategy = build_strategy("trend", "Trend", StrategyParams::new()).unwrap();
        assert_eq!(strategy.name(), "Trend");
        assert!(!strategy.is_initialized());

        let mut strategy = build_strategy("Momentum", "Mom", StrategyParams::new()).unwrap();
        strategy.initialize().unwrap();
        assert!(strategy.is_initialized());

        assert!(build_strategy("martingale", "x", StrategyParams::new()).is_err());
    }
}
