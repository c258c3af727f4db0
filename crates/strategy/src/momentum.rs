use livetrader_core::prelude::*;

use crate::{validate_long_fraction, Strategy, StrategyBase, StrategyParams};

/// Rate-of-change strategy over a fixed lookback.
#[derive(Debug, Clone)]
pub struct Momentum {
    base: StrategyBase,
    lookback: usize,
    threshold: f64,
    long_fraction: f64,
}

impl Momentum {
    pub const DEFAULT_LOOKBACK: usize = 5;
    pub const DEFAULT_THRESHOLD: f64 = 0.01;
    pub const DEFAULT_LONG_FRACTION: f64 = 0.7;

    pub fn new(name: impl Into<String>, params: StrategyParams) -> Result<Self> {
        let base = StrategyBase::new(name, params);
        let lookback = base.param_usize("lookback", Self::DEFAULT_LOOKBACK)?;
        let threshold = base.param_f64("threshold", Self::DEFAULT_THRESHOLD)?;
        let long_fraction = base.param_f64("long_fraction", Self::DEFAULT_LONG_FRACTION)?;

        if lookback == 0 {
            return Err(LiveTraderError::InvalidConfig(format!(
                "Strategy '{}': lookback must be at least 1",
                base.name
            )));
        }
        if threshold < 0.0 {
            return Err(LiveTraderError::InvalidConfig(format!(
                "Strategy '{}': threshold must be non-negative, got {}",
                base.name, threshold
            )));
        }
        let long_fraction = validate_long_fraction(&base, long_fraction)?;

        Ok(Self {
            base,
            lookback,
            threshold,
            long_fraction,
        })
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Strategy for Momentum {
    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StrategyBase {
        &mut self.base
    }

    fn generate_signals(&self, prices: &[f64]) -> Result<Vec<Signal>> {
        let mut signals = vec![Signal::Hold; prices.len()];
        if prices.len() <= self.lookback {
            return Ok(signals);
        }

        for i in self.lookback..prices.len() {
            let reference = prices[i - self.lookback];
            if reference <= 0.0 {
                continue;
            }

            let momentum = (prices[i] - reference) / reference;
            if momentum > self.threshold {
                signals[i] = Signal::Buy;
            } else if momentum < -self.threshold {
                signals[i] = Signal::Sell;
            }
        }

        Ok(signals)
    }

    fn calculate_target_position(&self, signal: Signal, current_position: f64) -> Result<f64> {
        Ok(match signal {
            Signal::Buy => self.long_fraction,
            Signal::Sell => 0.0,
            Signal::Hold => current_position,
        })
    }
}
