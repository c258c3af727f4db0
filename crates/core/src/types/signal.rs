use serde::{Deserialize, Serialize};
use std::fmt;

/// Ternary trading indicator derived from price history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Sell,
    #[default]
    Hold,
    Buy,
}

impl Signal {
    pub fn as_i8(self) -> i8 {
        match self {
            Signal::Sell => -1,
            Signal::Hold => 0,
            Signal::Buy => 1,
        }
    }

    /// Maps any positive value to `Buy`, any negative value to `Sell`.
    pub fn from_i8(value: i8) -> Self {
        match value.signum() {
            1 => Signal::Buy,
            -1 => Signal::Sell,
            _ => Signal::Hold,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Signal::Sell => "sell",
            Signal::Hold => "hold",
            Signal::Buy => "buy",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
            Signal::Buy => write!(f, "BUY"),
        }
    }
}

/// Why a target position was chosen in an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Signal => "signal",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
        }
    }

    pub fn is_forced(self) -> bool {
        !matches!(self, ExitReason::Signal)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_integer_mapping() {
        assert_eq!(Signal::from_i8(1), Signal::Buy);
        assert_eq!(Signal::from_i8(-1), Signal::Sell);
        assert_eq!(Signal::from_i8(0), Signal::Hold);
        assert_eq!(Signal::from_i8(7), Signal::Buy);
        assert_eq!(Signal::Sell.as_i8(), -1);
        assert_eq!(Signal::default(), Signal::Hold);
    }

    #[test]
    fn test_exit_reason_labels() {
        assert_eq!(ExitReason::StopLoss.to_string(), "stop_loss");
        assert_eq!(ExitReason::TakeProfit.as_str(), "take_profit");
        assert!(ExitReason::StopLoss.is_forced());
        assert!(!ExitReason::Signal.is_forced());
        assert_eq!(
            serde_json::to_value(ExitReason::TakeProfit).unwrap(),
            serde_json::json!("take_profit")
        );
    }
}
