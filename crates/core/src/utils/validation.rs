use crate::error::{LiveTraderError, Result};

pub fn validate_market(market: &str) -> Result<()> {
    if market.trim().is_empty() {
        return Err(LiveTraderError::InvalidConfig("Market cannot be empty".to_string()));
    }

    if market.chars().any(char::is_whitespace) {
        return Err(LiveTraderError::InvalidConfig(format!(
            "Market must not contain whitespace: {:?}",
            market
        )));
    }

    Ok(())
}

pub fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(LiveTraderError::InvalidConfig(format!(
            "{} must be greater than 0, got {}",
            name, value
        )));
    }

    Ok(())
}

/// Accepts values in the half-open interval (0, 1].
pub fn validate_fraction(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value > 1.0 {
        return Err(LiveTraderError::InvalidConfig(format!(
            "{} must be in (0, 1], got {}",
            name, value
        )));
    }

    Ok(())
}

pub fn validate_optional_positive(name: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) => validate_positive(name, v),
        None => Ok(()),
    }
}
