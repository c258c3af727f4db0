use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LiveTraderError, Result};

/// Decimal places kept when an order size leaves the engine.
pub const ORDER_SIZE_SCALE: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "buy" | "bid" | "long" => Some(OrderSide::Buy),
            "sell" | "ask" | "short" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "market"),
            OrderType::Limit => write!(f, "limit"),
        }
    }
}

/// What the reconciler wants traded. Sizes are fractions of capital.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub side: OrderSide,
    pub size: f64,
    pub notional: f64,
}

/// Order as submitted to an exchange collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub size: Decimal,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn market(market: impl Into<String>, side: OrderSide, size: f64) -> Result<Self> {
        let size = Decimal::from_f64(size)
            .map(|d| d.round_dp(ORDER_SIZE_SCALE).normalize())
            .ok_or_else(|| LiveTraderError::InvalidOrder(format!("Unrepresentable order size: {}", size)))?;

        if size <= Decimal::ZERO {
            return Err(LiveTraderError::InvalidOrder(format!(
                "Order size must be positive, got {}",
                size
            )));
        }

        Ok(Self {
            market: market.into(),
            side,
            order_type: OrderType::Market,
            size,
            client_order_id: None,
        })
    }

    pub fn from_intent(market: impl Into<String>, intent: &OrderIntent) -> Result<Self> {
        Self::market(market, intent.side, intent.size)
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}

/// Normalised acknowledgement of a placed order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: Option<String>,
    pub status: Option<String>,
}
