use async_trait::async_trait;
use livetrader_core::config::PaperConfig;
use livetrader_core::utils::now_iso8601;
use livetrader_core::{
    LiveTraderError, OrderRequest, OrderSide, OrderType, Result, FLAT_EPSILON,
};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::f64::consts::PI;
use tracing::{debug, info};
use uuid::Uuid;

use crate::traits::Exchange;

/// Source of ticker prices for the paper venue.
#[derive(Debug, Clone)]
pub enum PriceFeed {
    /// Replays a fixed series, repeating the last price once exhausted.
    Scripted { prices: Vec<f64>, cursor: usize },
    /// Sine wave around `start_price` with an optional compounding drift.
    Synthetic {
        start_price: f64,
        amplitude: f64,
        period_ticks: u32,
        drift_per_tick: f64,
        tick: u64,
    },
}

impl PriceFeed {
    pub fn scripted(prices: Vec<f64>) -> Self {
        PriceFeed::Scripted { prices, cursor: 0 }
    }

    pub fn synthetic(config: &PaperConfig) -> Self {
        PriceFeed::Synthetic {
            start_price: config.start_price,
            amplitude: config.amplitude,
            period_ticks: config.period_ticks.max(1),
            drift_per_tick: config.drift_per_tick,
            tick: 0,
        }
    }

    fn next_price(&mut self) -> Option<f64> {
        match self {
            PriceFeed::Scripted { prices, cursor } => {
                let price = prices.get(*cursor).or_else(|| prices.last()).copied();
                if *cursor < prices.len() {
                    *cursor += 1;
                }
                price
            }
            PriceFeed::Synthetic {
                start_price,
                amplitude,
                period_ticks,
                drift_per_tick,
                tick,
            } => {
                let phase = 2.0 * PI * (*tick as f64) / f64::from(*period_ticks);
                let trend = (1.0 + *drift_per_tick).powf(*tick as f64);
                *tick += 1;
                Some(*start_price * trend * (1.0 + *amplitude * phase.sin()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperFill {
    pub order_id: String,
    pub market: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub price: f64,
    pub timestamp: String,
}

#[derive(Debug)]
struct PaperState {
    feed: PriceFeed,
    last_price: Option<f64>,
    positions: HashMap<String, f64>,
    fills: Vec<PaperFill>,
}

/// In-memory venue that fills every market order at the last quoted price.
#[derive(Debug)]
pub struct PaperExchange {
    name: String,
    wrap_responses: bool,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new(feed: PriceFeed) -> Self {
        Self {
            name: "paper".to_string(),
            wrap_responses: false,
            state: Mutex::new(PaperState {
                feed,
                last_price: None,
                positions: HashMap::new(),
                fills: Vec::new(),
            }),
        }
    }

    pub fn scripted(prices: Vec<f64>) -> Self {
        Self::new(PriceFeed::scripted(prices))
    }

    pub fn from_config(config: &PaperConfig) -> Self {
        Self::new(PriceFeed::synthetic(config)).with_wrapped_responses(config.wrap_responses)
    }

    /// Wrap every response in `{"data": ...}` like hosted venues do.
    pub fn with_wrapped_responses(mut self, wrap: bool) -> Self {
        self.wrap_responses = wrap;
        self
    }

    pub fn with_position(self, market: &str, size: f64) -> Self {
        self.state.lock().positions.insert(market.to_string(), size);
        self
    }

    pub fn position(&self, market: &str) -> f64 {
        self.state.lock().positions.get(market).copied().unwrap_or(0.0)
    }

    pub fn fills(&self) -> Vec<PaperFill> {
        self.state.lock().fills.clone()
    }

    fn respond(&self, body: Value) -> Value {
        if self.wrap_responses {
            json!({ "data": body })
        } else {
            body
        }
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_ticker(&self, market: &str) -> Result<Value> {
        let price = {
            let mut state = self.state.lock();
            let price = state.feed.next_price().ok_or_else(|| {
                LiveTraderError::Exchange(format!("No prices available for {}", market))
            })?;
            state.last_price = Some(price);
            price
        };

        debug!(market = market, price = price, "Paper ticker");

        Ok(self.respond(json!({
            "market": market,
            "last_price": price,
            "timestamp": now_iso8601(),
        })))
    }

    async fn get_positions(&self, market: &str) -> Result<Value> {
        let size = self.position(market);
        let entries = if size.abs() < FLAT_EPSILON {
            Vec::new()
        } else {
            vec![json!({
                "market": market,
                "size": size,
                "side": if size > 0.0 { "long" } else { "short" },
            })]
        };

        Ok(self.respond(Value::Array(entries)))
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Value> {
        if request.order_type != OrderType::Market {
            return Err(LiveTraderError::InvalidOrder(format!(
                "Paper venue only fills market orders, got {}",
                request.order_type
            )));
        }

        let size = request.size.to_f64().filter(|s| *s > 0.0).ok_or_else(|| {
            LiveTraderError::InvalidOrder(format!("Invalid order size: {}", request.size))
        })?;

        let fill = {
            let mut state = self.state.lock();
            let price = state.last_price.ok_or_else(|| {
                LiveTraderError::Exchange("No quote yet; request a ticker first".to_string())
            })?;

            let delta = match request.side {
                OrderSide::Buy => size,
                OrderSide::Sell => -size,
            };
            let position = state.positions.entry(request.market.clone()).or_insert(0.0);
            *position += delta;
            if position.abs() < FLAT_EPSILON {
                *position = 0.0;
            }

            let fill = PaperFill {
                order_id: format!("paper-{}", Uuid::new_v4()),
                market: request.market.clone(),
                side: request.side,
                size: request.size,
                price,
                timestamp: now_iso8601(),
            };
            state.fills.push(fill.clone());
            fill
        };

        info!(
            order_id = %fill.order_id,
            market = %fill.market,
            side = %fill.side,
            size = %fill.size,
            price = fill.price,
            "Paper order filled"
        );

        Ok(self.respond(json!({
            "order_id": fill.order_id,
            "status": "filled",
            "market": fill.market,
            "side": fill.side.as_str(),
            "filled_size": fill.size.to_string(),
            "price": fill.price,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::ResponseNormalizer;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_scripted_feed_repeats_last_price() {
        let exchange = PaperExchange::scripted(vec![100.0, 101.0]);
        let normalizer = ResponseNormalizer::new();

        let mut seen = Vec::new();
        for _ in 0..4 {
            let ticker = exchange.get_ticker("BTC-PERP").await.unwrap();
            seen.push(normalizer.last_price(&ticker).unwrap());
        }
        assert_eq!(seen, vec![100.0, 101.0, 101.0, 101.0]);
    }

    #[tokio::test]
    async fn test_empty_script_is_an_error() {
        let exchange = PaperExchange::scripted(Vec::new());
        assert!(exchange.get_ticker("BTC-PERP").await.is_err());
    }

    #[tokio::test]
    async fn test_market_order_fills_at_last_price() {
        let exchange = PaperExchange::scripted(vec![250.0]).with_wrapped_responses(true);
        let normalizer = ResponseNormalizer::new();

        let order = OrderRequest::market("ETH-PERP", OrderSide::Buy, 0.5).unwrap();
        assert!(exchange.place_order(&order).await.is_err());

        exchange.get_ticker("ETH-PERP").await.unwrap();
        let response = exchange.place_order(&order).await.unwrap();
        let ack = normalizer.order_ack(&response);
        assert!(ack.order_id.unwrap().starts_with("paper-"));
        assert_eq!(ack.status.as_deref(), Some("filled"));

        let positions = exchange.get_positions("ETH-PERP").await.unwrap();
        assert_eq!(normalizer.position_size(&positions).unwrap(), 0.5);

        let fills = exchange.fills();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].size, dec!(0.5));
        assert_eq!(fills[0].price, 250.0);

        let close = OrderRequest::market("ETH-PERP", OrderSide::Sell, 0.5).unwrap();
        exchange.place_order(&close).await.unwrap();
        let positions = exchange.get_positions("ETH-PERP").await.unwrap();
        assert_eq!(positions, json!({"data": []}));
    }

    #[tokio::test]
    async fn test_limit_orders_rejected() {
        let exchange = PaperExchange::scripted(vec![10.0]);
        exchange.get_ticker("BTC-PERP").await.unwrap();

        let mut order = OrderRequest::market("BTC-PERP", OrderSide::Buy, 0.1).unwrap();
        order.order_type = OrderType::Limit;
        assert!(matches!(
            exchange.place_order(&order).await,
            Err(LiveTraderError::InvalidOrder(_))
        ));
    }

    #[test]
    fn test_synthetic_feed_oscillates_around_start() {
        let config = PaperConfig {
            start_price: 100.0,
            amplitude: 0.1,
            period_ticks: 4,
            drift_per_tick: 0.0,
            wrap_responses: false,
        };
        let mut feed = PriceFeed::synthetic(&config);
        let prices: Vec<f64> = (0..4).filter_map(|_| feed.next_price()).collect();
        assert!((prices[0] - 100.0).abs() < 1e-9);
        assert!((prices[1] - 110.0).abs() < 1e-9);
        assert!((prices[2] - 100.0).abs() < 1e-9);
        assert!((prices[3] - 90.0).abs() < 1e-9);
    }
}
