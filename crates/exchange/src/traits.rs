use async_trait::async_trait;
use livetrader_core::{OrderRequest, Result};
use serde_json::Value;
use std::sync::Arc;

pub type SharedExchange = Arc<dyn Exchange>;

/// Venue collaborator consumed by the trading loop.
///
/// Responses are returned raw; [`crate::ResponseNormalizer`] accepts both the
/// flat shape and the shape wrapped in a top-level `data` field.
#[async_trait]
pub trait Exchange: Send + Sync {
    fn name(&self) -> &str;

    /// Ticker for `market`, expected to carry a `last_price` field.
    async fn get_ticker(&self, market: &str) -> Result<Value>;

    /// Open positions for `market`, a list of entries with a `size` field.
    async fn get_positions(&self, market: &str) -> Result<Value>;

    /// Submit an order; the response carries an `order_id`.
    async fn place_order(&self, request: &OrderRequest) -> Result<Value>;
}
