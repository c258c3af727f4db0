use livetrader_core::{LiveTraderError, OrderAck, Result};
use serde_json::Value;

const SIZE_FIELD: &str = "size";

/// Extracts the handful of fields the trading loop needs from venue responses.
///
/// Every lookup first unwraps an optional top-level `data` field, so both
/// `{"last_price": 1.0}` and `{"data": {"last_price": 1.0}}` are accepted.
#[derive(Debug, Clone)]
pub struct ResponseNormalizer {
    price_fields: Vec<String>,
    order_id_fields: Vec<String>,
}

impl ResponseNormalizer {
    pub fn new() -> Self {
        Self {
            price_fields: vec!["last_price".to_string()],
            order_id_fields: vec!["order_id".to_string()],
        }
    }

    /// Accept an alternative field name for the last traded price.
    pub fn add_price_field(mut self, field: impl Into<String>) -> Self {
        self.price_fields.push(field.into());
        self
    }

    pub fn add_order_id_field(mut self, field: impl Into<String>) -> Self {
        self.order_id_fields.push(field.into());
        self
    }

    /// Last traded price, or `None` when absent, unparseable or non-positive.
    pub fn last_price(&self, response: &Value) -> Option<f64> {
        let body = unwrap_data(response);
        self.price_fields
            .iter()
            .find_map(|field| body.get(field.as_str()).and_then(as_f64))
            .filter(|price| price.is_finite() && *price > 0.0)
    }

    /// Size of the first reported position. An empty list, an empty object
    /// or a null payload means flat.
    pub fn position_size(&self, response: &Value) -> Result<f64> {
        let body = unwrap_data(response);

        let entries = match body {
            Value::Array(entries) => entries,
            Value::Object(map) => match map.get("positions") {
                Some(Value::Array(entries)) => entries,
                _ if map.values().all(Value::is_null) => return Ok(0.0),
                _ => return self.entry_size(body),
            },
            Value::Null => return Ok(0.0),
            other => {
                return Err(LiveTraderError::InvalidData(format!(
                    "Unexpected positions payload: {}",
                    other
                )))
            }
        };

        match entries.first() {
            Some(entry) => self.entry_size(entry),
            None => Ok(0.0),
        }
    }

    pub fn order_ack(&self, response: &Value) -> OrderAck {
        let body = unwrap_data(response);
        let order_id = self.order_id_fields.iter().find_map(|field| match body.get(field.as_str()) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });
        let status = body.get("status").and_then(Value::as_str).map(str::to_string);

        OrderAck { order_id, status }
    }

    fn entry_size(&self, entry: &Value) -> Result<f64> {
        entry
            .get(SIZE_FIELD)
            .and_then(as_f64)
            .filter(|size| size.is_finite())
            .ok_or_else(|| {
                LiveTraderError::InvalidData(format!(
                    "Position entry has no numeric '{}' field: {}",
                    SIZE_FIELD, entry
                ))
            })
    }
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the `data` field when present and non-null, otherwise `value`.
pub fn unwrap_data(value: &Value) -> &Value {
    match value.get("data") {
        Some(inner) if !inner.is_null() => inner,
        _ => value,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
