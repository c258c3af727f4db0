//! Prelude module - re-exports commonly used types for convenience

pub use crate::config::{
    AppConfig, LoggingConfig, MetricsConfig, PaperConfig, ReporterConfig, RuntimeConfig,
    RuntimeSettings, StrategySettings, TraderConfig,
};
pub use crate::error::{LiveTraderError, Result};
pub use crate::types::{
    order::*,
    position::*,
    signal::*,
};

// Re-export commonly used external types
pub use rust_decimal::Decimal;
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
