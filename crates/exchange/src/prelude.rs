//! Prelude module for livetrader-exchange
//!
//! Re-exports commonly used types and traits

pub use crate::traits::{Exchange, SharedExchange};
pub use crate::normalizer::ResponseNormalizer;
pub use crate::paper::{PaperExchange, PaperFill, PriceFeed};

// Re-export common types from core
pub use livetrader_core::prelude::*;
