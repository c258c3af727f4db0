use std::path::Path;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use livetrader_core::config::LoggingConfig;
use livetrader_core::prelude::*;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. The returned guard
/// flushes the file appender and must be held until the process exits.
pub fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let mut layers = Vec::new();
    let mut guard = None;

    if config.console {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true);

        if config.json {
            layers.push(console_layer.json().boxed());
        } else {
            layers.push(console_layer.boxed());
        }
    }

    if let Some(log_file) = &config.file {
        let log_path = Path::new(log_file);
        let directory = log_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        std::fs::create_dir_all(directory).map_err(|e| {
            LiveTraderError::Monitoring(format!("Failed to create log directory: {}", e))
        })?;

        let file_name = log_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("livetrader.log"));
        let (writer, file_guard) = non_blocking(rolling::daily(directory, file_name));
        guard = Some(file_guard);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true);

        if config.json {
            layers.push(file_layer.json().boxed());
        } else {
            layers.push(file_layer.boxed());
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| LiveTraderError::Monitoring(format!("Failed to install subscriber: {}", e)))?;

    info!(level = %config.level, file = ?config.file, json = config.json, "Logging initialized");

    Ok(guard)
}

/// Event helpers tagged with the owning component's name.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn log_signal(&self, market: &str, price: f64, signal: Signal, position: f64) {
        info!(
            component = %self.component,
            event = "signal",
            market = %market,
            price = price,
            signal = %signal,
            position = position,
            "Signal generated"
        );
    }

    pub fn log_order(&self, market: &str, side: OrderSide, size: f64, price: f64, order_id: &str) {
        info!(
            component = %self.component,
            event = "order_placed",
            market = %market,
            side = %side,
            size = size,
            price = price,
            order_id = %order_id,
            "Order placed"
        );
    }

    pub fn log_trade(&self, market: &str, side: OrderSide, size: f64, price: f64, reason: ExitReason) {
        info!(
            component = %self.component,
            event = "trade_executed",
            market = %market,
            side = %side,
            size = size,
            price = price,
            reason = %reason,
            "Trade executed"
        );
    }

    pub fn log_risk_event(&self, event_type: &str, market: Option<&str>, details: &str) {
        warn!(
            component = %self.component,
            event = "risk_event",
            event_type = %event_type,
            market = ?market,
            details = %details,
            "Risk management event"
        );
    }

    pub fn log_error(&self, error: &str, context: Option<&str>) {
        error!(
            component = %self.component,
            event = "error",
            error = %error,
            context = ?context,
            "Error occurred"
        );
    }

    pub fn log_warning(&self, message: &str, context: Option<&str>) {
        warn!(
            component = %self.component,
            event = "warning",
            message = %message,
            context = ?context,
            "Warning"
        );
    }

    pub fn log_system_event(&self, event: &str, details: &serde_json::Value) {
        info!(
            component = %self.component,
            event = %event,
            details = %details,
            "System event"
        );
    }
}
