use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use livetrader_core::prelude::*;

fn monitoring_error(e: impl std::fmt::Display) -> LiveTraderError {
    LiveTraderError::Monitoring(e.to_string())
}

/// Prometheus instruments for the trading loop.
pub struct MetricsCollector {
    registry: Registry,

    pub iterations_total: IntCounter,
    pub iteration_duration: Histogram,
    pub signals_total: IntCounterVec,
    pub orders_total: IntCounterVec,
    pub orders_rejected_total: IntCounter,
    pub order_failures_total: IntCounter,
    pub risk_exits_total: IntCounterVec,
    pub strategy_errors_total: IntCounter,
    pub exchange_errors_total: IntCounterVec,

    pub last_price: Gauge,
    pub position_size: Gauge,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let iterations_total = IntCounter::with_opts(Opts::new(
            "livetrader_iterations_total",
            "Total number of trading loop iterations",
        ))
        .map_err(monitoring_error)?;

        let iteration_duration = Histogram::with_opts(HistogramOpts::new(
            "livetrader_iteration_duration_seconds",
            "Time spent in one trading loop iteration, excluding the sleep",
        ))
        .map_err(monitoring_error)?;

        let signals_total = IntCounterVec::new(
            Opts::new("livetrader_signals_total", "Signals acted upon, by kind"),
            &["signal"],
        )
        .map_err(monitoring_error)?;

        let orders_total = IntCounterVec::new(
            Opts::new("livetrader_orders_total", "Orders placed, by side"),
            &["side"],
        )
        .map_err(monitoring_error)?;

        let orders_rejected_total = IntCounter::with_opts(Opts::new(
            "livetrader_orders_rejected_total",
            "Rebalances rejected by the notional cap",
        ))
        .map_err(monitoring_error)?;

        let order_failures_total = IntCounter::with_opts(Opts::new(
            "livetrader_order_failures_total",
            "Orders the exchange failed to accept",
        ))
        .map_err(monitoring_error)?;

        let risk_exits_total = IntCounterVec::new(
            Opts::new("livetrader_risk_exits_total", "Forced exits, by reason"),
            &["reason"],
        )
        .map_err(monitoring_error)?;

        let strategy_errors_total = IntCounter::with_opts(Opts::new(
            "livetrader_strategy_errors_total",
            "Strategy errors and panics",
        ))
        .map_err(monitoring_error)?;

        let exchange_errors_total = IntCounterVec::new(
            Opts::new("livetrader_exchange_errors_total", "Failed exchange calls, by operation"),
            &["operation"],
        )
        .map_err(monitoring_error)?;

        let last_price = Gauge::with_opts(Opts::new("livetrader_last_price", "Last observed market price"))
            .map_err(monitoring_error)?;

        let position_size = Gauge::with_opts(Opts::new(
            "livetrader_position_size",
            "Current position as a fraction of capital",
        ))
        .map_err(monitoring_error)?;

        registry.register(Box::new(iterations_total.clone())).map_err(monitoring_error)?;
        registry.register(Box::new(iteration_duration.clone())).map_err(monitoring_error)?;
        registry.register(Box::new(signals_total.clone())).map_err(monitoring_error)?;
        registry.register(Box::new(orders_total.clone())).map_err(monitoring_error)?;
        registry.register(Box::new(orders_rejected_total.clone())).map_err(monitoring_error)?;
        registry.register(Box::new(order_failures_total.clone())).map_err(monitoring_error)?;
        registry.register(Box::new(risk_exits_total.clone())).map_err(monitoring_error)?;
        registry.register(Box::new(strategy_errors_total.clone())).map_err(monitoring_error)?;
        registry.register(Box::new(exchange_errors_total.clone())).map_err(monitoring_error)?;
        registry.register(Box::new(last_price.clone())).map_err(monitoring_error)?;
        registry.register(Box::new(position_size.clone())).map_err(monitoring_error)?;

        Ok(Self {
            registry,
            iterations_total,
            iteration_duration,
            signals_total,
            orders_total,
            orders_rejected_total,
            order_failures_total,
            risk_exits_total,
            strategy_errors_total,
            exchange_errors_total,
            last_price,
            position_size,
        })
    }

    pub fn record_iteration(&self, duration_secs: f64) {
        self.iterations_total.inc();
        self.iteration_duration.observe(duration_secs);
    }

    pub fn record_signal(&self, signal: Signal) {
        self.signals_total.with_label_values(&[signal.label()]).inc();
    }

    pub fn record_order(&self, side: OrderSide) {
        self.orders_total.with_label_values(&[side.as_str()]).inc();
    }

    pub fn record_order_rejected(&self) {
        self.orders_rejected_total.inc();
    }

    pub fn record_order_failure(&self) {
        self.order_failures_total.inc();
    }

    pub fn record_risk_exit(&self, reason: ExitReason) {
        self.risk_exits_total.with_label_values(&[reason.as_str()]).inc();
    }

    pub fn record_strategy_error(&self) {
        self.strategy_errors_total.inc();
    }

    pub fn record_exchange_error(&self, operation: &str) {
        self.exchange_errors_total.with_label_values(&[operation]).inc();
    }

    pub fn update_price(&self, price: f64) {
        self.last_price.set(price);
    }

    pub fn update_position(&self, size: f64) {
        self.position_size.set(size);
    }

    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).map_err(monitoring_error)?;

        String::from_utf8(buffer).map_err(monitoring_error)
    }
}

/// HTTP endpoint exposing `/metrics` and `/health`.
pub struct MetricsServer {
    address: SocketAddr,
    metrics_collector: Arc<MetricsCollector>,
    handle: Option<JoinHandle<()>>,
}

impl MetricsServer {
    pub fn new(address: SocketAddr, metrics_collector: Arc<MetricsCollector>) -> Self {
        Self {
            address,
            metrics_collector,
            handle: None,
        }
    }

    /// Bind and serve in the background; returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .with_state(Arc::clone(&self.metrics_collector));

        let listener = TcpListener::bind(self.address).await?;
        let local_addr = listener.local_addr()?;

        info!("Metrics server listening on {}", local_addr);

        self.handle = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server error: {}", e);
            }
        }));

        Ok(local_addr)
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!("Metrics server stopped");
        }
    }
}

impl Drop for MetricsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn metrics_handler(State(metrics_collector): State<Arc<MetricsCollector>>) -> impl IntoResponse {
    match metrics_collector.gather_metrics() {
        Ok(metrics) => (StatusCode::OK, metrics),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics".to_string())
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_rendering() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.record_iteration(0.01);
        metrics.record_signal(Signal::Buy);
        metrics.record_order(OrderSide::Buy);
        metrics.record_risk_exit(ExitReason::StopLoss);
        metrics.record_exchange_error("get_ticker");
        metrics.update_price(101.5);
        metrics.update_position(0.5);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("livetrader_iterations_total 1"));
        assert!(text.contains("livetrader_signals_total{signal=\"buy\"} 1"));
        assert!(text.contains("livetrader_orders_total{side=\"buy\"} 1"));
        assert!(text.contains("livetrader_risk_exits_total{reason=\"stop_loss\"} 1"));
        assert!(text.contains("livetrader_exchange_errors_total{operation=\"get_ticker\"} 1"));
        assert!(text.contains("livetrader_last_price 101.5"));
        assert!(text.contains("livetrader_position_size 0.5"));
    }

    #[test]
    fn test_collectors_are_independent() {
        let a = MetricsCollector::new().unwrap();
        let b = MetricsCollector::new().unwrap();
        a.record_order_rejected();
        assert!(a.gather_metrics().unwrap().contains("livetrader_orders_rejected_total 1"));
        assert!(b.gather_metrics().unwrap().contains("livetrader_orders_rejected_total 0"));
    }

    #[tokio::test]
    async fn test_server_serves_metrics() {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        metrics.record_strategy_error();

        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap(), Arc::clone(&metrics));
        let addr = server.start().await.unwrap();

        let health = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
        assert!(health.status().is_success());

        let body = reqwest::get(format!("http://{}/metrics", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("livetrader_strategy_errors_total 1"));

        server.stop();
    }
}
