use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use livetrader_core::prelude::*;
use livetrader_exchange::prelude::*;
use livetrader_execution::prelude::*;
use livetrader_monitoring::prelude::*;
use livetrader_strategy::prelude::*;

/// Wires configuration, venue, strategy and telemetry into one trading session.
pub struct LiveTraderApp {
    config: AppConfig,
    metrics: Option<Arc<MetricsCollector>>,
    metrics_server: Option<MetricsServer>,
}

impl LiveTraderApp {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            metrics: None,
            metrics_server: None,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Build a trader against `exchange`, registering telemetry when the
    /// runtime section carries an API key.
    pub async fn build_trader(&mut self, exchange: SharedExchange) -> Result<LiveTrader> {
        let settings = &self.config.strategy;
        let strategy = build_strategy(&settings.kind, &settings.name, settings.params.clone())?;

        let mut trader = LiveTrader::new(self.config.trader.clone(), strategy, exchange)?
            .with_logger(StructuredLogger::new("live_trader"));

        if let Some(metrics) = self.start_metrics().await? {
            trader = trader.with_metrics(metrics);
        }

        if let Some(runtime) = self.config.runtime_config() {
            info!(runtime = %runtime.describe(), "Monitoring enabled");
            match TelemetryReporter::new(runtime, self.config.reporter.clone()) {
                Ok(reporter) => {
                    trader.attach_reporter(reporter).await;
                }
                Err(e) => warn!("Failed to create telemetry reporter, continuing without monitoring: {}", e),
            }
        } else {
            info!("Monitoring disabled");
        }

        Ok(trader)
    }

    /// Trade on the paper venue until stopped or `max_iterations` is reached.
    pub async fn run(&mut self, max_iterations: Option<u64>) -> Result<TradingSummary> {
        let exchange: SharedExchange = Arc::new(PaperExchange::from_config(&self.config.paper));
        let mut trader = self.build_trader(exchange).await?;

        let stop = trader.stop_handle();
        let signals = tokio::spawn(async move {
            wait_for_shutdown().await;
            stop.stop();
        });

        let result = trader.start(max_iterations).await;
        signals.abort();

        if let Some(report) = trader.shutdown().await {
            info!(
                completed = report.completed,
                cancelled = report.cancelled,
                failed = report.failed,
                "Telemetry drained"
            );
        }

        self.shutdown();

        let summary = result?;
        info!(
            iterations = summary.iterations,
            trades = summary.trades,
            final_position = summary.final_position,
            exit = %summary.exit,
            "Trading session finished"
        );
        Ok(summary)
    }

    pub fn shutdown(&mut self) {
        if let Some(mut server) = self.metrics_server.take() {
            server.stop();
        }
    }

    async fn start_metrics(&mut self) -> Result<Option<Arc<MetricsCollector>>> {
        if !self.config.metrics.enabled {
            return Ok(None);
        }
        if let Some(metrics) = &self.metrics {
            return Ok(Some(Arc::clone(metrics)));
        }

        let address: SocketAddr = self.config.metrics.address.parse().map_err(|_| {
            LiveTraderError::InvalidConfig(format!("Invalid metrics address: {}", self.config.metrics.address))
        })?;

        let metrics = Arc::new(MetricsCollector::new()?);
        let mut server = MetricsServer::new(address, Arc::clone(&metrics));
        server.start().await?;

        self.metrics = Some(Arc::clone(&metrics));
        self.metrics_server = Some(server);
        Ok(Some(metrics))
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.trader.check_interval_secs = 0;
        config.trader.warmup_samples = 3;
        config.paper.drift_per_tick = 0.001;
        config
    }

    #[tokio::test]
    async fn test_run_on_paper_venue() {
        let mut app = LiveTraderApp::new(fast_config()).unwrap();
        let summary = app.run(Some(8)).await.unwrap();

        assert_eq!(summary.iterations, 8);
        assert_eq!(summary.exit, LoopExit::MaxIterations);
        assert!(summary.last_price.is_some());
    }

    #[tokio::test]
    async fn test_unknown_strategy_fails_build() {
        let mut config = fast_config();
        config.strategy.kind = "grid".to_string();
        let mut app = LiveTraderApp::new(config).unwrap();

        let exchange: SharedExchange = Arc::new(PaperExchange::scripted(vec![100.0]));
        assert!(app.build_trader(exchange).await.is_err());
    }

    #[tokio::test]
    async fn test_metrics_server_started_when_enabled() {
        let mut config = fast_config();
        config.metrics.enabled = true;
        config.metrics.address = "127.0.0.1:0".to_string();
        let mut app = LiveTraderApp::new(config).unwrap();

        let exchange: SharedExchange = Arc::new(PaperExchange::scripted(vec![100.0, 101.0, 102.0]));
        let mut trader = app.build_trader(exchange).await.unwrap();
        trader.start(Some(3)).await.unwrap();

        let metrics = app.metrics.clone().unwrap();
        assert!(metrics.gather_metrics().unwrap().contains("livetrader_iterations_total 3"));
        app.shutdown();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = fast_config();
        config.trader.max_position_size = 0.0;
        assert!(LiveTraderApp::new(config).is_err());
    }
}
