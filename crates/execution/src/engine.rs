use serde::Serialize;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use livetrader_core::prelude::*;
use livetrader_exchange::prelude::{Exchange, ResponseNormalizer, SharedExchange};
use livetrader_monitoring::{MetricsCollector, RuntimeStatus, ShutdownReport, StructuredLogger, TelemetryReporter};
use livetrader_strategy::Strategy;

use crate::history::PriceHistory;
use crate::reconciler::{PositionReconciler, Rebalance};
use crate::risk::RiskGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraderState {
    Stopped,
    Running,
}

/// Why the loop returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LoopExit {
    MaxIterations,
    StopRequested,
    Fatal(String),
}

impl LoopExit {
    pub fn is_error(&self) -> bool {
        matches!(self, LoopExit::Fatal(_))
    }
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopExit::MaxIterations => write!(f, "max iterations reached"),
            LoopExit::StopRequested => write!(f, "stop requested"),
            LoopExit::Fatal(e) => write!(f, "fatal error: {}", e),
        }
    }
}

/// What a single iteration did.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// No usable price this time.
    NoPrice,
    WarmingUp { samples: usize, required: usize },
    Evaluated {
        price: f64,
        signal: Signal,
        target: f64,
        reason: ExitReason,
        order_id: Option<String>,
        traded: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradingSummary {
    pub iterations: u64,
    pub trades: u64,
    pub final_position: f64,
    pub entry_price: f64,
    pub last_price: Option<f64>,
    pub exit: LoopExit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraderStatus {
    pub state: TraderState,
    pub strategy: String,
    pub market: String,
    pub position: f64,
    pub entry_price: f64,
    pub trades: u64,
    pub iterations: u64,
    pub history_len: usize,
    pub last_price: Option<f64>,
    pub monitoring_enabled: bool,
}

/// Requests a cooperative stop from any task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Single-market trading loop.
///
/// Each iteration reads the price, asks the strategy for a signal, syncs the
/// position from the exchange, applies the risk guard, places at most one
/// reconciling market order and emits telemetry. The loop ends on a stop
/// request, after `max_iterations`, or on a fatal error.
pub struct LiveTrader {
    config: TraderConfig,
    strategy: Box<dyn Strategy>,
    exchange: SharedExchange,
    normalizer: ResponseNormalizer,
    history: PriceHistory,
    position: PositionState,
    risk: RiskGuard,
    reconciler: PositionReconciler,
    reporter: Option<TelemetryReporter>,
    metrics: Option<Arc<MetricsCollector>>,
    logger: StructuredLogger,
    state: TraderState,
    stop_tx: Arc<watch::Sender<bool>>,
    #[cfg(unix)]
    interrupt_signal: tokio::signal::unix::SignalKind,
    iterations: u64,
    last_price: Option<f64>,
    last_signal: Signal,
}

impl LiveTrader {
    pub fn new(config: TraderConfig, strategy: Box<dyn Strategy>, exchange: SharedExchange) -> Result<Self> {
        config.validate()?;

        let (stop_tx, _) = watch::channel(false);

        Ok(Self {
            history: PriceHistory::new(config.history_length, config.warmup_samples),
            risk: RiskGuard::from_config(&config),
            reconciler: PositionReconciler::from_config(&config),
            config,
            strategy,
            exchange,
            normalizer: ResponseNormalizer::new(),
            position: PositionState::new(),
            reporter: None,
            metrics: None,
            logger: StructuredLogger::new("live_trader"),
            state: TraderState::Stopped,
            stop_tx: Arc::new(stop_tx),
            #[cfg(unix)]
            interrupt_signal: tokio::signal::unix::SignalKind::interrupt(),
            iterations: 0,
            last_price: None,
            last_signal: Signal::Hold,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Register `reporter` with the monitoring backend and keep it on success.
    pub async fn attach_reporter(&mut self, reporter: TelemetryReporter) -> bool {
        let created = reporter
            .create_runtime(
                &self.config.market,
                self.config.initial_capital,
                self.config.max_position_size,
            )
            .await;

        if created {
            self.reporter = Some(reporter);
        } else {
            self.logger.log_warning(
                "Monitoring registration failed, continuing without telemetry",
                Some(&self.config.market),
            );
        }
        created
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.stop_tx),
        }
    }

    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn state(&self) -> TraderState {
        self.state
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    pub fn config(&self) -> &TraderConfig {
        &self.config
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    pub fn status(&self) -> TraderStatus {
        TraderStatus {
            state: self.state,
            strategy: self.strategy.name().to_string(),
            market: self.config.market.clone(),
            position: self.position.size,
            entry_price: self.position.entry_price,
            trades: self.position.trades_count,
            iterations: self.iterations,
            history_len: self.history.len(),
            last_price: self.last_price,
            monitoring_enabled: self.reporter.is_some(),
        }
    }

    /// Run the loop until stopped, `max_iterations` is reached, or a fatal
    /// error occurs.
    pub async fn start(&mut self, max_iterations: Option<u64>) -> Result<TradingSummary> {
        if self.state == TraderState::Running {
            return Err(LiveTraderError::Execution("Trader is already running".to_string()));
        }

        self.ensure_initialized()?;

        self.state = TraderState::Running;
        let interrupt = self.spawn_interrupt_listener();
        self.logger.log_system_event(
            "trading_started",
            &json!({
                "strategy": self.strategy.name(),
                "market": self.config.market,
                "exchange": self.exchange.name(),
                "initial_capital": self.config.initial_capital,
                "max_position_size": self.config.max_position_size,
                "check_interval_secs": self.config.check_interval_secs,
                "stop_loss": self.config.stop_loss,
                "take_profit": self.config.take_profit,
                "max_iterations": max_iterations,
            }),
        );

        let reached = |iterations: u64| max_iterations.map_or(false, |max| iterations >= max);

        let exit = loop {
            if *self.stop_tx.borrow() {
                break LoopExit::StopRequested;
            }
            if reached(self.iterations) {
                break LoopExit::MaxIterations;
            }

            self.iterations += 1;
            let started = Instant::now();

            match self.run_iteration().await {
                Ok(outcome) => debug!(iteration = self.iterations, outcome = ?outcome, "Iteration complete"),
                Err(e) if e.is_fatal() => {
                    error!(
                        market = %self.config.market,
                        price = ?self.last_price,
                        signal = %self.last_signal,
                        position = self.position.size,
                        error = %e,
                        "Fatal error, stopping trading loop"
                    );
                    break LoopExit::Fatal(e.to_string());
                }
                Err(e) => {
                    error!(
                        market = %self.config.market,
                        price = ?self.last_price,
                        signal = %self.last_signal,
                        position = self.position.size,
                        error = %e,
                        "Iteration failed"
                    );
                }
            }

            if let Some(metrics) = &self.metrics {
                metrics.record_iteration(started.elapsed().as_secs_f64());
            }

            if reached(self.iterations) {
                break LoopExit::MaxIterations;
            }

            self.wait_for_next_iteration().await;
        };

        if let Some(interrupt) = interrupt {
            interrupt.abort();
        }
        self.state = TraderState::Stopped;
        self.stop_tx.send_replace(false);

        let status = if exit.is_error() {
            RuntimeStatus::Error
        } else {
            RuntimeStatus::Stopped
        };
        if let Some(reporter) = &self.reporter {
            let mut extra = Map::new();
            extra.insert("total_trades".to_string(), json!(self.position.trades_count));
            extra.insert("final_position".to_string(), json!(self.position.size));
            extra.insert("iterations".to_string(), json!(self.iterations));
            if let LoopExit::Fatal(message) = &exit {
                extra.insert("error".to_string(), json!(message));
            }
            reporter.update_runtime_status(status, Some(extra));
        }

        let summary = TradingSummary {
            iterations: self.iterations,
            trades: self.position.trades_count,
            final_position: self.position.size,
            entry_price: self.position.entry_price,
            last_price: self.last_price,
            exit,
        };

        self.logger.log_system_event(
            "trading_stopped",
            &serde_json::to_value(&summary).unwrap_or(Value::Null),
        );

        Ok(summary)
    }

    /// Drain outstanding telemetry and release the trader.
    pub async fn shutdown(self) -> Option<ShutdownReport> {
        let reporter = self.reporter?;
        let report = reporter.close().await;
        info!(
            completed = report.completed,
            cancelled = report.cancelled,
            stats = ?report.stats,
            "Trader shut down"
        );
        Some(report)
    }

    /// One pass of the trading loop.
    pub async fn run_iteration(&mut self) -> Result<IterationOutcome> {
        self.ensure_initialized()?;
        let market = self.config.market.clone();

        let ticker = match self.exchange.get_ticker(&market).await {
            Ok(ticker) => ticker,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(market = %market, error = %e, "Failed to fetch ticker, skipping iteration");
                self.record_exchange_error("get_ticker");
                return Ok(IterationOutcome::NoPrice);
            }
        };

        let price = match self.normalizer.last_price(&ticker) {
            Some(price) => price,
            None => {
                warn!(market = %market, ticker = %ticker, "Ticker has no usable last_price, skipping iteration");
                return Ok(IterationOutcome::NoPrice);
            }
        };

        self.last_price = Some(price);
        self.history.update(price);
        if let Some(metrics) = &self.metrics {
            metrics.update_price(price);
        }

        if !self.history.is_warm() {
            info!(
                market = %market,
                price = price,
                "Warming up price history ({}/{})",
                self.history.len(),
                self.history.warmup()
            );
            return Ok(IterationOutcome::WarmingUp {
                samples: self.history.len(),
                required: self.history.warmup(),
            });
        }

        let signal = self.evaluate_signal();
        self.last_signal = signal;

        self.sync_position(&market, price).await?;

        let (target, reason) = match self.risk.check(&self.position, price) {
            Some(reason) => {
                self.logger.log_risk_event(
                    reason.as_str(),
                    Some(&market),
                    &format!(
                        "entry={} price={} size={}",
                        self.position.entry_price, price, self.position.size
                    ),
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_risk_exit(reason);
                }
                (0.0, reason)
            }
            None => (self.evaluate_target(signal), ExitReason::Signal),
        };

        self.logger.log_signal(&market, price, signal, self.position.size);
        if let Some(metrics) = &self.metrics {
            metrics.record_signal(signal);
        }

        let mut order_id = None;
        let mut traded = false;
        match self.reconciler.plan(target, self.position.size, price) {
            Rebalance::InSync => {}
            Rebalance::Rejected { .. } => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_order_rejected();
                }
            }
            Rebalance::Order(intent) => {
                if let Some(id) = self.execute(&market, intent, target, price, reason).await? {
                    order_id = Some(id);
                    traded = true;
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.update_position(self.position.size);
        }

        if let Some(reporter) = &self.reporter {
            let mut extra = Map::new();
            extra.insert("position".to_string(), json!(self.position.size));
            extra.insert("target_position".to_string(), json!(target));
            reporter.report_signal(&market, signal, price, Some(extra));
        }

        Ok(IterationOutcome::Evaluated {
            price,
            signal,
            target,
            reason,
            order_id,
            traded,
        })
    }

    /// Place the order for `intent`; returns the order id once confirmed.
    async fn execute(
        &mut self,
        market: &str,
        intent: OrderIntent,
        target: f64,
        price: f64,
        reason: ExitReason,
    ) -> Result<Option<String>> {
        let request = OrderRequest::from_intent(market, &intent)?;

        let response = match self.exchange.place_order(&request).await {
            Ok(response) => response,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.logger.log_error(
                    &e.to_string(),
                    Some(&format!("{} {} {} @ {}", intent.side, request.size, market, price)),
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_order_failure();
                }
                return Ok(None);
            }
        };

        let ack = self.normalizer.order_ack(&response);
        let order_id = ack.order_id.unwrap_or_else(|| "unknown".to_string());

        let previous = self.position.size;
        self.position.apply_fill(previous, target, price);

        self.logger.log_order(market, intent.side, intent.size, price, &order_id);
        self.logger.log_trade(market, intent.side, intent.size, price, reason);
        if let Some(metrics) = &self.metrics {
            metrics.record_order(intent.side);
        }

        if let Some(reporter) = &self.reporter {
            let mut extra = Map::new();
            extra.insert("reason".to_string(), json!(reason.as_str()));
            extra.insert("target_position".to_string(), json!(target));
            reporter.report_trade(market, intent.side, intent.size, price, Some(&order_id), Some(extra));
            reporter.report_position(
                market,
                self.position.size,
                self.position.entry_price,
                price,
                None,
            );
        }

        Ok(Some(order_id))
    }

    async fn sync_position(&mut self, market: &str, price: f64) -> Result<()> {
        let size = match self.exchange.get_positions(market).await {
            Ok(response) => match self.normalizer.position_size(&response) {
                Ok(size) => size,
                Err(e) => {
                    warn!(market = %market, error = %e, "Unreadable positions response, keeping last known position");
                    return Ok(());
                }
            },
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(market = %market, error = %e, "Failed to fetch positions, keeping last known position");
                self.record_exchange_error("get_positions");
                return Ok(());
            }
        };

        if self.position.sync_size(size, price) {
            self.logger.log_warning(
                "Exchange reports a position with no known entry, using current price as entry",
                Some(&format!("{} size={} price={}", market, size, price)),
            );
        }
        Ok(())
    }

    fn evaluate_signal(&self) -> Signal {
        let strategy = &self.strategy;
        let prices = self.history.as_slice();

        match panic::catch_unwind(AssertUnwindSafe(|| strategy.generate_signals(prices))) {
            Ok(Ok(signals)) => signals.last().copied().unwrap_or(Signal::Hold),
            Ok(Err(e)) => {
                self.strategy_failure("generate_signals", &e.to_string());
                Signal::Hold
            }
            Err(payload) => {
                self.strategy_failure("generate_signals", &panic_message(payload.as_ref()));
                Signal::Hold
            }
        }
    }

    /// Strategy target clamped into `[0, max_position_size]`; any failure
    /// keeps the current position.
    fn evaluate_target(&self, signal: Signal) -> f64 {
        let strategy = &self.strategy;
        let current = self.position.size;

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            strategy.calculate_target_position(signal, current)
        }));

        match result {
            Ok(Ok(target)) if target.is_finite() => target.clamp(0.0, self.config.max_position_size),
            Ok(Ok(target)) => {
                self.strategy_failure("calculate_target_position", &format!("non-finite target {}", target));
                current
            }
            Ok(Err(e)) => {
                self.strategy_failure("calculate_target_position", &e.to_string());
                current
            }
            Err(payload) => {
                self.strategy_failure("calculate_target_position", &panic_message(payload.as_ref()));
                current
            }
        }
    }

    fn strategy_failure(&self, operation: &str, message: &str) {
        self.logger.log_error(
            message,
            Some(&format!("strategy {} {}", self.strategy.name(), operation)),
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_strategy_error();
        }
    }

    fn record_exchange_error(&self, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_exchange_error(operation);
        }
    }

    fn ensure_initialized(&mut self) -> Result<()> {
        if !self.strategy.is_initialized() {
            self.strategy.initialize()?;
        }
        Ok(())
    }

    /// Relay the interrupt signal into the stop flag for the whole run.
    #[cfg(unix)]
    fn spawn_interrupt_listener(&self) -> Option<JoinHandle<()>> {
        use tokio::signal::unix::signal;

        // Must be registered before the first iteration starts.
        let mut stream = match signal(self.interrupt_signal) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to install interrupt handler: {}", e);
                return None;
            }
        };
        let tx = Arc::clone(&self.stop_tx);
        Some(tokio::spawn(async move {
            if stream.recv().await.is_some() {
                info!("Received interrupt, stopping after the current iteration");
                tx.send_replace(true);
            }
        }))
    }

    #[cfg(not(unix))]
    fn spawn_interrupt_listener(&self) -> Option<JoinHandle<()>> {
        let tx = Arc::clone(&self.stop_tx);
        Some(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received interrupt, stopping after the current iteration");
                tx.send_replace(true);
            }
        }))
    }

    /// Sleep for the check interval unless a stop is requested.
    async fn wait_for_next_iteration(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow() {
            return;
        }

        tokio::select! {
            _ = sleep(self.config.check_interval()) => {}
            _ = stop_rx.changed() => {
                info!("Stop requested, interrupting sleep");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("strategy panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("strategy panicked: {}", message)
    } else {
        "strategy panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use livetrader_exchange::PaperExchange;
    use livetrader_strategy::prelude::{StrategyBase, StrategyParams, TrendFollowing};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    fn config() -> TraderConfig {
        TraderConfig {
            market: "BTC-PERP".to_string(),
            initial_capital: 10_000.0,
            max_position_size: 0.5,
            check_interval_secs: 0,
            stop_loss: Some(0.05),
            take_profit: Some(0.10),
            history_length: 100,
            warmup_samples: 10,
            rebalance_epsilon: 0.001,
        }
    }

    fn trend() -> Box<dyn Strategy> {
        Box::new(TrendFollowing::new("Trend", StrategyParams::new()).unwrap())
    }

    fn rising(count: usize) -> Vec<f64> {
        (0..count).map(|i| 100.0 + i as f64).collect()
    }

    /// Fixed signal and target, or a failure mode.
    struct FixedStrategy {
        base: StrategyBase,
        signal: Signal,
        target: f64,
        fail: bool,
        panic: bool,
    }

    impl FixedStrategy {
        fn new(signal: Signal, target: f64) -> Self {
            Self {
                base: StrategyBase::new("Fixed", StrategyParams::new()),
                signal,
                target,
                fail: false,
                panic: false,
            }
        }
    }

    impl Strategy for FixedStrategy {
        fn base(&self) -> &StrategyBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut StrategyBase {
            &mut self.base
        }

        fn generate_signals(&self, prices: &[f64]) -> Result<Vec<Signal>> {
            if self.panic {
                panic!("boom");
            }
            if self.fail {
                return Err(LiveTraderError::Strategy("model unavailable".to_string()));
            }
            Ok(vec![self.signal; prices.len()])
        }

        fn calculate_target_position(&self, signal: Signal, current: f64) -> Result<f64> {
            if self.fail {
                return Err(LiveTraderError::Strategy("model unavailable".to_string()));
            }
            match signal {
                Signal::Hold => Ok(current),
                _ => Ok(self.target),
            }
        }
    }

    /// Wraps a paper venue and injects failures.
    struct FlakyExchange {
        inner: PaperExchange,
        ticker_failures: Mutex<VecDeque<LiveTraderError>>,
        position_failures: Mutex<u32>,
        order_failures: Mutex<u32>,
        reported_positions: Mutex<Option<Value>>,
        ticker_delay: Mutex<Duration>,
    }

    impl FlakyExchange {
        fn new(prices: Vec<f64>) -> Self {
            Self {
                inner: PaperExchange::scripted(prices),
                ticker_failures: Mutex::new(VecDeque::new()),
                position_failures: Mutex::new(0),
                order_failures: Mutex::new(0),
                reported_positions: Mutex::new(None),
                ticker_delay: Mutex::new(Duration::ZERO),
            }
        }
    }

    #[async_trait]
    impl Exchange for FlakyExchange {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn get_ticker(&self, market: &str) -> Result<Value> {
            if let Some(e) = self.ticker_failures.lock().pop_front() {
                return Err(e);
            }
            let delay = *self.ticker_delay.lock();
            if !delay.is_zero() {
                sleep(delay).await;
            }
            self.inner.get_ticker(market).await
        }

        async fn get_positions(&self, market: &str) -> Result<Value> {
            {
                let mut failures = self.position_failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(LiveTraderError::Timeout("positions".to_string()));
                }
            }
            if let Some(payload) = self.reported_positions.lock().clone() {
                return Ok(payload);
            }
            self.inner.get_positions(market).await
        }

        async fn place_order(&self, request: &OrderRequest) -> Result<Value> {
            {
                let mut failures = self.order_failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(LiveTraderError::Exchange("insufficient margin".to_string()));
                }
            }
            self.inner.place_order(request).await
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let exchange: SharedExchange = Arc::new(PaperExchange::scripted(rising(5)));
        let bad = TraderConfig {
            initial_capital: -1.0,
            ..config()
        };
        assert!(LiveTrader::new(bad, trend(), Arc::clone(&exchange)).is_err());

        let bad = TraderConfig {
            max_position_size: 1.5,
            ..config()
        };
        assert!(LiveTrader::new(bad, trend(), exchange).is_err());
    }

    #[tokio::test]
    async fn test_warmup_then_buy_on_rising_prices() {
        let exchange = Arc::new(PaperExchange::scripted(rising(13)));
        let mut trader = LiveTrader::new(config(), trend(), exchange.clone()).unwrap();

        for i in 1..10 {
            let outcome = trader.run_iteration().await.unwrap();
            assert_eq!(outcome, IterationOutcome::WarmingUp { samples: i, required: 10 });
        }

        match trader.run_iteration().await.unwrap() {
            IterationOutcome::Evaluated { price, signal, target, traded, .. } => {
                assert_eq!(price, 109.0);
                assert_eq!(signal, Signal::Buy);
                assert_eq!(target, 0.5);
                assert!(traded);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(trader.position().size, 0.5);
        assert_eq!(trader.position().entry_price, 109.0);
        assert_eq!(trader.position().trades_count, 1);
        assert_eq!(exchange.position("BTC-PERP"), 0.5);

        // Already at target: no further orders.
        for _ in 0..3 {
            trader.run_iteration().await.unwrap();
        }
        assert_eq!(exchange.fills().len(), 1);
        assert_eq!(trader.position().entry_price, 109.0);
    }

    #[tokio::test]
    async fn test_start_runs_max_iterations() {
        let exchange = Arc::new(PaperExchange::scripted(rising(13)));
        let mut trader = LiveTrader::new(config(), trend(), exchange).unwrap();

        let summary = trader.start(Some(13)).await.unwrap();
        assert_eq!(summary.exit, LoopExit::MaxIterations);
        assert_eq!(summary.iterations, 13);
        assert_eq!(summary.trades, 1);
        assert_eq!(summary.final_position, 0.5);
        assert_eq!(summary.last_price, Some(112.0));
        assert_eq!(trader.state(), TraderState::Stopped);

        let status = trader.status();
        assert_eq!(status.strategy, "Trend");
        assert_eq!(status.history_len, 13);
        assert!(!status.monitoring_enabled);
    }

    #[tokio::test]
    async fn test_stop_loss_closes_position() {
        let mut prices = vec![100.0; 10];
        prices.push(94.0);
        let exchange = Arc::new(PaperExchange::scripted(prices).with_position("BTC-PERP", 0.5));
        let mut trader =
            LiveTrader::new(config(), Box::new(FixedStrategy::new(Signal::Buy, 0.5)), exchange.clone()).unwrap();

        // First evaluated iteration adopts 100 as the entry price.
        for _ in 0..10 {
            trader.run_iteration().await.unwrap();
        }
        assert_eq!(trader.position().entry_price, 100.0);
        assert_eq!(exchange.fills().len(), 0);

        match trader.run_iteration().await.unwrap() {
            IterationOutcome::Evaluated { target, reason, traded, .. } => {
                assert_eq!(target, 0.0);
                assert_eq!(reason, ExitReason::StopLoss);
                assert!(traded);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(trader.position().is_flat());
        assert_eq!(trader.position().entry_price, 0.0);
        assert_eq!(exchange.fills()[0].side, OrderSide::Sell);
    }

    #[tokio::test]
    async fn test_strategy_errors_and_panics_hold() {
        let exchange = Arc::new(PaperExchange::scripted(rising(12)));
        let mut failing = FixedStrategy::new(Signal::Buy, 0.5);
        failing.fail = true;
        let mut trader = LiveTrader::new(config(), Box::new(failing), exchange.clone()).unwrap();

        let summary = trader.start(Some(12)).await.unwrap();
        assert_eq!(summary.exit, LoopExit::MaxIterations);
        assert_eq!(summary.trades, 0);
        assert!(exchange.fills().is_empty());

        let exchange = Arc::new(PaperExchange::scripted(rising(12)));
        let mut panicking = FixedStrategy::new(Signal::Buy, 0.5);
        panicking.panic = true;
        let mut trader = LiveTrader::new(config(), Box::new(panicking), exchange.clone()).unwrap();

        let summary = trader.start(Some(12)).await.unwrap();
        assert_eq!(summary.iterations, 12);
        assert_eq!(summary.trades, 0);
        assert_eq!(trader.status().history_len, 12);
    }

    #[tokio::test]
    async fn test_target_is_clamped_and_nan_rejected() {
        let exchange = Arc::new(PaperExchange::scripted(vec![100.0; 12]));
        let mut trader = LiveTrader::new(
            config(),
            Box::new(FixedStrategy::new(Signal::Buy, 3.0)),
            exchange.clone(),
        )
        .unwrap();
        trader.start(Some(10)).await.unwrap();
        assert_eq!(trader.position().size, 0.5);

        let exchange = Arc::new(PaperExchange::scripted(vec![100.0; 12]));
        let mut trader = LiveTrader::new(
            config(),
            Box::new(FixedStrategy::new(Signal::Buy, f64::NAN)),
            exchange.clone(),
        )
        .unwrap();
        trader.start(Some(10)).await.unwrap();
        assert!(trader.position().is_flat());
        assert!(exchange.fills().is_empty());
    }

    #[tokio::test]
    async fn test_notional_cap_blocks_order() {
        let exchange = Arc::new(PaperExchange::scripted(vec![20_000.0; 10]));
        let mut trader = LiveTrader::new(
            config(),
            Box::new(FixedStrategy::new(Signal::Buy, 0.5)),
            exchange.clone(),
        )
        .unwrap();

        let summary = trader.start(Some(10)).await.unwrap();
        assert_eq!(summary.trades, 0);
        assert!(exchange.fills().is_empty());
        assert!(trader.position().is_flat());
    }

    #[tokio::test]
    async fn test_exchange_failures_skip_or_keep_state() {
        let exchange = Arc::new(FlakyExchange::new(rising(20)));
        exchange
            .ticker_failures
            .lock()
            .push_back(LiveTraderError::Timeout("ticker".to_string()));
        let mut trader = LiveTrader::new(config(), trend(), exchange.clone()).unwrap();

        assert_eq!(trader.run_iteration().await.unwrap(), IterationOutcome::NoPrice);
        assert_eq!(trader.history().len(), 0);

        for _ in 0..9 {
            trader.run_iteration().await.unwrap();
        }

        // Order rejected by the venue: state unchanged.
        *exchange.order_failures.lock() = 1;
        match trader.run_iteration().await.unwrap() {
            IterationOutcome::Evaluated { traded, order_id, .. } => {
                assert!(!traded);
                assert!(order_id.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(trader.position().is_flat());
        assert_eq!(trader.position().trades_count, 0);

        trader.run_iteration().await.unwrap();
        assert_eq!(trader.position().size, 0.5);

        // Position read fails: last known size is kept.
        *exchange.position_failures.lock() = 1;
        trader.run_iteration().await.unwrap();
        assert_eq!(trader.position().size, 0.5);

        // Exchange reports flat: entry is cleared, then the strategy buys back.
        *exchange.reported_positions.lock() = Some(json!({"data": [{"size": 0.0}]}));
        trader.run_iteration().await.unwrap();
        assert_eq!(trader.position().trades_count, 2);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_loop() {
        let exchange = Arc::new(FlakyExchange::new(rising(20)));
        {
            let mut failures = exchange.ticker_failures.lock();
            failures.push_back(LiveTraderError::Timeout("ticker".to_string()));
            failures.push_back(LiveTraderError::Authentication("invalid api key".to_string()));
        }
        let mut trader = LiveTrader::new(config(), trend(), exchange).unwrap();

        let summary = trader.start(Some(50)).await.unwrap();
        assert!(summary.exit.is_error());
        assert_eq!(summary.iterations, 2);
        assert_eq!(trader.state(), TraderState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_handle_interrupts_sleep() {
        let exchange = Arc::new(PaperExchange::scripted(rising(5)));
        let config = TraderConfig {
            check_interval_secs: 60,
            ..config()
        };
        let mut trader = LiveTrader::new(config, trend(), exchange).unwrap();
        let stop = trader.stop_handle();
        let started = Instant::now();

        let task = tokio::spawn(async move {
            let summary = trader.start(None).await;
            (trader, summary)
        });

        sleep(Duration::from_secs(150)).await;
        stop.stop();

        let (trader, summary) = task.await.unwrap();
        let summary = summary.unwrap();
        assert_eq!(summary.exit, LoopExit::StopRequested);
        assert_eq!(summary.iterations, 3);
        assert!(started.elapsed() < Duration::from_secs(180));
        assert!(!stop.is_stop_requested());
        assert_eq!(trader.state(), TraderState::Stopped);
    }

    #[tokio::test]
    async fn test_take_profit_closes_position() {
        let mut prices = vec![100.0; 10];
        prices.push(111.0);
        let exchange = Arc::new(PaperExchange::scripted(prices));
        let mut trader =
            LiveTrader::new(config(), Box::new(FixedStrategy::new(Signal::Buy, 0.5)), exchange.clone()).unwrap();

        for _ in 0..10 {
            trader.run_iteration().await.unwrap();
        }
        assert_eq!(trader.position().size, 0.5);
        assert_eq!(trader.position().entry_price, 100.0);

        match trader.run_iteration().await.unwrap() {
            IterationOutcome::Evaluated { price, target, reason, traded, .. } => {
                assert_eq!(price, 111.0);
                assert_eq!(target, 0.0);
                assert_eq!(reason, ExitReason::TakeProfit);
                assert!(traded);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let fills = exchange.fills();
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].side, OrderSide::Buy);
        assert_eq!(fills[1].side, OrderSide::Sell);
        assert!(trader.position().is_flat());
        assert_eq!(trader.position().entry_price, 0.0);
        assert_eq!(trader.position().trades_count, 2);
        assert_eq!(exchange.position("BTC-PERP"), 0.0);
    }

    #[tokio::test]
    async fn test_empty_position_payload_means_flat() {
        let exchange = Arc::new(FlakyExchange::new(vec![100.0; 20]));
        let mut trader =
            LiveTrader::new(config(), Box::new(FixedStrategy::new(Signal::Hold, 0.5)), exchange.clone()).unwrap();
        *exchange.reported_positions.lock() = Some(json!({"data": [{"size": 0.3}]}));

        for _ in 0..10 {
            trader.run_iteration().await.unwrap();
        }
        assert_eq!(trader.position().size, 0.3);
        assert_eq!(trader.position().entry_price, 100.0);

        *exchange.reported_positions.lock() = Some(json!({"data": null}));
        trader.run_iteration().await.unwrap();
        assert!(trader.position().is_flat());
        assert_eq!(trader.position().entry_price, 0.0);

        *exchange.reported_positions.lock() = Some(json!({"data": [{"size": 0.3}]}));
        trader.run_iteration().await.unwrap();
        assert_eq!(trader.position().size, 0.3);

        *exchange.reported_positions.lock() = Some(json!({}));
        trader.run_iteration().await.unwrap();
        assert!(trader.position().is_flat());
        assert!(exchange.inner.fills().is_empty());
    }

    #[tokio::test]
    async fn test_run_iteration_initializes_strategy() {
        let exchange = Arc::new(PaperExchange::scripted(rising(3)));
        let mut trader = LiveTrader::new(config(), trend(), exchange).unwrap();
        assert!(!trader.strategy().is_initialized());

        trader.run_iteration().await.unwrap();
        assert!(trader.strategy().is_initialized());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupt_during_iteration_stops_loop() {
        let exchange = Arc::new(FlakyExchange::new(rising(10)));
        *exchange.ticker_delay.lock() = Duration::from_millis(500);
        let config = TraderConfig {
            check_interval_secs: 1,
            ..config()
        };
        let mut trader = LiveTrader::new(config, trend(), exchange).unwrap();
        // A signal no other test listens for, delivered to this process.
        trader.interrupt_signal = tokio::signal::unix::SignalKind::user_defined1();

        let task = tokio::spawn(async move {
            let summary = trader.start(Some(4)).await;
            (trader, summary)
        });

        // Lands while the second iteration is fetching the ticker.
        sleep(Duration::from_millis(1750)).await;
        let status = std::process::Command::new("kill")
            .args(["-USR1", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let (trader, summary) = task.await.unwrap();
        let summary = summary.unwrap();
        assert_eq!(summary.exit, LoopExit::StopRequested);
        assert_eq!(summary.iterations, 2);
        assert_eq!(trader.state(), TraderState::Stopped);
        assert!(!trader.stop_handle().is_stop_requested());
    }

    #[tokio::test]
    async fn test_shutdown_without_reporter() {
        let exchange = Arc::new(PaperExchange::scripted(rising(3)));
        let trader = LiveTrader::new(config(), trend(), exchange).unwrap();
        assert!(trader.shutdown().await.is_none());
    }
}
