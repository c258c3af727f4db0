use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use livetrader_core::config::{ReporterConfig, RuntimeConfig};
use livetrader_core::prelude::*;
use livetrader_core::utils::now_iso8601;

use crate::retry::RetryPolicy;
use crate::sink::{HttpSink, SharedSink, TelemetryError};

const RUNTIMES_PATH: &str = "/api/v1/runtimes";

/// Kinds of fire-and-forget telemetry events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Signal,
    Trade,
    Position,
    Status,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Signal => "signal",
            EventKind::Trade => "trade",
            EventKind::Position => "position",
            EventKind::Status => "status",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    Running,
    Stopped,
    Error,
}

impl RuntimeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeStatus::Running => "running",
            RuntimeStatus::Stopped => "stopped",
            RuntimeStatus::Error => "error",
        }
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery counters, updated by reporter tasks.
#[derive(Debug, Default)]
pub struct ReporterStats {
    signals_sent: AtomicU64,
    signals_failed: AtomicU64,
    trades_sent: AtomicU64,
    trades_failed: AtomicU64,
    positions_sent: AtomicU64,
    positions_failed: AtomicU64,
    status_sent: AtomicU64,
    status_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub signals_sent: u64,
    pub signals_failed: u64,
    pub trades_sent: u64,
    pub trades_failed: u64,
    pub positions_sent: u64,
    pub positions_failed: u64,
    pub status_sent: u64,
    pub status_failed: u64,
}

impl ReporterStats {
    pub fn record(&self, kind: EventKind, delivered: bool) {
        let counter = match (kind, delivered) {
            (EventKind::Signal, true) => &self.signals_sent,
            (EventKind::Signal, false) => &self.signals_failed,
            (EventKind::Trade, true) => &self.trades_sent,
            (EventKind::Trade, false) => &self.trades_failed,
            (EventKind::Position, true) => &self.positions_sent,
            (EventKind::Position, false) => &self.positions_failed,
            (EventKind::Status, true) => &self.status_sent,
            (EventKind::Status, false) => &self.status_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            signals_sent: self.signals_sent.load(Ordering::Relaxed),
            signals_failed: self.signals_failed.load(Ordering::Relaxed),
            trades_sent: self.trades_sent.load(Ordering::Relaxed),
            trades_failed: self.trades_failed.load(Ordering::Relaxed),
            positions_sent: self.positions_sent.load(Ordering::Relaxed),
            positions_failed: self.positions_failed.load(Ordering::Relaxed),
            status_sent: self.status_sent.load(Ordering::Relaxed),
            status_failed: self.status_failed.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of draining the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Tasks that ran to completion, delivered or not.
    pub completed: usize,
    /// Tasks still running at the deadline and aborted.
    pub cancelled: usize,
    /// Tasks that panicked.
    pub failed: usize,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone, Copy)]
enum Verb {
    Post,
    Patch,
}

/// Asynchronous sender of runtime telemetry.
///
/// Every `report_*` call returns immediately; delivery happens on a spawned
/// task gated by a fixed number of worker permits. Nothing is sent before
/// [`TelemetryReporter::create_runtime`] has succeeded.
pub struct TelemetryReporter {
    config: RuntimeConfig,
    settings: ReporterConfig,
    sink: SharedSink,
    retry: RetryPolicy,
    workers: Arc<Semaphore>,
    pending: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<ReporterStats>,
    runtime_created: AtomicBool,
    closed: AtomicBool,
}

impl TelemetryReporter {
    /// Reporter posting to `config.api_base_url` over HTTP.
    pub fn new(config: RuntimeConfig, settings: ReporterConfig) -> std::result::Result<Self, TelemetryError> {
        let sink = HttpSink::new(&config, settings.request_timeout())?;
        Ok(Self::with_sink(config, settings, Arc::new(sink)))
    }

    pub fn with_sink(config: RuntimeConfig, settings: ReporterConfig, sink: SharedSink) -> Self {
        let workers = Arc::new(Semaphore::new(settings.workers.max(1)));
        let retry = RetryPolicy::from_config(&settings);

        Self {
            config,
            settings,
            sink,
            retry,
            workers,
            pending: Mutex::new(Vec::new()),
            stats: Arc::new(ReporterStats::default()),
            runtime_created: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn runtime_id(&self) -> &str {
        &self.config.runtime_id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn is_runtime_created(&self) -> bool {
        self.runtime_created.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn pending_tasks(&self) -> usize {
        self.pending.lock().len()
    }

    /// Register this session with the monitoring backend.
    ///
    /// Returns `true` once the runtime exists; failures are logged and
    /// reported as `false` so the caller can continue without monitoring.
    pub async fn create_runtime(&self, market: &str, initial_capital: f64, max_position_size: f64) -> bool {
        if self.is_runtime_created() {
            return true;
        }

        let mut body = json!({
            "runtime_id": self.config.runtime_id,
            "strategy_id": self.config.strategy_id,
            "market": market,
            "initial_capital": initial_capital,
            "max_position_size": max_position_size,
            "environment": self.config.environment,
            "sdk_version": self.config.sdk_version,
            "status": RuntimeStatus::Running.as_str(),
            "start_time": now_iso8601(),
        });
        if let (Some(metadata), Some(map)) = (&self.config.metadata, body.as_object_mut()) {
            map.insert("metadata".to_string(), Value::Object(metadata.clone()));
        }

        let sink = &self.sink;
        let body = &body;
        let result = self
            .retry
            .execute("create_runtime", move || async move { sink.post(RUNTIMES_PATH, body).await })
            .await;

        match result {
            Ok(()) => {
                self.runtime_created.store(true, Ordering::Release);
                info!(
                    runtime_id = %self.config.runtime_id,
                    market = %market,
                    environment = %self.config.environment,
                    "Runtime registered with monitoring backend"
                );
                true
            }
            Err(e) => {
                error!(
                    runtime_id = %self.config.runtime_id,
                    error = %e,
                    "Failed to register runtime, monitoring disabled"
                );
                false
            }
        }
    }

    pub fn report_signal(&self, market: &str, signal: Signal, price: f64, extra: Option<Map<String, Value>>) {
        let body = json!({
            "market": market,
            "signal": signal.as_i8(),
            "price": price,
        });
        self.submit(EventKind::Signal, Verb::Post, self.events_path("signals"), body, extra);
    }

    pub fn report_trade(
        &self,
        market: &str,
        side: OrderSide,
        size: f64,
        price: f64,
        order_id: Option<&str>,
        extra: Option<Map<String, Value>>,
    ) {
        let body = json!({
            "market": market,
            "side": side.as_str(),
            "size": size,
            "price": price,
            "order_id": order_id,
        });
        self.submit(EventKind::Trade, Verb::Post, self.events_path("trades"), body, extra);
    }

    pub fn report_position(
        &self,
        market: &str,
        position_size: f64,
        entry_price: f64,
        current_price: f64,
        extra: Option<Map<String, Value>>,
    ) {
        let (pnl, pnl_pct) = if position_size != 0.0 && entry_price > 0.0 {
            (
                (current_price - entry_price) * position_size,
                (current_price - entry_price) / entry_price,
            )
        } else {
            (0.0, 0.0)
        };

        let body = json!({
            "market": market,
            "position_size": position_size,
            "entry_price": entry_price,
            "current_price": current_price,
            "pnl": pnl,
            "pnl_pct": pnl_pct,
        });
        self.submit(EventKind::Position, Verb::Post, self.events_path("positions"), body, extra);
    }

    pub fn update_runtime_status(&self, status: RuntimeStatus, extra: Option<Map<String, Value>>) {
        let body = json!({
            "status": status.as_str(),
            "updated_at": now_iso8601(),
        });
        let path = format!("{}/{}", RUNTIMES_PATH, self.config.runtime_id);
        self.submit(EventKind::Status, Verb::Patch, path, body, extra);
    }

    /// Stop accepting events and wait up to `timeout` for in-flight ones.
    ///
    /// Tasks still running at the deadline are aborted. The deadline bounds
    /// the whole drain, however many tasks are pending.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        self.closed.store(true, Ordering::Release);

        let handles = std::mem::take(&mut *self.pending.lock());
        let deadline = Instant::now() + timeout;
        let mut completed = 0;
        let mut cancelled = 0;
        let mut failed = 0;

        for mut handle in handles {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => completed += 1,
                Ok(Err(e)) if e.is_cancelled() => cancelled += 1,
                Ok(Err(e)) => {
                    error!(error = %e, "Telemetry task panicked");
                    failed += 1;
                }
                Err(_) => {
                    handle.abort();
                    cancelled += 1;
                }
            }
        }

        let report = ShutdownReport {
            completed,
            cancelled,
            failed,
            stats: self.stats.snapshot(),
        };

        if cancelled > 0 {
            warn!(
                completed = completed,
                cancelled = cancelled,
                timeout_ms = timeout.as_millis() as u64,
                "Telemetry drain timed out, pending events dropped"
            );
        } else {
            info!(completed = completed, "Telemetry reporter drained");
        }

        report
    }

    /// [`TelemetryReporter::shutdown`] with the configured drain timeout.
    pub async fn close(&self) -> ShutdownReport {
        self.shutdown(self.settings.drain_timeout()).await
    }

    fn events_path(&self, collection: &str) -> String {
        format!("{}/{}/{}", RUNTIMES_PATH, self.config.runtime_id, collection)
    }

    fn submit(&self, kind: EventKind, verb: Verb, path: String, mut body: Value, extra: Option<Map<String, Value>>) {
        if !self.is_runtime_created() {
            debug!(kind = %kind, "Runtime not registered, dropping event");
            return;
        }
        if self.closed.load(Ordering::Acquire) {
            debug!(kind = %kind, "Reporter closed, dropping event");
            return;
        }

        if let Some(map) = body.as_object_mut() {
            if let Some(extra) = extra {
                map.extend(extra);
            }
            if kind != EventKind::Status {
                map.insert("runtime_id".to_string(), json!(self.config.runtime_id));
                map.insert("strategy_id".to_string(), json!(self.config.strategy_id));
                map.insert("timestamp".to_string(), json!(now_iso8601()));
            }
        }

        let sink = Arc::clone(&self.sink);
        let retry = self.retry.clone();
        let stats = Arc::clone(&self.stats);
        let workers = Arc::clone(&self.workers);

        let handle = tokio::spawn(async move {
            let _permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let sink = &sink;
            let path = path.as_str();
            let body = &body;
            let result = retry
                .execute(kind.as_str(), move || async move {
                    match verb {
                        Verb::Post => sink.post(path, body).await,
                        Verb::Patch => sink.patch(path, body).await,
                    }
                })
                .await;

            match result {
                Ok(()) => {
                    stats.record(kind, true);
                    debug!(kind = %kind, path = %path, "Telemetry event delivered");
                }
                Err(e) => {
                    stats.record(kind, false);
                    warn!(kind = %kind, path = %path, error = %e, "Failed to deliver telemetry event");
                }
            }
        });

        let mut pending = self.pending.lock();
        if pending.len() >= self.settings.prune_threshold {
            pending.retain(|handle| !handle.is_finished());
        }
        pending.push(handle);
    }
}

impl Drop for TelemetryReporter {
    fn drop(&mut self) {
        for handle in self.pending.get_mut().drain(..) {
            handle.abort();
        }
    }
}

impl fmt::Debug for TelemetryReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryReporter")
            .field("runtime_id", &self.config.runtime_id)
            .field("runtime_created", &self.is_runtime_created())
            .field("pending", &self.pending_tasks())
            .finish()
    }
}
