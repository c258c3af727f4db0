pub mod logging;
pub mod metrics;
pub mod retry;
pub mod sink;
pub mod reporter;

pub use logging::{setup_logging, StructuredLogger};
pub use metrics::{MetricsCollector, MetricsServer};
pub use retry::{ExponentialBackoff, RetryPolicy};
pub use sink::{HttpSink, SharedSink, TelemetryError, TelemetrySink};
pub use reporter::{
    EventKind, ReporterStats, RuntimeStatus, ShutdownReport, StatsSnapshot, TelemetryReporter,
};

pub mod prelude {
    pub use super::{
        setup_logging, StructuredLogger,
        MetricsCollector, MetricsServer,
        ExponentialBackoff, RetryPolicy,
        HttpSink, SharedSink, TelemetryError, TelemetrySink,
        EventKind, ReporterStats, RuntimeStatus, ShutdownReport, StatsSnapshot, TelemetryReporter,
    };
}
