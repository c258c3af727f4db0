use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

use crate::error::{LiveTraderError, Result};
use crate::utils::validation::{
    validate_fraction, validate_market, validate_optional_positive, validate_positive,
};

pub const DEFAULT_API_BASE_URL: &str = "https://api.1024quant.com";
pub const DEFAULT_ENVIRONMENT: &str = "local";
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub trader: TraderConfig,
    pub strategy: StrategySettings,
    pub runtime: Option<RuntimeSettings>,
    pub reporter: ReporterConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub paper: PaperConfig,
}

/// Parameters of one trading session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraderConfig {
    pub market: String,
    pub initial_capital: f64,
    /// Largest fraction of capital that may be deployed, in (0, 1].
    pub max_position_size: f64,
    pub check_interval_secs: u64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub history_length: usize,
    pub warmup_samples: usize,
    pub rebalance_epsilon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    pub kind: String,
    pub name: String,
    pub params: HashMap<String, Value>,
}

/// Loose monitoring section as it appears in a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    pub strategy_id: Option<String>,
    pub environment: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

/// Identity of one monitored trading session.
#[derive(Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub api_key: String,
    pub runtime_id: String,
    pub strategy_id: Option<String>,
    pub api_base_url: String,
    pub environment: String,
    pub sdk_version: String,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    pub workers: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub drain_timeout_ms: u64,
    pub prune_threshold: usize,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub json: bool,
    pub console: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
}

/// Synthetic price feed used by the paper venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub start_price: f64,
    pub amplitude: f64,
    pub period_ticks: u32,
    pub drift_per_tick: f64,
    pub wrap_responses: bool,
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("LIVETRADER").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Defaults, then the optional file, then `LIVETRADER__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(Environment::with_prefix("LIVETRADER").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn development() -> Self {
        Self {
            trader: TraderConfig {
                check_interval_secs: 5,
                ..TraderConfig::default()
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                ..LoggingConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.trader.validate()?;
        self.reporter.validate()?;

        if self.strategy.kind.trim().is_empty() {
            return Err(LiveTraderError::InvalidConfig("Strategy kind cannot be empty".to_string()));
        }

        if self.metrics.enabled && self.metrics.address.parse::<std::net::SocketAddr>().is_err() {
            return Err(LiveTraderError::InvalidConfig(format!(
                "Invalid metrics address: {}",
                self.metrics.address
            )));
        }

        Ok(())
    }

    pub fn runtime_config(&self) -> Option<RuntimeConfig> {
        self.runtime.as_ref().and_then(RuntimeSettings::to_runtime_config)
    }

    /// Effective configuration as TOML, with the API key masked.
    pub fn to_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        if let Some(runtime) = redacted.runtime.as_mut() {
            if runtime.api_key.is_some() {
                runtime.api_key = Some("<redacted>".to_string());
            }
        }

        toml::to_string_pretty(&redacted).map_err(|e| LiveTraderError::InvalidConfig(e.to_string()))
    }
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            market: "BTC-PERP".to_string(),
            initial_capital: 10_000.0,
            max_position_size: 0.5,
            check_interval_secs: 60,
            stop_loss: Some(0.05),
            take_profit: Some(0.10),
            history_length: 100,
            warmup_samples: 10,
            rebalance_epsilon: 0.001,
        }
    }
}

impl TraderConfig {
    pub fn new(market: impl Into<String>, initial_capital: f64, max_position_size: f64) -> Self {
        Self {
            market: market.into(),
            initial_capital,
            max_position_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_market(&self.market)?;
        validate_positive("initial_capital", self.initial_capital)?;
        validate_fraction("max_position_size", self.max_position_size)?;
        validate_optional_positive("stop_loss", self.stop_loss)?;
        validate_optional_positive("take_profit", self.take_profit)?;
        validate_positive("rebalance_epsilon", self.rebalance_epsilon)?;

        if self.warmup_samples == 0 {
            return Err(LiveTraderError::InvalidConfig(
                "warmup_samples must be at least 1".to_string(),
            ));
        }

        if self.history_length < self.warmup_samples {
            return Err(LiveTraderError::InvalidConfig(format!(
                "history_length ({}) must be >= warmup_samples ({})",
                self.history_length, self.warmup_samples
            )));
        }

        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Largest notional a single order may carry.
    pub fn notional_cap(&self) -> f64 {
        self.initial_capital * self.max_position_size
    }
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            kind: "trend".to_string(),
            name: "Trend".to_string(),
            params: HashMap::new(),
        }
    }
}

impl RuntimeSettings {
    /// A missing `api_key` disables monitoring instead of failing startup.
    pub fn to_runtime_config(&self) -> Option<RuntimeConfig> {
        let api_key = match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => {
                error!("Runtime config is missing required field 'api_key'; monitoring disabled, trading continues");
                return None;
            }
        };

        let mut config = match RuntimeConfig::from_env(api_key) {
            Ok(config) => config,
            Err(e) => {
                error!("Runtime config error: {}; monitoring disabled, trading continues", e);
                return None;
            }
        };

        if let Some(url) = &self.api_base_url {
            config = config.with_base_url(url.as_str());
        }
        if let Some(strategy_id) = &self.strategy_id {
            config = config.with_strategy_id(strategy_id.as_str());
        }
        if let Some(environment) = &self.environment {
            config = config.with_environment(environment.as_str());
        }
        if let Some(metadata) = &self.metadata {
            config = config.with_metadata(metadata.clone());
        }

        Some(config)
    }
}

impl RuntimeConfig {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LiveTraderError::InvalidConfig("api_key is required".to_string()));
        }

        Ok(Self {
            api_key,
            runtime_id: Uuid::new_v4().to_string(),
            strategy_id: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            sdk_version: SDK_VERSION.to_string(),
            metadata: None,
        })
    }

    /// Like [`RuntimeConfig::new`], then applies `STRATEGY_ID`, `ENVIRONMENT`
    /// and `API_BASE_URL` from the process environment.
    pub fn from_env(api_key: impl Into<String>) -> Result<Self> {
        let mut config = Self::new(api_key)?;

        if let Ok(strategy_id) = std::env::var("STRATEGY_ID") {
            config.strategy_id = Some(strategy_id);
        }
        if let Ok(environment) = std::env::var("ENVIRONMENT") {
            config.environment = environment;
        }
        if let Ok(url) = std::env::var("API_BASE_URL") {
            config.api_base_url = url;
        }

        Ok(config)
    }

    pub fn with_strategy_id(mut self, strategy_id: impl Into<String>) -> Self {
        self.strategy_id = Some(strategy_id.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Everything except the API key.
    pub fn describe(&self) -> Value {
        serde_json::json!({
            "runtime_id": self.runtime_id,
            "strategy_id": self.strategy_id,
            "api_base_url": self.api_base_url,
            "environment": self.environment,
            "sdk_version": self.sdk_version,
            "metadata": self.metadata,
        })
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("api_key", &"<redacted>")
            .field("runtime_id", &self.runtime_id)
            .field("strategy_id", &self.strategy_id)
            .field("api_base_url", &self.api_base_url)
            .field("environment", &self.environment)
            .field("sdk_version", &self.sdk_version)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            drain_timeout_ms: 5_000,
            prune_threshold: 100,
            request_timeout_ms: 10_000,
        }
    }
}

impl ReporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(LiveTraderError::InvalidConfig("reporter.workers must be at least 1".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(LiveTraderError::InvalidConfig(
                "reporter.request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
            console: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9090".to_string(),
        }
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            start_price: 50_000.0,
            amplitude: 0.02,
            period_ticks: 40,
            drift_per_tick: 0.0,
            wrap_responses: false,
        }
    }
}
