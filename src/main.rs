use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use livetrader::app::LiveTraderApp;
use livetrader::prelude::*;
use livetrader_monitoring::setup_logging;

#[derive(Parser)]
#[command(name = "livetrader")]
#[command(about = "A live trading execution engine with runtime telemetry")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop against the paper venue
    Run {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Use the development profile (debug logging, 5s interval)
        #[arg(long, conflicts_with = "config")]
        dev: bool,

        /// Stop after this many iterations
        #[arg(long)]
        max_iterations: Option<u64>,

        /// Override the check interval in seconds
        #[arg(long)]
        interval: Option<u64>,

        /// Log level
        #[arg(long)]
        log_level: Option<String>,

        /// Emit logs as JSON
        #[arg(long)]
        json_logs: bool,
    },
    /// Validate a configuration file and print the effective settings
    CheckConfig {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = AppConfig::load(path.map(PathBuf::as_path))
        .with_context(|| format!("failed to load configuration from {:?}", path))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            dev,
            max_iterations,
            interval,
            log_level,
            json_logs,
        } => {
            let mut app_config = if dev {
                AppConfig::development()
            } else {
                load_config(config.as_ref())?
            };

            if let Some(level) = log_level {
                app_config.logging.level = level;
            }
            if json_logs {
                app_config.logging.json = true;
            }
            if let Some(interval) = interval {
                app_config.trader.check_interval_secs = interval;
            }

            let _guard = setup_logging(&app_config.logging).context("failed to initialise logging")?;

            info!(
                market = %app_config.trader.market,
                strategy = %app_config.strategy.kind,
                version = env!("CARGO_PKG_VERSION"),
                "Starting livetrader"
            );

            let mut app = LiveTraderApp::new(app_config).context("invalid configuration")?;
            let summary = app.run(max_iterations).await?;

            println!("{}", serde_json::to_string_pretty(&summary)?);

            if let LoopExit::Fatal(message) = &summary.exit {
                anyhow::bail!("trading stopped on fatal error: {}", message);
            }
        }
        Commands::CheckConfig { config } => {
            let app_config = load_config(config.as_ref())?;
            app_config.validate().context("invalid configuration")?;

            println!("{}", app_config.to_toml()?);
            match app_config.runtime_config() {
                Some(runtime) => println!("# monitoring: enabled ({})", runtime.api_base_url),
                None => println!("# monitoring: disabled"),
            }
        }
        Commands::Version => {
            println!("livetrader v{}", env!("CARGO_PKG_VERSION"));
            println!("A live trading execution engine with runtime telemetry");
        }
    }

    Ok(())
}
