use thiserror::Error;

pub type Result<T> = std::result::Result<T, LiveTraderError>;

#[derive(Error, Debug)]
pub enum LiveTraderError {
    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Strategy error: {0}")]
    Strategy(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Network timeout: {0}")]
    Timeout(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Monitoring error: {0}")]
    Monitoring(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LiveTraderError {
    /// Errors that end a trading session instead of skipping one iteration.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LiveTraderError::Authentication(_)
                | LiveTraderError::InvalidConfig(_)
                | LiveTraderError::Config(_)
        )
    }
}
