//! Error types for the market sentinel

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the market sentinel
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid market id: {0}")]
    InvalidMarket(String),

    // Market data errors
    #[error("No market data: {0}")]
    DataUnavailable(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // Order errors
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    // Forecasting errors
    #[error("Predictor failure: {0}")]
    Predictor(String),

    #[error("Model persistence failed: {0}")]
    ModelPersistence(String),

    // Worker lifecycle errors
    #[error("Worker already running for market {0}")]
    DuplicateWorker(String),

    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Errors a worker absorbs for the current tick and then keeps running
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::DataUnavailable(_)
                | Error::Http(_)
                | Error::OrderRejected(_)
                | Error::Predictor(_)
        )
    }

    /// Check if this error comes from bad configuration
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_) | Error::InvalidMarket(_))
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Http(format!("request timed out: {}", e))
        } else {
            Error::Http(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
