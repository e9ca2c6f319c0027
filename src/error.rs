use thiserror::Error;

/// Main error type for the connector pipeline
#[derive(Error, Debug)]
pub enum BenchError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    // Network errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Numeric errors
    #[error("Singular matrix: pivot {pivot:e} in column {column}")]
    SingularMatrix { column: usize, pivot: f64 },

    #[error("Residual {residual:e} exceeds tolerance {tolerance:e}")]
    ResidualTooLarge { residual: f64, tolerance: f64 },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for BenchError
pub type Result<T> = std::result::Result<T, BenchError>;
