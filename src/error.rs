use alloy::transports::TransportError;
use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Top-level error type for the reconciler
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Chain RPC errors
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("RPC transport failure: {0}")]
    Transport(String),

    #[error("RPC returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to decode RPC response: {0}")]
    Decode(String),

    #[error("Chain mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: i64, actual: i64 },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl From<TransportError> for ChainError {
    fn from(error: TransportError) -> Self {
        match error.as_error_resp() {
            Some(payload) => ChainError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
            },
            None => ChainError::Transport(error.to_string()),
        }
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Migration(format!("{:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let messages: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<String>>()
            .join("; ");

        AppError::Config(format!("Validation failed: {}", details))
    }
}

/// Result type alias for the reconciler
pub type AppResult<T> = Result<T, AppError>;
