//! Error types for the forecast overlay pipeline.

use thiserror::Error;

/// Result type alias using ForecastError.
pub type ForecastResult<T> = Result<T, ForecastError>;

/// Primary error type for overlay loading and rendering.
#[derive(Debug, Error)]
pub enum ForecastError {
    // === Load lifecycle ===
    /// The load was superseded by a newer selection. Not a failure.
    #[error("load cancelled")]
    Cancelled,

    // === Resolution Errors ===
    #[error("No resource code registered for overlay: {0}")]
    UnknownOverlay(String),

    #[error("Could not resolve resource: {0}")]
    Resolution(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    // === Data Errors ===
    #[error("Transport failed: {0}")]
    Transport(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Field not ready: {0}")]
    FieldNotReady(String),

    // === Storage Errors ===
    #[error("Cache error: {0}")]
    Cache(String),

    // === Rendering Errors ===
    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForecastError {
    /// Whether this error is the cancellation marker rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ForecastError::Cancelled)
    }

    /// Short, stable label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::Cancelled => "cancelled",
            ForecastError::UnknownOverlay(_)
            | ForecastError::Resolution(_)
            | ForecastError::InvalidDate(_) => "resolution",
            ForecastError::Transport(_) => "transport",
            ForecastError::Decode(_) => "decode",
            ForecastError::FieldNotReady(_) => "field_not_ready",
            ForecastError::Cache(_) => "cache",
            ForecastError::Render(_) => "render",
            ForecastError::Config(_) => "config",
            ForecastError::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for ForecastError {
    fn from(err: std::io::Error) -> Self {
        ForecastError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Internal(format!("JSON error: {}", err))
    }
}
