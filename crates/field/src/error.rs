//! Error types for field construction and raster decoding.

use forecast_common::ForecastError;
use thiserror::Error;

/// Errors that can occur while decoding rasters or building fields.
#[derive(Error, Debug)]
pub enum FieldError {
    /// The payload is not a well-formed raster.
    #[error("malformed raster: {0}")]
    Decode(String),

    /// Grid metadata and value arrays disagree.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// Decoding was stopped through its cancel flag.
    #[error("decode cancelled")]
    Cancelled,
}

impl FieldError {
    /// Create a Decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create an InvalidGrid error.
    pub fn invalid_grid(msg: impl Into<String>) -> Self {
        Self::InvalidGrid(msg.into())
    }
}

impl From<FieldError> for ForecastError {
    fn from(err: FieldError) -> Self {
        match err {
            FieldError::Cancelled => ForecastError::Cancelled,
            other => ForecastError::Decode(other.to_string()),
        }
    }
}

/// Result type for field operations.
pub type FieldResult<T> = std::result::Result<T, FieldError>;
