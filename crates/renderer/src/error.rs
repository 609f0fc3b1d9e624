//! Error types for overlay rendering.

use forecast_common::ForecastError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    /// The overlay has no drawing routine of its own.
    #[error("draw() is not implemented for this overlay")]
    DrawNotImplemented,

    #[error("map has no pane named '{0}'")]
    UnknownPane(String),

    #[error("cannot allocate a {width}x{height} surface")]
    Surface { width: u32, height: u32 },

    #[error("invalid overlay configuration: {0}")]
    InvalidConfig(String),

    #[error("encoding failed: {0}")]
    Encode(String),
}

impl RenderError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<RenderError> for ForecastError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::InvalidConfig(msg) => ForecastError::Config(msg),
            other => ForecastError::Render(other.to_string()),
        }
    }
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;
