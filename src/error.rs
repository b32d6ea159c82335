use thiserror::Error;

use crate::ml::ModelKind;

/// Errors surfaced by the forecasting core.
///
/// A missing or unreadable artifact is not represented here: the loader
/// records it as an `ArtifactStatus` and the caller falls back.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("{0} model not loaded")]
    ModelUnavailable(ModelKind),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{kind} prediction failed: {reason}")]
    Prediction { kind: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ForecastError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ForecastError::Validation(msg.into())
    }

    pub fn prediction(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        ForecastError::Prediction {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Errors caused by the request rather than by the service.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ForecastError::Validation(_) | ForecastError::ModelUnavailable(_)
        )
    }
}

impl From<sqlx::Error> for ForecastError {
    fn from(e: sqlx::Error) -> Self {
        ForecastError::Storage(e.to_string())
    }
}

impl From<sled::Error> for ForecastError {
    fn from(e: sled::Error) -> Self {
        ForecastError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(e: serde_json::Error) -> Self {
        ForecastError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for ForecastError {
    fn from(e: std::io::Error) -> Self {
        ForecastError::Storage(e.to_string())
    }
}

impl From<config::ConfigError> for ForecastError {
    fn from(e: config::ConfigError) -> Self {
        ForecastError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;

/// Reject NaN and infinite inputs instead of letting them clamp silently.
pub fn ensure_finite(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ForecastError::validation(format!("{} must be a finite number, got {}", name, value)))
    }
}
