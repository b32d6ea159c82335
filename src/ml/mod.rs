pub mod arima;
pub mod artifacts;
pub mod dispatcher;
pub mod features;
pub mod gbdt;
pub mod scaler;
pub mod sequence;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ForecastError, Result};

pub use artifacts::{ArtifactLoader, ArtifactStatus};
pub use dispatcher::{ModelAvailability, ModelDispatcher, ModelOutcome};
pub use gbdt::TreeEnsemble;
pub use scaler::FeatureScaler;

/// Forecasting backend identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Lstm,
    Arima,
    Sarima,
    LightGbm,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Lstm,
        ModelKind::Arima,
        ModelKind::Sarima,
        ModelKind::LightGbm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Lstm => "lstm",
            ModelKind::Arima => "arima",
            ModelKind::Sarima => "sarima",
            ModelKind::LightGbm => "lightgbm",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::Lstm => "LSTM",
            ModelKind::Arima => "ARIMA",
            ModelKind::Sarima => "SARIMA",
            ModelKind::LightGbm => "LightGBM",
        }
    }

    /// Classical kinds forecast forward from their stored state and need a horizon.
    pub fn is_classical(&self) -> bool {
        matches!(self, ModelKind::Arima | ModelKind::Sarima)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lstm" | "sequence" => Ok(ModelKind::Lstm),
            "arima" => Ok(ModelKind::Arima),
            "sarima" => Ok(ModelKind::Sarima),
            "lightgbm" | "lgbm" | "boosted-tree" => Ok(ModelKind::LightGbm),
            _ => Err(ForecastError::validation(format!("Unknown model kind: {}", s))),
        }
    }
}

/// A loaded forecasting artifact. Handles are read-only and shared across requests.
pub trait Forecaster: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// `input` is a price series or a feature vector depending on the backend.
    fn forecast(&self, input: &[f64], horizon: usize) -> Result<f64>;
}
