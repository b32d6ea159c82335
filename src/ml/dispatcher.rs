use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::arima::ArimaModel;
use super::artifacts::ArtifactLoader;
use super::gbdt::{BoostedTreeForecaster, TreeEnsemble};
use super::scaler::FeatureScaler;
use super::sequence::SequenceModel;
use super::{Forecaster, ModelKind};
use crate::config::ModelSettings;
use crate::error::{ForecastError, Result};

/// Availability flags for the forecasting kinds and the shared scaler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAvailability {
    pub lstm: bool,
    pub arima: bool,
    pub sarima: bool,
    pub lightgbm: bool,
    pub scaler: bool,
}

/// Per-kind result of a `compare` run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Prediction { value: f64 },
    Unavailable,
    Failed { error: String },
}

impl ModelOutcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            ModelOutcome::Prediction { value } => Some(*value),
            _ => None,
        }
    }
}

/// Registry of loaded forecasting handles, built once and read-only afterwards.
pub struct ModelDispatcher {
    models: BTreeMap<ModelKind, Arc<dyn Forecaster>>,
    scaler: Option<FeatureScaler>,
}

impl ModelDispatcher {
    /// Load every forecasting artifact named in `settings`. Missing or broken
    /// artifacts leave their slot empty.
    pub fn from_loader(
        loader: &mut ArtifactLoader,
        settings: &ModelSettings,
        scaler: Option<FeatureScaler>,
    ) -> Self {
        let mut models: BTreeMap<ModelKind, Arc<dyn Forecaster>> = BTreeMap::new();

        if let Some(m) = loader.load::<SequenceModel>(&settings.lstm_file) {
            models.insert(ModelKind::Lstm, Arc::new(m));
        }
        if let Some(m) = loader.load::<ArimaModel>(&settings.arima_file) {
            models.insert(ModelKind::Arima, Arc::new(m.with_kind(ModelKind::Arima)));
        }
        if let Some(m) = loader.load::<ArimaModel>(&settings.sarima_file) {
            models.insert(ModelKind::Sarima, Arc::new(m.with_kind(ModelKind::Sarima)));
        }
        if let Some(m) = loader.load::<TreeEnsemble>(&settings.lightgbm_file) {
            models.insert(
                ModelKind::LightGbm,
                Arc::new(BoostedTreeForecaster::new(m, scaler.clone())),
            );
        }

        let dispatcher = Self { models, scaler };
        let loaded: Vec<&str> = dispatcher.models.keys().map(|k| k.as_str()).collect();
        info!("Model dispatcher ready: {} of {} models loaded {:?}",
              loaded.len(), ModelKind::ALL.len(), loaded);
        dispatcher
    }

    pub fn from_models(models: Vec<Arc<dyn Forecaster>>, scaler: Option<FeatureScaler>) -> Self {
        Self {
            models: models.into_iter().map(|m| (m.kind(), m)).collect(),
            scaler,
        }
    }

    pub fn is_loaded(&self, kind: ModelKind) -> bool {
        self.models.contains_key(&kind)
    }

    pub fn scaler(&self) -> Option<&FeatureScaler> {
        self.scaler.as_ref()
    }

    pub fn available_models(&self) -> ModelAvailability {
        ModelAvailability {
            lstm: self.is_loaded(ModelKind::Lstm),
            arima: self.is_loaded(ModelKind::Arima),
            sarima: self.is_loaded(ModelKind::Sarima),
            lightgbm: self.is_loaded(ModelKind::LightGbm),
            scaler: self.scaler.is_some(),
        }
    }

    fn validate_input(kind: ModelKind, input: &[f64], horizon: usize) -> Result<()> {
        if input.is_empty() {
            return Err(ForecastError::validation("input series must not be empty"));
        }
        if let Some(i) = input.iter().position(|v| !v.is_finite()) {
            return Err(ForecastError::validation(format!("input[{}] is not a finite number", i)));
        }
        if kind.is_classical() && horizon == 0 {
            return Err(ForecastError::validation(format!("{} requires horizon >= 1", kind)));
        }
        Ok(())
    }

    /// Predict with one backend. Input is validated before availability is checked.
    pub fn predict(&self, kind: ModelKind, input: &[f64], horizon: usize) -> Result<f64> {
        Self::validate_input(kind, input, horizon)?;

        let model = self
            .models
            .get(&kind)
            .ok_or(ForecastError::ModelUnavailable(kind))?;

        let value = model.forecast(input, horizon)?;
        if !value.is_finite() {
            return Err(ForecastError::prediction(kind.as_str(), "output is not finite"));
        }
        debug!("{} predicted {:.6} (horizon {})", kind, value, horizon);
        Ok(value)
    }

    /// Run every kind on the same input. One failing backend never fails the call.
    pub fn compare(&self, input: &[f64], horizon: usize) -> Result<BTreeMap<ModelKind, ModelOutcome>> {
        // Shared checks only; a zero horizon fails the classical kinds individually.
        Self::validate_input(ModelKind::Lstm, input, horizon)?;

        let outcomes = ModelKind::ALL
            .iter()
            .map(|&kind| {
                let outcome = match self.predict(kind, input, horizon) {
                    Ok(value) => ModelOutcome::Prediction { value },
                    Err(ForecastError::ModelUnavailable(_)) => ModelOutcome::Unavailable,
                    Err(e) => ModelOutcome::Failed { error: e.to_string() },
                };
                (kind, outcome)
            })
            .collect();

        Ok(outcomes)
    }
}
