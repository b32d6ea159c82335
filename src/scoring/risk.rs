use std::collections::BTreeMap;
use tracing::debug;

use super::ScorerBackend;
use crate::error::{ForecastError, Result};
use crate::ml::features::{project_risk, RiskFeatures};
use crate::ml::{ArtifactLoader, FeatureScaler, TreeEnsemble};
use crate::types::{Quote, RiskCategory, RiskRequest, RiskScore, ScoreSource};

const NAME: &str = "risk";

/// Deterministic risk score in [0, 1].
pub fn rule_based_risk(f: &RiskFeatures) -> f64 {
    (0.4 * f.volatility - 0.3 * f.sentiment + 0.2 * f.liquidity + 0.1 * f.event_severity)
        .clamp(0.0, 1.0)
}

/// Higher the further the score sits from the 0.5 midpoint.
pub fn risk_confidence(score: f64) -> f64 {
    (0.55 + 0.3 * (2.0 * score - 1.0).abs()).min(0.95)
}

pub struct RiskScorer {
    backend: ScorerBackend,
}

impl RiskScorer {
    pub fn new(backend: ScorerBackend) -> Self {
        Self { backend }
    }

    pub fn rule_based() -> Self {
        Self::new(ScorerBackend::RuleBased)
    }

    pub fn from_loader(loader: &mut ArtifactLoader, file_name: &str, scaler: Option<&FeatureScaler>) -> Self {
        let model = loader.load::<TreeEnsemble>(file_name);
        Self::new(ScorerBackend::select(NAME, model, scaler, RiskFeatures::NUM_FEATURES))
    }

    pub fn source(&self) -> ScoreSource {
        self.backend.source()
    }

    /// Score a request; `quote` supplies volatility when the request omits it.
    pub fn score(&self, req: &RiskRequest, quote: Option<&Quote>) -> Result<RiskScore> {
        let features = project_risk(req, quote)?;
        self.score_features(&req.ticker, &features)
    }

    pub fn score_features(&self, ticker: &str, features: &RiskFeatures) -> Result<RiskScore> {
        for (name, value) in feature_map(features) {
            if !value.is_finite() {
                return Err(ForecastError::validation(format!("{} must be a finite number", name)));
            }
        }

        let score = match self.backend.trained_score(NAME, &features.to_array())? {
            Some(raw) if raw.is_finite() => raw.clamp(0.0, 1.0),
            Some(_) => return Err(ForecastError::prediction(NAME, "trained output is not finite")),
            None => rule_based_risk(features),
        };
        let category = RiskCategory::from_score(score);
        debug!("Risk for {}: {:.4} ({}, {})", ticker, score, category, self.source().as_str());

        Ok(RiskScore {
            subject: ticker.to_string(),
            raw_score: score,
            label: category,
            confidence: risk_confidence(score),
            inputs: feature_map(features),
            explanation: format!("The calculated risk is {} based on the given inputs.", category),
            source: self.source(),
        })
    }
}

fn feature_map(f: &RiskFeatures) -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("volatility".to_string(), f.volatility),
        ("sentiment".to_string(), f.sentiment),
        ("liquidity".to_string(), f.liquidity),
        ("event_severity".to_string(), f.event_severity),
    ])
}
