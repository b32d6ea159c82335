use std::collections::BTreeMap;
use tracing::debug;

use super::ScorerBackend;
use crate::error::{ForecastError, Result};
use crate::ml::features::{project_event, EventFeatures};
use crate::ml::{ArtifactLoader, FeatureScaler, TreeEnsemble};
use crate::types::{EventImpact, EventRequest, ImpactLabel, ScoreSource};

const NAME: &str = "event impact";

/// Deterministic impact in [-1, 1].
pub fn rule_based_impact(f: &EventFeatures) -> f64 {
    (0.4 * f.sentiment - 0.3 * f.volatility + 0.8 * f.keyword_strength).clamp(-1.0, 1.0)
}

pub fn impact_confidence(impact: f64) -> f64 {
    (0.55 + 0.3 * impact.abs()).min(0.95)
}

pub struct EventScorer {
    backend: ScorerBackend,
}

impl EventScorer {
    pub fn new(backend: ScorerBackend) -> Self {
        Self { backend }
    }

    pub fn rule_based() -> Self {
        Self::new(ScorerBackend::RuleBased)
    }

    pub fn from_loader(loader: &mut ArtifactLoader, file_name: &str, scaler: Option<&FeatureScaler>) -> Self {
        let model = loader.load::<TreeEnsemble>(file_name);
        Self::new(ScorerBackend::select(NAME, model, scaler, EventFeatures::NUM_FEATURES))
    }

    pub fn source(&self) -> ScoreSource {
        self.backend.source()
    }

    pub fn score(&self, req: &EventRequest) -> Result<EventImpact> {
        let features = project_event(req)?;

        let impact = match self.backend.trained_score(NAME, &features.to_array())? {
            Some(raw) if raw.is_finite() => raw.clamp(-1.0, 1.0),
            Some(_) => return Err(ForecastError::prediction(NAME, "trained output is not finite")),
            None => rule_based_impact(&features),
        };
        let label = ImpactLabel::from_score(impact);
        debug!("Impact for '{}': {:.4} ({})", req.headline, impact, label);

        let inputs = BTreeMap::from([
            ("keyword_strength".to_string(), features.keyword_strength),
            ("sentiment".to_string(), features.sentiment),
            ("volatility".to_string(), features.volatility),
        ]);

        Ok(EventImpact {
            subject: req.headline.clone(),
            raw_score: impact,
            label,
            confidence: impact_confidence(impact),
            inputs,
            explanation: format!(
                "The event '{}' combined with sentiment and volatility suggests a {} impact.",
                req.headline, label
            ),
            source: self.source(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headline: &str, sentiment: f64, volatility: f64) -> EventRequest {
        let mut req = EventRequest::new(headline);
        req.sentiment = Some(sentiment);
        req.volatility = Some(volatility);
        req
    }

    #[test]
    fn test_baseline_keyword_is_mild_positive() {
        let scorer = EventScorer::rule_based();
        let result = scorer.score(&EventRequest::new("Oil prices remain stable")).unwrap();

        // 0.8 * 0.3
        assert!((result.raw_score - 0.24).abs() < 1e-12);
        assert_eq!(result.label, ImpactLabel::MildPositive);
        assert!((result.confidence - 0.622).abs() < 1e-12);
        assert_eq!(
            result.explanation,
            "The event 'Oil prices remain stable' combined with sentiment and volatility suggests a Mild Positive impact."
        );
    }

    #[test]
    fn test_negative_event() {
        let scorer = EventScorer::rule_based();
        let result = scorer.score(&request("Regulation review", -1.0, 1.0)).unwrap();
        // -0.4 - 0.3 + 0.8 * 0.5
        assert!((result.raw_score + 0.3).abs() < 1e-12);
        assert_eq!(result.label, ImpactLabel::MildNegative);

        let result = scorer.score(&request("Quiet day", -3.0, 2.0)).unwrap();
        assert_eq!(result.raw_score, -1.0);
        assert_eq!(result.label, ImpactLabel::StrongNegative);
        assert!((result.confidence - 0.85).abs() < 1e-12);
    }

    #[test]
    fn test_impact_and_confidence_bounds() {
        let scorer = EventScorer::rule_based();
        let result = scorer.score(&request("War and bankruptcy", 5.0, -5.0)).unwrap();
        assert_eq!(result.raw_score, 1.0);
        assert!(result.confidence <= 0.95);
    }

    #[test]
    fn test_non_finite_rejected() {
        let scorer = EventScorer::rule_based();
        let err = scorer.score(&request("Earnings", f64::NAN, 0.0)).unwrap_err();
        assert!(matches!(err, ForecastError::Validation(_)));
    }

    #[test]
    fn test_trained_backend() {
        let model = TreeEnsemble { num_features: 3, base_score: -0.6, trees: Vec::new() };
        let scaler = FeatureScaler::MinMax { data_min: vec![0.0; 3], data_max: vec![1.0; 3] };
        let scorer = EventScorer::new(ScorerBackend::select("event", Some(model), Some(&scaler), 3));

        let result = scorer.score(&EventRequest::new("Merger announced")).unwrap();
        assert_eq!(result.source, ScoreSource::Trained);
        assert_eq!(result.label, ImpactLabel::StrongNegative);
        assert_eq!(result.inputs["keyword_strength"], 0.6);
    }
}
