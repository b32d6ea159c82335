pub mod event;
pub mod risk;

pub use event::EventScorer;
pub use risk::RiskScorer;

use tracing::{info, warn};

use crate::error::{ForecastError, Result};
use crate::ml::{FeatureScaler, TreeEnsemble};
use crate::types::ScoreSource;

/// Scoring path, chosen once when a scorer is built.
#[derive(Debug, Clone)]
pub enum ScorerBackend {
    Trained {
        model: TreeEnsemble,
        scaler: FeatureScaler,
    },
    RuleBased,
}

impl ScorerBackend {
    /// Use the trained model only when both it and the shared scaler are loaded
    /// and agree with the scorer's feature width.
    pub fn select(
        name: &str,
        model: Option<TreeEnsemble>,
        scaler: Option<&FeatureScaler>,
        arity: usize,
    ) -> Self {
        match (model, scaler) {
            (Some(model), Some(scaler)) => {
                if model.num_features != arity || scaler.dim() != arity {
                    warn!(
                        "{} scorer: model expects {} features and scaler {}, inputs have {}; using rule-based scoring",
                        name, model.num_features, scaler.dim(), arity
                    );
                    return ScorerBackend::RuleBased;
                }
                info!("{} scorer using trained model", name);
                ScorerBackend::Trained {
                    model,
                    scaler: scaler.clone(),
                }
            }
            (Some(_), None) => {
                warn!("{} scorer: model loaded without scaler; using rule-based scoring", name);
                ScorerBackend::RuleBased
            }
            (None, _) => {
                info!("{} scorer using rule-based scoring", name);
                ScorerBackend::RuleBased
            }
        }
    }

    pub fn source(&self) -> ScoreSource {
        match self {
            ScorerBackend::Trained { .. } => ScoreSource::Trained,
            ScorerBackend::RuleBased => ScoreSource::RuleBased,
        }
    }

    /// Raw trained output, or `None` on the rule-based path.
    fn trained_score(&self, name: &str, features: &[f64]) -> Result<Option<f64>> {
        let ScorerBackend::Trained { model, scaler } = self else {
            return Ok(None);
        };
        let fail = |reason: String| ForecastError::prediction(name, reason);
        let scaled = scaler.transform(features).map_err(fail)?;
        let value = model.predict_raw(&scaled).map_err(fail)?;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ensemble(num_features: usize) -> TreeEnsemble {
        TreeEnsemble {
            num_features,
            base_score: 0.5,
            trees: Vec::new(),
        }
    }

    fn scaler(dim: usize) -> FeatureScaler {
        FeatureScaler::Standard { mean: vec![0.0; dim], std: vec![1.0; dim] }
    }

    #[test]
    fn test_trained_requires_model_and_scaler() {
        let s = scaler(3);
        assert_eq!(ScorerBackend::select("event", Some(ensemble(3)), Some(&s), 3).source(), ScoreSource::Trained);
        assert_eq!(ScorerBackend::select("event", Some(ensemble(3)), None, 3).source(), ScoreSource::RuleBased);
        assert_eq!(ScorerBackend::select("event", None, Some(&s), 3).source(), ScoreSource::RuleBased);
    }

    #[test]
    fn test_arity_mismatch_falls_back() {
        let s = scaler(4);
        let backend = ScorerBackend::select("event", Some(ensemble(3)), Some(&s), 3);
        assert!(matches!(backend, ScorerBackend::RuleBased));
    }

    #[test]
    fn test_trained_score() {
        let s = scaler(2);
        let backend = ScorerBackend::select("risk", Some(ensemble(2)), Some(&s), 2);
        assert_eq!(backend.trained_score("risk", &[1.0, 2.0]).unwrap(), Some(0.5));
        assert_eq!(ScorerBackend::RuleBased.trained_score("risk", &[1.0, 2.0]).unwrap(), None);
    }
}
