use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::Result;
use crate::ml::{
    ArtifactLoader, ArtifactStatus, FeatureScaler, ModelAvailability, ModelDispatcher, ModelKind,
    ModelOutcome,
};
use crate::realtime::{FinnhubClient, QuoteCache, RealtimeData, RealtimeSource};
use crate::scoring::{EventScorer, RiskScorer};
use crate::tracker::{TrackerEntry, TrackerStore};
use crate::types::{EventImpact, EventRequest, PredictRequest, RiskRequest, RiskScore, ScoreSource};

/// What was loaded at startup and which scoring paths are active
#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub available: ModelAvailability,
    pub risk_scorer: ScoreSource,
    pub event_scorer: ScoreSource,
    pub artifacts: BTreeMap<String, ArtifactStatus>,
}

/// Wires the dispatcher, scorers, realtime source and tracker from one `Settings`.
pub struct ForecastEngine {
    dispatcher: ModelDispatcher,
    risk: RiskScorer,
    event: EventScorer,
    realtime: RealtimeSource,
    tracker: TrackerStore,
    artifacts: BTreeMap<String, ArtifactStatus>,
}

impl ForecastEngine {
    pub async fn new(settings: &Settings) -> Result<Self> {
        let models = &settings.models;
        let mut loader = ArtifactLoader::new(&models.dir);

        let scaler = loader.load::<FeatureScaler>(&models.scaler_file);
        let dispatcher = ModelDispatcher::from_loader(&mut loader, models, scaler.clone());
        let risk = RiskScorer::from_loader(&mut loader, &models.risk_model_file, scaler.as_ref());
        let event = EventScorer::from_loader(&mut loader, &models.event_model_file, scaler.as_ref());

        let loaded = loader.statuses().values().filter(|s| s.is_loaded()).count();
        info!("{} of {} artifacts loaded from {}", loaded, loader.statuses().len(), loader.dir().display());

        let cache = QuoteCache::open(&settings.realtime.cache_path, settings.realtime.cache_ttl()?)?;
        let provider = Arc::new(FinnhubClient::new(&settings.realtime)?);
        let realtime = RealtimeSource::new(provider, cache);

        let tracker = TrackerStore::new(&settings.tracker.database_url).await?;

        Ok(Self::with_components(
            dispatcher,
            risk,
            event,
            realtime,
            tracker,
            loader.into_statuses(),
        ))
    }

    pub fn with_components(
        dispatcher: ModelDispatcher,
        risk: RiskScorer,
        event: EventScorer,
        realtime: RealtimeSource,
        tracker: TrackerStore,
        artifacts: BTreeMap<String, ArtifactStatus>,
    ) -> Self {
        Self {
            dispatcher,
            risk,
            event,
            realtime,
            tracker,
            artifacts,
        }
    }

    pub fn predict(&self, kind: ModelKind, req: &PredictRequest) -> Result<f64> {
        self.dispatcher.predict(kind, &req.series, req.horizon)
    }

    /// Predict and append the result to the tracker ledger.
    pub async fn predict_and_log(
        &self,
        kind: ModelKind,
        symbol: &str,
        req: &PredictRequest,
    ) -> Result<TrackerEntry> {
        let value = self.predict(kind, req)?;
        self.tracker
            .log_prediction(kind.as_str(), symbol, value, None, None)
            .await
    }

    pub fn compare(&self, req: &PredictRequest) -> Result<BTreeMap<ModelKind, ModelOutcome>> {
        self.dispatcher.compare(&req.series, req.horizon)
    }

    /// Score risk. Missing volatility is derived from the latest quote when one is available.
    pub async fn score_risk(&self, req: &RiskRequest) -> Result<RiskScore> {
        let quote = if req.volatility.is_none() {
            match self.realtime.latest_quote(&req.ticker).await {
                Ok(quote) => quote,
                Err(e) => {
                    warn!("No quote for {} volatility: {}", req.ticker, e);
                    None
                }
            }
        } else {
            None
        };

        self.risk.score(req, quote.as_ref())
    }

    pub fn score_event(&self, req: &EventRequest) -> Result<EventImpact> {
        self.event.score(req)
    }

    pub async fn quote(&self, symbol: &str) -> Result<RealtimeData> {
        self.realtime.get_data(symbol).await
    }

    pub fn realtime(&self) -> &RealtimeSource {
        &self.realtime
    }

    pub fn tracker(&self) -> &TrackerStore {
        &self.tracker
    }

    pub fn model_report(&self) -> ModelReport {
        ModelReport {
            available: self.dispatcher.available_models(),
            risk_scorer: self.risk.source(),
            event_scorer: self.event.source(),
            artifacts: self.artifacts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;
    use chrono::{Duration, Utc};
    use crate::ml::arima::ArimaModel;
    use crate::ml::artifacts::Artifact;
    use crate::ml::Forecaster;
    use crate::realtime::MockQuoteProvider;
    use crate::tracker::AccuracyFilter;
    use crate::types::Quote;

    async fn engine(provider: MockQuoteProvider) -> ForecastEngine {
        let arima = ArimaModel::decode(br#"{"ar": [0.5], "constant": 1.0, "history": [4.0]}"#).unwrap();
        let models: Vec<Arc<dyn Forecaster>> = vec![Arc::new(arima)];

        ForecastEngine::with_components(
            ModelDispatcher::from_models(models, None),
            RiskScorer::rule_based(),
            EventScorer::rule_based(),
            RealtimeSource::new(
                Arc::new(provider),
                QuoteCache::temporary(Duration::seconds(60)).unwrap(),
            ),
            TrackerStore::in_memory().await.unwrap(),
            BTreeMap::new(),
        )
    }

    fn offline() -> MockQuoteProvider {
        let mut provider = MockQuoteProvider::new();
        provider
            .expect_fetch_quote()
            .returning(|_| Err(ForecastError::UpstreamUnavailable("offline".to_string())));
        provider
    }

    #[tokio::test]
    async fn test_predict_and_log() {
        let engine = engine(offline()).await;
        let req = PredictRequest { series: vec![1.0], horizon: 1 };

        let entry = engine.predict_and_log(ModelKind::Arima, "AAPL", &req).await.unwrap();
        assert_eq!(entry.model_name, "arima");
        assert_eq!(entry.predicted_value, 3.0);

        let err = engine.predict_and_log(ModelKind::Lstm, "AAPL", &req).await.unwrap_err();
        assert!(matches!(err, ForecastError::ModelUnavailable(ModelKind::Lstm)));
        assert_eq!(engine.tracker().get_all().await.len(), 1);

        engine.tracker().log_actual("AAPL", entry.timestamp, 2.0).await.unwrap();
        let report = engine.tracker().accuracy(&AccuracyFilter::model("arima")).await;
        assert_eq!(report.count, 1);
        assert_eq!(report.max_error, Some(1.0));
    }

    #[tokio::test]
    async fn test_risk_volatility_from_live_quote() {
        let mut provider = MockQuoteProvider::new();
        provider.expect_fetch_quote().returning(|s| {
            Ok(Quote {
                symbol: s.to_string(),
                current_price: 100.0,
                high: 110.0,
                low: 90.0,
                open: 95.0,
                previous_close: 100.0,
                timestamp: Utc::now(),
            })
        });
        let engine = engine(provider).await;

        let mut req = RiskRequest::samples().remove(0);
        req.volatility = None;
        req.sentiment = Some(0.0);
        let score = engine.score_risk(&req).await.unwrap();

        // volatility 0.2 -> 0.4 * 0.2
        assert!((score.inputs["volatility"] - 0.2).abs() < 1e-12);
        assert!((score.raw_score - 0.08).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_risk_without_quote_defaults_volatility() {
        let engine = engine(offline()).await;
        let mut req = RiskRequest::samples().remove(0);
        req.volatility = None;

        let score = engine.score_risk(&req).await.unwrap();
        assert_eq!(score.inputs["volatility"], 0.0);
        assert_eq!(score.source, ScoreSource::RuleBased);
    }

    #[tokio::test]
    async fn test_model_report() {
        let engine = engine(offline()).await;
        let report = engine.model_report();
        assert!(report.available.arima);
        assert!(!report.available.lstm);
        assert_eq!(report.event_scorer, ScoreSource::RuleBased);

        let outcomes = engine.compare(&PredictRequest { series: vec![1.0], horizon: 1 }).unwrap();
        assert_eq!(outcomes.len(), 4);
    }

    #[tokio::test]
    async fn test_new_from_settings_with_empty_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.models.dir = dir.path().join("models");
        settings.realtime.cache_path = dir.path().join("cache");
        settings.tracker.database_url = format!("sqlite://{}", dir.path().join("tracker.db").display());

        let engine = ForecastEngine::new(&settings).await.unwrap();
        let report = engine.model_report();
        assert!(!report.available.lstm && !report.available.scaler);
        assert_eq!(report.risk_scorer, ScoreSource::RuleBased);
        assert!(report.artifacts.values().all(|s| *s == ArtifactStatus::Missing));

        let event = engine.score_event(&EventRequest::new("Bankruptcy filing")).unwrap();
        assert_eq!(event.inputs["keyword_strength"], 1.0);

        // No API key configured: live fetch fails and the empty cache has nothing.
        let data = engine.quote("AAPL").await.unwrap();
        assert!(matches!(data, RealtimeData::NoRecentData { .. }));
    }
}
