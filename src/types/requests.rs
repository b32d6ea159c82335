use serde::{Deserialize, Serialize};

fn default_horizon() -> usize {
    1
}

/// Forecast request: recent closing prices (or a feature vector for tree models).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub series: Vec<f64>,
    #[serde(default = "default_horizon")]
    pub horizon: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskRequest {
    pub ticker: String,
    pub price: f64,
    pub volume: f64,
    /// Derived from the latest quote when omitted
    #[serde(default)]
    pub volatility: Option<f64>,
    #[serde(default, alias = "sentiment_score")]
    pub sentiment: Option<f64>,
    #[serde(default)]
    pub liquidity: Option<f64>,
    #[serde(default)]
    pub event_severity: Option<f64>,
    #[serde(default)]
    pub macro_index: Option<f64>,
}

impl RiskRequest {
    pub fn samples() -> Vec<RiskRequest> {
        vec![
            RiskRequest {
                ticker: "AAPL".to_string(),
                price: 187.23,
                volume: 32_100_000.0,
                volatility: Some(0.028),
                sentiment: Some(0.65),
                liquidity: None,
                event_severity: None,
                macro_index: Some(0.4),
            },
            RiskRequest {
                ticker: "TSLA".to_string(),
                price: 244.89,
                volume: 59_000_000.0,
                volatility: Some(0.091),
                sentiment: Some(-0.3),
                liquidity: None,
                event_severity: None,
                macro_index: Some(-0.15),
            },
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRequest {
    pub headline: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub sentiment: Option<f64>,
    #[serde(default)]
    pub volatility: Option<f64>,
}

impl EventRequest {
    pub fn new(headline: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            description: String::new(),
            ticker: String::new(),
            sentiment: None,
            volatility: None,
        }
    }

    /// Headline and description, the text the keyword table is matched against.
    pub fn text(&self) -> String {
        if self.description.is_empty() {
            self.headline.clone()
        } else {
            format!("{} {}", self.headline, self.description)
        }
    }

    pub fn samples() -> Vec<EventRequest> {
        vec![
            EventRequest::new("Federal Reserve increases interest rates by 0.25%"),
            EventRequest::new("Apple announces record quarterly profits"),
            EventRequest::new("Oil prices remain stable amid global uncertainty"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_request_default_horizon() {
        let req: PredictRequest = serde_json::from_str(r#"{"series": [1.0, 2.0]}"#).unwrap();
        assert_eq!(req.horizon, 1);
        assert_eq!(req.series.len(), 2);
    }

    #[test]
    fn test_risk_request_accepts_sentiment_score_alias() {
        let req: RiskRequest = serde_json::from_str(
            r#"{"ticker": "TSLA", "price": 244.89, "volume": 59000000, "volatility": 0.091, "sentiment_score": -0.3}"#,
        )
        .unwrap();
        assert_eq!(req.sentiment, Some(-0.3));
        assert_eq!(req.liquidity, None);
        assert_eq!(req.macro_index, None);
    }

    #[test]
    fn test_event_text_joins_description() {
        let mut req = EventRequest::new("Merger talks");
        assert_eq!(req.text(), "Merger talks");
        req.description = "Regulators review the deal".to_string();
        assert_eq!(req.text(), "Merger talks Regulators review the deal");
    }

    #[test]
    fn test_samples() {
        assert_eq!(RiskRequest::samples().len(), 2);
        assert_eq!(EventRequest::samples().len(), 3);
    }
}
