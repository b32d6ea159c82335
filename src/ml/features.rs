use serde::{Deserialize, Serialize};

use crate::error::{ensure_finite, Result};
use crate::types::{EventRequest, Quote, RiskRequest};

/// Keyword weights for event text, matched as lower-case substrings.
pub const KEYWORD_WEIGHTS: [(&str, f64); 9] = [
    ("earnings", 0.8),
    ("inflation", 0.7),
    ("rate hike", 0.9),
    ("war", 1.0),
    ("merger", 0.6),
    ("acquisition", 0.6),
    ("bankruptcy", 1.0),
    ("lawsuit", 0.7),
    ("regulation", 0.5),
];

pub const KEYWORD_BASELINE: f64 = 0.3;

/// Fixed-size feature vector for event-impact scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventFeatures {
    pub keyword_strength: f64,
    pub sentiment: f64,
    pub volatility: f64,
}

impl EventFeatures {
    pub const NUM_FEATURES: usize = 3;

    pub fn to_array(&self) -> [f64; Self::NUM_FEATURES] {
        [self.keyword_strength, self.sentiment, self.volatility]
    }
}

/// Fixed-size feature vector for risk scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFeatures {
    pub volatility: f64,
    pub sentiment: f64,
    pub liquidity: f64,
    pub event_severity: f64,
}

impl RiskFeatures {
    pub const NUM_FEATURES: usize = 4;

    pub fn to_array(&self) -> [f64; Self::NUM_FEATURES] {
        [self.volatility, self.sentiment, self.liquidity, self.event_severity]
    }
}

/// Strongest matching keyword weight, never below the baseline.
pub fn keyword_strength(text: &str) -> f64 {
    let lower = text.to_lowercase();
    KEYWORD_WEIGHTS
        .iter()
        .filter(|(word, _)| lower.contains(word))
        .map(|(_, weight)| *weight)
        .fold(KEYWORD_BASELINE, f64::max)
}

pub fn project_event(req: &EventRequest) -> Result<EventFeatures> {
    Ok(EventFeatures {
        keyword_strength: keyword_strength(&req.text()),
        sentiment: ensure_finite("sentiment", req.sentiment.unwrap_or(0.0))?,
        volatility: ensure_finite("volatility", req.volatility.unwrap_or(0.0))?,
    })
}

/// Build risk features. Volatility falls back to the quote's intraday range, then to 0.
pub fn project_risk(req: &RiskRequest, quote: Option<&Quote>) -> Result<RiskFeatures> {
    ensure_finite("price", req.price)?;
    ensure_finite("volume", req.volume)?;
    if let Some(m) = req.macro_index {
        ensure_finite("macro_index", m)?;
    }

    let volatility = match req.volatility {
        Some(v) => v,
        None => quote.and_then(quote_volatility).unwrap_or(0.0),
    };

    Ok(RiskFeatures {
        volatility: ensure_finite("volatility", volatility)?,
        sentiment: ensure_finite("sentiment", req.sentiment.unwrap_or(0.0))?,
        liquidity: ensure_finite("liquidity", req.liquidity.unwrap_or(0.0))?,
        event_severity: ensure_finite("event_severity", req.event_severity.unwrap_or(0.0))?,
    })
}

/// Intraday range relative to the previous close.
pub fn quote_volatility(quote: &Quote) -> Option<f64> {
    if quote.previous_close > 0.0 {
        let v = quote.range() / quote.previous_close;
        v.is_finite().then_some(v)
    } else {
        None
    }
}

/// Engineered features of the last point of a closing-price series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesFeatures {
    pub last_return: f64,
    pub log_return: f64,
    pub ma_5: f64,
    pub ma_10: f64,
    pub volatility_5: f64,
}

impl SeriesFeatures {
    pub const NUM_FEATURES: usize = 5;

    pub fn to_array(&self) -> [f64; Self::NUM_FEATURES] {
        [self.last_return, self.log_return, self.ma_5, self.ma_10, self.volatility_5]
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation
fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Needs at least 10 closes and a non-zero previous close. `None` when any feature is not finite.
pub fn series_features(closes: &[f64]) -> Option<SeriesFeatures> {
    if closes.len() < 10 || closes.iter().any(|c| !c.is_finite()) {
        return None;
    }
    let n = closes.len();
    let prev = closes[n - 2];
    if prev == 0.0 {
        return None;
    }

    let last_return = closes[n - 1] / prev - 1.0;
    let last_5 = &closes[n - 5..];

    let features = SeriesFeatures {
        last_return,
        log_return: last_return.ln_1p(),
        ma_5: mean(last_5),
        ma_10: mean(&closes[n - 10..]),
        volatility_5: std_dev(last_5),
    };
    features.to_array().iter().all(|v| v.is_finite()).then_some(features)
}
