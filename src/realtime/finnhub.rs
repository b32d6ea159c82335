use async_trait::async_trait;
use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use tracing::debug;

use super::QuoteProvider;
use crate::config::RealtimeSettings;
use crate::error::{ForecastError, Result};
use crate::types::Quote;

/// Finnhub `/quote` client with a request timeout and a per-minute budget.
pub struct FinnhubClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    limiter: DefaultDirectRateLimiter,
}

impl FinnhubClient {
    pub fn new(settings: &RealtimeSettings) -> Result<Self> {
        let per_minute = NonZeroU32::new(settings.max_requests_per_minute).ok_or_else(|| {
            ForecastError::Config("realtime.max_requests_per_minute must be > 0".to_string())
        })?;

        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ForecastError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }
}

#[async_trait]
impl QuoteProvider for FinnhubClient {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
        let Some(api_key) = &self.api_key else {
            return Err(ForecastError::UpstreamUnavailable("no quote API key configured".to_string()));
        };
        if self.limiter.check().is_err() {
            return Err(ForecastError::UpstreamUnavailable("quote API rate limit reached".to_string()));
        }

        let url = format!("{}/quote", self.base_url);
        debug!("Fetching quote for {}", symbol);

        let resp: FinnhubQuote = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("token", api_key.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(upstream)?
            .json()
            .await
            .map_err(upstream)?;

        resp.into_quote(symbol)
    }
}

fn upstream(e: reqwest::Error) -> ForecastError {
    // Strip the URL: it carries the API token.
    ForecastError::UpstreamUnavailable(e.without_url().to_string())
}

/// Finnhub quote payload
#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    c: Option<f64>,
    h: Option<f64>,
    l: Option<f64>,
    o: Option<f64>,
    pc: Option<f64>,
}

impl FinnhubQuote {
    fn into_quote(self, symbol: &str) -> Result<Quote> {
        // Unknown symbols come back as all zeros.
        let current_price = match self.c {
            Some(c) if c.is_finite() && c != 0.0 => c,
            _ => {
                return Err(ForecastError::UpstreamUnavailable(format!(
                    "no price returned for {}",
                    symbol
                )))
            }
        };

        Ok(Quote {
            symbol: symbol.to_string(),
            current_price,
            high: self.h.unwrap_or(current_price),
            low: self.l.unwrap_or(current_price),
            open: self.o.unwrap_or(current_price),
            previous_close: self.pc.unwrap_or(current_price),
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_parse_quote_payload() {
        let payload: FinnhubQuote =
            serde_json::from_str(r#"{"c": 187.2, "h": 189.0, "l": 185.5, "o": 186.0, "pc": 185.9, "t": 1700000000}"#)
                .unwrap();
        let quote = payload.into_quote("AAPL").unwrap();
        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.current_price, 187.2);
        assert_eq!(quote.previous_close, 185.9);
    }

    #[test]
    fn test_zero_price_is_upstream_failure() {
        let payload: FinnhubQuote =
            serde_json::from_str(r#"{"c": 0, "h": 0, "l": 0, "o": 0, "pc": 0}"#).unwrap();
        assert!(matches!(payload.into_quote("NOPE"), Err(ForecastError::UpstreamUnavailable(_))));

        let payload: FinnhubQuote = serde_json::from_str(r#"{}"#).unwrap();
        assert!(payload.into_quote("NOPE").is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = assert_ok!(FinnhubClient::new(&RealtimeSettings::default()));
        let err = assert_err!(client.fetch_quote("AAPL").await);
        assert!(matches!(err, ForecastError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_upstream_failure() {
        let settings = RealtimeSettings {
            api_key: Some("test".to_string()),
            // Nothing listens here; only the rate limiter is exercised.
            api_base_url: "http://127.0.0.1:9".to_string(),
            max_requests_per_minute: 1,
            request_timeout_ms: 200,
            ..RealtimeSettings::default()
        };
        let client = FinnhubClient::new(&settings).unwrap();

        let _ = client.fetch_quote("AAPL").await;
        let err = client.fetch_quote("AAPL").await.unwrap_err();
        assert!(err.to_string().contains("rate limit"));
    }
}
