use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache::{CacheLookup, QuoteCache};
use super::QuoteProvider;
use crate::error::Result;
use crate::types::{normalize_symbol, Quote};

/// Outcome of a realtime lookup. "No recent data" is a result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RealtimeData {
    Live(Quote),
    Cached(Quote),
    NoRecentData { symbol: String, message: String },
}

impl RealtimeData {
    pub fn quote(&self) -> Option<&Quote> {
        match self {
            RealtimeData::Live(q) | RealtimeData::Cached(q) => Some(q),
            RealtimeData::NoRecentData { .. } => None,
        }
    }

    pub fn into_quote(self) -> Option<Quote> {
        match self {
            RealtimeData::Live(q) | RealtimeData::Cached(q) => Some(q),
            RealtimeData::NoRecentData { .. } => None,
        }
    }
}

/// Live fetch with fallback to the last cached quote.
pub struct RealtimeSource {
    provider: Arc<dyn QuoteProvider>,
    cache: QuoteCache,
}

impl RealtimeSource {
    pub fn new(provider: Arc<dyn QuoteProvider>, cache: QuoteCache) -> Self {
        Self { provider, cache }
    }

    pub fn cache(&self) -> &QuoteCache {
        &self.cache
    }

    /// A live quote is cached before it is returned; a cache write failure is surfaced.
    pub async fn get_data(&self, symbol: &str) -> Result<RealtimeData> {
        let symbol = normalize_symbol(symbol);

        match self.provider.fetch_quote(&symbol).await {
            Ok(quote) => {
                debug!(
                    "{} live at {:.2} ({:+.2}%, range {:.2}%)",
                    symbol,
                    quote.current_price,
                    quote.change_pct(),
                    quote.intraday_range_pct()
                );
                self.cache.put(&quote)?;
                Ok(RealtimeData::Live(quote))
            }
            Err(e) => {
                warn!("Failed to fetch real-time data for {}: {}", symbol, e);
                Ok(self.from_cache(&symbol))
            }
        }
    }

    fn from_cache(&self, symbol: &str) -> RealtimeData {
        match self.cache.get(symbol) {
            CacheLookup::Fresh(quote) => RealtimeData::Cached(quote),
            CacheLookup::Stale { age_secs, .. } => {
                info!("Cache expired for {} ({}s old)", symbol, age_secs);
                no_recent_data(symbol)
            }
            CacheLookup::Absent => no_recent_data(symbol),
        }
    }

    /// Best available quote for feature construction, if any.
    pub async fn latest_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        Ok(self.get_data(symbol).await?.into_quote())
    }
}

fn no_recent_data(symbol: &str) -> RealtimeData {
    RealtimeData::NoRecentData {
        symbol: symbol.to_string(),
        message: format!("No recent data for {}", symbol),
    }
}
