use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Canonical ticker form shared by the quote cache and the tracker.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Point-in-time market snapshot for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub current_price: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub previous_close: f64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// Fresh while strictly younger than `ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }

    pub fn change(&self) -> f64 {
        self.current_price - self.previous_close
    }

    pub fn change_pct(&self) -> f64 {
        if self.previous_close == 0.0 {
            return 0.0;
        }
        self.change() / self.previous_close * 100.0
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn intraday_range_pct(&self) -> f64 {
        if self.previous_close == 0.0 {
            return 0.0;
        }
        self.range() / self.previous_close * 100.0
    }
}
