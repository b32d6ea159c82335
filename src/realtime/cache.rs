use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::Quote;

const QUOTES_TREE: &str = "quotes";

/// Result of a cache read. A stale entry never exposes its price.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CacheLookup {
    Fresh(Quote),
    Stale {
        symbol: String,
        as_of: DateTime<Utc>,
        age_secs: i64,
    },
    Absent,
}

/// Last-known quote per symbol, stored one key per symbol.
pub struct QuoteCache {
    db: sled::Db,
    quotes: sled::Tree,
    ttl: Duration,
}

impl QuoteCache {
    pub fn open(path: &Path, ttl: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path)?;
        info!("Quote cache opened at {} (ttl {}s)", path.display(), ttl.num_seconds());
        Self::from_db(db, ttl)
    }

    /// Throwaway cache removed on drop.
    pub fn temporary(ttl: Duration) -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, ttl)
    }

    fn from_db(db: sled::Db, ttl: Duration) -> Result<Self> {
        let quotes = db.open_tree(QUOTES_TREE)?;
        Ok(Self { db, quotes, ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Overwrite the entry for the quote's symbol and flush before returning.
    pub fn put(&self, quote: &Quote) -> Result<()> {
        let value = serde_json::to_vec(quote)?;
        self.quotes.insert(quote.symbol.as_bytes(), value)?;
        self.quotes.flush()?;
        debug!("Cached quote for {} at {}", quote.symbol, quote.timestamp);
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> CacheLookup {
        self.get_at(symbol, Utc::now())
    }

    pub fn get_at(&self, symbol: &str, now: DateTime<Utc>) -> CacheLookup {
        let Some(quote) = self.read(symbol) else {
            return CacheLookup::Absent;
        };

        if quote.is_fresh(now, self.ttl) {
            CacheLookup::Fresh(quote)
        } else {
            let age_secs = quote.age(now).num_seconds();
            CacheLookup::Stale {
                symbol: quote.symbol,
                as_of: quote.timestamp,
                age_secs,
            }
        }
    }

    /// Read failures degrade to a miss.
    fn read(&self, symbol: &str) -> Option<Quote> {
        let bytes = match self.quotes.get(symbol.as_bytes()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Quote cache read failed for {}: {}", symbol, e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(quote) => Some(quote),
            Err(e) => {
                warn!("Corrupt cached quote for {}: {}", symbol, e);
                None
            }
        }
    }

    /// Drop entries past TTL (and unreadable ones). Returns how many were removed.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for item in self.quotes.iter() {
            let (key, value) = item?;
            let fresh = serde_json::from_slice::<Quote>(&value)
                .map(|q| q.is_fresh(now, self.ttl))
                .unwrap_or(false);
            if !fresh && self.remove_if_unchanged(&key, &value)? {
                removed += 1;
            }
        }
        if removed > 0 {
            self.db.flush()?;
            info!("Purged {} expired quotes", removed);
        }
        Ok(removed)
    }

    pub fn purge_expired(&self) -> Result<usize> {
        self.purge_expired_at(Utc::now())
    }

    /// Remove `key` only if it still holds `seen`; a concurrent `put` survives.
    fn remove_if_unchanged(&self, key: &[u8], seen: &[u8]) -> Result<bool> {
        let swapped = self.quotes.compare_and_swap(key, Some(seen), None::<&[u8]>)?;
        Ok(swapped.is_ok())
    }
}
