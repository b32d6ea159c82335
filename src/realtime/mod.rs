pub mod cache;
pub mod finnhub;
pub mod source;

pub use cache::QuoteCache;
pub use finnhub::FinnhubClient;
pub use source::{RealtimeData, RealtimeSource};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Quote;

/// Live quote feed. Any error is treated as an upstream failure by callers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote>;
}
