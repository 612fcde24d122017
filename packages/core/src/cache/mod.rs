//! Quote cache stores.
//!
//! The cache-aside controller only sees [`QuoteCache`]. Three backends are
//! available:
//! - [`memory::MemoryQuoteCache`]: bounded in-process map
//! - [`sqlite::SqliteQuoteCache`]: SQLite via `sqlx`
//! - [`http::HttpQuoteCache`]: an external cache service over HTTP

pub mod http;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::aggregator::{
    error::CacheError,
    types::{CacheEntry, FlightQuery, FlightQuote},
};

pub use http::HttpQuoteCache;
pub use memory::MemoryQuoteCache;
pub use sqlite::SqliteQuoteCache;

/// Provider recorded for stored rows that do not name one.
pub const UNATTRIBUTED_PROVIDER: &str = "flight-cache";

#[async_trait]
pub trait QuoteCache: Send + Sync {
    /// Short name used in logs.
    fn backend_name(&self) -> &str;

    /// Look up the entry for `query`. `Ok(None)` is a miss.
    async fn get(&self, query: &FlightQuery) -> Result<Option<CacheEntry>, CacheError>;

    /// Replace the entry for `query` with `quotes`.
    async fn put(&self, query: &FlightQuery, quotes: &[FlightQuote]) -> Result<(), CacheError>;
}
