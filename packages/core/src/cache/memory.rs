//! In-memory quote cache.
//!
//! Holds at most `capacity` queries. When full, the oldest inserted query is
//! evicted before a new one is stored (FIFO, backed by `VecDeque`).
//! Overwriting an existing query refreshes its timestamp but not its
//! eviction position.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::QuoteCache;
use crate::aggregator::{
    error::CacheError,
    types::{CacheEntry, FlightQuery, FlightQuote},
};

/// Default maximum number of queries retained in memory.
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Default)]
struct Entries {
    by_query: HashMap<FlightQuery, CacheEntry>,
    insertion_order: VecDeque<FlightQuery>,
}

#[derive(Debug)]
pub struct MemoryQuoteCache {
    entries: RwLock<Entries>,
    capacity: usize,
}

impl MemoryQuoteCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    /// Store an entry with an explicit timestamp.
    pub async fn insert(&self, entry: CacheEntry) {
        let mut entries = self.entries.write().await;

        if !entries.by_query.contains_key(&entry.query) {
            if entries.insertion_order.len() >= self.capacity {
                if let Some(oldest) = entries.insertion_order.pop_front() {
                    entries.by_query.remove(&oldest);
                }
            }
            entries.insertion_order.push_back(entry.query.clone());
        }
        entries.by_query.insert(entry.query.clone(), entry);
    }
}

#[cfg(test)]
impl MemoryQuoteCache {
    pub(crate) async fn len(&self) -> usize {
        self.entries.read().await.by_query.len()
    }

    pub(crate) async fn is_empty(&self) -> bool {
        self.entries.read().await.by_query.is_empty()
    }
}

impl Default for MemoryQuoteCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl QuoteCache for MemoryQuoteCache {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn get(&self, query: &FlightQuery) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.by_query.get(query).cloned())
    }

    async fn put(&self, query: &FlightQuery, quotes: &[FlightQuote]) -> Result<(), CacheError> {
        self.insert(CacheEntry {
            query: query.clone(),
            quotes: quotes.to_vec(),
            written_at: Some(Utc::now()),
        })
        .await;
        Ok(())
    }
}
