//! Cache-aside controller.
//!
//! Serves a query from the cache when a fresh, non-empty entry exists.
//! Otherwise fans out to every provider, finalizes the merged list and
//! writes it back in a background task the response never waits on.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::aggregator::{
    coordinator::{FanOutCoordinator, DEFAULT_CACHE_TIMEOUT},
    finalize::finalize,
    types::{FlightQuery, FlightQuote, SearchParams},
};
use crate::cache::QuoteCache;
use crate::error::AppError;
use crate::metrics::AppMetrics;

pub const DEFAULT_TTL: Duration = Duration::from_secs(900);

/// Result of consulting the cache for one query.
enum Lookup {
    Hit(Vec<FlightQuote>),
    Miss(&'static str),
}

pub struct FlightSearchService {
    cache: Arc<dyn QuoteCache>,
    coordinator: FanOutCoordinator,
    ttl: Option<Duration>,
    cache_timeout: Duration,
    max_results: Option<usize>,
    metrics: Option<Arc<AppMetrics>>,
}

impl FlightSearchService {
    pub fn new(cache: Arc<dyn QuoteCache>, coordinator: FanOutCoordinator) -> Self {
        Self {
            cache,
            coordinator,
            ttl: Some(DEFAULT_TTL),
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            max_results: None,
            metrics: None,
        }
    }

    /// Entry lifetime. `None` serves entries of any age.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    pub fn with_max_results(mut self, max_results: Option<usize>) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn cache(&self) -> &Arc<dyn QuoteCache> {
        &self.cache
    }

    /// Validate raw parameters, then search.
    ///
    /// Validation is the only failure; it happens before any I/O.
    pub async fn handle(&self, params: SearchParams) -> Result<Vec<FlightQuote>, AppError> {
        let query = params.validate()?;
        Ok(self.search(&query).await)
    }

    pub async fn search(&self, query: &FlightQuery) -> Vec<FlightQuote> {
        if let Some(metrics) = &self.metrics {
            metrics.searches_total.inc();
        }

        let outcome = match self.lookup(query).await {
            Lookup::Hit(quotes) => {
                self.record_lookup("hit");
                tracing::info!(
                    "Cache hit for {}->{} on {} ({} quotes)",
                    query.origin(),
                    query.destination(),
                    query.date_string(),
                    quotes.len()
                );
                return quotes;
            }
            Lookup::Miss(outcome) => outcome,
        };

        self.record_lookup(outcome);
        tracing::info!(
            "Cache {} for {}->{} on {}, querying {} providers",
            outcome,
            query.origin(),
            query.destination(),
            query.date_string(),
            self.coordinator.provider_count()
        );

        let quotes = finalize(self.coordinator.gather(query).await, self.max_results);
        self.store_in_background(query, &quotes);
        quotes
    }

    async fn lookup(&self, query: &FlightQuery) -> Lookup {
        let result = tokio::time::timeout(self.cache_timeout, self.cache.get(query)).await;

        match result {
            Ok(Ok(Some(entry))) if entry.quotes.is_empty() => Lookup::Miss("miss"),
            Ok(Ok(Some(entry))) => {
                if entry.is_fresh(self.chrono_ttl(), Utc::now()) {
                    Lookup::Hit(entry.quotes)
                } else {
                    Lookup::Miss("stale")
                }
            }
            Ok(Ok(None)) => Lookup::Miss("miss"),
            Ok(Err(err)) => {
                tracing::warn!(
                    "Cache lookup on {} backend failed: {}",
                    self.cache.backend_name(),
                    err
                );
                Lookup::Miss("error")
            }
            Err(_) => {
                tracing::warn!(
                    "Cache lookup on {} backend timed out after {}ms",
                    self.cache.backend_name(),
                    self.cache_timeout.as_millis()
                );
                Lookup::Miss("error")
            }
        }
    }

    /// Write `quotes` back without blocking the caller.
    fn store_in_background(&self, query: &FlightQuery, quotes: &[FlightQuote]) {
        if quotes.is_empty() {
            if let Some(metrics) = &self.metrics {
                metrics.cache_writes_total.with_label_values(&["skipped"]).inc();
            }
            return;
        }

        let cache = self.cache.clone();
        let metrics = self.metrics.clone();
        let timeout = self.cache_timeout;
        let query = query.clone();
        let quotes = quotes.to_vec();

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, cache.put(&query, &quotes)).await {
                Ok(Ok(())) => {
                    tracing::debug!(
                        "Cached {} quotes for {}->{} on {}",
                        quotes.len(),
                        query.origin(),
                        query.destination(),
                        query.date_string()
                    );
                    "ok"
                }
                Ok(Err(err)) => {
                    tracing::warn!("Cache write on {} backend failed: {}", cache.backend_name(), err);
                    "error"
                }
                Err(_) => {
                    tracing::warn!(
                        "Cache write on {} backend timed out after {}ms",
                        cache.backend_name(),
                        timeout.as_millis()
                    );
                    "error"
                }
            };
            if let Some(metrics) = &metrics {
                metrics.cache_writes_total.with_label_values(&[outcome]).inc();
            }
        });
    }

    fn chrono_ttl(&self) -> Option<chrono::Duration> {
        self.ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok())
    }

    fn record_lookup(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.cache_lookups_total.with_label_values(&[outcome]).inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::aggregator::{
        coordinator::ProviderTimeouts,
        error::{CacheError, ProviderError, ValidationError},
        provider::FlightProvider,
        types::CacheEntry,
    };
    use crate::cache::MemoryQuoteCache;
    use crate::services::mock::MockFlightProvider;

    fn query() -> FlightQuery {
        FlightQuery::parse("JFK", "LAX", "2025-06-01").unwrap()
    }

    fn quote(provider: &str, airline: &str, price: f64) -> FlightQuote {
        FlightQuote {
            provider: provider.into(),
            airline: airline.into(),
            origin: "JFK".into(),
            destination: "LAX".into(),
            date: query().date(),
            price: Some(price),
        }
    }

    /// A store that fails every call.
    struct BrokenCache;

    #[async_trait]
    impl QuoteCache for BrokenCache {
        fn backend_name(&self) -> &str {
            "broken"
        }

        async fn get(&self, _query: &FlightQuery) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }

        async fn put(&self, _query: &FlightQuery, _quotes: &[FlightQuote]) -> Result<(), CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }
    }

    /// A store that never answers in time.
    struct HangingCache;

    #[async_trait]
    impl QuoteCache for HangingCache {
        fn backend_name(&self) -> &str {
            "hanging"
        }

        async fn get(&self, _query: &FlightQuery) -> Result<Option<CacheEntry>, CacheError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }

        async fn put(&self, _query: &FlightQuery, _quotes: &[FlightQuote]) -> Result<(), CacheError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn service_with(
        cache: Arc<dyn QuoteCache>,
        providers: Vec<Arc<MockFlightProvider>>,
    ) -> FlightSearchService {
        let providers = providers
            .into_iter()
            .map(|p| p as Arc<dyn FlightProvider>)
            .collect();
        FlightSearchService::new(
            cache,
            FanOutCoordinator::new(providers, ProviderTimeouts::default()),
        )
    }

    /// Wait for the background write to land.
    async fn wait_for_entry(cache: &MemoryQuoteCache, query: &FlightQuery) -> CacheEntry {
        for _ in 0..100 {
            if let Some(entry) = cache.get(query).await.unwrap() {
                return entry;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cache entry was never written");
    }

    #[tokio::test]
    async fn fresh_hit_is_returned_without_provider_calls() {
        let cache = Arc::new(MemoryQuoteCache::default());
        let cached = vec![quote("google-flights", "Delta", 199.0)];
        cache.put(&query(), &cached).await.unwrap();

        let provider = Arc::new(MockFlightProvider::new("a").with_records(vec![json!({"price": 1})]));
        let service = service_with(cache, vec![provider.clone()]);

        let quotes = service.search(&query()).await;

        assert_eq!(quotes, cached);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn empty_cached_list_counts_as_miss() {
        let cache = Arc::new(MemoryQuoteCache::default());
        cache.put(&query(), &[]).await.unwrap();

        let provider = Arc::new(
            MockFlightProvider::new("a").with_records(vec![json!({"airline": "Delta", "price": 10})]),
        );
        let service = service_with(cache, vec![provider.clone()]);

        let quotes = service.search(&query()).await;

        assert_eq!(quotes.len(), 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn stale_entry_triggers_fan_out() {
        let cache = Arc::new(MemoryQuoteCache::default());
        cache
            .insert(CacheEntry {
                query: query(),
                quotes: vec![quote("old", "Delta", 999.0)],
                written_at: Some(Utc::now() - chrono::Duration::hours(2)),
            })
            .await;

        let provider = Arc::new(
            MockFlightProvider::new("fresh").with_records(vec![json!({"airline": "Delta", "price": 150})]),
        );
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let service = service_with(cache.clone(), vec![provider.clone()])
            .with_ttl(Some(Duration::from_secs(60)))
            .with_metrics(metrics.clone());

        let quotes = service.search(&query()).await;

        assert_eq!(provider.calls(), 1);
        assert_eq!(quotes[0].provider, "fresh");
        let stale = metrics.cache_lookups_total.with_label_values(&["stale"]).get();
        assert!((stale - 1.0).abs() < f64::EPSILON);

        for _ in 0..100 {
            let entry = wait_for_entry(&cache, &query()).await;
            if entry.quotes[0].provider == "fresh" {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("stale entry was not replaced");
    }

    #[tokio::test]
    async fn ttl_disabled_serves_old_entries() {
        let cache = Arc::new(MemoryQuoteCache::default());
        cache
            .insert(CacheEntry {
                query: query(),
                quotes: vec![quote("old", "Delta", 999.0)],
                written_at: Some(Utc::now() - chrono::Duration::days(30)),
            })
            .await;
        let provider = Arc::new(MockFlightProvider::new("p"));
        let service = service_with(cache, vec![provider.clone()]).with_ttl(None);

        let quotes = service.search(&query()).await;

        assert_eq!(quotes[0].provider, "old");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn broken_cache_degrades_to_miss_and_still_answers() {
        let provider = Arc::new(
            MockFlightProvider::new("a").with_records(vec![json!({"airline": "Delta", "price": 120})]),
        );
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let service =
            service_with(Arc::new(BrokenCache), vec![provider]).with_metrics(metrics.clone());

        let quotes = service.search(&query()).await;

        assert_eq!(quotes.len(), 1);
        let errors = metrics.cache_lookups_total.with_label_values(&["error"]).get();
        assert!((errors - 1.0).abs() < f64::EPSILON);

        for _ in 0..100 {
            if metrics.cache_writes_total.with_label_values(&["error"]).get() > 0.0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("failed cache write was not recorded");
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_cache_is_bounded_by_timeout() {
        let provider = Arc::new(
            MockFlightProvider::new("a").with_records(vec![json!({"airline": "Delta", "price": 120})]),
        );
        let service = service_with(Arc::new(HangingCache), vec![provider.clone()])
            .with_cache_timeout(Duration::from_secs(5));

        let quotes = service.search(&query()).await;

        assert_eq!(quotes.len(), 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn all_providers_failing_yields_empty_and_skips_write() {
        let cache = Arc::new(MemoryQuoteCache::default());
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let service = service_with(
            cache.clone(),
            vec![
                Arc::new(MockFlightProvider::new("a").with_error(ProviderError::timeout("t"))),
                Arc::new(MockFlightProvider::new("b").with_error(ProviderError::http(503, "down"))),
            ],
        )
        .with_metrics(metrics.clone());

        let quotes = service.search(&query()).await;

        assert!(quotes.is_empty());
        assert!(cache.is_empty().await);
        let skipped = metrics.cache_writes_total.with_label_values(&["skipped"]).get();
        assert!((skipped - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn handle_rejects_invalid_params_before_any_io() {
        let provider = Arc::new(MockFlightProvider::new("a"));
        let service = service_with(Arc::new(BrokenCache), vec![provider.clone()]);

        let params = SearchParams {
            origin: Some("JFK".into()),
            destination: None,
            travel_date: Some("2025-06-01".into()),
        };
        let err = service.handle(params).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Validation(ValidationError::MissingParameters { .. })
        ));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn max_results_caps_merged_list() {
        let provider = Arc::new(MockFlightProvider::new("a").with_records(vec![
            json!({"airline": "A", "price": 300}),
            json!({"airline": "B", "price": 100}),
            json!({"airline": "C", "price": 200}),
        ]));
        let service = service_with(Arc::new(MemoryQuoteCache::default()), vec![provider])
            .with_max_results(Some(2));

        let quotes = service.search(&query()).await;

        let prices: Vec<_> = quotes.iter().map(|q| q.price).collect();
        assert_eq!(prices, vec![Some(100.0), Some(200.0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn jfk_to_lax_scenario_merges_dedups_and_caches() {
        let cache = Arc::new(MemoryQuoteCache::default());
        let relayed = |airline: &str, price: f64| {
            json!({ "provider": "scraper1", "airline": airline, "price": price })
        };
        let a = Arc::new(
            MockFlightProvider::new("flight-cache")
                .relaying()
                .with_records(vec![relayed("Delta", 300.0)]),
        );
        let b = Arc::new(
            MockFlightProvider::new("flight-search")
                .relaying()
                .with_records(vec![relayed("Delta", 300.0), relayed("Delta", 250.0)]),
        );
        let c = Arc::new(
            MockFlightProvider::new("slow")
                .with_records(vec![json!({"airline": "United", "price": 1})])
                .with_delay(Duration::from_secs(120)),
        );
        let service = service_with(cache.clone(), vec![a, b, c]);

        let quotes = service.search(&query()).await;

        let prices: Vec<_> = quotes.iter().map(|q| q.price).collect();
        assert_eq!(prices, vec![Some(250.0), Some(300.0)]);
        assert!(quotes.iter().all(|q| q.provider == "scraper1"));

        let entry = wait_for_entry(&cache, &query()).await;
        assert_eq!(entry.quotes, quotes);
    }
}
