//! Concurrent fan-out across every configured provider.
//!
//! Each provider call runs as its own tokio task under its own timeout. The
//! coordinator waits for all of them, keeps the successes in dispatch order
//! and turns every failure into a log line and a metric.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::aggregator::{
    error::ProviderError,
    finalize::finalize,
    normalizer::normalize,
    provider::{FlightProvider, ProviderKind},
    types::{FlightQuery, FlightQuote},
};
use crate::metrics::AppMetrics;

pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-kind timeout budget for provider calls.
#[derive(Debug, Clone, Copy)]
pub struct ProviderTimeouts {
    pub cache: Duration,
    pub external: Duration,
}

impl ProviderTimeouts {
    pub fn for_kind(&self, kind: ProviderKind) -> Duration {
        match kind {
            ProviderKind::Cache => self.cache,
            ProviderKind::External => self.external,
        }
    }
}

impl Default for ProviderTimeouts {
    fn default() -> Self {
        Self {
            cache: DEFAULT_CACHE_TIMEOUT,
            external: DEFAULT_EXTERNAL_TIMEOUT,
        }
    }
}

pub struct FanOutCoordinator {
    providers: Vec<Arc<dyn FlightProvider>>,
    timeouts: ProviderTimeouts,
    metrics: Option<Arc<AppMetrics>>,
}

impl FanOutCoordinator {
    pub fn new(providers: Vec<Arc<dyn FlightProvider>>, timeouts: ProviderTimeouts) -> Self {
        Self {
            providers,
            timeouts,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Query every provider and return the concatenated normalized quotes.
    ///
    /// Never fails: a provider error only reduces coverage.
    pub async fn gather(&self, query: &FlightQuery) -> Vec<FlightQuote> {
        let handles: Vec<(String, JoinHandle<Result<Vec<FlightQuote>, ProviderError>>)> = self
            .providers
            .iter()
            .map(|provider| {
                let name = provider.provider_name().to_string();
                let handle = tokio::spawn(call_provider(
                    provider.clone(),
                    query.clone(),
                    self.timeouts.for_kind(provider.kind()),
                    self.metrics.clone(),
                ));
                (name, handle)
            })
            .collect();

        let mut merged = Vec::new();
        let mut failed = 0usize;
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(quotes)) => {
                    tracing::debug!("Provider {} returned {} quotes", name, quotes.len());
                    merged.extend(quotes);
                }
                Ok(Err(err)) => {
                    failed += 1;
                    tracing::warn!("Provider {} failed: {}", name, err);
                }
                Err(join_err) => {
                    failed += 1;
                    tracing::error!("Provider {} task aborted: {}", name, join_err);
                    self.record_outcome(&name, "panic");
                }
            }
        }

        tracing::info!(
            "Fan-out for {}->{} on {}: {} quotes, {}/{} providers failed",
            query.origin(),
            query.destination(),
            query.date_string(),
            merged.len(),
            failed,
            self.providers.len()
        );

        merged
    }

    fn record_outcome(&self, provider: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics
                .provider_calls_total
                .with_label_values(&[provider, outcome])
                .inc();
        }
    }
}

/// One provider call: search under a timeout, then normalize.
async fn call_provider(
    provider: Arc<dyn FlightProvider>,
    query: FlightQuery,
    timeout: Duration,
    metrics: Option<Arc<AppMetrics>>,
) -> Result<Vec<FlightQuote>, ProviderError> {
    let name = provider.provider_name().to_string();
    let started = Instant::now();

    let outcome = match tokio::time::timeout(timeout, provider.search(&query)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::timeout(format!(
            "no response within {}ms",
            timeout.as_millis()
        ))),
    };

    if let Some(metrics) = &metrics {
        let label = match &outcome {
            Ok(_) => "success",
            Err(err) => err.kind().as_label(),
        };
        metrics
            .provider_calls_total
            .with_label_values(&[name.as_str(), label])
            .inc();
        metrics
            .provider_call_duration
            .with_label_values(&[name.as_str()])
            .observe(started.elapsed().as_secs_f64());
    }

    let raw = outcome?;
    let quotes: Vec<FlightQuote> = raw
        .iter()
        .map(|record| normalize(provider.attribution(record), &query, record))
        .collect();
    Ok(match provider.result_limit() {
        Some(limit) => finalize(quotes, Some(limit)),
        None => quotes,
    })
}
