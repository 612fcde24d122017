//! Scripted in-process provider for unit and router tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::flight_service::relayed_provider;
use crate::aggregator::{
    error::ProviderError,
    provider::{FlightProvider, ProviderKind, ProviderResult},
    types::{FlightQuery, RawFlight},
};

pub struct MockFlightProvider {
    name: String,
    kind: ProviderKind,
    limit: Option<usize>,
    records: Vec<RawFlight>,
    error: Option<ProviderError>,
    delay: Option<Duration>,
    relay: bool,
    calls: AtomicUsize,
}

impl MockFlightProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ProviderKind::External,
            limit: None,
            records: Vec::new(),
            error: None,
            delay: None,
            relay: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_records(mut self, records: Vec<RawFlight>) -> Self {
        self.records = records;
        self
    }

    pub fn with_error(mut self, error: ProviderError) -> Self {
        self.error = Some(error);
        self
    }

    /// Sleep before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Attribute quotes to the `provider` field carried by each record.
    pub fn relaying(mut self) -> Self {
        self.relay = true;
        self
    }

    /// Number of times `search` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlightProvider for MockFlightProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn result_limit(&self) -> Option<usize> {
        self.limit
    }

    fn attribution<'a>(&'a self, record: &'a RawFlight) -> &'a str {
        if self.relay {
            relayed_provider(record).unwrap_or(&self.name)
        } else {
            &self.name
        }
    }

    async fn search(&self, _query: &FlightQuery) -> ProviderResult {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(self.records.clone()),
        }
    }
}
