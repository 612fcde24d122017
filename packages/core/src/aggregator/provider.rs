//! Flight Provider Interface
//!
//! Provides abstraction layer over heterogeneous flight data sources

use async_trait::async_trait;

use crate::aggregator::{
    error::ProviderError,
    types::{FlightQuery, RawFlight},
};

/// Result type for provider operations
pub type ProviderResult<T = Vec<RawFlight>> = Result<T, ProviderError>;

/// How a provider is expected to behave, which decides its timeout budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Backed by a cache; expected to answer within seconds.
    Cache,
    /// External data source; slower and less reliable.
    External,
}

/// One flight data source. Implementations own their request and response
/// contract and must turn every failure into a [`ProviderError`].
#[async_trait]
pub trait FlightProvider: Send + Sync {
    /// Stable identifier stamped on every quote from this provider.
    fn provider_name(&self) -> &str;

    fn kind(&self) -> ProviderKind {
        ProviderKind::External
    }

    /// Top-K policy applied to this provider's normalized quotes.
    fn result_limit(&self) -> Option<usize> {
        None
    }

    /// Provider name recorded on the quote built from `record`.
    ///
    /// Services that relay other providers' records override this to keep
    /// the attribution carried by each record.
    fn attribution<'a>(&'a self, _record: &'a RawFlight) -> &'a str {
        self.provider_name()
    }

    /// Run one search and return the provider's raw records.
    async fn search(&self, query: &FlightQuery) -> ProviderResult;
}
