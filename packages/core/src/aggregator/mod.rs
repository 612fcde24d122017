//! Query aggregation engine.
//!
//! A validated [`FlightQuery`] goes through [`FlightSearchService`], which
//! consults the quote cache and on a miss asks [`FanOutCoordinator`] to
//! query every [`FlightProvider`] concurrently. Raw records are mapped by the
//! normalizer and the merged list is deduplicated and price-sorted by
//! [`finalize`].

pub mod coordinator;
pub mod error;
pub mod finalize;
pub mod normalizer;
pub mod polling;
pub mod provider;
pub mod service;
pub mod types;

pub use coordinator::{FanOutCoordinator, ProviderTimeouts};
pub use error::{CacheError, ProviderError, ValidationError};
pub use finalize::finalize;
pub use polling::{drive_search, IncrementalSearch, PollingPolicy};
pub use provider::{FlightProvider, ProviderKind};
pub use service::FlightSearchService;
pub use types::{CacheEntry, FlightQuery, FlightQuote, SearchParams};
