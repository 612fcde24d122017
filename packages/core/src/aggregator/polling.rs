//! Bounded polling for providers whose search runs asynchronously.
//!
//! The provider's first answer may be `incomplete` with a session token.
//! [`drive_search`] keeps asking for the rest until the provider says it is
//! done, the token disappears, the retry budget runs out or the time budget
//! is spent. Whatever data is held at that point is returned, partial or not.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use serde_json::Value;

use crate::aggregator::{error::ProviderError, provider::ProviderResult, types::FlightQuery};
use crate::metrics::AppMetrics;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    Complete,
    Incomplete,
}

impl SearchStatus {
    /// Anything other than an explicit `"incomplete"` counts as complete.
    pub fn from_wire(status: Option<&str>) -> Self {
        match status {
            Some(s) if s.eq_ignore_ascii_case("incomplete") => SearchStatus::Incomplete,
            _ => SearchStatus::Complete,
        }
    }
}

/// One response from an asynchronous search endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub status: SearchStatus,
    pub session_id: Option<String>,
    pub data: Value,
}

/// Continuation state held between polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSession {
    pub session_id: String,
    pub status: SearchStatus,
    pub attempts_used: u32,
}

/// Where the driver ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct DrivenSearch {
    pub data: Value,
    pub status: SearchStatus,
    pub polls: u32,
}

/// A provider search that can be started and then resumed by session id.
#[async_trait]
pub trait IncrementalSearch: Send + Sync {
    async fn start(&self, query: &FlightQuery) -> ProviderResult<SearchPage>;

    async fn resume(&self, session_id: &str) -> ProviderResult<SearchPage>;
}

#[derive(Debug, Clone, Copy)]
pub struct PollingPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    /// Wall-clock limit for the whole search, initial call included.
    pub time_budget: Option<Duration>,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
            time_budget: None,
        }
    }
}

impl PollingPolicy {
    /// Budget the search to finish inside a caller's `timeout`, leaving a
    /// tenth of it so partial data is handed back before the caller gives up.
    pub fn fitted_to(mut self, timeout: Duration) -> Self {
        self.time_budget = Some(timeout.saturating_sub(timeout / 10));
        self
    }
}

/// Run a search to its terminal state.
///
/// Only a failure of the initial call is an error. Failed polls are logged
/// and consume an attempt. Once the time budget is spent the driver stops
/// waiting and returns the data it holds.
pub async fn drive_search<S>(
    search: &S,
    query: &FlightQuery,
    policy: PollingPolicy,
    metrics: Option<&AppMetrics>,
) -> ProviderResult<DrivenSearch>
where
    S: IncrementalSearch + ?Sized,
{
    let deadline = policy.time_budget.map(|budget| Instant::now() + budget);

    let first = match deadline {
        Some(at) => tokio::time::timeout_at(at, search.start(query))
            .await
            .map_err(|_| ProviderError::timeout("initial search exceeded the time budget"))??,
        None => search.start(query).await?,
    };
    let mut data = first.data;

    let mut session = match (first.status, first.session_id) {
        (SearchStatus::Incomplete, Some(session_id)) => SearchSession {
            session_id,
            status: SearchStatus::Incomplete,
            attempts_used: 0,
        },
        (status, _) => {
            return Ok(DrivenSearch {
                data,
                status,
                polls: 0,
            })
        }
    };

    loop {
        if session.attempts_used >= policy.max_retries {
            tracing::warn!(
                "Search session {} still incomplete after {} polls, using partial data",
                session.session_id,
                session.attempts_used
            );
            break;
        }

        if deadline.is_some_and(|at| Instant::now() + policy.backoff >= at) {
            tracing::warn!(
                "Search session {} out of time after {} polls, using partial data",
                session.session_id,
                session.attempts_used
            );
            break;
        }

        session.attempts_used += 1;
        tokio::time::sleep(policy.backoff).await;
        if let Some(metrics) = metrics {
            metrics.search_polls_total.inc();
        }

        tracing::debug!(
            "Polling incomplete search, attempt {}, sessionId={}",
            session.attempts_used,
            session.session_id
        );

        let poll = match deadline {
            Some(at) => tokio::time::timeout_at(at, search.resume(&session.session_id))
                .await
                .unwrap_or_else(|_| Err(ProviderError::timeout("poll exceeded the time budget"))),
            None => search.resume(&session.session_id).await,
        };

        match poll {
            Ok(page) => {
                data = page.data;
                session.status = page.status;
                match page.session_id {
                    Some(next) if session.status == SearchStatus::Incomplete => {
                        session.session_id = next;
                    }
                    _ => break,
                }
            }
            Err(err) => {
                tracing::warn!("Polling attempt {} failed: {}", session.attempts_used, err);
            }
        }
    }

    Ok(DrivenSearch {
        data,
        status: session.status,
        polls: session.attempts_used,
    })
}
