//! Flights Sky search via RapidAPI (`flights-sky`).
//!
//! This backend answers the first request with a partial result and a
//! `sessionId`; the remainder is fetched from `/flights/search-incomplete`.
//! The polling itself is handled by [`drive_search`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use super::http::{build_client, expect_records, fetch_json};
use crate::aggregator::{
    error::ProviderError,
    polling::{drive_search, IncrementalSearch, PollingPolicy, SearchPage, SearchStatus},
    provider::{FlightProvider, ProviderResult},
    types::{FlightQuery, RawFlight},
};
use crate::metrics::AppMetrics;

pub const PROVIDER_NAME: &str = "flights-sky";
pub const DEFAULT_HOST: &str = "flights-sky.p.rapidapi.com";

pub struct FlightsSkyClient {
    base_url: String,
    host: String,
    api_key: String,
    http: Client,
    policy: PollingPolicy,
    metrics: Option<Arc<AppMetrics>>,
}

impl FlightsSkyClient {
    pub fn new(
        base_url: impl Into<String>,
        host: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        policy: PollingPolicy,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            host: host.into(),
            api_key: api_key.into(),
            http: build_client(timeout)?,
            policy,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn get(&self, endpoint: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, endpoint))
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", &self.host)
    }
}

/// Split a response into status, session token and the `data` object.
fn parse_page(body: Value) -> Result<SearchPage, ProviderError> {
    let data = match body {
        Value::Object(mut fields) => fields.remove("data").unwrap_or(Value::Null),
        _ => return Err(ProviderError::malformed("response is not a JSON object")),
    };
    if !data.is_object() {
        return Err(ProviderError::malformed("response has no data object"));
    }

    let status = SearchStatus::from_wire(data.pointer("/context/status").and_then(Value::as_str));
    let session_id = data
        .pointer("/context/sessionId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(SearchPage {
        status,
        session_id,
        data,
    })
}

/// Pull quote records out of a terminal `data` object.
///
/// Full searches carry `itineraries`; cheapest-quote searches carry
/// `flightQuotes.results` instead.
fn extract_records(mut data: Value) -> Result<Vec<RawFlight>, ProviderError> {
    let has_itineraries = data
        .get("itineraries")
        .and_then(Value::as_array)
        .is_some_and(|list| !list.is_empty());

    if has_itineraries {
        let itineraries = data.get_mut("itineraries").map(Value::take).unwrap_or_default();
        return expect_records(itineraries, "data.itineraries");
    }

    let results = data
        .pointer_mut("/flightQuotes/results")
        .map(Value::take)
        .unwrap_or_default();
    expect_records(results, "data.flightQuotes.results")
}

#[async_trait]
impl IncrementalSearch for FlightsSkyClient {
    async fn start(&self, query: &FlightQuery) -> ProviderResult<SearchPage> {
        let date = query.date_string();
        let request = self.get("/flights/search-one-way").query(&[
            ("fromEntityId", query.origin()),
            ("toEntityId", query.destination()),
            ("departDate", date.as_str()),
            ("adults", "1"),
            ("cabinClass", "economy"),
            ("market", "US"),
            ("locale", "en-US"),
            ("currency", "USD"),
        ]);

        parse_page(fetch_json(request).await?)
    }

    async fn resume(&self, session_id: &str) -> ProviderResult<SearchPage> {
        let request = self
            .get("/flights/search-incomplete")
            .query(&[("sessionId", session_id)]);

        parse_page(fetch_json(request).await?)
    }
}

#[async_trait]
impl FlightProvider for FlightsSkyClient {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn search(&self, query: &FlightQuery) -> ProviderResult {
        let outcome = drive_search(self, query, self.policy, self.metrics.as_deref()).await?;
        if outcome.status == SearchStatus::Incomplete {
            tracing::info!(
                "{} returned partial results after {} polls",
                PROVIDER_NAME,
                outcome.polls
            );
        }
        extract_records(outcome.data)
    }
}
