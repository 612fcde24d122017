//! Google Flights search via RapidAPI (`google-flights4`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::http::{build_client, expect_records, fetch_json};
use crate::aggregator::{
    provider::{FlightProvider, ProviderResult},
    types::FlightQuery,
};

pub const PROVIDER_NAME: &str = "google-flights";
pub const DEFAULT_HOST: &str = "google-flights4.p.rapidapi.com";

/// Only the cheapest results from this provider are kept.
const RESULT_LIMIT: usize = 10;

pub struct GoogleFlightsClient {
    base_url: String,
    host: String,
    api_key: String,
    http: Client,
}

impl GoogleFlightsClient {
    pub fn new(
        base_url: impl Into<String>,
        host: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            host: host.into(),
            api_key: api_key.into(),
            http: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl FlightProvider for GoogleFlightsClient {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn result_limit(&self) -> Option<usize> {
        Some(RESULT_LIMIT)
    }

    async fn search(&self, query: &FlightQuery) -> ProviderResult {
        let url = format!("{}/flights/search-one-way", self.base_url);
        let date = query.date_string();

        let request = self
            .http
            .get(&url)
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", &self.host)
            .query(&[
                ("departureId", query.origin()),
                ("arrivalId", query.destination()),
                ("departureDate", date.as_str()),
                ("adults", "1"),
                ("hl", "en"),
                ("gl", "US"),
                ("currency", "USD"),
            ]);

        let mut body = fetch_json(request).await?;
        let flights = body
            .pointer_mut("/data/otherFlights")
            .map(serde_json::Value::take)
            .unwrap_or_default();

        expect_records(flights, "data.otherFlights")
    }
}
