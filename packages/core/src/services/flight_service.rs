//! Peer flight services that already speak this system's wire contract:
//! `GET {base}/flights?origin&destination&travel_date` returning a JSON array.
//!
//! Peers relay quotes from their own providers, so a record's `provider`
//! field is kept as its attribution.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::http::{build_client, expect_records, fetch_json};
use crate::aggregator::{
    provider::{FlightProvider, ProviderKind, ProviderResult},
    types::{FlightQuery, RawFlight},
};

/// Non-blank `provider` field of a relayed record.
pub fn relayed_provider(record: &RawFlight) -> Option<&str> {
    record
        .get("provider")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

pub struct FlightServiceClient {
    name: String,
    base_url: String,
    kind: ProviderKind,
    http: Client,
}

impl FlightServiceClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        kind: ProviderKind,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            kind,
            http: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl FlightProvider for FlightServiceClient {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn attribution<'a>(&'a self, record: &'a RawFlight) -> &'a str {
        relayed_provider(record).unwrap_or(&self.name)
    }

    async fn search(&self, query: &FlightQuery) -> ProviderResult {
        let date = query.date_string();
        let request = self
            .http
            .get(format!("{}/flights", self.base_url))
            .query(&[
                ("origin", query.origin()),
                ("destination", query.destination()),
                ("travel_date", date.as_str()),
            ]);

        expect_records(fetch_json(request).await?, "flight list")
    }
}
