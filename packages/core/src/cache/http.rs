//! Client for an external cache store service.
//!
//! The store speaks a flat row format: `GET /cache?origin&destination&travel_date`
//! returns an array (empty on miss) and `POST /cache` accepts an array. The
//! store requires a price on every row, so unpriced quotes are not written.
//! Rows carry a `cached_at` stamp; stores that drop it yield entries of
//! unknown age.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;

use super::{QuoteCache, UNATTRIBUTED_PROVIDER};
use crate::aggregator::{
    error::CacheError,
    finalize::finalize,
    normalizer::normalize,
    types::{CacheEntry, FlightQuery, FlightQuote},
};
use crate::services::{
    flight_service::relayed_provider,
    http::{body_preview, build_client},
};

pub struct HttpQuoteCache {
    base_url: String,
    http: Client,
}

#[derive(Debug, Serialize)]
struct StoredFlight<'a> {
    provider: &'a str,
    airline: &'a str,
    origin: &'a str,
    destination: &'a str,
    travel_date: String,
    price: f64,
    cached_at: DateTime<Utc>,
}

impl HttpQuoteCache {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: build_client(timeout)?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/cache", self.base_url)
    }
}

fn quote_from_row(query: &FlightQuery, row: &Value) -> FlightQuote {
    normalize(
        relayed_provider(row).unwrap_or(UNATTRIBUTED_PROVIDER),
        query,
        row,
    )
}

/// Oldest `cached_at` across rows, or `None` if any row lacks one.
fn oldest_stamp(rows: &[Value]) -> Option<DateTime<Utc>> {
    rows.iter()
        .map(|row| {
            row.get("cached_at")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
        })
        .collect::<Option<Vec<_>>>()?
        .into_iter()
        .min()
}

#[async_trait]
impl QuoteCache for HttpQuoteCache {
    fn backend_name(&self) -> &str {
        "http"
    }

    async fn get(&self, query: &FlightQuery) -> Result<Option<CacheEntry>, CacheError> {
        let date = query.date_string();
        let response = self
            .http
            .get(self.endpoint())
            .query(&[
                ("origin", query.origin()),
                ("destination", query.destination()),
                ("travel_date", date.as_str()),
            ])
            .send()
            .await
            .map_err(|err| CacheError::unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(CacheError::unavailable(format!(
                "cache store returned HTTP {}: {}",
                status.as_u16(),
                body_preview(&body)
            )));
        }

        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|err| CacheError::unavailable(format!("unreadable cache payload: {err}")))?;

        if rows.is_empty() {
            return Ok(None);
        }

        // The store appends rows in arrival order; bring them back to merged form.
        let quotes = finalize(rows.iter().map(|row| quote_from_row(query, row)).collect(), None);

        Ok(Some(CacheEntry {
            query: query.clone(),
            quotes,
            written_at: oldest_stamp(&rows),
        }))
    }

    async fn put(&self, query: &FlightQuery, quotes: &[FlightQuote]) -> Result<(), CacheError> {
        let cached_at = Utc::now();
        let date = query.date_string();
        let rows: Vec<StoredFlight<'_>> = quotes
            .iter()
            .filter_map(|quote| {
                quote.price.map(|price| StoredFlight {
                    provider: &quote.provider,
                    airline: &quote.airline,
                    origin: query.origin(),
                    destination: query.destination(),
                    travel_date: date.clone(),
                    price,
                    cached_at,
                })
            })
            .collect();

        let skipped = quotes.len() - rows.len();
        if skipped > 0 {
            tracing::debug!("Not caching {} unpriced quotes for {}", skipped, date);
        }
        if rows.is_empty() {
            return Ok(());
        }

        let response = self
            .http
            .post(self.endpoint())
            .json(&rows)
            .send()
            .await
            .map_err(|err| CacheError::unavailable(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = format!("HTTP {}: {}", status.as_u16(), body_preview(&body));
        if status == StatusCode::BAD_REQUEST {
            Err(CacheError::rejected(message))
        } else {
            Err(CacheError::unavailable(message))
        }
    }
}
