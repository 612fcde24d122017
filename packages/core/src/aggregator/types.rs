//! Core data types shared by every stage of the aggregation pipeline.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::error::ValidationError;

/// Date format accepted on the wire (`YYYY-MM-DD`).
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Untyped record exactly as a provider returned it.
pub type RawFlight = serde_json::Value;

/// Raw, unvalidated query parameters as they arrive over HTTP.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub travel_date: Option<String>,
}

impl SearchParams {
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        travel_date: impl Into<String>,
    ) -> Self {
        Self {
            origin: Some(origin.into()),
            destination: Some(destination.into()),
            travel_date: Some(travel_date.into()),
        }
    }

    /// Validate into a [`FlightQuery`].
    pub fn validate(&self) -> Result<FlightQuery, ValidationError> {
        FlightQuery::parse(
            self.origin.as_deref().unwrap_or_default(),
            self.destination.as_deref().unwrap_or_default(),
            self.travel_date.as_deref().unwrap_or_default(),
        )
    }
}

/// A validated one-way search. Doubles as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FlightQuery {
    origin: String,
    destination: String,
    #[serde(rename = "travel_date")]
    date: NaiveDate,
}

impl FlightQuery {
    /// Build a query from raw strings.
    ///
    /// Airport codes are trimmed and upper-cased so that `jfk` and `JFK`
    /// resolve to the same cache entry.
    pub fn parse(origin: &str, destination: &str, date: &str) -> Result<Self, ValidationError> {
        let origin = normalize_code(origin);
        let destination = normalize_code(destination);
        let date = date.trim();

        let mut missing = Vec::new();
        if origin.is_empty() {
            missing.push("origin");
        }
        if destination.is_empty() {
            missing.push("destination");
        }
        if date.is_empty() {
            missing.push("travel_date");
        }
        if !missing.is_empty() {
            return Err(ValidationError::missing(missing.join(", ")));
        }

        let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map_err(|_| ValidationError::invalid_date(date))?;

        Ok(Self {
            origin,
            destination,
            date,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// The travel date formatted as `YYYY-MM-DD`.
    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }
}

fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Canonical quote record produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightQuote {
    pub provider: String,
    pub airline: String,
    pub origin: String,
    pub destination: String,
    #[serde(rename = "travel_date")]
    pub date: NaiveDate,
    pub price: Option<f64>,
}

/// A cached result set for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub query: FlightQuery,
    pub quotes: Vec<FlightQuote>,
    /// `None` when the backing store cannot report when the entry was written.
    pub written_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Returns `true` when the entry may be served for the given TTL.
    ///
    /// A `None` TTL never expires. Entries of unknown age are served.
    pub fn is_fresh(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        match (ttl, self.written_at) {
            (Some(ttl), Some(written_at)) => now - written_at <= ttl,
            _ => true,
        }
    }
}
