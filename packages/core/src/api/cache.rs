//! Cache store surface.
//!
//! Exposes the configured quote cache over the same row format the HTTP cache
//! client speaks, so one instance can serve as another's cache store.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use super::AppState;
use crate::aggregator::{
    error::ValidationError,
    finalize::finalize,
    normalizer::{extract_airline, extract_price},
    types::{FlightQuery, FlightQuote, SearchParams},
};
use crate::cache::UNATTRIBUTED_PROVIDER;
use crate::error::AppError;
use crate::services::flight_service::relayed_provider;

/// One stored quote as it goes over the wire.
#[derive(Debug, Serialize)]
pub struct CachedFlightRow {
    #[serde(flatten)]
    pub quote: FlightQuote,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

/// `GET /cache?origin&destination&travel_date`. An empty array is a miss.
pub async fn get_cached(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<CachedFlightRow>>, AppError> {
    let query = params.validate()?;
    let entry = state
        .search
        .cache()
        .get(&query)
        .await
        .map_err(|err| AppError::Internal(err.to_string()))?;

    let rows = entry
        .map(|entry| {
            let cached_at = entry.written_at;
            entry
                .quotes
                .into_iter()
                .map(|quote| CachedFlightRow { quote, cached_at })
                .collect()
        })
        .unwrap_or_default();

    Ok(Json(rows))
}

/// `POST /cache` with one record or an array of records.
///
/// Every record needs `origin`, `destination`, `travel_date`, `airline` and
/// `price`; a record without `airline` may name a `provider` instead. Records
/// are grouped by query and appended to that query's existing entry, which is
/// deduplicated, re-sorted and re-stamped as a whole.
pub async fn store_flights(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let records = match payload {
        Value::Array(records) => records,
        record @ Value::Object(_) => vec![record],
        _ => return Err(ValidationError::MissingFields.into()),
    };

    let mut groups: Vec<(FlightQuery, Vec<FlightQuote>)> = Vec::new();
    for record in &records {
        let (query, quote) = parse_record(record)?;
        match groups.iter_mut().find(|(existing, _)| *existing == query) {
            Some((_, quotes)) => quotes.push(quote),
            None => groups.push((query, vec![quote])),
        }
    }

    let cache = state.search.cache();
    for (query, quotes) in groups.iter_mut() {
        let mut merged = cache
            .get(query)
            .await
            .map_err(|err| AppError::Internal(err.to_string()))?
            .map(|entry| entry.quotes)
            .unwrap_or_default();
        merged.append(quotes);
        cache
            .put(query, &finalize(merged, None))
            .await
            .map_err(|err| AppError::Internal(err.to_string()))?;
    }

    tracing::info!(
        "Stored {} records across {} queries via {} backend",
        records.len(),
        groups.len(),
        cache.backend_name()
    );

    Ok((StatusCode::CREATED, Json(json!({ "status": "inserted" }))))
}

fn parse_record(record: &Value) -> Result<(FlightQuery, FlightQuote), ValidationError> {
    let text = |field: &str| {
        record
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let (Some(origin), Some(destination), Some(travel_date)) =
        (text("origin"), text("destination"), text("travel_date"))
    else {
        return Err(ValidationError::MissingFields);
    };

    let airline = extract_airline(record)
        .or_else(|| relayed_provider(record).map(str::to_string))
        .ok_or(ValidationError::MissingFields)?;
    let price = extract_price(record).ok_or(ValidationError::MissingFields)?;

    let query = FlightQuery::parse(origin, destination, travel_date)?;
    let quote = FlightQuote {
        provider: relayed_provider(record)
            .unwrap_or(UNATTRIBUTED_PROVIDER)
            .to_string(),
        airline,
        origin: query.origin().to_string(),
        destination: query.destination().to_string(),
        date: query.date(),
        price: Some(price),
    };

    Ok((query, quote))
}
