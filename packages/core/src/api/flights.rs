use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};

use super::headers::{cache_control, compute_etag, if_none_match_matches};
use super::AppState;
use crate::aggregator::types::SearchParams;
use crate::error::AppError;

/// `GET /flights?origin&destination&travel_date`
///
/// Answers with the merged, price-sorted quote list. An empty list is a
/// normal answer; only malformed parameters produce a 400.
pub async fn search_flights(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    request_headers: HeaderMap,
) -> Result<Response, AppError> {
    let quotes = state.search.handle(params).await?;
    let body = serde_json::to_vec(&quotes).map_err(|err| AppError::Internal(err.to_string()))?;

    let etag = compute_etag(&body);
    let cache_control = cache_control(state.search.ttl());

    if if_none_match_matches(&request_headers, &etag) {
        return Ok(Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::CACHE_CONTROL, cache_control)
            .header(header::ETAG, etag)
            .body(Body::empty())
            .expect("304 response should be valid"));
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CACHE_CONTROL, cache_control)
        .header(header::ETAG, etag)
        .body(Body::from(body))
        .expect("flights response should be valid"))
}
