//! HTTP surface.
//!
//! `create_router` assembles every route over one [`AppState`]; `main.rs` and
//! the integration tests build the app the same way.

pub mod cache;
pub mod flights;
pub mod headers;
pub mod health;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;

use crate::aggregator::service::FlightSearchService;
use crate::metrics::AppMetrics;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<FlightSearchService>,
    pub metrics: Arc<AppMetrics>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/flights", get(flights::search_flights))
        .route("/cache", get(cache::get_cached).post(cache::store_flights))
        .route("/health", get(health::health))
        .route("/metrics", get(render_metrics))
        .layer(middleware::from_fn_with_state(state.clone(), track_http_metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `GET /metrics` in Prometheus text exposition format.
async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(body))
            .expect("metrics response should be valid"),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("metrics error"))
                .expect("metrics error response should be valid")
        }
    }
}

/// Count and time every request. Paths are labelled by route template.
async fn track_http_metrics(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    state
        .metrics
        .http_requests_total
        .with_label_values(&[method.as_str(), path.as_str(), status.as_str()])
        .inc();
    state
        .metrics
        .http_request_duration
        .observe(started.elapsed().as_secs_f64());

    response
}
