//! Prometheus metrics registry for the flight aggregator.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and hand it to
//! the search service, the provider clients and the HTTP middleware.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry};

const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
const PROVIDER_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0];

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Validated searches handled by the cache-aside controller.
    pub searches_total: Counter,
    /// Cache lookups, labelled by outcome (`hit`, `miss`, `stale`, `error`).
    pub cache_lookups_total: CounterVec,
    /// Background cache writes, labelled by outcome (`ok`, `error`, `skipped`).
    pub cache_writes_total: CounterVec,
    /// Provider calls, labelled by provider and outcome.
    pub provider_calls_total: CounterVec,
    /// Provider call latency in seconds, labelled by provider.
    pub provider_call_duration: HistogramVec,
    /// Continuation polls issued against incremental search backends.
    pub search_polls_total: Counter,
    /// HTTP request count, labelled by method, path, and status code.
    pub http_requests_total: CounterVec,
    /// HTTP request latency histogram in seconds.
    pub http_request_duration: Histogram,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let searches_total = Counter::with_opts(Opts::new(
            "flight_aggregator_searches_total",
            "Validated flight searches",
        ))?;

        let cache_lookups_total = CounterVec::new(
            Opts::new(
                "flight_aggregator_cache_lookups_total",
                "Cache lookups by outcome",
            ),
            &["outcome"],
        )?;

        let cache_writes_total = CounterVec::new(
            Opts::new(
                "flight_aggregator_cache_writes_total",
                "Background cache writes by outcome",
            ),
            &["outcome"],
        )?;

        let provider_calls_total = CounterVec::new(
            Opts::new(
                "flight_aggregator_provider_calls_total",
                "Provider calls by provider and outcome",
            ),
            &["provider", "outcome"],
        )?;

        let provider_call_duration = HistogramVec::new(
            HistogramOpts::new(
                "flight_aggregator_provider_call_duration_seconds",
                "Provider call latency in seconds",
            )
            .buckets(PROVIDER_BUCKETS.to_vec()),
            &["provider"],
        )?;

        let search_polls_total = Counter::with_opts(Opts::new(
            "flight_aggregator_search_polls_total",
            "Continuation polls against incremental search backends",
        ))?;

        let http_requests_total = CounterVec::new(
            Opts::new(
                "flight_aggregator_http_requests_total",
                "HTTP requests by method, path, and status",
            ),
            &["method", "path", "status"],
        )?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "flight_aggregator_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(searches_total.clone()))?;
        registry.register(Box::new(cache_lookups_total.clone()))?;
        registry.register(Box::new(cache_writes_total.clone()))?;
        registry.register(Box::new(provider_calls_total.clone()))?;
        registry.register(Box::new(provider_call_duration.clone()))?;
        registry.register(Box::new(search_polls_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            searches_total,
            cache_lookups_total,
            cache_writes_total,
            provider_calls_total,
            provider_call_duration,
            search_polls_total,
            http_requests_total,
            http_request_duration,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Method, Request},
        response::Response,
        routing::get,
        Router,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn make_metrics_app() -> (Router, Arc<AppMetrics>) {
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let m = metrics.clone();
        let app = Router::new().route(
            "/metrics",
            get(move || {
                let m2 = m.clone();
                async move {
                    match m2.render() {
                        Ok(body) => Response::builder()
                            .status(200)
                            .header("content-type", "text/plain; version=0.0.4")
                            .body(Body::from(body))
                            .unwrap(),
                        Err(_) => Response::builder()
                            .status(500)
                            .body(Body::from("error"))
                            .unwrap(),
                    }
                }
            }),
        );
        (app, metrics)
    }

    async fn scrape(app: Router) -> String {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn scrape_contains_all_metric_names_after_a_search() {
        let (app, metrics) = make_metrics_app();

        metrics.searches_total.inc();
        metrics.cache_lookups_total.with_label_values(&["miss"]).inc();
        metrics.cache_writes_total.with_label_values(&["ok"]).inc();
        metrics
            .provider_calls_total
            .with_label_values(&["flights-sky", "ok"])
            .inc();
        metrics
            .provider_call_duration
            .with_label_values(&["flights-sky"])
            .observe(2.0);
        metrics.search_polls_total.inc_by(3.0);
        metrics
            .http_requests_total
            .with_label_values(&["GET", "/flights", "200"])
            .inc();
        metrics.http_request_duration.observe(0.042);

        let body = scrape(app).await;

        assert!(body.contains("flight_aggregator_searches_total"));
        assert!(body.contains("flight_aggregator_cache_lookups_total{outcome=\"miss\"} 1"));
        assert!(body.contains("flight_aggregator_cache_writes_total"));
        assert!(body.contains("flight_aggregator_provider_calls_total"));
        assert!(body.contains("provider=\"flights-sky\""));
        assert!(body.contains("flight_aggregator_provider_call_duration_seconds"));
        assert!(body.contains("flight_aggregator_search_polls_total 3"));
        assert!(body.contains("flight_aggregator_http_requests_total"));
        assert!(body.contains("flight_aggregator_http_request_duration_seconds"));
    }
}
