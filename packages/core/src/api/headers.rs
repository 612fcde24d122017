use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};

/// Compute a weakly-stable quoted ETag from response bytes.
pub fn compute_etag(body: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("\"{:x}\"", hasher.finish())
}

/// Cache-Control for a search result. Without a TTL clients must revalidate.
pub fn cache_control(ttl: Option<Duration>) -> HeaderValue {
    match ttl {
        Some(ttl) => HeaderValue::from_str(&format!("public, max-age={}", ttl.as_secs()))
            .expect("cache-control header value should be valid"),
        None => HeaderValue::from_static("no-cache"),
    }
}

/// Returns true when `If-None-Match` contains `*` or the exact current ETag.
pub fn if_none_match_matches(headers: &HeaderMap, current_etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .map(|tag| tag.trim())
                .any(|tag| tag == "*" || tag == current_etag)
        })
        .unwrap_or(false)
}
