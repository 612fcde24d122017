//! Shared reqwest plumbing for provider clients.
//!
//! Every provider funnels its HTTP exchange through [`fetch_json`] so that
//! status, transport and decode failures map onto the same
//! [`ProviderError`] variants everywhere.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use crate::aggregator::error::ProviderError;

/// Sent on every outbound request; some upstreams reject bare clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36";

const BODY_PREVIEW_CHARS: usize = 160;

/// Build a client with a fixed request timeout.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// Send `request` and decode a JSON body.
pub async fn fetch_json(request: RequestBuilder) -> Result<Value, ProviderError> {
    let response = request.send().await.map_err(map_transport_error)?;

    let status = response.status();
    let body = response.bytes().await.map_err(map_transport_error)?;
    if !status.is_success() {
        return Err(map_status_error(status, &body));
    }

    serde_json::from_slice(&body)
        .map_err(|err| ProviderError::malformed(format!("invalid JSON payload: {err}")))
}

pub fn map_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_decode() {
        ProviderError::malformed(error.to_string())
    } else {
        ProviderError::timeout(error.to_string())
    }
}

pub fn map_status_error(status: StatusCode, body: &[u8]) -> ProviderError {
    ProviderError::http(status.as_u16(), body_preview(body))
}

/// Whitespace-collapsed, length-capped view of a response body for logs.
pub fn body_preview(body: &[u8]) -> String {
    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(BODY_PREVIEW_CHARS).collect::<String>();
    if compact.chars().count() > BODY_PREVIEW_CHARS {
        format!("{preview}...")
    } else {
        preview
    }
}

/// Expect `value` to be a JSON array of records.
pub fn expect_records(value: Value, what: &str) -> Result<Vec<Value>, ProviderError> {
    match value {
        Value::Array(records) => Ok(records),
        Value::Null => Ok(Vec::new()),
        other => Err(ProviderError::malformed(format!(
            "expected {what} to be an array, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
