//! Result normalizer.
//!
//! Maps loosely-typed provider records onto [`FlightQuote`]. This is the only
//! place that knows about provider field names; nothing downstream sees a
//! raw record.

use serde_json::Value;

use crate::aggregator::types::{FlightQuery, FlightQuote, RawFlight};

/// Airline used when a record carries no carrier information at all.
pub const UNKNOWN_AIRLINE: &str = "Unknown";

const PRICE_OBJECT_FIELDS: &[&str] = &["raw", "value", "amount", "formatted"];
const PRICE_FALLBACK_FIELDS: &[&str] = &["totalPrice", "fare"];
const AIRLINE_NAME_FIELDS: &[&str] = &["airlineName", "carrier"];
const CARRIER_CODE_FIELDS: &[&str] = &["airlineCode", "carrierCode"];

/// Normalize one raw record.
///
/// Identity fields come from the query, never from the payload.
pub fn normalize(provider: &str, query: &FlightQuery, raw: &RawFlight) -> FlightQuote {
    FlightQuote {
        provider: provider.to_string(),
        airline: extract_airline(raw).unwrap_or_else(|| UNKNOWN_AIRLINE.to_string()),
        origin: query.origin().to_string(),
        destination: query.destination().to_string(),
        date: query.date(),
        price: extract_price(raw),
    }
}

pub fn extract_price(raw: &RawFlight) -> Option<f64> {
    let price = match raw.get("price") {
        Some(Value::Object(fields)) => PRICE_OBJECT_FIELDS
            .iter()
            .find_map(|name| fields.get(*name).and_then(price_from_scalar)),
        Some(other) => price_from_scalar(other),
        None => None,
    };

    price.or_else(|| {
        PRICE_FALLBACK_FIELDS
            .iter()
            .find_map(|name| raw.get(*name).and_then(price_from_scalar))
    })
}

fn price_from_scalar(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_price_text(s),
        _ => None,
    }?;

    (parsed.is_finite() && parsed >= 0.0).then_some(parsed)
}

/// Parse strings like `"$1,234.50"`, `"USD 99"` or `"-5"`.
///
/// Exactly one numeric group is accepted. Commas are only read as thousands
/// separators; decimal-comma text such as `"1.299,00"` is not a price.
fn parse_price_text(text: &str) -> Option<f64> {
    let is_numeric = |c: char| c.is_ascii_digit() || c == '.' || c == ',';

    let start = text.find(is_numeric)?;
    let rest = &text[start..];
    let end = rest.find(|c: char| !is_numeric(c)).unwrap_or(rest.len());
    let (group, tail) = rest.split_at(end);
    if tail.contains(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let value: f64 = strip_thousands(group)?.parse().ok()?;
    let negative = text[..start].contains('-');
    Some(if negative { -value } else { value })
}

fn strip_thousands(group: &str) -> Option<String> {
    let (whole, fraction) = match group.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (group, None),
    };
    if fraction.is_some_and(|f| f.contains(['.', ','])) {
        return None;
    }

    if whole.contains(',') {
        let mut blocks = whole.split(',');
        let lead = blocks.next().unwrap_or_default();
        if lead.is_empty() || lead.len() > 3 || blocks.any(|block| block.len() != 3) {
            return None;
        }
    }

    let mut digits = whole.replace(',', "");
    if let Some(fraction) = fraction {
        digits.push('.');
        digits.push_str(fraction);
    }
    digits.chars().any(|c| c.is_ascii_digit()).then_some(digits)
}

pub fn extract_airline(raw: &RawFlight) -> Option<String> {
    if let Some(name) = raw.get("airline").and_then(airline_from_value) {
        return Some(name);
    }

    if let Some(name) = AIRLINE_NAME_FIELDS
        .iter()
        .find_map(|field| raw.get(*field).and_then(non_blank))
    {
        return Some(name);
    }

    if let Some(name) = raw
        .pointer("/legs/0/carriers/marketing/0/name")
        .and_then(non_blank)
    {
        return Some(name);
    }

    if let Some(code) = CARRIER_CODE_FIELDS
        .iter()
        .find_map(|field| raw.get(*field).and_then(non_blank))
    {
        return Some(code);
    }

    raw.get("carrierIds")
        .and_then(Value::as_array)
        .and_then(|ids| ids.first())
        .and_then(|id| match id {
            Value::Number(n) => Some(n.to_string()),
            other => non_blank(other),
        })
}

fn airline_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Array(carriers) => carriers.first().and_then(|carrier| match carrier {
            Value::Object(fields) => fields
                .get("airlineName")
                .or_else(|| fields.get("name"))
                .and_then(non_blank),
            other => non_blank(other),
        }),
        other => non_blank(other),
    }
}

fn non_blank(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query() -> FlightQuery {
        FlightQuery::parse("JFK", "LAX", "2025-06-01").unwrap()
    }

    #[test]
    fn stamps_identity_fields_from_query_not_payload() {
        let raw = json!({
            "origin": "XXX",
            "destination": "YYY",
            "travel_date": "1999-01-01",
            "provider": "someone-else",
            "airline": "Delta",
            "price": 199
        });

        let quote = normalize("google-flights", &query(), &raw);

        assert_eq!(quote.provider, "google-flights");
        assert_eq!(quote.origin, "JFK");
        assert_eq!(quote.destination, "LAX");
        assert_eq!(quote.date, query().date());
        assert_eq!(quote.airline, "Delta");
        assert_eq!(quote.price, Some(199.0));
    }

    #[test]
    fn price_from_nested_raw_field() {
        let raw = json!({ "price": { "raw": 412.5, "formatted": "$413" } });
        assert_eq!(extract_price(&raw), Some(412.5));
    }

    #[test]
    fn price_from_formatted_text_when_raw_missing() {
        let raw = json!({ "price": { "formatted": "$1,204" } });
        assert_eq!(extract_price(&raw), Some(1204.0));
    }

    #[test]
    fn price_from_amount_field() {
        let raw = json!({ "price": { "amount": "88.10" } });
        assert_eq!(extract_price(&raw), Some(88.10));
    }

    #[test]
    fn price_from_fallback_field() {
        let raw = json!({ "totalPrice": 250 });
        assert_eq!(extract_price(&raw), Some(250.0));
    }

    #[test]
    fn missing_price_is_absent_not_zero() {
        let raw = json!({ "airline": "Delta" });
        assert_eq!(extract_price(&raw), None);
        let raw = json!({ "price": null });
        assert_eq!(extract_price(&raw), None);
        let raw = json!({ "price": "n/a" });
        assert_eq!(extract_price(&raw), None);
    }

    #[test]
    fn negative_price_is_absent() {
        let raw = json!({ "price": -5 });
        assert_eq!(extract_price(&raw), None);
    }

    #[test]
    fn airline_from_carrier_object_list() {
        let raw = json!({ "airline": [{ "airlineName": "JetBlue", "airlineCode": "B6" }] });
        assert_eq!(extract_airline(&raw).as_deref(), Some("JetBlue"));
    }

    #[test]
    fn airline_falls_back_to_code() {
        let raw = json!({ "airline": [], "airlineCode": "AA" });
        assert_eq!(extract_airline(&raw).as_deref(), Some("AA"));
    }

    #[test]
    fn airline_from_itinerary_legs() {
        let raw = json!({
            "legs": [{ "carriers": { "marketing": [{ "name": "United" }] } }]
        });
        assert_eq!(extract_airline(&raw).as_deref(), Some("United"));
    }

    #[test]
    fn airline_from_numeric_carrier_id() {
        let raw = json!({ "carrierIds": [-32753] });
        assert_eq!(extract_airline(&raw).as_deref(), Some("-32753"));
    }

    #[test]
    fn airline_defaults_to_unknown() {
        let raw = json!({ "airline": "   ", "price": 10 });
        let quote = normalize("p", &query(), &raw);
        assert_eq!(quote.airline, UNKNOWN_AIRLINE);
    }

    #[test]
    fn string_price_with_currency_prefix() {
        let raw = json!({ "price": "USD 99" });
        assert_eq!(extract_price(&raw), Some(99.0));
    }

    #[test]
    fn negative_string_price_is_absent() {
        assert_eq!(extract_price(&json!({ "price": "-5" })), None);
        assert_eq!(extract_price(&json!({ "price": "-$120.00" })), None);
    }

    #[test]
    fn decimal_comma_text_is_not_a_price() {
        assert_eq!(extract_price(&json!({ "price": "1.299,00 EUR" })), None);
        assert_eq!(extract_price(&json!({ "price": "99,50" })), None);
    }

    #[test]
    fn several_numbers_in_text_is_not_a_price() {
        assert_eq!(extract_price(&json!({ "price": "from 120 to 340" })), None);
    }

    #[test]
    fn thousands_separators_are_accepted() {
        assert_eq!(extract_price(&json!({ "price": "$12,345.60" })), Some(12345.6));
    }
}
