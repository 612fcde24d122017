//! Deduplication and price ordering of merged quotes.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::NaiveDate;

use crate::aggregator::types::FlightQuote;

/// Identity of a quote for deduplication. Price is compared by bit pattern so
/// that an absent price is its own value and never equals a numeric one.
#[derive(Debug, PartialEq, Eq, Hash)]
struct QuoteKey<'a> {
    provider: &'a str,
    airline: &'a str,
    origin: &'a str,
    destination: &'a str,
    date: NaiveDate,
    price: Option<u64>,
}

impl<'a> From<&'a FlightQuote> for QuoteKey<'a> {
    fn from(quote: &'a FlightQuote) -> Self {
        Self {
            provider: &quote.provider,
            airline: &quote.airline,
            origin: &quote.origin,
            destination: &quote.destination,
            date: quote.date,
            price: quote.price.map(f64::to_bits),
        }
    }
}

/// Remove duplicates, keeping the first occurrence of each key.
pub fn dedup(quotes: Vec<FlightQuote>) -> Vec<FlightQuote> {
    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(quotes.len());
        quotes.iter().map(|q| seen.insert(QuoteKey::from(q))).collect()
    };

    quotes
        .into_iter()
        .zip(keep)
        .filter_map(|(quote, keep)| keep.then_some(quote))
        .collect()
}

/// Stable ascending sort by price with absent prices last.
pub fn sort_by_price(quotes: &mut [FlightQuote]) {
    quotes.sort_by(|a, b| compare_price(a.price, b.price));
}

fn compare_price(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Dedup, sort, and optionally keep only the first `limit` quotes.
pub fn finalize(quotes: Vec<FlightQuote>, limit: Option<usize>) -> Vec<FlightQuote> {
    let mut quotes = dedup(quotes);
    sort_by_price(&mut quotes);
    if let Some(limit) = limit {
        quotes.truncate(limit);
    }
    quotes
}
