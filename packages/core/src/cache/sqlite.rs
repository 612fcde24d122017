//! SQLite-backed quote cache.
//!
//! Each cached query is a set of rows in `cached_flights` sharing
//! `(origin, destination, travel_date)`, ordered by `position`. A write
//! replaces the whole set in one transaction so readers never see a mix of
//! two result sets.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;

use super::QuoteCache;
use crate::aggregator::{
    error::CacheError,
    types::{CacheEntry, FlightQuery, FlightQuote, DATE_FORMAT},
};

pub struct SqliteQuoteCache {
    pool: SqlitePool,
}

impl SqliteQuoteCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete every row written before `cutoff`. Returns the number of rows deleted.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cached_flights WHERE written_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl QuoteCache for SqliteQuoteCache {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, query: &FlightQuery) -> Result<Option<CacheEntry>, CacheError> {
        let rows = sqlx::query(
            "SELECT provider, airline, price, travel_date, written_at
             FROM cached_flights
             WHERE origin = ? AND destination = ? AND travel_date = ?
             ORDER BY position ASC",
        )
        .bind(query.origin())
        .bind(query.destination())
        .bind(query.date_string())
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut written_at: Option<DateTime<Utc>> = None;
        let quotes: Vec<FlightQuote> = rows
            .into_iter()
            .filter_map(|row| {
                use sqlx::Row;
                let provider: String = row.try_get("provider").ok()?;
                let airline: String = row.try_get("airline").ok()?;
                let price: Option<f64> = row.try_get("price").ok()?;
                let date_str: String = row.try_get("travel_date").ok()?;
                let written_str: String = row.try_get("written_at").ok()?;

                let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT).ok()?;
                let row_written = DateTime::parse_from_rfc3339(&written_str)
                    .ok()?
                    .with_timezone(&Utc);
                written_at = Some(written_at.map_or(row_written, |w| w.min(row_written)));

                Some(FlightQuote {
                    provider,
                    airline,
                    origin: query.origin().to_string(),
                    destination: query.destination().to_string(),
                    date,
                    price,
                })
            })
            .collect();

        Ok(Some(CacheEntry {
            query: query.clone(),
            quotes,
            written_at,
        }))
    }

    async fn put(&self, query: &FlightQuery, quotes: &[FlightQuote]) -> Result<(), CacheError> {
        let written_at = Utc::now().to_rfc3339();
        let date = query.date_string();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM cached_flights
             WHERE origin = ? AND destination = ? AND travel_date = ?",
        )
        .bind(query.origin())
        .bind(query.destination())
        .bind(&date)
        .execute(&mut *tx)
        .await?;

        for (position, quote) in quotes.iter().enumerate() {
            sqlx::query(
                "INSERT INTO cached_flights
                 (origin, destination, travel_date, position, provider, airline, price, written_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(query.origin())
            .bind(query.destination())
            .bind(&date)
            .bind(position as i64)
            .bind(&quote.provider)
            .bind(&quote.airline)
            .bind(quote.price)
            .bind(&written_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
