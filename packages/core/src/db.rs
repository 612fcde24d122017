//! SQLite connection pool and schema bootstrap.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS cached_flights (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    origin      TEXT    NOT NULL,
    destination TEXT    NOT NULL,
    travel_date TEXT    NOT NULL,
    position    INTEGER NOT NULL,
    provider    TEXT    NOT NULL,
    airline     TEXT    NOT NULL,
    price       REAL,
    written_at  TEXT    NOT NULL
)";

const CREATE_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_cached_flights_query
    ON cached_flights (origin, destination, travel_date)";

/// Open a pool for `database_url` and make sure the schema exists.
///
/// In-memory databases are per-connection in SQLite, so the pool is pinned to
/// a single connection for `sqlite::memory:` URLs.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool_options = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options.connect_with(options).await?;

    sqlx::query(CREATE_TABLE).execute(&pool).await?;
    sqlx::query(CREATE_INDEX).execute(&pool).await?;

    Ok(pool)
}
