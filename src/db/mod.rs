use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Opens the SQLite pool behind the email index. In-memory databases are
/// pinned to a single connection so every query sees the same data.
pub async fn connect(raw_url: &str) -> Result<SqlitePool> {
    let url = normalize_sqlite_url(raw_url);
    let in_memory = url.contains(":memory:");

    let options = SqliteConnectOptions::from_str(&url)
        .with_context(|| format!("invalid DATABASE_URL {url}"))?
        .create_if_missing(true);

    let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
    if in_memory {
        // dropping the only connection would drop the database with it
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }
    let pool = pool_options
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open {url}"))?;
    Ok(pool)
}

/// Accepts `sqlite:foo.db`, `sqlite://foo.db`, `file:foo.db` or a bare path.
pub fn normalize_sqlite_url(input: &str) -> String {
    if input.starts_with("sqlite://") || input.starts_with("sqlite::memory:") {
        return input.to_string();
    }
    if let Some(rest) = input.strip_prefix("sqlite:") {
        return format!("sqlite://{}", rest.trim_start_matches('/'));
    }
    if let Some(rest) = input.strip_prefix("file:") {
        return format!("sqlite://{rest}");
    }
    format!("sqlite://{input}")
}
