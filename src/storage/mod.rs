//! SQLite storage for indicators, the blocklist cache, and counters

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::models::{Indicator, NewIndicator};

/// Counter bumped once per recorded search
pub const SEARCH_COUNTER: &str = "searches";
/// Counter bumped once per tracked page view
pub const PAGE_VIEW_COUNTER: &str = "page_views";

/// Database repository for the dashboard
#[derive(Clone)]
pub struct IndicatorStore {
    pool: SqlitePool,
}

impl IndicatorStore {
    /// Open (or create) the database at `database_url`
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        // WAL keeps readers unblocked while feed imports write
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .context("Failed to enable WAL mode")?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }

    // ==================== Indicators ====================

    /// Insert an indicator, refreshing `last_seen` when it already exists
    pub async fn upsert_indicator(&self, indicator: &NewIndicator) -> Result<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();

        sqlx::query(
            r#"
            INSERT INTO threat_indicators (type, value, category, source, first_seen, last_seen, severity, notes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (type, value) DO UPDATE SET
                category = excluded.category,
                source = excluded.source,
                last_seen = excluded.last_seen,
                severity = excluded.severity,
                notes = excluded.notes
            "#,
        )
        .bind(&indicator.indicator_type)
        .bind(&indicator.value)
        .bind(&indicator.category)
        .bind(&indicator.source)
        .bind(&today)
        .bind(&today)
        .bind(&indicator.severity)
        .bind(&indicator.notes)
        .execute(&self.pool)
        .await
        .context("Failed to upsert indicator")?;

        Ok(())
    }

    /// Upsert a batch, skipping rows that fail. Returns the processed count.
    pub async fn import_indicators(&self, indicators: &[NewIndicator]) -> Result<u64> {
        let mut imported = 0;

        for indicator in indicators {
            match self.upsert_indicator(indicator).await {
                Ok(()) => imported += 1,
                Err(e) => {
                    tracing::warn!(error = %e, value = %indicator.value, "Skipping indicator");
                }
            }
        }

        Ok(imported)
    }

    /// Substring search across the display fields, newest rows first
    pub async fn search_indicators(&self, query: &str, limit: i64) -> Result<Vec<Indicator>> {
        let pattern = format!("%{}%", query);

        let indicators = sqlx::query_as::<_, Indicator>(
            r#"
            SELECT * FROM threat_indicators
            WHERE value LIKE ? OR category LIKE ? OR source LIKE ? OR notes LIKE ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to search indicators")?;

        Ok(indicators)
    }

    /// Exact match on type and value
    pub async fn check_indicator(
        &self,
        indicator_type: &str,
        value: &str,
    ) -> Result<Option<Indicator>> {
        let indicator = sqlx::query_as::<_, Indicator>(
            "SELECT * FROM threat_indicators WHERE type = ? AND value = ? LIMIT 1",
        )
        .bind(indicator_type)
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to check indicator")?;

        Ok(indicator)
    }

    /// First `limit` rows, newest first
    pub async fn list_indicators(&self, limit: i64) -> Result<Vec<Indicator>> {
        let indicators = sqlx::query_as::<_, Indicator>(
            "SELECT * FROM threat_indicators ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list indicators")?;

        Ok(indicators)
    }

    // ==================== Blocklist cache ====================

    /// Cached blocklist payload for an IP. A corrupt entry counts as a miss.
    pub async fn cached_blocklist(&self, ip: &str) -> Result<Option<Value>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM neutrino_cache WHERE ip = ?")
                .bind(ip)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to read blocklist cache")?;

        let Some((data,)) = row else {
            return Ok(None);
        };

        match serde_json::from_str(&data) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(error = %e, ip, "Corrupt blocklist cache entry, treating as miss");
                Ok(None)
            }
        }
    }

    /// Store a blocklist payload for an IP, replacing any previous entry
    pub async fn save_blocklist(&self, ip: &str, data: &Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO neutrino_cache (ip, data, cached_at)
            VALUES (?, ?, ?)
            ON CONFLICT (ip) DO UPDATE SET
                data = excluded.data,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(ip)
        .bind(data.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save blocklist cache entry")?;

        Ok(())
    }

    // ==================== Counters ====================

    /// Atomically bump a named counter and return the new value
    pub async fn increment_counter(&self, name: &str) -> Result<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO counters (name, value)
            VALUES (?, 1)
            ON CONFLICT (name) DO UPDATE SET value = counters.value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .context("Failed to increment counter")?;

        Ok(value)
    }

    /// Current value of a named counter, zero when never bumped
    pub async fn counter(&self, name: &str) -> Result<i64> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM counters WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read counter")?;

        Ok(value.unwrap_or(0))
    }

    // ==================== Statistics ====================

    /// Total indicator rows
    pub async fn entry_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM threat_indicators")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count indicators")?;

        Ok(count)
    }

    /// Indicator counts grouped by category
    pub async fn category_breakdown(&self) -> Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT category, COUNT(*) FROM threat_indicators GROUP BY category",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute category breakdown")?;

        Ok(rows.into_iter().collect())
    }
}
