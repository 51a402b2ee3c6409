// src/store/sqlite.rs
//! SQLite store. Targets, alerts and search history survive restarts, and the
//! `UNIQUE` fingerprint column keeps dedup working across them.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings, so text order
//! is time order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::{AlertStore, AlertTotals, InsertOutcome};
use crate::error::StoreError;
use crate::model::{
    Alert, AlertFilter, AlertId, AlertStatus, NewAlert, NewTarget, Page, QueryOrigin, RiskTier,
    SearchQuery, SearchQueryId, SourceKind, Target, TargetId,
};

const ALERT_COLUMNS: &str = "id, fingerprint, title, description, source_url, source_type, \
     risk_level, relevance_score, status, created_at, target_id, location, query_type";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url` and apply
    /// the schema.
    ///
    /// # Example URLs
    /// - `sqlite://data/monitor.db`
    /// - `sqlite::memory:`
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // every pooled connection to `:memory:` would get its own database
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        }
        .connect_with(options)
        .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS targets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                keywords TEXT NOT NULL DEFAULT '[]',
                target_type TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fingerprint TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                source_url TEXT NOT NULL,
                source_type TEXT NOT NULL,
                risk_level TEXT NOT NULL,
                relevance_score REAL,
                status TEXT NOT NULL DEFAULT 'new',
                created_at TEXT NOT NULL,
                target_id INTEGER,
                location TEXT,
                query_type TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_alerts_created_at ON alerts(created_at);
            CREATE INDEX IF NOT EXISTS idx_alerts_target_id ON alerts(target_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_queries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                location TEXT,
                query_text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                results_count INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{s}': {e}")))
}

fn parse_col<T: FromStr>(s: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    s.parse::<T>().map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn id_arg(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

#[derive(Debug, FromRow)]
struct TargetRow {
    id: i64,
    name: String,
    keywords: String,
    target_type: String,
    active: bool,
    created_at: String,
}

impl TargetRow {
    fn into_target(self) -> Result<Target, StoreError> {
        let keywords: Vec<String> = serde_json::from_str(&self.keywords)
            .map_err(|e| StoreError::Corrupt(format!("keywords: {e}")))?;
        Ok(Target {
            id: self.id as TargetId,
            name: self.name,
            keywords,
            target_type: self.target_type,
            active: self.active,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct AlertRow {
    id: i64,
    fingerprint: String,
    title: String,
    description: String,
    source_url: String,
    source_type: String,
    risk_level: String,
    relevance_score: Option<f64>,
    status: String,
    created_at: String,
    target_id: Option<i64>,
    location: Option<String>,
    query_type: String,
}

impl AlertRow {
    fn into_alert(self) -> Result<Alert, StoreError> {
        Ok(Alert {
            id: self.id as AlertId,
            fingerprint: self.fingerprint,
            title: self.title,
            description: self.description,
            source_url: self.source_url,
            source_type: parse_col::<SourceKind>(&self.source_type)?,
            risk_level: parse_col::<RiskTier>(&self.risk_level)?,
            relevance_score: self.relevance_score,
            status: parse_col::<AlertStatus>(&self.status)?,
            created_at: parse_ts(&self.created_at)?,
            target_id: self.target_id.map(|t| t as TargetId),
            location: self.location,
            query_type: parse_col::<QueryOrigin>(&self.query_type)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct SearchQueryRow {
    id: i64,
    topic: String,
    location: Option<String>,
    query_text: String,
    created_at: String,
    results_count: i64,
}

impl SearchQueryRow {
    fn into_query(self) -> Result<SearchQuery, StoreError> {
        Ok(SearchQuery {
            id: self.id as SearchQueryId,
            topic: self.topic,
            location: self.location,
            query_text: self.query_text,
            created_at: parse_ts(&self.created_at)?,
            results_count: self.results_count.max(0) as usize,
        })
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AlertFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(r) = filter.risk_level {
        qb.push(" AND risk_level = ").push_bind(r.as_str());
    }
    if let Some(s) = filter.status {
        qb.push(" AND status = ").push_bind(s.as_str());
    }
    if let Some(q) = filter.query_type {
        qb.push(" AND query_type = ").push_bind(q.as_str());
    }
}

#[async_trait]
impl AlertStore for SqliteStore {
    async fn create_target(&self, target: NewTarget) -> Result<Target, StoreError> {
        let keywords = serde_json::to_string(&target.keywords)
            .map_err(|e| StoreError::Corrupt(format!("keywords: {e}")))?;
        let row = sqlx::query_as::<_, TargetRow>(
            "INSERT INTO targets (name, keywords, target_type, active, created_at)
             VALUES (?, ?, ?, 1, ?)
             RETURNING id, name, keywords, target_type, active, created_at",
        )
        .bind(&target.name)
        .bind(keywords)
        .bind(&target.target_type)
        .bind(ts(Utc::now()))
        .fetch_one(&self.pool)
        .await?;
        row.into_target()
    }

    async fn get_target(&self, id: TargetId) -> Result<Target, StoreError> {
        sqlx::query_as::<_, TargetRow>(
            "SELECT id, name, keywords, target_type, active, created_at FROM targets WHERE id = ?",
        )
        .bind(id_arg(id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound { entity: "target", id })?
        .into_target()
    }

    async fn list_active_targets(&self) -> Result<Vec<Target>, StoreError> {
        sqlx::query_as::<_, TargetRow>(
            "SELECT id, name, keywords, target_type, active, created_at
             FROM targets WHERE active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(TargetRow::into_target)
        .collect()
    }

    async fn deactivate_target(&self, id: TargetId) -> Result<Target, StoreError> {
        sqlx::query_as::<_, TargetRow>(
            "UPDATE targets SET active = 0 WHERE id = ?
             RETURNING id, name, keywords, target_type, active, created_at",
        )
        .bind(id_arg(id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound { entity: "target", id })?
        .into_target()
    }

    async fn insert_alert_if_fingerprint_unique(
        &self,
        alert: NewAlert,
    ) -> Result<InsertOutcome, StoreError> {
        let res = sqlx::query(
            "INSERT INTO alerts (fingerprint, title, description, source_url, source_type,
                risk_level, relevance_score, status, created_at, target_id, location, query_type)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'new', ?, ?, ?, ?)
             ON CONFLICT(fingerprint) DO NOTHING",
        )
        .bind(&alert.fingerprint)
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(&alert.source_url)
        .bind(alert.source_type.as_str())
        .bind(alert.risk_level.as_str())
        .bind(alert.relevance_score)
        .bind(ts(Utc::now()))
        .bind(alert.target_id.map(id_arg))
        .bind(&alert.location)
        .bind(alert.query_type.as_str())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            tracing::debug!(fingerprint = %alert.fingerprint, "fingerprint already stored");
            return Ok(InsertOutcome::Duplicate);
        }
        Ok(InsertOutcome::Inserted(res.last_insert_rowid() as AlertId))
    }

    async fn query_alerts(
        &self,
        filter: &AlertFilter,
        page: usize,
        per_page: usize,
    ) -> Result<Page<Alert>, StoreError> {
        let per_page = per_page.max(1);
        let page = page.max(1);

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM alerts");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let offset = (page - 1).saturating_mul(per_page);
        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {ALERT_COLUMNS} FROM alerts"));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::try_from(per_page).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
        let items = select
            .build_query_as::<AlertRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AlertRow::into_alert)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::from_parts(items, total.max(0) as usize, page, per_page))
    }

    async fn update_alert_status(
        &self,
        id: AlertId,
        status: AlertStatus,
    ) -> Result<Alert, StoreError> {
        let sql = format!("UPDATE alerts SET status = ? WHERE id = ? RETURNING {ALERT_COLUMNS}");
        sqlx::query_as::<_, AlertRow>(&sql)
            .bind(status.as_str())
            .bind(id_arg(id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "alert", id })?
            .into_alert()
    }

    async fn insert_search_query(
        &self,
        topic: &str,
        location: Option<&str>,
        query_text: &str,
    ) -> Result<SearchQuery, StoreError> {
        sqlx::query_as::<_, SearchQueryRow>(
            "INSERT INTO search_queries (topic, location, query_text, created_at, results_count)
             VALUES (?, ?, ?, ?, 0)
             RETURNING id, topic, location, query_text, created_at, results_count",
        )
        .bind(topic)
        .bind(location)
        .bind(query_text)
        .bind(ts(Utc::now()))
        .fetch_one(&self.pool)
        .await?
        .into_query()
    }

    async fn update_search_query_result_count(
        &self,
        id: SearchQueryId,
        results_count: usize,
    ) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE search_queries SET results_count = ? WHERE id = ?")
            .bind(i64::try_from(results_count).unwrap_or(i64::MAX))
            .bind(id_arg(id))
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "search query",
                id,
            });
        }
        Ok(())
    }

    async fn list_search_queries(&self, limit: usize) -> Result<Vec<SearchQuery>, StoreError> {
        sqlx::query_as::<_, SearchQueryRow>(
            "SELECT id, topic, location, query_text, created_at, results_count
             FROM search_queries ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(SearchQueryRow::into_query)
        .collect()
    }

    async fn aggregate_alert_counts_by_risk_tier(
        &self,
        since: DateTime<Utc>,
    ) -> Result<BTreeMap<RiskTier, usize>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT risk_level, COUNT(*) FROM alerts WHERE created_at >= ? GROUP BY risk_level",
        )
        .bind(ts(since))
        .fetch_all(&self.pool)
        .await?;

        let mut out = BTreeMap::new();
        for (tier, n) in rows {
            out.insert(parse_col::<RiskTier>(&tier)?, n.max(0) as usize);
        }
        Ok(out)
    }

    async fn alert_totals(&self) -> Result<AlertTotals, StoreError> {
        let (total, new, critical): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'new' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN risk_level = 'critical' THEN 1 ELSE 0 END), 0)
             FROM alerts",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(AlertTotals {
            total: total.max(0) as usize,
            new: new.max(0) as usize,
            critical: critical.max(0) as usize,
        })
    }

    async fn count_active_targets(&self) -> Result<usize, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM targets WHERE active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as usize)
    }

    async fn count_new_alerts_for_target(&self, target: TargetId) -> Result<usize, StoreError> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM alerts WHERE target_id = ? AND status = 'new'",
        )
        .bind(id_arg(target))
        .fetch_one(&self.pool)
        .await?;
        Ok(n.max(0) as usize)
    }
}
