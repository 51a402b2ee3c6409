// src/store/mod.rs
//! Persistence boundary consumed by the scan and search pipelines and the API.
//!
//! Every method is a single-row write or a simple aggregate. The only
//! cross-task guarantee the pipelines rely on is that
//! [`AlertStore::insert_alert_if_fingerprint_unique`] checks and records the
//! fingerprint atomically.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::model::{
    Alert, AlertFilter, AlertId, AlertStatus, NewAlert, NewTarget, Page, RiskTier, SearchQuery,
    SearchQueryId, Target, TargetId,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Result of an insert attempt. A fingerprint already on record is the
/// normal dedup signal, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(AlertId),
    Duplicate,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

/// Headline counters for the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertTotals {
    pub total: usize,
    pub new: usize,
    pub critical: usize,
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create_target(&self, target: NewTarget) -> Result<Target, StoreError>;

    async fn get_target(&self, id: TargetId) -> Result<Target, StoreError>;

    async fn list_active_targets(&self) -> Result<Vec<Target>, StoreError>;

    /// Soft delete. The row stays so old alerts keep their target link.
    async fn deactivate_target(&self, id: TargetId) -> Result<Target, StoreError>;

    async fn insert_alert_if_fingerprint_unique(
        &self,
        alert: NewAlert,
    ) -> Result<InsertOutcome, StoreError>;

    /// Newest first. Out-of-range pages come back empty.
    async fn query_alerts(
        &self,
        filter: &AlertFilter,
        page: usize,
        per_page: usize,
    ) -> Result<Page<Alert>, StoreError>;

    async fn update_alert_status(
        &self,
        id: AlertId,
        status: AlertStatus,
    ) -> Result<Alert, StoreError>;

    async fn insert_search_query(
        &self,
        topic: &str,
        location: Option<&str>,
        query_text: &str,
    ) -> Result<SearchQuery, StoreError>;

    async fn update_search_query_result_count(
        &self,
        id: SearchQueryId,
        results_count: usize,
    ) -> Result<(), StoreError>;

    /// Newest first, at most `limit`.
    async fn list_search_queries(&self, limit: usize) -> Result<Vec<SearchQuery>, StoreError>;

    /// Alerts created at or after `since`, grouped by tier. Tiers with no
    /// alerts are absent.
    async fn aggregate_alert_counts_by_risk_tier(
        &self,
        since: DateTime<Utc>,
    ) -> Result<BTreeMap<RiskTier, usize>, StoreError>;

    async fn alert_totals(&self) -> Result<AlertTotals, StoreError>;

    async fn count_active_targets(&self) -> Result<usize, StoreError>;

    /// Alerts still in `new` status that were raised for `target`.
    async fn count_new_alerts_for_target(&self, target: TargetId) -> Result<usize, StoreError>;
}
