// src/store/memory.rs
//! In-process store. All state sits behind one `tokio::sync::RwLock`, so
//! each trait method is atomic with respect to the others.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{AlertStore, AlertTotals, InsertOutcome};
use crate::error::StoreError;
use crate::model::{
    Alert, AlertFilter, AlertId, AlertStatus, NewAlert, NewTarget, Page, RiskTier, SearchQuery,
    SearchQueryId, Target, TargetId,
};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Default)]
struct Inner {
    targets: Vec<Target>,
    // insertion order == id order == created_at order
    alerts: Vec<Alert>,
    fingerprints: HashSet<String>,
    queries: Vec<SearchQuery>,
    next_target: TargetId,
    next_alert: AlertId,
    next_query: SearchQueryId,
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    clock: Clock,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    /// Store whose `created_at` stamps come from `clock`.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
        }
    }
}

fn passes(filter: &AlertFilter, a: &Alert) -> bool {
    filter.risk_level.map_or(true, |r| a.risk_level == r)
        && filter.status.map_or(true, |s| a.status == s)
        && filter.query_type.map_or(true, |q| a.query_type == q)
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn create_target(&self, target: NewTarget) -> Result<Target, StoreError> {
        let mut g = self.inner.write().await;
        g.next_target += 1;
        let t = Target {
            id: g.next_target,
            name: target.name,
            keywords: target.keywords,
            target_type: target.target_type,
            active: true,
            created_at: (self.clock)(),
        };
        g.targets.push(t.clone());
        Ok(t)
    }

    async fn get_target(&self, id: TargetId) -> Result<Target, StoreError> {
        let g = self.inner.read().await;
        g.targets
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "target", id })
    }

    async fn list_active_targets(&self) -> Result<Vec<Target>, StoreError> {
        let g = self.inner.read().await;
        Ok(g.targets.iter().filter(|t| t.active).cloned().collect())
    }

    async fn deactivate_target(&self, id: TargetId) -> Result<Target, StoreError> {
        let mut g = self.inner.write().await;
        let t = g
            .targets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound { entity: "target", id })?;
        t.active = false;
        Ok(t.clone())
    }

    async fn insert_alert_if_fingerprint_unique(
        &self,
        alert: NewAlert,
    ) -> Result<InsertOutcome, StoreError> {
        let mut g = self.inner.write().await;
        if !g.fingerprints.insert(alert.fingerprint.clone()) {
            return Ok(InsertOutcome::Duplicate);
        }
        g.next_alert += 1;
        let id = g.next_alert;
        g.alerts.push(Alert {
            id,
            fingerprint: alert.fingerprint,
            title: alert.title,
            description: alert.description,
            source_url: alert.source_url,
            source_type: alert.source_type,
            risk_level: alert.risk_level,
            relevance_score: alert.relevance_score,
            status: AlertStatus::New,
            created_at: (self.clock)(),
            target_id: alert.target_id,
            location: alert.location,
            query_type: alert.query_type,
        });
        Ok(InsertOutcome::Inserted(id))
    }

    async fn query_alerts(
        &self,
        filter: &AlertFilter,
        page: usize,
        per_page: usize,
    ) -> Result<Page<Alert>, StoreError> {
        let g = self.inner.read().await;
        let mut rows: Vec<Alert> = g
            .alerts
            .iter()
            .rev()
            .filter(|a| passes(filter, a))
            .cloned()
            .collect();
        // newest first; id breaks ties between equal timestamps
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(Page::slice(&rows, page, per_page))
    }

    async fn update_alert_status(
        &self,
        id: AlertId,
        status: AlertStatus,
    ) -> Result<Alert, StoreError> {
        let mut g = self.inner.write().await;
        let a = g
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound { entity: "alert", id })?;
        a.status = status;
        Ok(a.clone())
    }

    async fn insert_search_query(
        &self,
        topic: &str,
        location: Option<&str>,
        query_text: &str,
    ) -> Result<SearchQuery, StoreError> {
        let mut g = self.inner.write().await;
        g.next_query += 1;
        let q = SearchQuery {
            id: g.next_query,
            topic: topic.to_string(),
            location: location.map(str::to_string),
            query_text: query_text.to_string(),
            created_at: (self.clock)(),
            results_count: 0,
        };
        g.queries.push(q.clone());
        Ok(q)
    }

    async fn update_search_query_result_count(
        &self,
        id: SearchQueryId,
        results_count: usize,
    ) -> Result<(), StoreError> {
        let mut g = self.inner.write().await;
        let q = g
            .queries
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or(StoreError::NotFound {
                entity: "search query",
                id,
            })?;
        q.results_count = results_count;
        Ok(())
    }

    async fn list_search_queries(&self, limit: usize) -> Result<Vec<SearchQuery>, StoreError> {
        let g = self.inner.read().await;
        Ok(g.queries.iter().rev().take(limit).cloned().collect())
    }

    async fn aggregate_alert_counts_by_risk_tier(
        &self,
        since: DateTime<Utc>,
    ) -> Result<BTreeMap<RiskTier, usize>, StoreError> {
        let g = self.inner.read().await;
        let mut out = BTreeMap::new();
        for a in g.alerts.iter().filter(|a| a.created_at >= since) {
            *out.entry(a.risk_level).or_insert(0) += 1;
        }
        Ok(out)
    }

    async fn alert_totals(&self) -> Result<AlertTotals, StoreError> {
        let g = self.inner.read().await;
        Ok(g.alerts.iter().fold(AlertTotals::default(), |mut acc, a| {
            acc.total += 1;
            if a.status == AlertStatus::New {
                acc.new += 1;
            }
            if a.risk_level == RiskTier::Critical {
                acc.critical += 1;
            }
            acc
        }))
    }

    async fn count_active_targets(&self) -> Result<usize, StoreError> {
        let g = self.inner.read().await;
        Ok(g.targets.iter().filter(|t| t.active).count())
    }

    async fn count_new_alerts_for_target(&self, target: TargetId) -> Result<usize, StoreError> {
        let g = self.inner.read().await;
        Ok(g
            .alerts
            .iter()
            .filter(|a| a.target_id == Some(target) && a.status == AlertStatus::New)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QueryOrigin, SourceKind};
    use chrono::Duration;
    use std::sync::Mutex;

    fn alert(fp: &str, tier: RiskTier, origin: QueryOrigin, target: Option<TargetId>) -> NewAlert {
        NewAlert {
            fingerprint: fp.into(),
            title: format!("title {fp}"),
            description: String::new(),
            source_url: format!("https://x.test/{fp}"),
            source_type: SourceKind::Reddit,
            risk_level: tier,
            relevance_score: None,
            target_id: target,
            location: None,
            query_type: origin,
        }
    }

    #[tokio::test]
    async fn duplicate_fingerprint_is_not_an_error() {
        let s = MemoryStore::new();
        let a = alert("fp1", RiskTier::Low, QueryOrigin::Monitoring, None);
        assert_eq!(
            s.insert_alert_if_fingerprint_unique(a.clone()).await.unwrap(),
            InsertOutcome::Inserted(1)
        );
        assert_eq!(
            s.insert_alert_if_fingerprint_unique(a).await.unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(s.alert_totals().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn concurrent_inserts_of_same_fingerprint_yield_one_row() {
        let s = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let s = s.clone();
            handles.push(tokio::spawn(async move {
                s.insert_alert_if_fingerprint_unique(alert(
                    "same",
                    RiskTier::High,
                    QueryOrigin::Monitoring,
                    None,
                ))
                .await
                .unwrap()
            }));
        }
        let mut inserted = 0;
        for h in handles {
            if h.await.unwrap().is_inserted() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn query_filters_and_orders_newest_first() {
        let s = MemoryStore::new();
        s.insert_alert_if_fingerprint_unique(alert("a", RiskTier::Critical, QueryOrigin::Monitoring, None))
            .await
            .unwrap();
        s.insert_alert_if_fingerprint_unique(alert("b", RiskTier::Low, QueryOrigin::Search, None))
            .await
            .unwrap();
        s.insert_alert_if_fingerprint_unique(alert("c", RiskTier::Critical, QueryOrigin::Monitoring, None))
            .await
            .unwrap();

        let all = s.query_alerts(&AlertFilter::default(), 1, 20).await.unwrap();
        let fps: Vec<_> = all.items.iter().map(|a| a.fingerprint.as_str()).collect();
        assert_eq!(fps, vec!["c", "b", "a"]);

        let crit = AlertFilter {
            risk_level: Some(RiskTier::Critical),
            ..Default::default()
        };
        assert_eq!(s.query_alerts(&crit, 1, 20).await.unwrap().total, 2);

        let search = AlertFilter {
            query_type: Some(QueryOrigin::Search),
            ..Default::default()
        };
        assert_eq!(s.query_alerts(&search, 1, 20).await.unwrap().items[0].fingerprint, "b");
    }

    #[tokio::test]
    async fn status_update_and_not_found() {
        let s = MemoryStore::new();
        s.insert_alert_if_fingerprint_unique(alert("a", RiskTier::Low, QueryOrigin::Monitoring, Some(1)))
            .await
            .unwrap();
        let a = s.update_alert_status(1, AlertStatus::Dismissed).await.unwrap();
        assert_eq!(a.status, AlertStatus::Dismissed);
        assert!(matches!(
            s.update_alert_status(99, AlertStatus::Reviewed).await,
            Err(StoreError::NotFound { entity: "alert", id: 99 })
        ));
        assert_eq!(s.count_new_alerts_for_target(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deactivated_targets_leave_the_active_list() {
        let s = MemoryStore::new();
        let t = s
            .create_target(NewTarget {
                name: "Acme".into(),
                keywords: vec!["acme".into()],
                target_type: "company".into(),
            })
            .await
            .unwrap();
        assert_eq!(s.count_active_targets().await.unwrap(), 1);
        s.deactivate_target(t.id).await.unwrap();
        assert!(s.list_active_targets().await.unwrap().is_empty());
        // still resolvable for historical alerts
        assert!(!s.get_target(t.id).await.unwrap().active);
    }

    #[tokio::test]
    async fn aggregate_respects_since() {
        let now = Utc::now();
        let stamp = Arc::new(Mutex::new(now - Duration::days(10)));
        let clock_stamp = stamp.clone();
        let s = MemoryStore::with_clock(Arc::new(move || *clock_stamp.lock().unwrap()));

        s.insert_alert_if_fingerprint_unique(alert("old", RiskTier::High, QueryOrigin::Monitoring, None))
            .await
            .unwrap();
        *stamp.lock().unwrap() = now - Duration::days(1);
        s.insert_alert_if_fingerprint_unique(alert("h", RiskTier::High, QueryOrigin::Monitoring, None))
            .await
            .unwrap();
        s.insert_alert_if_fingerprint_unique(alert("l", RiskTier::Low, QueryOrigin::Search, None))
            .await
            .unwrap();

        let counts = s
            .aggregate_alert_counts_by_risk_tier(now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(counts.get(&RiskTier::High), Some(&1));
        assert_eq!(counts.get(&RiskTier::Low), Some(&1));
        assert_eq!(counts.get(&RiskTier::Critical), None);
    }

    #[tokio::test]
    async fn search_history_newest_first_and_limited() {
        let s = MemoryStore::new();
        for i in 0..5 {
            let q = s
                .insert_search_query(&format!("t{i}"), None, &format!("t{i}"))
                .await
                .unwrap();
            s.update_search_query_result_count(q.id, i).await.unwrap();
        }
        let h = s.list_search_queries(3).await.unwrap();
        assert_eq!(h.len(), 3);
        assert_eq!(h[0].topic, "t4");
        assert_eq!(h[0].results_count, 4);
    }
}
