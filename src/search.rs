// src/search.rs
//! On-demand topic search: fan out to every search-capable adapter at once,
//! merge, dedup, rank by relevance, persist the head of the ranking.

use chrono::Utc;
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::analyze::{RelevanceScorer, ScoredFinding};
use crate::config::MonitorConfig;
use crate::error::{SearchError, SourceError, ValidationError};
use crate::ingest::{
    dedup_findings, ensure_metrics_described, new_alert, AlertLimits, FetchMode, Query,
    SourceAdapter,
};
use crate::model::{Finding, QueryOrigin, RiskTier, SearchQueryId};
use crate::store::{AlertStore, InsertOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query_id: SearchQueryId,
    /// Size of the full ranked set, after dedup.
    pub results_count: usize,
    pub alerts_created: usize,
    pub source_failures: usize,
    /// Head of the ranking, at most the configured return limit.
    pub results: Vec<ScoredFinding>,
}

pub struct SearchOrchestrator {
    store: Arc<dyn AlertStore>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    relevance: RelevanceScorer,
    limits: AlertLimits,
    deadline: Duration,
    persist_limit: usize,
    return_limit: usize,
}

impl SearchOrchestrator {
    pub fn new(
        store: Arc<dyn AlertStore>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        relevance: RelevanceScorer,
        limits: AlertLimits,
    ) -> Self {
        Self {
            store,
            adapters,
            relevance,
            limits,
            deadline: Duration::from_secs(30),
            persist_limit: 20,
            return_limit: 10,
        }
    }

    pub fn from_config(
        cfg: &MonitorConfig,
        store: Arc<dyn AlertStore>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        relevance: RelevanceScorer,
    ) -> Self {
        Self::new(store, adapters, relevance, cfg.alert_limits())
            .with_deadline(cfg.adapter_deadline())
            .with_limits(cfg.search_persist_limit, cfg.search_return_limit)
    }

    /// Per-adapter deadline. A late adapter is abandoned, not retried.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_limits(mut self, persist: usize, ret: usize) -> Self {
        self.persist_limit = persist;
        self.return_limit = ret.min(persist);
        self
    }

    pub async fn run(
        &self,
        topic: &str,
        location: Option<&str>,
    ) -> Result<SearchOutcome, SearchError> {
        ensure_metrics_described();

        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ValidationError::MissingField("topic").into());
        }
        let query = Query::for_topic(topic, location);
        let location = query.location.clone();

        let audit = self
            .store
            .insert_search_query(topic, location.as_deref(), &query.query_text())
            .await?;
        tracing::info!(query_id = audit.id, topic, location = ?location, "search started");

        let (findings, source_failures) = self.fan_out(&query).await;

        let (unique, dropped) = dedup_findings(findings);
        counter!("dedup_dropped_total").increment(dropped as u64);

        let mut ranked = self
            .relevance
            .rank(unique, topic, location.as_deref(), Utc::now());
        let results_count = ranked.len();

        let mut alerts_created = 0;
        for s in ranked.iter().take(self.persist_limit) {
            let alert = new_alert(
                s.fingerprint.clone(),
                &s.finding,
                RiskTier::Low,
                Some(s.relevance_score),
                None,
                location.clone(),
                QueryOrigin::Search,
                self.limits,
            );
            match self.store.insert_alert_if_fingerprint_unique(alert).await {
                Ok(InsertOutcome::Inserted(_)) => {
                    alerts_created += 1;
                    counter!("alerts_created_total", "origin" => "search").increment(1);
                }
                Ok(InsertOutcome::Duplicate) => {
                    counter!("dedup_dropped_total").increment(1);
                }
                Err(e) => tracing::warn!(error = %e, "could not persist search result"),
            }
        }

        if let Err(e) = self
            .store
            .update_search_query_result_count(audit.id, results_count)
            .await
        {
            tracing::warn!(query_id = audit.id, error = %e, "could not record result count");
        }

        ranked.truncate(self.return_limit);
        tracing::info!(
            query_id = audit.id,
            results = results_count,
            alerts_created,
            failures = source_failures,
            "search complete"
        );
        Ok(SearchOutcome {
            query_id: audit.id,
            results_count,
            alerts_created,
            source_failures,
            results: ranked,
        })
    }

    /// Every adapter concurrently, each under its own deadline. Findings keep
    /// adapter order, then the adapter's own order.
    async fn fan_out(&self, query: &Query) -> (Vec<Finding>, usize) {
        let calls = self
            .adapters
            .iter()
            .filter(|a| a.supports(FetchMode::Search))
            .map(|a| async move {
                let kind = a.kind();
                let res = match tokio::time::timeout(
                    self.deadline,
                    a.fetch(query, FetchMode::Search),
                )
                .await
                {
                    Ok(r) => r,
                    Err(_) => Err(SourceError::Timeout {
                        source_kind: kind,
                        secs: self.deadline.as_secs(),
                    }),
                };
                (kind, res)
            });

        let mut all = Vec::new();
        let mut failures = 0;
        for (kind, res) in join_all(calls).await {
            match res {
                Ok(mut v) => {
                    counter!("findings_fetched_total", "source" => kind.as_str())
                        .increment(v.len() as u64);
                    all.append(&mut v);
                }
                Err(e) => {
                    failures += 1;
                    counter!("source_errors_total", "source" => kind.as_str()).increment(1);
                    tracing::warn!(source = %kind, error = %e, "search source failed");
                }
            }
        }
        (all, failures)
    }
}
