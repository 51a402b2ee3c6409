// src/scan.rs
//! Scheduled monitoring sweep: every active target against every
//! monitor-capable adapter, fetch → fingerprint → risk tier → persist.
//!
//! Work is split into one worker per source family. Workers run concurrently;
//! inside a worker targets are visited one after another with a pause in
//! between, and every outbound call waits on the family's shared pacer.

use futures::future::join_all;
use metrics::{counter, gauge};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::analyze::RiskScorer;
use crate::config::MonitorConfig;
use crate::ingest::{
    ensure_metrics_described, fingerprint, new_alert, AlertLimits, FetchMode, Query,
    SourceAdapter,
};
use crate::model::{truncate_chars, Finding, QueryOrigin, SourceKind, Target};
use crate::store::{AlertStore, InsertOutcome};

/// Tally of one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ScanReport {
    pub alerts_created: usize,
    pub targets_scanned: usize,
    pub findings_fetched: usize,
    pub duplicates: usize,
    pub source_failures: usize,
}

impl ScanReport {
    fn absorb(&mut self, other: ScanReport) {
        self.alerts_created += other.alerts_created;
        self.findings_fetched += other.findings_fetched;
        self.duplicates += other.duplicates;
        self.source_failures += other.source_failures;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed(ScanReport),
    /// Another cycle held the guard; nothing was done.
    Skipped,
}

impl ScanOutcome {
    pub fn alerts_created(&self) -> usize {
        match self {
            ScanOutcome::Completed(r) => r.alerts_created,
            ScanOutcome::Skipped => 0,
        }
    }
}

pub struct ScanOrchestrator {
    store: Arc<dyn AlertStore>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    risk: RiskScorer,
    limits: AlertLimits,
    target_pause: Duration,
    running: Mutex<()>,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn AlertStore>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        risk: RiskScorer,
        limits: AlertLimits,
    ) -> Self {
        Self {
            store,
            adapters,
            risk,
            limits,
            target_pause: Duration::ZERO,
            running: Mutex::new(()),
        }
    }

    pub fn from_config(
        cfg: &MonitorConfig,
        store: Arc<dyn AlertStore>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        risk: RiskScorer,
    ) -> Self {
        Self::new(store, adapters, risk, cfg.alert_limits()).with_target_pause(cfg.target_pause())
    }

    /// Pause between two targets within one source worker.
    pub fn with_target_pause(mut self, pause: Duration) -> Self {
        self.target_pause = pause;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Run one cycle unless one is already in flight.
    pub async fn run_cycle(&self) -> ScanOutcome {
        ensure_metrics_described();

        let Ok(_guard) = self.running.try_lock() else {
            counter!("scan_skipped_total").increment(1);
            tracing::info!("scan already running, trigger ignored");
            return ScanOutcome::Skipped;
        };

        let t0 = std::time::Instant::now();
        let targets = match self.store.list_active_targets().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "could not list targets, cycle ends empty");
                return ScanOutcome::Completed(ScanReport::default());
            }
        };

        let targets: Vec<Target> = targets
            .into_iter()
            .filter(|t| {
                let keep = t.keywords.iter().any(|k| !k.trim().is_empty());
                if !keep {
                    tracing::info!(target_name = %t.name, "target has no keywords, skipped");
                }
                keep
            })
            .collect();

        tracing::info!(targets = targets.len(), "scan cycle started");

        let workers = self
            .families()
            .into_iter()
            .map(|(kind, adapters)| self.run_family(kind, adapters, &targets));
        let mut report = ScanReport {
            targets_scanned: targets.len(),
            ..Default::default()
        };
        for partial in join_all(workers).await {
            report.absorb(partial);
        }

        counter!("scan_cycles_total").increment(1);
        gauge!("scan_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        tracing::info!(
            alerts_created = report.alerts_created,
            targets = report.targets_scanned,
            fetched = report.findings_fetched,
            duplicates = report.duplicates,
            failures = report.source_failures,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "scan cycle complete"
        );
        ScanOutcome::Completed(report)
    }

    /// Monitor-capable adapters grouped by family, in configured order.
    fn families(&self) -> BTreeMap<SourceKind, Vec<Arc<dyn SourceAdapter>>> {
        let mut out: BTreeMap<SourceKind, Vec<Arc<dyn SourceAdapter>>> = BTreeMap::new();
        for a in self.adapters.iter().filter(|a| a.supports(FetchMode::Monitor)) {
            out.entry(a.kind()).or_default().push(a.clone());
        }
        out
    }

    async fn run_family(
        &self,
        kind: SourceKind,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        targets: &[Target],
    ) -> ScanReport {
        let mut report = ScanReport::default();
        for (i, target) in targets.iter().enumerate() {
            if i > 0 && !self.target_pause.is_zero() {
                tokio::time::sleep(self.target_pause).await;
            }
            let query = Query::for_target(target);
            for adapter in &adapters {
                match adapter.fetch(&query, FetchMode::Monitor).await {
                    Ok(findings) => {
                        counter!("findings_fetched_total", "source" => kind.as_str())
                            .increment(findings.len() as u64);
                        report.findings_fetched += findings.len();
                        for f in findings {
                            self.record(target, f, &mut report).await;
                        }
                    }
                    Err(e) => {
                        counter!("source_errors_total", "source" => kind.as_str()).increment(1);
                        tracing::warn!(source = %kind, target_name = %target.name, error = %e, "source fetch failed");
                        report.source_failures += 1;
                    }
                }
            }
        }
        report
    }

    async fn record(&self, target: &Target, f: Finding, report: &mut ScanReport) {
        if f.title.trim().is_empty() {
            return;
        }
        let fp = fingerprint(&f);
        let tier = self.risk.score_finding(&f);
        let alert = new_alert(
            fp,
            &f,
            tier,
            None,
            Some(target.id),
            None,
            QueryOrigin::Monitoring,
            self.limits,
        );
        match self.store.insert_alert_if_fingerprint_unique(alert).await {
            Ok(InsertOutcome::Inserted(id)) => {
                report.alerts_created += 1;
                counter!("alerts_created_total", "origin" => "monitoring").increment(1);
                tracing::info!(
                    alert_id = id,
                    risk = %tier,
                    source = %f.source,
                    title = %truncate_chars(&f.title, 50),
                    "new alert"
                );
            }
            Ok(InsertOutcome::Duplicate) => {
                report.duplicates += 1;
                counter!("dedup_dropped_total").increment(1);
                tracing::debug!(source = %f.source, "already seen");
            }
            Err(e) => {
                tracing::warn!(source = %f.source, error = %e, "could not persist alert");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::model::NewTarget;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;

    struct Fixed(SourceKind, Vec<(&'static str, &'static str)>);

    #[async_trait]
    impl SourceAdapter for Fixed {
        fn kind(&self) -> SourceKind {
            self.0
        }
        fn supports(&self, mode: FetchMode) -> bool {
            mode == FetchMode::Monitor
        }
        async fn fetch(&self, _q: &Query, _m: FetchMode) -> Result<Vec<Finding>, SourceError> {
            Ok(self
                .1
                .iter()
                .map(|(title, url)| Finding {
                    title: title.to_string(),
                    body: String::new(),
                    url: url.to_string(),
                    source: self.0,
                    published_at: Utc::now(),
                    signal: None,
                })
                .collect())
        }
    }

    fn limits() -> AlertLimits {
        AlertLimits {
            title_max_chars: 200,
            description_max_chars: 1000,
        }
    }

    async fn store_with_target(keywords: Vec<String>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .create_target(NewTarget {
                name: "Acme".into(),
                keywords,
                target_type: "company".into(),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn empty_titles_are_dropped_and_tiers_assigned() {
        let store = store_with_target(vec!["acme".into()]).await;
        let scan = ScanOrchestrator::new(
            store.clone(),
            vec![Arc::new(Fixed(
                SourceKind::Reddit,
                vec![("Acme data breach", "u1"), ("", "u2"), ("Acme picnic", "u3")],
            ))],
            RiskScorer::default(),
            limits(),
        );
        let ScanOutcome::Completed(r) = scan.run_cycle().await else {
            panic!("expected a completed cycle");
        };
        assert_eq!(r.alerts_created, 2);
        assert_eq!(r.findings_fetched, 3);
        let page = store
            .query_alerts(&Default::default(), 1, 20)
            .await
            .unwrap();
        let tiers: Vec<_> = page.items.iter().map(|a| a.risk_level).collect();
        assert_eq!(tiers, vec![crate::model::RiskTier::Low, crate::model::RiskTier::Critical]);
        assert!(page.items.iter().all(|a| a.target_id == Some(1)));
    }

    #[tokio::test]
    async fn target_without_keywords_is_skipped() {
        let store = store_with_target(vec!["  ".into()]).await;
        let scan = ScanOrchestrator::new(
            store,
            vec![Arc::new(Fixed(SourceKind::Github, vec![("x", "u")]))],
            RiskScorer::default(),
            limits(),
        );
        assert_eq!(
            scan.run_cycle().await,
            ScanOutcome::Completed(ScanReport::default())
        );
    }

    #[tokio::test]
    async fn same_item_from_two_families_is_stored_once() {
        let store = store_with_target(vec!["acme".into()]).await;
        let scan = ScanOrchestrator::new(
            store.clone(),
            vec![
                Arc::new(Fixed(SourceKind::Reddit, vec![("Acme", "https://same")])),
                Arc::new(Fixed(SourceKind::Hackernews, vec![("Acme", "https://same")])),
            ],
            RiskScorer::default(),
            limits(),
        );
        let ScanOutcome::Completed(r) = scan.run_cycle().await else {
            panic!("expected a completed cycle");
        };
        assert_eq!(r.alerts_created, 1);
        assert_eq!(r.duplicates, 1);
    }
}
