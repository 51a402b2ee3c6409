// tests/scan_cycle.rs
//
// Scan orchestration against in-memory adapters and the in-memory store.
//
// Covered:
// - a failing source does not abort the cycle
// - the same finding over two cycles persists once
// - a second trigger while a cycle runs is skipped
// - a finding seen by a scan is not re-persisted by a search
// - with SQLite, a restart neither loses targets nor re-alerts old findings

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use threat_monitor::analyze::{RelevanceScorer, RiskScorer};
use threat_monitor::config::MonitorConfig;
use threat_monitor::error::SourceError;
use threat_monitor::ingest::{FetchMode, Query, SourceAdapter};
use threat_monitor::model::{AlertFilter, Finding, NewTarget, QueryOrigin, SourceKind};
use threat_monitor::scan::{ScanOrchestrator, ScanOutcome};
use threat_monitor::search::SearchOrchestrator;
use threat_monitor::store::{AlertStore, MemoryStore};

/// Returns one finding per keyword, titled after the keyword.
struct Echo {
    kind: SourceKind,
    calls: AtomicUsize,
}

impl Echo {
    fn new(kind: SourceKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            calls: AtomicUsize::new(0),
        })
    }
}

fn finding(title: &str, kind: SourceKind) -> Finding {
    Finding {
        title: title.to_string(),
        body: "seen in the wild".into(),
        url: format!("https://example.test/{}", title.replace(' ', "-")),
        source: kind,
        published_at: Utc::now(),
        signal: None,
    }
}

#[async_trait]
impl SourceAdapter for Echo {
    fn kind(&self) -> SourceKind {
        self.kind
    }
    fn supports(&self, _mode: FetchMode) -> bool {
        true
    }
    async fn fetch(&self, q: &Query, _mode: FetchMode) -> Result<Vec<Finding>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(q
            .keywords
            .iter()
            .map(|k| finding(&format!("{k} token exposed"), self.kind))
            .collect())
    }
}

struct Broken(SourceKind);

#[async_trait]
impl SourceAdapter for Broken {
    fn kind(&self) -> SourceKind {
        self.0
    }
    fn supports(&self, mode: FetchMode) -> bool {
        mode == FetchMode::Monitor
    }
    async fn fetch(&self, _q: &Query, _mode: FetchMode) -> Result<Vec<Finding>, SourceError> {
        Err(SourceError::Status {
            source_kind: self.0,
            status: 503,
        })
    }
}

/// Blocks until released, so a cycle can be held open.
struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl SourceAdapter for Gate {
    fn kind(&self) -> SourceKind {
        SourceKind::News
    }
    fn supports(&self, _mode: FetchMode) -> bool {
        true
    }
    async fn fetch(&self, _q: &Query, _mode: FetchMode) -> Result<Vec<Finding>, SourceError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(vec![])
    }
}

async fn store_with_targets(names: &[&str]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for n in names {
        store
            .create_target(NewTarget {
                name: n.to_string(),
                keywords: vec![n.to_lowercase()],
                target_type: "company".into(),
            })
            .await
            .unwrap();
    }
    store
}

fn scan(store: Arc<MemoryStore>, adapters: Vec<Arc<dyn SourceAdapter>>) -> ScanOrchestrator {
    ScanOrchestrator::new(
        store,
        adapters,
        RiskScorer::default(),
        MonitorConfig::default().alert_limits(),
    )
}

#[tokio::test]
async fn failing_source_is_isolated() {
    let store = store_with_targets(&["Acme", "Globex"]).await;
    let reddit = Echo::new(SourceKind::Reddit);
    let orch = scan(
        store.clone(),
        vec![
            reddit.clone(),
            Arc::new(Broken(SourceKind::Github)),
            Echo::new(SourceKind::Hackernews),
        ],
    );

    let ScanOutcome::Completed(report) = orch.run_cycle().await else {
        panic!("cycle should run");
    };
    // reddit and hackernews each produce the same title per target, but urls
    // and bodies match too, so they collapse to one alert per target
    assert_eq!(report.alerts_created, 2);
    assert_eq!(report.duplicates, 2);
    assert_eq!(report.source_failures, 2);
    assert_eq!(report.targets_scanned, 2);
    assert_eq!(reddit.calls.load(Ordering::SeqCst), 2);

    let page = store.query_alerts(&AlertFilter::default(), 1, 20).await.unwrap();
    assert_eq!(page.total, 2);
    // "token" + "exposed" are both high-risk terms
    assert!(page
        .items
        .iter()
        .all(|a| a.risk_level == threat_monitor::model::RiskTier::High));
}

#[tokio::test]
async fn second_cycle_persists_nothing_new() {
    let store = store_with_targets(&["Acme"]).await;
    let orch = scan(store.clone(), vec![Echo::new(SourceKind::Reddit)]);

    assert_eq!(orch.run_cycle().await.alerts_created(), 1);
    let again = orch.run_cycle().await;
    assert_eq!(again.alerts_created(), 0);
    let ScanOutcome::Completed(r) = again else {
        panic!("cycle should run");
    };
    assert_eq!(r.duplicates, 1);
    assert_eq!(store.alert_totals().await.unwrap().total, 1);
}

#[tokio::test]
async fn deactivated_target_is_not_scanned() {
    let store = store_with_targets(&["Acme", "Globex"]).await;
    store.deactivate_target(2).await.unwrap();
    let echo = Echo::new(SourceKind::Reddit);
    let orch = scan(store, vec![echo.clone()]);
    assert_eq!(orch.run_cycle().await.alerts_created(), 1);
    assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn zero_targets_is_a_valid_empty_cycle() {
    let store = Arc::new(MemoryStore::new());
    let orch = scan(store, vec![Echo::new(SourceKind::Reddit)]);
    assert!(matches!(orch.run_cycle().await, ScanOutcome::Completed(r) if r.alerts_created == 0));
}

#[tokio::test]
async fn overlapping_trigger_is_skipped() {
    let store = store_with_targets(&["Acme"]).await;
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let orch = Arc::new(scan(
        store,
        vec![Arc::new(Gate {
            entered: entered.clone(),
            release: release.clone(),
        })],
    ));

    let first = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.run_cycle().await })
    };
    entered.notified().await;
    assert!(orch.is_running());

    assert_eq!(orch.run_cycle().await, ScanOutcome::Skipped);

    release.notify_one();
    assert!(matches!(first.await.unwrap(), ScanOutcome::Completed(_)));
    assert!(!orch.is_running());
}

#[tokio::test]
async fn search_does_not_duplicate_what_a_scan_found() {
    let store = store_with_targets(&["acme"]).await;
    let echo = Echo::new(SourceKind::Reddit);
    let orch = scan(store.clone(), vec![echo.clone()]);
    assert_eq!(orch.run_cycle().await.alerts_created(), 1);

    let search = SearchOrchestrator::new(
        store.clone(),
        vec![echo],
        RelevanceScorer::default(),
        MonitorConfig::default().alert_limits(),
    );
    let out = search.run("acme", None).await.unwrap();
    assert_eq!(out.results_count, 1);
    assert_eq!(out.alerts_created, 0);

    let all = store.query_alerts(&AlertFilter::default(), 1, 20).await.unwrap();
    assert_eq!(all.total, 1);
    assert_eq!(all.items[0].query_type, QueryOrigin::Monitoring);
}

#[tokio::test]
async fn sqlite_restart_keeps_targets_and_fingerprints() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = MonitorConfig {
        database_url: Some(format!("sqlite://{}", tmp.path().join("monitor.db").display())),
        ..MonitorConfig::default()
    };

    let store = threat_monitor::open_store(&cfg).await.unwrap();
    store
        .create_target(NewTarget {
            name: "Acme".into(),
            keywords: vec!["acme".into()],
            target_type: "company".into(),
        })
        .await
        .unwrap();
    let first = ScanOrchestrator::new(
        store.clone(),
        vec![Echo::new(SourceKind::Reddit)],
        RiskScorer::default(),
        cfg.alert_limits(),
    );
    assert_eq!(first.run_cycle().await.alerts_created(), 1);
    drop(first);
    drop(store);

    // fresh process, same file
    let store = threat_monitor::open_store(&cfg).await.unwrap();
    assert_eq!(store.list_active_targets().await.unwrap().len(), 1);
    let second = ScanOrchestrator::new(
        store.clone(),
        vec![Echo::new(SourceKind::Reddit)],
        RiskScorer::default(),
        cfg.alert_limits(),
    );
    assert_eq!(second.run_cycle().await.alerts_created(), 0);
    assert_eq!(store.alert_totals().await.unwrap().total, 1);
}
