// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod scan;
pub mod scheduler;
pub mod search;
pub mod store;

use anyhow::Context;
use std::sync::Arc;

use crate::analyze::{RelevanceScorer, RiskScorer};
use crate::api::AppState;
use crate::config::{rules, MonitorConfig, RiskRules, SourceWeights};
use crate::ingest::{providers::default_adapters, SourcePacer};
use crate::scan::ScanOrchestrator;
use crate::search::SearchOrchestrator;
use crate::store::{AlertStore, MemoryStore, SqliteStore};

pub use crate::api::create_router;

/// Everything the binary wires together, built from one config.
pub struct Service {
    pub state: AppState,
    pub scan: Arc<ScanOrchestrator>,
}

impl Service {
    /// Real HTTP adapters and rule files from their default paths. Alerts go
    /// to SQLite when `database_url` is set, otherwise to memory.
    pub async fn from_config(cfg: &MonitorConfig) -> anyhow::Result<Self> {
        let client = cfg.http_client()?;
        let pacer = Arc::new(SourcePacer::from_config(cfg));
        let adapters = default_adapters(cfg, client, pacer);

        let risk = RiskScorer::new(RiskRules::load_from_file(rules::DEFAULT_RISK_RULES_PATH));
        let relevance = RelevanceScorer::new(SourceWeights::load_from_file(
            rules::DEFAULT_SOURCE_WEIGHTS_PATH,
        ));

        let store = open_store(cfg).await?;
        let scan = Arc::new(ScanOrchestrator::from_config(
            cfg,
            store.clone(),
            adapters.clone(),
            risk,
        ));
        let search = Arc::new(SearchOrchestrator::from_config(
            cfg,
            store.clone(),
            adapters,
            relevance,
        ));

        Ok(Self {
            state: AppState::new(cfg, store, scan.clone(), search),
            scan,
        })
    }

    pub fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }
}

/// The configured persistence backend.
pub async fn open_store(cfg: &MonitorConfig) -> anyhow::Result<Arc<dyn AlertStore>> {
    match cfg.database_url.as_deref() {
        Some(url) => {
            let store = SqliteStore::connect(url)
                .await
                .with_context(|| format!("opening database {url}"))?;
            tracing::info!(database = %url, "sqlite store ready");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("no database_url configured, alerts are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
