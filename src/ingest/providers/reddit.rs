// src/ingest/providers/reddit.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use super::{get_text, join_url, settle};
use crate::config::monitor::RedditConfig;
use crate::error::SourceError;
use crate::ingest::pacing::SourcePacer;
use crate::ingest::types::{FetchMode, Query, SourceAdapter};
use crate::model::{Finding, Signal, SourceKind};

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    data: ListingData,
}

#[derive(Debug, Default, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    score: i64,
}

/// Forum search over `/search.json`.
pub struct RedditAdapter {
    cfg: RedditConfig,
    client: reqwest::Client,
    pacer: Arc<SourcePacer>,
}

impl RedditAdapter {
    pub fn new(cfg: RedditConfig, client: reqwest::Client, pacer: Arc<SourcePacer>) -> Self {
        Self { cfg, client, pacer }
    }

    /// Map a raw listing payload into findings.
    pub fn parse_listing(body: &str) -> Result<Vec<Finding>, SourceError> {
        let listing: Listing =
            serde_json::from_str(body).map_err(|e| SourceError::parse(SourceKind::Reddit, e))?;
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|c| to_finding(c.data))
            .collect())
    }

    async fn search(
        &self,
        q: &str,
        sort: &str,
        limit: usize,
        window: &str,
    ) -> Result<Vec<Finding>, SourceError> {
        self.pacer.until_ready(SourceKind::Reddit).await;
        let url = join_url(&self.cfg.base_url, "/search.json");
        let limit = limit.to_string();
        let req = self.client.get(url).query(&[
            ("q", q),
            ("sort", sort),
            ("limit", limit.as_str()),
            ("t", window),
        ]);
        let body = get_text(SourceKind::Reddit, req).await?;
        Self::parse_listing(&body)
    }
}

fn to_finding(p: Post) -> Finding {
    Finding {
        title: p.title,
        body: p.selftext,
        url: format!("https://reddit.com{}", p.permalink),
        source: SourceKind::Reddit,
        published_at: DateTime::<Utc>::from_timestamp(p.created_utc as i64, 0)
            .unwrap_or_default(),
        signal: Some(Signal::Score(p.score)),
    }
}

#[async_trait]
impl SourceAdapter for RedditAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Reddit
    }

    fn supports(&self, _mode: FetchMode) -> bool {
        true
    }

    async fn fetch(&self, query: &Query, mode: FetchMode) -> Result<Vec<Finding>, SourceError> {
        let mut results = Vec::new();
        match mode {
            FetchMode::Monitor => {
                for kw in query.keywords.iter().take(self.cfg.monitor_keywords) {
                    results.push(self.search(kw, "new", self.cfg.monitor_limit, "day").await);
                }
            }
            FetchMode::Search => {
                for q in query.search_variants().iter().take(self.cfg.search_queries) {
                    results.push(
                        self.search(q, "relevance", self.cfg.search_limit, "month")
                            .await,
                    );
                }
            }
        }
        settle(SourceKind::Reddit, results)
    }
}
