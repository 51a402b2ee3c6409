// src/ingest/providers/hackernews.rs
//! Link-aggregator adapters: the new-stories firehose for monitoring and the
//! search index for ad-hoc topics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use super::{get_json, get_text, join_url};
use crate::config::monitor::HackerNewsConfig;
use crate::error::SourceError;
use crate::ingest::clean_text;
use crate::ingest::pacing::SourcePacer;
use crate::ingest::types::{FetchMode, Query, SourceAdapter};
use crate::model::{Finding, Signal, SourceKind};

fn item_url(id: impl std::fmt::Display) -> String {
    format!("https://news.ycombinator.com/item?id={id}")
}

#[derive(Debug, Deserialize)]
struct Story {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    time: i64,
    #[serde(default)]
    score: Option<i64>,
}

/// Scans the newest stories and keeps those whose title mentions a keyword.
pub struct HackerNewsFeedAdapter {
    cfg: HackerNewsConfig,
    client: reqwest::Client,
    pacer: Arc<SourcePacer>,
}

impl HackerNewsFeedAdapter {
    pub fn new(cfg: HackerNewsConfig, client: reqwest::Client, pacer: Arc<SourcePacer>) -> Self {
        Self { cfg, client, pacer }
    }

    /// First keyword (case-insensitive) contained in `title`, if any.
    pub fn matching_keyword<'a>(title: &str, keywords: &'a [String]) -> Option<&'a str> {
        let t = title.to_lowercase();
        keywords
            .iter()
            .map(String::as_str)
            .find(|k| !k.is_empty() && t.contains(&k.to_lowercase()))
    }

    async fn story(&self, id: u64) -> Result<Option<Story>, SourceError> {
        self.pacer.until_ready(SourceKind::Hackernews).await;
        let url = join_url(&self.cfg.feed_base_url, &format!("/v0/item/{id}.json"));
        // deleted items come back as `null`
        get_json::<Option<Story>>(SourceKind::Hackernews, self.client.get(url)).await
    }
}

fn story_to_finding(s: Story) -> Finding {
    Finding {
        title: s.title.unwrap_or_default(),
        body: s.text.as_deref().map(clean_text).unwrap_or_default(),
        url: s.url.unwrap_or_else(|| item_url(s.id)),
        source: SourceKind::Hackernews,
        published_at: DateTime::<Utc>::from_timestamp(s.time, 0).unwrap_or_default(),
        signal: s.score.map(Signal::Points),
    }
}

#[async_trait]
impl SourceAdapter for HackerNewsFeedAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Hackernews
    }

    fn supports(&self, mode: FetchMode) -> bool {
        mode == FetchMode::Monitor
    }

    async fn fetch(&self, query: &Query, _mode: FetchMode) -> Result<Vec<Finding>, SourceError> {
        if query.keywords.is_empty() {
            return Ok(Vec::new());
        }
        self.pacer.until_ready(SourceKind::Hackernews).await;
        let url = join_url(&self.cfg.feed_base_url, "/v0/newstories.json");
        let ids: Vec<u64> = get_json(SourceKind::Hackernews, self.client.get(url)).await?;

        let mut out = Vec::new();
        for id in ids.into_iter().take(self.cfg.feed_stories) {
            let story = match self.story(id).await {
                Ok(Some(s)) => s,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(story = id, error = %e, "skipping story");
                    continue;
                }
            };
            let title = story.title.as_deref().unwrap_or_default();
            if Self::matching_keyword(title, &query.keywords).is_some() {
                out.push(story_to_finding(story));
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID", default)]
    object_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    story_text: Option<String>,
    #[serde(default)]
    points: Option<i64>,
    #[serde(default)]
    created_at: Option<String>,
}

/// Story search over the Algolia index.
pub struct HackerNewsSearchAdapter {
    cfg: HackerNewsConfig,
    client: reqwest::Client,
    pacer: Arc<SourcePacer>,
}

impl HackerNewsSearchAdapter {
    pub fn new(cfg: HackerNewsConfig, client: reqwest::Client, pacer: Arc<SourcePacer>) -> Self {
        Self { cfg, client, pacer }
    }

    pub fn parse_hits(body: &str, now: DateTime<Utc>) -> Result<Vec<Finding>, SourceError> {
        let resp: SearchResponse = serde_json::from_str(body)
            .map_err(|e| SourceError::parse(SourceKind::Hackernews, e))?;
        Ok(resp
            .hits
            .into_iter()
            .map(|h| Finding {
                title: h.title.unwrap_or_default(),
                body: h.story_text.as_deref().map(clean_text).unwrap_or_default(),
                url: h
                    .url
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| item_url(&h.object_id)),
                source: SourceKind::Hackernews,
                published_at: h
                    .created_at
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(now),
                signal: Some(Signal::Points(h.points.unwrap_or(0))),
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for HackerNewsSearchAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Hackernews
    }

    fn supports(&self, mode: FetchMode) -> bool {
        mode == FetchMode::Search
    }

    async fn fetch(&self, query: &Query, _mode: FetchMode) -> Result<Vec<Finding>, SourceError> {
        self.pacer.until_ready(SourceKind::Hackernews).await;
        let url = join_url(&self.cfg.search_base_url, "/api/v1/search");
        let q = query.query_text();
        let hits = self.cfg.search_limit.to_string();
        let req = self.client.get(url).query(&[
            ("query", q.as_str()),
            ("tags", "story"),
            ("hitsPerPage", hits.as_str()),
        ]);
        let body = get_text(SourceKind::Hackernews, req).await?;
        Self::parse_hits(&body, Utc::now())
    }
}
