use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::sync::Arc;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use super::{get_text, settle};
use crate::config::monitor::NewsConfig;
use crate::error::SourceError;
use crate::ingest::clean_text;
use crate::ingest::pacing::SourcePacer;
use crate::ingest::types::{FetchMode, Query, SourceAdapter};
use crate::model::{Finding, SourceKind};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0))
}

/// Topic search over a fixed set of RSS news feeds.
pub struct NewsRssAdapter {
    cfg: NewsConfig,
    client: reqwest::Client,
    pacer: Arc<SourcePacer>,
}

impl NewsRssAdapter {
    pub fn new(cfg: NewsConfig, client: reqwest::Client, pacer: Arc<SourcePacer>) -> Self {
        Self { cfg, client, pacer }
    }

    /// Items of one feed that mention the topic (and the location, when given)
    /// in their title or description.
    pub fn parse_feed(
        xml: &str,
        feed_url: &str,
        query: &Query,
        now: DateTime<Utc>,
    ) -> Result<Vec<Finding>, SourceError> {
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).map_err(|e| SourceError::parse(SourceKind::News, e))?;

        let topic = query.topic().to_lowercase();
        let location = query.location.as_deref().map(str::to_lowercase);

        let mut out = Vec::new();
        for it in rss.channel.item {
            let title = clean_text(it.title.as_deref().unwrap_or_default());
            let body = clean_text(it.description.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let hay = format!("{} {}", title, body).to_lowercase();
            if topic.is_empty() || !hay.contains(&topic) {
                continue;
            }
            if let Some(loc) = &location {
                if !hay.contains(loc.as_str()) {
                    continue;
                }
            }
            out.push(Finding {
                title,
                body,
                url: it
                    .link
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| feed_url.to_string()),
                source: SourceKind::News,
                published_at: it
                    .pub_date
                    .as_deref()
                    .and_then(parse_rfc2822)
                    .unwrap_or(now),
                signal: None,
            });
        }
        Ok(out)
    }

    async fn fetch_feed(&self, feed_url: &str, query: &Query) -> Result<Vec<Finding>, SourceError> {
        self.pacer.until_ready(SourceKind::News).await;
        let body = get_text(SourceKind::News, self.client.get(feed_url)).await?;
        Self::parse_feed(&body, feed_url, query, Utc::now())
    }
}

#[async_trait]
impl SourceAdapter for NewsRssAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::News
    }

    fn supports(&self, mode: FetchMode) -> bool {
        mode == FetchMode::Search
    }

    async fn fetch(&self, query: &Query, _mode: FetchMode) -> Result<Vec<Finding>, SourceError> {
        let mut results = Vec::with_capacity(self.cfg.feeds.len());
        for feed in &self.cfg.feeds {
            results.push(self.fetch_feed(feed, query).await);
        }
        settle(SourceKind::News, results)
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
