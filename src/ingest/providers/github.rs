// src/ingest/providers/github.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use super::{get_text, join_url, settle};
use crate::config::monitor::GithubConfig;
use crate::error::SourceError;
use crate::ingest::pacing::SourcePacer;
use crate::ingest::types::{FetchMode, Query, SourceAdapter};
use crate::model::{Finding, Signal, SourceKind};

#[derive(Debug, Deserialize)]
struct SearchPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CodeHit {
    #[serde(default)]
    name: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    repository: Option<RepoRef>,
}

#[derive(Debug, Deserialize)]
struct RepoRef {
    #[serde(default)]
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct RepoHit {
    #[serde(default)]
    name: String,
    description: Option<String>,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    html_url: String,
    updated_at: Option<String>,
}

/// Code search while monitoring, repository search for ad-hoc topics.
pub struct GithubAdapter {
    cfg: GithubConfig,
    token: Option<String>,
    client: reqwest::Client,
    pacer: Arc<SourcePacer>,
}

impl GithubAdapter {
    pub fn new(
        cfg: GithubConfig,
        token: Option<String>,
        client: reqwest::Client,
        pacer: Arc<SourcePacer>,
    ) -> Self {
        Self {
            cfg,
            token,
            client,
            pacer,
        }
    }

    /// Code-search payload → findings. Timestamp is `now`, the API gives none.
    pub fn parse_code_search(body: &str, now: DateTime<Utc>) -> Result<Vec<Finding>, SourceError> {
        let page: SearchPage<CodeHit> =
            serde_json::from_str(body).map_err(|e| SourceError::parse(SourceKind::Github, e))?;
        Ok(page
            .items
            .into_iter()
            .map(|it| {
                let repo = it.repository.map(|r| r.full_name).unwrap_or_default();
                Finding {
                    title: format!("Code found: {}", it.name),
                    body: format!("Repository: {}\nPath: {}", repo, it.path),
                    url: it.html_url,
                    source: SourceKind::Github,
                    published_at: now,
                    signal: None,
                }
            })
            .collect())
    }

    /// Repository-search payload → findings, with stars as the signal.
    pub fn parse_repo_search(body: &str, now: DateTime<Utc>) -> Result<Vec<Finding>, SourceError> {
        let page: SearchPage<RepoHit> =
            serde_json::from_str(body).map_err(|e| SourceError::parse(SourceKind::Github, e))?;
        Ok(page
            .items
            .into_iter()
            .map(|r| {
                let published_at = r
                    .updated_at
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(now);
                Finding {
                    title: format!("Repository: {}", r.name),
                    body: format!(
                        "Description: {}\nLanguage: {}\nStars: {}",
                        r.description.unwrap_or_default(),
                        r.language.as_deref().unwrap_or("N/A"),
                        r.stargazers_count
                    ),
                    url: r.html_url,
                    source: SourceKind::Github,
                    published_at,
                    signal: Some(Signal::Stars(r.stargazers_count)),
                }
            })
            .collect())
    }

    fn request(&self, path: &str, params: &[(&str, &str)]) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(join_url(&self.cfg.base_url, path))
            .header("Accept", "application/vnd.github+json")
            .query(params);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn code_search(&self, keyword: &str) -> Result<Vec<Finding>, SourceError> {
        self.pacer.until_ready(SourceKind::Github).await;
        let q = format!("\"{keyword}\"");
        let per_page = self.cfg.monitor_limit.to_string();
        let req = self.request(
            "/search/code",
            &[("q", q.as_str()), ("sort", "indexed"), ("per_page", per_page.as_str())],
        );
        let body = get_text(SourceKind::Github, req).await?;
        Self::parse_code_search(&body, Utc::now())
    }

    async fn repo_search(&self, q: &str) -> Result<Vec<Finding>, SourceError> {
        self.pacer.until_ready(SourceKind::Github).await;
        let per_page = self.cfg.search_limit.to_string();
        let req = self.request(
            "/search/repositories",
            &[("q", q), ("sort", "updated"), ("per_page", per_page.as_str())],
        );
        let body = get_text(SourceKind::Github, req).await?;
        Self::parse_repo_search(&body, Utc::now())
    }
}

#[async_trait]
impl SourceAdapter for GithubAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Github
    }

    fn supports(&self, _mode: FetchMode) -> bool {
        true
    }

    async fn fetch(&self, query: &Query, mode: FetchMode) -> Result<Vec<Finding>, SourceError> {
        let mut results = Vec::new();
        match mode {
            FetchMode::Monitor => {
                for kw in query.keywords.iter().take(self.cfg.monitor_keywords) {
                    results.push(self.code_search(kw).await);
                }
            }
            FetchMode::Search => {
                for q in query.search_variants().iter().take(self.cfg.search_queries) {
                    results.push(self.repo_search(q).await);
                }
            }
        }
        settle(SourceKind::Github, results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_hits_map_to_findings() {
        let now = Utc::now();
        let body = r#"{"total_count":1,"items":[{"name":"config.py","path":"src/config.py","html_url":"https://github.com/o/r/blob/main/src/config.py","repository":{"full_name":"o/r"}}]}"#;
        let out = GithubAdapter::parse_code_search(body, now).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Code found: config.py");
        assert_eq!(out[0].body, "Repository: o/r\nPath: src/config.py");
        assert_eq!(out[0].published_at, now);
        assert_eq!(out[0].signal, None);
    }

    #[test]
    fn repo_hits_carry_stars_and_updated_at() {
        let now = Utc::now();
        let body = r#"{"items":[{"name":"acme","description":null,"language":null,"stargazers_count":50,"html_url":"https://github.com/o/acme","updated_at":"2024-01-02T03:04:05Z"}]}"#;
        let out = GithubAdapter::parse_repo_search(body, now).unwrap();
        assert_eq!(out[0].title, "Repository: acme");
        assert_eq!(out[0].body, "Description: \nLanguage: N/A\nStars: 50");
        assert_eq!(out[0].signal, Some(Signal::Stars(50)));
        assert_eq!(out[0].published_at.to_rfc3339(), "2024-01-02T03:04:05+00:00");
    }

    #[test]
    fn rate_limit_message_without_items_is_empty() {
        let out = GithubAdapter::parse_code_search(r#"{"message":"API rate limit exceeded"}"#, Utc::now())
            .unwrap();
        assert!(out.is_empty());
    }
}
