// src/config/monitor.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::AlertLimits;
use crate::model::SourceKind;

pub const DEFAULT_MONITOR_CONFIG_PATH: &str = "config/monitor.toml";
pub const ENV_MONITOR_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";
pub const ENV_SCAN_INTERVAL_MINUTES: &str = "SCAN_INTERVAL_MINUTES";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// One week. Longer intervals are clamped to this.
pub const MAX_SCAN_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

fn default_scan_interval_minutes() -> u64 {
    30
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_adapter_deadline_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "ThreatMonitor/1.0 (Security Research Tool)".to_string()
}
fn default_page_size() -> usize {
    20
}
fn default_search_persist_limit() -> usize {
    20
}
fn default_search_return_limit() -> usize {
    10
}
fn default_search_history_limit() -> usize {
    20
}
fn default_title_max_chars() -> usize {
    200
}
fn default_description_max_chars() -> usize {
    1000
}
fn default_target_pause_ms() -> u64 {
    2000
}

/// Service-wide settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_scan_interval_minutes")]
    pub scan_interval_minutes: u64,
    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Deadline for one whole adapter call in the search fan-out.
    #[serde(default = "default_adapter_deadline_secs")]
    pub adapter_deadline_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_search_persist_limit")]
    pub search_persist_limit: usize,
    #[serde(default = "default_search_return_limit")]
    pub search_return_limit: usize,
    #[serde(default = "default_search_history_limit")]
    pub search_history_limit: usize,
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
    #[serde(default = "default_description_max_chars")]
    pub description_max_chars: usize,
    #[serde(default = "default_target_pause_ms")]
    pub target_pause_ms: u64,
    #[serde(default)]
    pub github_token: Option<String>,
    /// SQLite URL such as `sqlite://data/monitor.db`. Unset keeps all state in memory.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// Per-source pacing and bounds. Missing keys keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub reddit: RedditConfig,
    pub github: GithubConfig,
    pub hackernews: HackerNewsConfig,
    pub news: NewsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub base_url: String,
    pub min_interval_ms: u64,
    pub monitor_keywords: usize,
    pub monitor_limit: usize,
    pub search_queries: usize,
    pub search_limit: usize,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.reddit.com".to_string(),
            min_interval_ms: 1000,
            monitor_keywords: 3,
            monitor_limit: 5,
            search_queries: 3,
            search_limit: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub base_url: String,
    pub min_interval_ms: u64,
    pub monitor_keywords: usize,
    pub monitor_limit: usize,
    pub search_queries: usize,
    pub search_limit: usize,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            min_interval_ms: 3000,
            monitor_keywords: 2,
            monitor_limit: 3,
            search_queries: 2,
            search_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HackerNewsConfig {
    pub feed_base_url: String,
    pub search_base_url: String,
    pub min_interval_ms: u64,
    pub feed_stories: usize,
    pub search_limit: usize,
}

impl Default for HackerNewsConfig {
    fn default() -> Self {
        Self {
            feed_base_url: "https://hacker-news.firebaseio.com".to_string(),
            search_base_url: "https://hn.algolia.com".to_string(),
            min_interval_ms: 200,
            feed_stories: 20,
            search_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub min_interval_ms: u64,
    pub feeds: Vec<String>,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            feeds: vec![
                "https://feeds.bbci.co.uk/news/rss.xml".to_string(),
                "https://rss.cnn.com/rss/edition.rss".to_string(),
                "https://feeds.reuters.com/reuters/topNews".to_string(),
            ],
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval_minutes: default_scan_interval_minutes(),
            request_timeout_secs: default_request_timeout_secs(),
            adapter_deadline_secs: default_adapter_deadline_secs(),
            user_agent: default_user_agent(),
            page_size: default_page_size(),
            search_persist_limit: default_search_persist_limit(),
            search_return_limit: default_search_return_limit(),
            search_history_limit: default_search_history_limit(),
            title_max_chars: default_title_max_chars(),
            description_max_chars: default_description_max_chars(),
            target_pause_ms: default_target_pause_ms(),
            github_token: None,
            database_url: None,
            sources: SourcesConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load using `$MONITOR_CONFIG_PATH` or `config/monitor.toml`; a missing
    /// file yields defaults. Env overrides are applied afterwards.
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_MONITOR_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_MONITOR_CONFIG_PATH));
        let mut cfg = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };
        cfg.apply_env();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading monitor config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing monitor config at {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: MonitorConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Some(v) = parse_positive_env(std::env::var(ENV_SCAN_INTERVAL_MINUTES).ok()) {
            self.scan_interval_minutes = v;
        }
        if let Some(v) = parse_positive_env(std::env::var(ENV_REQUEST_TIMEOUT_SECS).ok()) {
            self.request_timeout_secs = v;
        }
        if let Ok(token) = std::env::var(ENV_GITHUB_TOKEN) {
            let token = token.trim();
            if !token.is_empty() {
                self.github_token = Some(token.to_string());
            }
        }
        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            let url = url.trim();
            if !url.is_empty() {
                self.database_url = Some(url.to_string());
            }
        }
    }

    /// Replace zero values with defaults and keep the search caps ordered.
    fn sanitize(&mut self) {
        if self.scan_interval_minutes == 0 {
            self.scan_interval_minutes = default_scan_interval_minutes();
        }
        self.scan_interval_minutes = self.scan_interval_minutes.min(MAX_SCAN_INTERVAL_MINUTES);
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        if self.adapter_deadline_secs == 0 {
            self.adapter_deadline_secs = default_adapter_deadline_secs();
        }
        if self.page_size == 0 {
            self.page_size = default_page_size();
        }
        if self.search_persist_limit == 0 {
            self.search_persist_limit = default_search_persist_limit();
        }
        if self.search_return_limit == 0 {
            self.search_return_limit = default_search_return_limit();
        }
        self.search_return_limit = self.search_return_limit.min(self.search_persist_limit);
        if self.title_max_chars == 0 {
            self.title_max_chars = default_title_max_chars();
        }
        if self.description_max_chars == 0 {
            self.description_max_chars = default_description_max_chars();
        }

        let r = RedditConfig::default();
        let s = &mut self.sources.reddit;
        or_default(&mut s.monitor_keywords, r.monitor_keywords);
        or_default(&mut s.monitor_limit, r.monitor_limit);
        or_default(&mut s.search_queries, r.search_queries);
        or_default(&mut s.search_limit, r.search_limit);

        let g = GithubConfig::default();
        let s = &mut self.sources.github;
        or_default(&mut s.monitor_keywords, g.monitor_keywords);
        or_default(&mut s.monitor_limit, g.monitor_limit);
        or_default(&mut s.search_queries, g.search_queries);
        or_default(&mut s.search_limit, g.search_limit);

        let h = HackerNewsConfig::default();
        let s = &mut self.sources.hackernews;
        or_default(&mut s.feed_stories, h.feed_stories);
        or_default(&mut s.search_limit, h.search_limit);
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_minutes.saturating_mul(60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn adapter_deadline(&self) -> Duration {
        Duration::from_secs(self.adapter_deadline_secs)
    }

    pub fn target_pause(&self) -> Duration {
        Duration::from_millis(self.target_pause_ms)
    }

    pub fn alert_limits(&self) -> AlertLimits {
        AlertLimits {
            title_max_chars: self.title_max_chars,
            description_max_chars: self.description_max_chars,
        }
    }

    /// Minimum spacing between two calls to the same source family.
    pub fn min_interval(&self, kind: SourceKind) -> Duration {
        let ms = match kind {
            SourceKind::Reddit => self.sources.reddit.min_interval_ms,
            SourceKind::Github => self.sources.github.min_interval_ms,
            SourceKind::Hackernews => self.sources.hackernews.min_interval_ms,
            SourceKind::News => self.sources.news.min_interval_ms,
        };
        Duration::from_millis(ms)
    }

    /// Shared HTTP client for all adapters.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.request_timeout())
            .build()
            .context("building HTTP client")
    }
}

fn or_default(v: &mut usize, d: usize) {
    if *v == 0 {
        *v = d;
    }
}

fn parse_positive_env(raw: Option<String>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn empty_toml_gives_original_defaults() {
        let cfg = MonitorConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.scan_interval_minutes, 30);
        assert_eq!(cfg.request_timeout_secs, 10);
        assert_eq!(cfg.page_size, 20);
        assert_eq!(cfg.sources.reddit.monitor_keywords, 3);
        assert_eq!(cfg.sources.github.monitor_limit, 3);
        assert_eq!(cfg.sources.hackernews.feed_stories, 20);
        assert_eq!(cfg.sources.news.feeds.len(), 3);
        assert_eq!(cfg.min_interval(SourceKind::Github), Duration::from_secs(3));
    }

    #[test]
    fn zero_values_fall_back_and_caps_stay_ordered() {
        let cfg = MonitorConfig::from_toml_str(
            r#"
            page_size = 0
            search_persist_limit = 5
            search_return_limit = 50

            [sources.reddit]
            base_url = "http://localhost"
            monitor_keywords = 0
            monitor_limit = 7
            "#,
        )
        .unwrap();
        assert_eq!(cfg.page_size, 20);
        assert_eq!(cfg.search_return_limit, 5);
        assert_eq!(cfg.sources.reddit.monitor_keywords, 3);
        assert_eq!(cfg.sources.reddit.monitor_limit, 7);
        assert_eq!(cfg.sources.reddit.base_url, "http://localhost");
        assert_eq!(cfg.sources.reddit.search_limit, 15);
        assert_eq!(cfg.sources.github.min_interval_ms, 3000);
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_file_values() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("monitor.toml");
        std::fs::write(&p, "scan_interval_minutes = 5\n").unwrap();

        env::set_var(ENV_MONITOR_CONFIG_PATH, p.display().to_string());
        env::set_var(ENV_REQUEST_TIMEOUT_SECS, "3");
        env::remove_var(ENV_SCAN_INTERVAL_MINUTES);
        let cfg = MonitorConfig::load().unwrap();
        assert_eq!(cfg.scan_interval_minutes, 5);
        assert_eq!(cfg.request_timeout_secs, 3);

        env::set_var(ENV_SCAN_INTERVAL_MINUTES, "not-a-number");
        let cfg = MonitorConfig::load().unwrap();
        assert_eq!(cfg.scan_interval_minutes, 5);

        env::remove_var(ENV_MONITOR_CONFIG_PATH);
        env::remove_var(ENV_REQUEST_TIMEOUT_SECS);
        env::remove_var(ENV_SCAN_INTERVAL_MINUTES);
    }

    #[serial_test::serial]
    #[test]
    fn huge_scan_interval_is_clamped() {
        env::remove_var(ENV_MONITOR_CONFIG_PATH);
        env::set_var(ENV_SCAN_INTERVAL_MINUTES, u64::MAX.to_string());
        let cfg = MonitorConfig::load().unwrap();
        assert_eq!(cfg.scan_interval_minutes, MAX_SCAN_INTERVAL_MINUTES);
        assert_eq!(cfg.scan_interval(), Duration::from_secs(7 * 24 * 3600));
        env::remove_var(ENV_SCAN_INTERVAL_MINUTES);

        // a value set after loading still cannot overflow
        let raw = MonitorConfig {
            scan_interval_minutes: u64::MAX,
            ..MonitorConfig::default()
        };
        assert_eq!(raw.scan_interval(), Duration::from_secs(u64::MAX));
    }

    #[serial_test::serial]
    #[test]
    fn database_url_comes_from_env() {
        env::remove_var(ENV_MONITOR_CONFIG_PATH);
        env::set_var(ENV_DATABASE_URL, " sqlite://data/monitor.db ");
        let cfg = MonitorConfig::load().unwrap();
        assert_eq!(cfg.database_url.as_deref(), Some("sqlite://data/monitor.db"));
        env::remove_var(ENV_DATABASE_URL);
    }
}
