// src/ingest/providers/mod.rs
pub mod github;
pub mod hackernews;
pub mod news_rss;
pub mod reddit;

use metrics::histogram;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::config::MonitorConfig;
use crate::error::SourceError;
use crate::ingest::pacing::SourcePacer;
use crate::ingest::types::SourceAdapter;
use crate::model::{Finding, SourceKind};

pub use github::GithubAdapter;
pub use hackernews::{HackerNewsFeedAdapter, HackerNewsSearchAdapter};
pub use news_rss::NewsRssAdapter;
pub use reddit::RedditAdapter;

/// All adapters in fixed scan order.
pub fn default_adapters(
    cfg: &MonitorConfig,
    client: reqwest::Client,
    pacer: Arc<SourcePacer>,
) -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(RedditAdapter::new(
            cfg.sources.reddit.clone(),
            client.clone(),
            pacer.clone(),
        )),
        Arc::new(GithubAdapter::new(
            cfg.sources.github.clone(),
            cfg.github_token.clone(),
            client.clone(),
            pacer.clone(),
        )),
        Arc::new(HackerNewsFeedAdapter::new(
            cfg.sources.hackernews.clone(),
            client.clone(),
            pacer.clone(),
        )),
        Arc::new(HackerNewsSearchAdapter::new(
            cfg.sources.hackernews.clone(),
            client.clone(),
            pacer.clone(),
        )),
        Arc::new(NewsRssAdapter::new(cfg.sources.news.clone(), client, pacer)),
    ]
}

/// GET `url` and return the body of a 2xx response.
pub(crate) async fn get_text(
    kind: SourceKind,
    req: reqwest::RequestBuilder,
) -> Result<String, SourceError> {
    let t0 = std::time::Instant::now();
    let resp = req.send().await.map_err(|e| SourceError::transport(kind, e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            source_kind: kind,
            status: status.as_u16(),
        });
    }
    let body = resp
        .text()
        .await
        .map_err(|e| SourceError::transport(kind, e))?;
    histogram!("source_fetch_ms", "source" => kind.as_str())
        .record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(body)
}

/// GET and decode JSON; decode failures become `SourceError::Parse`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    kind: SourceKind,
    req: reqwest::RequestBuilder,
) -> Result<T, SourceError> {
    let body = get_text(kind, req).await?;
    serde_json::from_str(&body).map_err(|e| SourceError::parse(kind, e))
}

/// Fold per-request results of one adapter call. Failed requests are logged
/// and skipped as long as at least one succeeded; if none did, the first
/// error is returned.
pub(crate) fn settle(
    kind: SourceKind,
    results: Vec<Result<Vec<Finding>, SourceError>>,
) -> Result<Vec<Finding>, SourceError> {
    let mut out = Vec::new();
    let mut first_err = None;
    let mut any_ok = false;
    for r in results {
        match r {
            Ok(mut v) => {
                any_ok = true;
                out.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(source = %kind, error = %e, "request failed, continuing");
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) if !any_ok => Err(e),
        _ => Ok(out),
    }
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
