// src/ingest/mod.rs
pub mod dedup;
pub mod pacing;
pub mod providers;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

use crate::model::{truncate_chars, Finding, NewAlert, QueryOrigin, RiskTier, TargetId};

pub use dedup::{dedup_findings, fingerprint};
pub use pacing::SourcePacer;
pub use types::{FetchMode, Query, SourceAdapter};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "findings_fetched_total",
            "Findings returned by source adapters."
        );
        describe_counter!("source_errors_total", "Adapter fetch/parse/timeout errors.");
        describe_counter!("alerts_created_total", "Alerts newly persisted.");
        describe_counter!(
            "dedup_dropped_total",
            "Findings dropped as already seen (in batch or in store)."
        );
        describe_counter!("scan_cycles_total", "Completed scan cycles.");
        describe_counter!(
            "scan_skipped_total",
            "Scan triggers ignored because a cycle was already running."
        );
        describe_histogram!("source_fetch_ms", "Adapter call time in milliseconds.");
        describe_gauge!("scan_last_run_ts", "Unix ts when the last scan cycle finished.");
    });
}

/// Clean markup out of source text: decode entities, strip tags, straighten
/// quotes, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Bounds applied to persisted alert text.
#[derive(Debug, Clone, Copy)]
pub struct AlertLimits {
    pub title_max_chars: usize,
    pub description_max_chars: usize,
}

/// Shape a deduplicated finding into an insertable alert.
#[allow(clippy::too_many_arguments)]
pub fn new_alert(
    fingerprint: String,
    finding: &Finding,
    risk_level: RiskTier,
    relevance_score: Option<f64>,
    target_id: Option<TargetId>,
    location: Option<String>,
    query_type: QueryOrigin,
    limits: AlertLimits,
) -> NewAlert {
    let title = if finding.title.trim().is_empty() {
        "No title".to_string()
    } else {
        truncate_chars(&finding.title, limits.title_max_chars)
    };
    NewAlert {
        fingerprint,
        title,
        description: truncate_chars(&finding.body, limits.description_max_chars),
        source_url: finding.url.clone(),
        source_type: finding.source,
        risk_level,
        relevance_score,
        target_id,
        location,
        query_type,
    }
}
