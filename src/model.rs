// src/model.rs
//! Core data types shared by the ingest, analysis, storage and API layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

pub type TargetId = u64;
pub type AlertId = u64;
pub type SearchQueryId = u64;

/// Source families. Order here is the fixed order the scan visits them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Reddit,
    Github,
    Hackernews,
    News,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Reddit,
        SourceKind::Github,
        SourceKind::Hackernews,
        SourceKind::News,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Reddit => "reddit",
            SourceKind::Github => "github",
            SourceKind::Hackernews => "hackernews",
            SourceKind::News => "news",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "source_type",
                value: s.to_string(),
            })
    }
}

/// A persistent named watch. Never deleted, only deactivated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub keywords: Vec<String>,
    pub target_type: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTarget {
    pub name: String,
    pub keywords: Vec<String>,
    pub target_type: String,
}

/// Source-specific popularity signal attached to a finding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Signal {
    /// Forum post score.
    Score(i64),
    /// Repository star count.
    Stars(u64),
    /// Link-aggregator points.
    Points(i64),
}

impl Signal {
    pub fn magnitude(&self) -> f64 {
        match *self {
            Signal::Score(v) => v as f64,
            Signal::Stars(v) => v as f64,
            Signal::Points(v) => v as f64,
        }
    }
}

/// Transient normalized item produced by an adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub title: String,
    pub body: String,
    pub url: String,
    pub source: SourceKind,
    pub published_at: DateTime<Utc>,
    pub signal: Option<Signal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Critical,
        RiskTier::High,
        RiskTier::Medium,
        RiskTier::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            "critical" => Ok(RiskTier::Critical),
            other => Err(ValidationError::InvalidValue {
                field: "risk_level",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    New,
    Reviewed,
    Dismissed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Reviewed => "reviewed",
            AlertStatus::Dismissed => "dismissed",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(AlertStatus::New),
            "reviewed" => Ok(AlertStatus::Reviewed),
            "dismissed" => Ok(AlertStatus::Dismissed),
            other => Err(ValidationError::InvalidValue {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryOrigin {
    Monitoring,
    Search,
}

impl QueryOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOrigin::Monitoring => "monitoring",
            QueryOrigin::Search => "search",
        }
    }
}

impl FromStr for QueryOrigin {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monitoring" => Ok(QueryOrigin::Monitoring),
            "search" => Ok(QueryOrigin::Search),
            other => Err(ValidationError::InvalidValue {
                field: "query_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Persisted, scored record. Created once, only `status` changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: AlertId,
    pub fingerprint: String,
    pub title: String,
    pub description: String,
    pub source_url: String,
    pub source_type: SourceKind,
    pub risk_level: RiskTier,
    /// Set on search-originated alerts only.
    pub relevance_score: Option<f64>,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub target_id: Option<TargetId>,
    pub location: Option<String>,
    pub query_type: QueryOrigin,
}

/// Alert as handed to the store, before an id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub fingerprint: String,
    pub title: String,
    pub description: String,
    pub source_url: String,
    pub source_type: SourceKind,
    pub risk_level: RiskTier,
    pub relevance_score: Option<f64>,
    pub target_id: Option<TargetId>,
    pub location: Option<String>,
    pub query_type: QueryOrigin,
}

/// Write-once audit record of an ad-hoc search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    pub id: SearchQueryId,
    pub topic: String,
    pub location: Option<String>,
    pub query_text: String,
    pub created_at: DateTime<Utc>,
    pub results_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertFilter {
    pub risk_level: Option<RiskTier>,
    pub status: Option<AlertStatus>,
    pub query_type: Option<QueryOrigin>,
}

/// One page of a paginated listing. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub pages: usize,
    pub current_page: usize,
}

impl<T> Page<T> {
    /// Page whose rows were already cut by the store; `total` counts all matches.
    pub fn from_parts(items: Vec<T>, total: usize, page: usize, per_page: usize) -> Self {
        Self {
            items,
            total,
            pages: total.div_ceil(per_page.max(1)),
            current_page: page.max(1),
        }
    }
}

impl<T: Clone> Page<T> {
    /// Slice `all` into the requested page. Out-of-range pages are empty, not an error.
    pub fn slice(all: &[T], page: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let page = page.max(1);
        let total = all.len();
        let pages = total.div_ceil(per_page);
        let start = (page - 1).saturating_mul(per_page);
        let items = if start >= total {
            Vec::new()
        } else {
            all[start..(start + per_page).min(total)].to_vec()
        };
        Self {
            items,
            total,
            pages,
            current_page: page,
        }
    }
}

/// Truncate to at most `max` chars on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
