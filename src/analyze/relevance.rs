// src/analyze/relevance.rs
//! Relevance ranking for ad-hoc search results.
//!
//! Additive score per finding (case-insensitive substring checks):
//! - topic in title +10, in body +5
//! - location in title +8, in body +4 (only when a location is given)
//! - popularity signal × source weight (absent signal → 0)
//! - recency: younger than 7 days +5, younger than 30 days +2
//!
//! Ranking is a stable descending sort, so equal scores keep input order.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SourceWeights;
use crate::model::Finding;

pub const TOPIC_IN_TITLE: f64 = 10.0;
pub const TOPIC_IN_BODY: f64 = 5.0;
pub const LOCATION_IN_TITLE: f64 = 8.0;
pub const LOCATION_IN_BODY: f64 = 4.0;
pub const RECENT_WEEK_BONUS: f64 = 5.0;
pub const RECENT_MONTH_BONUS: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredFinding {
    #[serde(flatten)]
    pub finding: Finding,
    pub fingerprint: String,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    weights: SourceWeights,
}

impl RelevanceScorer {
    pub fn new(weights: SourceWeights) -> Self {
        Self { weights }
    }

    pub fn score(
        &self,
        f: &Finding,
        topic: &str,
        location: Option<&str>,
        now: DateTime<Utc>,
    ) -> f64 {
        let title = f.title.to_lowercase();
        let body = f.body.to_lowercase();
        let mut score = 0.0;

        let topic = topic.to_lowercase();
        if title.contains(&topic) {
            score += TOPIC_IN_TITLE;
        }
        if body.contains(&topic) {
            score += TOPIC_IN_BODY;
        }

        if let Some(loc) = location.map(str::to_lowercase).filter(|l| !l.is_empty()) {
            if title.contains(&loc) {
                score += LOCATION_IN_TITLE;
            }
            if body.contains(&loc) {
                score += LOCATION_IN_BODY;
            }
        }

        if let Some(signal) = f.signal {
            score += signal.magnitude() * self.weights.weight_for(f.source);
        }

        // whole days, like a calendar "days old"
        let days_old = (now - f.published_at).num_days();
        if days_old < 7 {
            score += RECENT_WEEK_BONUS;
        } else if days_old < 30 {
            score += RECENT_MONTH_BONUS;
        }

        score
    }

    /// Score every finding and sort descending; ties keep input order.
    pub fn rank(
        &self,
        findings: Vec<(String, Finding)>,
        topic: &str,
        location: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<ScoredFinding> {
        let mut scored: Vec<ScoredFinding> = findings
            .into_iter()
            .map(|(fingerprint, finding)| {
                let relevance_score = self.score(&finding, topic, location, now);
                ScoredFinding {
                    finding,
                    fingerprint,
                    relevance_score,
                }
            })
            .collect();
        // Vec::sort_by is stable
        scored.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        scored
    }
}
