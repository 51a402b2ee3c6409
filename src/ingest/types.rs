// src/ingest/types.rs
use async_trait::async_trait;

use crate::error::SourceError;
use crate::model::{Finding, SourceKind, Target};

/// Which pipeline is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchMode {
    /// Scheduled sweep for a watch target.
    Monitor,
    /// Ad-hoc topic/location search.
    Search,
}

/// What to look for. Monitor queries carry a target's keywords; search
/// queries carry a single topic plus an optional location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub keywords: Vec<String>,
    pub location: Option<String>,
}

impl Query {
    pub fn for_target(target: &Target) -> Self {
        Self {
            keywords: target
                .keywords
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            location: None,
        }
    }

    pub fn for_topic(topic: &str, location: Option<&str>) -> Self {
        Self {
            keywords: vec![topic.trim().to_string()],
            location: location
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        }
    }

    /// Search topic (first keyword).
    pub fn topic(&self) -> &str {
        self.keywords.first().map(String::as_str).unwrap_or_default()
    }

    /// Plain `topic location` text, as recorded in the search audit.
    pub fn query_text(&self) -> String {
        match &self.location {
            Some(loc) => format!("{} {}", self.topic(), loc),
            None => self.topic().to_string(),
        }
    }

    /// Query strings tried in search mode, most general first. Adapters take
    /// a bounded prefix.
    pub fn search_variants(&self) -> Vec<String> {
        let topic = self.topic();
        let mut out = vec![topic.to_string()];
        if let Some(loc) = &self.location {
            out.push(format!("{topic} {loc}"));
            out.push(format!("{loc} {topic}"));
            out.push(format!("\"{topic}\" \"{loc}\""));
        }
        out
    }
}

/// One external source family. Empty results are a success.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn supports(&self, mode: FetchMode) -> bool;

    async fn fetch(&self, query: &Query, mode: FetchMode) -> Result<Vec<Finding>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_without_location_is_just_topic() {
        let q = Query::for_topic(" acme ", Some("  "));
        assert_eq!(q.search_variants(), vec!["acme".to_string()]);
        assert_eq!(q.query_text(), "acme");
    }

    #[test]
    fn variants_with_location() {
        let q = Query::for_topic("acme", Some("springfield"));
        assert_eq!(
            q.search_variants(),
            vec![
                "acme".to_string(),
                "acme springfield".to_string(),
                "springfield acme".to_string(),
                "\"acme\" \"springfield\"".to_string(),
            ]
        );
        assert_eq!(q.query_text(), "acme springfield");
    }
}
