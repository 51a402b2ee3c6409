//! # Scoring rules
//!
//! Keyword lists for the risk scorer and per-source popularity weights for
//! the relevance scorer.
//!
//! - Both load from JSON and fall back to a built-in seed when the file is
//!   missing or malformed.
//! - Keywords are lower-cased and trimmed on load; blanks are dropped.
//! - Matching stays plain substring containment (see `analyze::risk`).

use serde::Deserialize;
use std::{fs, path::Path};

use crate::model::SourceKind;

pub const DEFAULT_RISK_RULES_PATH: &str = "config/risk_rules.json";
pub const DEFAULT_SOURCE_WEIGHTS_PATH: &str = "config/source_weights.json";

/// Layered keyword lists, checked in priority order critical → high → medium.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RiskRules {
    pub critical: Vec<String>,
    pub high: Vec<String>,
    pub medium: Vec<String>,
}

impl RiskRules {
    /// Load rules from a JSON file. Falls back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path.as_ref()) {
            Ok(s) => match serde_json::from_str::<RiskRules>(&s) {
                Ok(r) => r.cleaned(),
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.as_ref().display(), "bad risk rules, using seed");
                    Self::default_seed()
                }
            },
            Err(_) => Self::default_seed(),
        }
    }

    pub fn default_seed() -> Self {
        fn list(xs: &[&str]) -> Vec<String> {
            xs.iter().map(|s| s.to_string()).collect()
        }
        Self {
            critical: list(&[
                "password leak",
                "data breach",
                "database dump",
                "credentials leaked",
                "api key exposed",
                "private key leaked",
                "security breach",
            ]),
            high: list(&[
                "password",
                "leak",
                "breach",
                "hack",
                "exploit",
                "vulnerability",
                "database",
                "credentials",
                "api key",
                "token",
                "exposed",
                "dump",
            ]),
            medium: list(&[
                "security",
                "threat",
                "attack",
                "malware",
                "phishing",
                "suspicious",
                "fraud",
                "scam",
                "investigation",
                "alert",
            ]),
        }
    }

    fn cleaned(self) -> Self {
        Self {
            critical: clean_list(self.critical),
            high: clean_list(self.high),
            medium: clean_list(self.medium),
        }
    }
}

impl Default for RiskRules {
    fn default() -> Self {
        Self::default_seed()
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim().to_lowercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

/// Popularity multipliers per source family; sources not listed weigh 0.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceWeights {
    #[serde(default)]
    pub reddit: f64,
    #[serde(default)]
    pub github: f64,
    #[serde(default)]
    pub hackernews: f64,
    #[serde(default)]
    pub news: f64,
}

impl SourceWeights {
    /// Load weights from a JSON file. Falls back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path.as_ref()) {
            Ok(s) => match serde_json::from_str::<SourceWeights>(&s) {
                Ok(w) => w,
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.as_ref().display(), "bad source weights, using seed");
                    Self::default_seed()
                }
            },
            Err(_) => Self::default_seed(),
        }
    }

    pub fn default_seed() -> Self {
        Self {
            reddit: 0.1,
            github: 0.1,
            hackernews: 0.2,
            news: 0.0,
        }
    }

    pub fn weight_for(&self, source: SourceKind) -> f64 {
        let w = match source {
            SourceKind::Reddit => self.reddit,
            SourceKind::Github => self.github,
            SourceKind::Hackernews => self.hackernews,
            SourceKind::News => self.news,
        };
        if w.is_finite() {
            w
        } else {
            0.0
        }
    }
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self::default_seed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[test]
    fn missing_files_fall_back_to_seed() {
        let r = RiskRules::load_from_file("does/not/exist.json");
        assert_eq!(r, RiskRules::default_seed());
        let w = SourceWeights::load_from_file("does/not/exist.json");
        assert_eq!(w.weight_for(SourceKind::Hackernews), 0.2);
    }

    #[test]
    fn loaded_rules_are_lowercased_and_deduped() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("rules.json");
        std::fs::write(
            &p,
            r#"{"critical":[" Data Breach ",""],"high":["Token","token"],"medium":["scam"]}"#,
        )
        .unwrap();
        let r = RiskRules::load_from_file(&p);
        assert_eq!(r.critical, vec!["data breach".to_string()]);
        assert_eq!(r.high, vec!["token".to_string()]);
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;
        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn logged<T>(f: impl FnOnce() -> T) -> (T, String) {
        let cap = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(cap.clone())
            .with_ansi(false)
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        let text = String::from_utf8(cap.0.lock().unwrap().clone()).unwrap();
        (out, text)
    }

    #[test]
    fn malformed_weights_use_seed_and_warn() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("w.json");
        std::fs::write(&p, "{ not json").unwrap();
        let (w, log) = logged(|| SourceWeights::load_from_file(&p));
        assert_eq!(w, SourceWeights::default_seed());
        assert!(log.contains("WARN"), "{log}");
        assert!(log.contains("bad source weights, using seed"), "{log}");
    }

    #[test]
    fn malformed_rules_warn_the_same_way() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("rules.json");
        std::fs::write(&p, "{ not json").unwrap();
        let (r, log) = logged(|| RiskRules::load_from_file(&p));
        assert_eq!(r, RiskRules::default_seed());
        assert!(log.contains("bad risk rules, using seed"), "{log}");
    }
}
