//! Risk tiering for monitoring findings.
//!
//! Layered keyword rules over the lower-cased `title + " " + body`, plain
//! substring containment, strict priority:
//! 1. any critical phrase present → `Critical`
//! 2. high-risk terms present: ≥2 → `High`, 1 → `Medium`
//! 3. medium-risk terms present: ≥2 → `Medium`
//! 4. otherwise `Low`
//!
//! Each list entry counts at most once, however often it occurs.

use crate::config::RiskRules;
use crate::model::{Finding, RiskTier};

#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    rules: RiskRules,
}

/// Why a tier was chosen; handy for logs and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub tier: RiskTier,
    pub critical_hit: Option<String>,
    pub high_hits: Vec<String>,
    pub medium_hits: Vec<String>,
}

impl RiskScorer {
    pub fn new(rules: RiskRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RiskRules {
        &self.rules
    }

    pub fn score_finding(&self, f: &Finding) -> RiskTier {
        self.score_text(&f.title, &f.body)
    }

    pub fn score_text(&self, title: &str, body: &str) -> RiskTier {
        self.assess(title, body).tier
    }

    pub fn assess(&self, title: &str, body: &str) -> RiskAssessment {
        let content = format!("{} {}", title, body).to_lowercase();

        if let Some(hit) = self.rules.critical.iter().find(|k| content.contains(k.as_str())) {
            return RiskAssessment {
                tier: RiskTier::Critical,
                critical_hit: Some(hit.clone()),
                high_hits: Vec::new(),
                medium_hits: Vec::new(),
            };
        }

        let high_hits = hits(&self.rules.high, &content);
        let medium_hits = hits(&self.rules.medium, &content);

        let tier = match (high_hits.len(), medium_hits.len()) {
            (h, _) if h >= 2 => RiskTier::High,
            (1, _) => RiskTier::Medium,
            (_, m) if m >= 2 => RiskTier::Medium,
            _ => RiskTier::Low,
        };

        RiskAssessment {
            tier,
            critical_hit: None,
            high_hits,
            medium_hits,
        }
    }
}

fn hits(list: &[String], content: &str) -> Vec<String> {
    list.iter()
        .filter(|k| !k.is_empty() && content.contains(k.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> RiskScorer {
        RiskScorer::default()
    }

    #[test]
    fn critical_phrase_short_circuits() {
        let a = scorer().assess("Database credentials leaked", "");
        assert_eq!(a.tier, RiskTier::Critical);
        assert_eq!(a.critical_hit.as_deref(), Some("credentials leaked"));
    }

    #[test]
    fn two_high_terms_is_high() {
        // "exploit" + "vulnerability"
        assert_eq!(
            scorer().score_text("New exploit", "for an old vulnerability"),
            RiskTier::High
        );
    }

    #[test]
    fn one_high_term_is_medium() {
        assert_eq!(scorer().score_text("Token rotation guide", ""), RiskTier::Medium);
    }

    #[test]
    fn substring_not_word_boundary() {
        // "hackathon" contains "hack"; "tokens" contains "token"
        let a = scorer().assess("Hackathon tokens", "");
        assert_eq!(a.high_hits, vec!["hack".to_string(), "token".to_string()]);
        assert_eq!(a.tier, RiskTier::High);
    }

    #[test]
    fn repeated_term_counts_once() {
        assert_eq!(
            scorer().score_text("password password password", ""),
            RiskTier::Medium
        );
    }

    #[test]
    fn two_medium_terms_is_medium() {
        assert_eq!(
            scorer().score_text("Phishing scam reported", ""),
            RiskTier::Medium
        );
    }

    #[test]
    fn single_medium_term_is_low() {
        assert_eq!(
            scorer().score_text("suspicious activity noted", ""),
            RiskTier::Low
        );
    }

    #[test]
    fn plain_text_is_low() {
        assert_eq!(scorer().score_text("A nice day", ""), RiskTier::Low);
        assert_eq!(scorer().score_text("", ""), RiskTier::Low);
    }

    #[test]
    fn body_is_scanned_too() {
        assert_eq!(
            scorer().score_text("Weekly roundup", "someone posted a DATA BREACH notice"),
            RiskTier::Critical
        );
    }

    #[test]
    fn phrase_split_across_title_and_body_matches_via_space() {
        // title and body are joined by a single space
        assert_eq!(scorer().score_text("big data", "breach today"), RiskTier::Critical);
    }

    #[test]
    fn custom_rules_are_honoured() {
        let s = RiskScorer::new(RiskRules {
            critical: vec!["ransom note".into()],
            high: vec![],
            medium: vec![],
        });
        assert_eq!(s.score_text("a Ransom Note appeared", ""), RiskTier::Critical);
        assert_eq!(s.score_text("password leak", ""), RiskTier::Low);
    }
}
