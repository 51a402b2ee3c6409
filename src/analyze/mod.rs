// src/analyze/mod.rs
//! Rule-based scoring: risk tiers for monitoring, relevance for search.

pub mod relevance;
pub mod risk;

pub use crate::analyze::relevance::{RelevanceScorer, ScoredFinding};
pub use crate::analyze::risk::{RiskAssessment, RiskScorer};
