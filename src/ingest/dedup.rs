// src/ingest/dedup.rs
//! Content fingerprints.
//!
//! Both the monitoring and the search pipeline fingerprint with this module,
//! so an item seen by one is a duplicate for the other.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt::Write as _;

use crate::model::Finding;

/// SHA-256 over `title ‖ body ‖ url`, lower-case hex (64 chars).
pub fn fingerprint(f: &Finding) -> String {
    let mut hasher = Sha256::new();
    hasher.update(f.title.as_bytes());
    hasher.update(f.body.as_bytes());
    hasher.update(f.url.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Drop in-batch repeats, keeping the first occurrence in input order.
/// Returns (kept, dropped_count).
pub fn dedup_findings(findings: Vec<Finding>) -> (Vec<(String, Finding)>, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(findings.len());
    let mut kept = Vec::with_capacity(findings.len());
    let mut dropped = 0usize;
    for f in findings {
        let fp = fingerprint(&f);
        if !seen.insert(fp.clone()) {
            dropped += 1;
            continue;
        }
        kept.push((fp, f));
    }
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Signal, SourceKind};
    use chrono::{TimeZone, Utc};

    fn finding(title: &str, body: &str, url: &str) -> Finding {
        Finding {
            title: title.into(),
            body: body.into(),
            url: url.into(),
            source: SourceKind::Reddit,
            published_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            signal: None,
        }
    }

    #[test]
    fn fingerprint_is_stable_hex_sha256() {
        let f = finding("Leak", "body", "https://x.test/1");
        assert_eq!(
            fingerprint(&f),
            "f83028f2aa9d7a1556d061e6d189c628cd23661f768e1cca6cb92f398cf2cdfb"
        );
        assert_eq!(fingerprint(&f), fingerprint(&f.clone()));
    }

    #[test]
    fn metadata_does_not_affect_fingerprint() {
        let a = finding("Leak", "body", "https://x.test/1");
        let mut b = a.clone();
        b.published_at = Utc.timestamp_opt(1, 0).unwrap();
        b.source = SourceKind::Hackernews;
        b.signal = Some(Signal::Points(99));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn content_changes_fingerprint() {
        let a = finding("Leak", "body", "https://x.test/1");
        let b = finding("Leak", "body", "https://x.test/2");
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn batch_dedup_keeps_first() {
        let mut second = finding("t", "b", "u");
        second.signal = Some(Signal::Score(5));
        let (kept, dropped) = dedup_findings(vec![
            finding("t", "b", "u"),
            finding("other", "", "u2"),
            second,
        ]);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].1.signal, None);
        assert_eq!(kept[1].1.title, "other");
    }
}
