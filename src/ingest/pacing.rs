//! Per-source pacing.
//!
//! One direct `governor` limiter per source family, with a quota of one call
//! per configured minimum interval. All work items hitting the same family
//! share its limiter; families never wait on each other.

use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::MonitorConfig;
use crate::model::SourceKind;

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Default)]
pub struct SourcePacer {
    limiters: HashMap<SourceKind, Arc<DirectLimiter>>,
}

impl SourcePacer {
    /// No pacing at all; used by tests.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &MonitorConfig) -> Self {
        let mut pacer = Self::default();
        for kind in SourceKind::ALL {
            pacer = pacer.with_interval(kind, cfg.min_interval(kind));
        }
        pacer
    }

    /// Set the minimum spacing for `kind`. A zero interval disables pacing.
    pub fn with_interval(mut self, kind: SourceKind, min_interval: Duration) -> Self {
        match Quota::with_period(min_interval) {
            Some(quota) => {
                self.limiters
                    .insert(kind, Arc::new(RateLimiter::direct(quota)));
            }
            None => {
                self.limiters.remove(&kind);
            }
        }
        self
    }

    /// Wait until `kind` may be called again.
    pub async fn until_ready(&self, kind: SourceKind) {
        if let Some(limiter) = self.limiters.get(&kind) {
            limiter.until_ready().await;
        }
    }
}
