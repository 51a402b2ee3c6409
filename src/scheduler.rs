// src/scheduler.rs
//! Named periodic jobs on the tokio runtime, cancellable at shutdown.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct PeriodicJob {
    pub name: String,
    pub interval: Duration,
}

impl PeriodicJob {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
        }
    }
}

/// Handle to one running job.
pub struct JobHandle {
    name: String,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl JobHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop after the current run (if any) finishes.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(job = %self.name, error = %e, "job task ended abnormally");
        }
    }
}

/// Owns a root token; every spawned job listens on a child of it.
#[derive(Default)]
pub struct Scheduler {
    root: CancellationToken,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` every `job.interval`, first after one full interval.
    /// A run that overruns the interval delays the next one instead of
    /// stacking runs.
    pub fn spawn<F, Fut>(&self, job: PeriodicJob, work: F) -> JobHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.root.child_token();
        let child = token.clone();
        let name = job.name.clone();
        let period = job.interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(job = %job.name, every_secs = period.as_secs(), "job scheduled");
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        tracing::debug!(job = %job.name, "job tick");
                        work().await;
                    }
                }
            }
            tracing::info!(job = %job.name, "job stopped");
        });

        JobHandle { name, token, task }
    }

    /// Cancel every job spawned from this scheduler.
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}
