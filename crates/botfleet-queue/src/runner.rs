//! Worker loop — claims due jobs and drives them to exactly one resolution.
//!
//! Any number of these loops may run concurrently against one store; the
//! atomic claim is the only coordination. A handler failure never crashes
//! the loop, and every claimed job is resolved (succeed or fail) before the
//! loop moves on, so nothing is left InProgress by a healthy worker.

use std::sync::Arc;

use botfleet_core::error::Result;

use crate::dispatch::{HandlerOutcome, HandlerRegistry};
use crate::job::Job;
use crate::store::JobStore;

/// What one tick accomplished.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickStats {
    pub claimed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Claim-and-dispatch driver shared by all workers.
pub struct JobRunner {
    store: Arc<JobStore>,
    registry: Arc<HandlerRegistry>,
    /// Called after a job is recorded as failed (retry or dead-letter), so
    /// the owning agent's schedule can advance instead of stalling on a
    /// poisoned job.
    on_failure: Option<Arc<dyn Fn(&Job) + Send + Sync>>,
}

impl JobRunner {
    pub fn new(store: Arc<JobStore>, registry: Arc<HandlerRegistry>) -> Self {
        for t in registry.unhandled_types() {
            tracing::warn!("⚠️ No handler registered for job type {t}");
        }
        Self { store, registry, on_failure: None }
    }

    /// Set the failure hook.
    pub fn set_on_failure<F>(&mut self, f: F)
    where
        F: Fn(&Job) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(f));
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// One tick: requeue orphans, claim up to `max_jobs`, execute each
    /// claimed job synchronously, record exactly one outcome per job.
    pub async fn run_tick(&self, max_jobs: usize) -> Result<TickStats> {
        self.store.requeue_stale()?;

        let jobs = self.store.claim(max_jobs)?;
        let mut stats = TickStats { claimed: jobs.len(), ..TickStats::default() };

        for job in &jobs {
            match self.registry.execute(job).await {
                Ok(outcome) => {
                    if let Err(e) = self.store.succeed(&job.id) {
                        tracing::error!("🚨 Failed to record success for job {}: {e}", job.id);
                    }
                    match outcome {
                        HandlerOutcome::Completed => stats.succeeded += 1,
                        HandlerOutcome::Skipped(_) => stats.skipped += 1,
                    }
                }
                Err(err) => {
                    let permanent = err.is_permanent();
                    if let Err(e) = self.store.fail(&job.id, &err.to_string(), permanent) {
                        tracing::error!("🚨 Failed to record failure for job {}: {e}", job.id);
                    }
                    if let Some(hook) = &self.on_failure {
                        hook(job);
                    }
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }
}

/// Spawn `workers` concurrent tick loops. Infrastructure errors (store
/// unreachable) back the loop's own interval off — doubling up to 8× —
/// instead of busy-retrying; a clean tick resets it.
pub fn spawn_workers(
    runner: Arc<JobRunner>,
    workers: usize,
    tick_secs: u64,
    max_jobs_per_tick: usize,
) -> Vec<tokio::task::JoinHandle<()>> {
    tracing::info!("⏰ Starting {workers} worker loop(s), tick every {tick_secs}s");
    (0..workers)
        .map(|idx| {
            let runner = runner.clone();
            tokio::spawn(async move {
                let base = std::time::Duration::from_secs(tick_secs.max(1));
                let mut sleep = base;
                loop {
                    tokio::time::sleep(sleep).await;
                    match runner.run_tick(max_jobs_per_tick).await {
                        Ok(stats) => {
                            sleep = base;
                            if stats.claimed > 0 {
                                tracing::info!(
                                    "📦 Worker {idx}: {} claimed, {} ok, {} skipped, {} failed",
                                    stats.claimed, stats.succeeded, stats.skipped, stats.failed
                                );
                            }
                        }
                        Err(e) => {
                            sleep = (sleep * 2).min(base * 8);
                            tracing::warn!(
                                "⚠️ Worker {idx}: tick failed ({e}), backing off to {}s",
                                sleep.as_secs()
                            );
                        }
                    }
                }
            })
        })
        .collect()
}
