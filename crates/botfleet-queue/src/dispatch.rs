//! Handler routing — maps a claimed job's type to the code that runs it.
//!
//! The dispatcher does no business logic: it looks up the handler, awaits
//! it once, and reports the outcome faithfully. Handlers own payload
//! interpretation, collaborator calls, and side effects.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::job::{Job, JobType};

/// How a handler finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The work was done.
    Completed,
    /// The job no longer applies (agent disabled, target gone). Resolved
    /// as success — a skip is not a failure and must not burn retries.
    Skipped(String),
}

/// A handler failure, classified so the outcome recorder knows whether a
/// retry can ever help.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Worth retrying: timeouts, rate limits, flaky collaborators.
    #[error("{0}")]
    Transient(String),
    /// Retrying cannot change the outcome: bad payload shape, unknown job
    /// type, content permanently rejected.
    #[error("{0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn transient(e: impl std::fmt::Display) -> Self {
        Self::Transient(e.to_string())
    }

    pub fn permanent(e: impl std::fmt::Display) -> Self {
        Self::Permanent(e.to_string())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

/// One job type's executor.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &Job) -> Result<HandlerOutcome, HandlerError>;
}

/// Registry of handlers, built once at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        if self.handlers.insert(job_type, handler).is_some() {
            tracing::warn!("⚠️ Handler for {job_type} replaced");
        }
    }

    /// Job types with no registered handler.
    pub fn unhandled_types(&self) -> Vec<JobType> {
        JobType::ALL
            .iter()
            .copied()
            .filter(|t| !self.handlers.contains_key(t))
            .collect()
    }

    /// Route and run one claimed job. A missing handler is a permanent
    /// failure — retrying an unroutable job can never succeed, so it
    /// dead-letters on first failure instead of burning the retry budget.
    pub async fn execute(&self, job: &Job) -> Result<HandlerOutcome, HandlerError> {
        let handler = self
            .handlers
            .get(&job.job_type)
            .ok_or_else(|| {
                HandlerError::Permanent(format!("no handler registered for {}", job.job_type))
            })?;

        let started = std::time::Instant::now();
        let result = handler.run(job).await;
        let elapsed = started.elapsed().as_millis();
        match &result {
            Ok(HandlerOutcome::Completed) => {
                tracing::info!("✅ {} job {} done in {}ms", job.job_type, job.id, elapsed);
            }
            Ok(HandlerOutcome::Skipped(reason)) => {
                tracing::info!("⏭️ {} job {} skipped: {}", job.job_type, job.id, reason);
            }
            Err(e) => {
                tracing::warn!("⚠️ {} job {} failed in {}ms: {}", job.job_type, job.id, elapsed, e);
            }
        }
        result
    }
}
