//! # BotFleet Queue
//!
//! Durable job execution engine — the only subsystem in the fleet with real
//! concurrency-safety requirements.
//!
//! ## Architecture
//! ```text
//! Worker tick (tokio interval, N concurrent loops)
//!   ├── JobStore::claim(limit)      — one atomic UPDATE…RETURNING step
//!   ├── HandlerRegistry::execute    — JobType → handler, typed failures
//!   └── succeed / fail              — backoff re-enqueue or dead-letter
//! ```
//!
//! Correctness rests on the store's claim statement, not in-process locks:
//! any number of workers (threads or processes sharing the DB file) can
//! poll concurrently and never receive the same job twice.

pub mod caps;
pub mod dispatch;
pub mod job;
pub mod runner;
pub mod store;

pub use caps::TypeCaps;
pub use dispatch::{HandlerError, HandlerOutcome, HandlerRegistry, JobHandler};
pub use job::{Job, JobStatus, JobType};
pub use runner::{spawn_workers, JobRunner, TickStats};
pub use store::JobStore;
