//! # BotFleet Runtime
//!
//! The composition root: concrete job handlers, the cadence pump that turns
//! due agents into queued jobs, collaborator adapters, and the background
//! loops that drive ticks, buffer fills, and expiry sweeps.
//!
//! ```text
//! FleetEngine
//!   ├── pump loop    — due agents → GenerateContent jobs (deduped)
//!   ├── worker loops — claim → handler → succeed/fail (botfleet-queue)
//!   ├── fill loop    — off-peak buffer top-up (botfleet-buffer)
//!   └── sweep loop   — buffer expiry garbage collection
//! ```

pub mod collab;
pub mod engine;
pub mod handlers;

pub use collab::{DenylistModerator, HttpGenerator, WeightedEffectSelector};
pub use engine::{FleetEngine, FleetStats};
