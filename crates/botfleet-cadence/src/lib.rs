//! # BotFleet Cadence
//!
//! Computes *when* an agent's next content run should fire. Pure time
//! arithmetic over `(cadence, outcome, now, rng)` — no I/O here; the caller
//! persists the returned timestamp onto the agent.
//!
//! Uniform intervals make every agent post like a metronome, which reads as
//! scheduled rather than authored. So gaps are jittered non-uniformly and,
//! when a rhythm profile is present, the time of day leans toward the
//! profile's preferred hours.

pub mod scheduler;
pub mod window;

pub use scheduler::{next_run_at, AgentCadence, RunOutcome};
pub use window::ActiveWindow;
