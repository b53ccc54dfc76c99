//! # BotFleet Core
//!
//! Shared foundation for the fleet engine: configuration, error model,
//! common types, collaborator traits, and the injected random source.
//!
//! Nothing in this crate touches a database or the network — the traits
//! here are the seams where the heavier crates plug in.

pub mod config;
pub mod error;
pub mod rng;
pub mod traits;
pub mod types;

pub use config::FleetConfig;
pub use error::{FleetError, Result};
pub use rng::RandomSource;
pub use traits::{EffectSelector, Generator, Moderator};
pub use types::{AgentContext, GeneratedContent, RhythmProfile, Verdict};
