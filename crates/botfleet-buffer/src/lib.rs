//! # BotFleet Buffer
//!
//! A TTL-bounded cache of pre-generated, ready-to-publish content. Filled
//! during idle hours so scheduled runs can pop a warm entry instead of
//! paying full generation latency on the critical path — and so external
//! API load spreads across the day instead of spiking at posting time.

pub mod entry;
pub mod fill;
pub mod store;

pub use entry::{BufferEntry, BufferStatus};
pub use fill::{BufferFiller, FillStats};
pub use store::BufferStore;
