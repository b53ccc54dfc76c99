//! # BotFleet Agents
//!
//! The agent registry: who the bots are, whether their schedule is on, and
//! when each should next run. Also keeps the published-post audit trail the
//! content handlers write to.
//!
//! This crate is deliberately thin — scheduling *decisions* live in
//! `botfleet-cadence`, execution in `botfleet-queue`.

pub mod agent;
pub mod store;

pub use agent::{Agent, NewAgent, Post, PostSource};
pub use store::AgentStore;
