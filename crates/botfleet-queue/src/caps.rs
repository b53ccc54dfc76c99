//! Per-type concurrency caps.
//!
//! Some job types hammer the shared generation pipeline hard enough that
//! the whole fleet must hold them to a small in-flight count, independent
//! of the claim batch size. The cap is enforced inside the claim
//! transaction against live InProgress counts, so it holds across worker
//! processes sharing the same database file.

use std::collections::HashMap;

use crate::job::JobType;

/// Fleet-wide in-flight limits by job type. Types without an entry are
/// bounded only by the claim batch size.
#[derive(Debug, Clone, Default)]
pub struct TypeCaps {
    caps: HashMap<JobType, usize>,
}

impl TypeCaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default caps: agent cycles and crew interactions are the expensive
    /// multi-call types.
    pub fn standard(agent_cycle: usize, crew_interaction: usize) -> Self {
        Self::new()
            .with_cap(JobType::AgentCycle, agent_cycle)
            .with_cap(JobType::CrewInteraction, crew_interaction)
    }

    pub fn with_cap(mut self, job_type: JobType, max_in_flight: usize) -> Self {
        self.caps.insert(job_type, max_in_flight);
        self
    }

    /// The cap for a type, if any.
    pub fn cap_for(&self, job_type: JobType) -> Option<usize> {
        self.caps.get(&job_type).copied()
    }

    /// Iterate over capped types.
    pub fn iter(&self) -> impl Iterator<Item = (JobType, usize)> + '_ {
        self.caps.iter().map(|(t, n)| (*t, *n))
    }

    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }
}
