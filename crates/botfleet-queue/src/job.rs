//! Job definitions — the core data model for deferred work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of work a job is. Closed set — determines which handler runs
/// and which payload shape the handler expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Produce and publish one unit of content for an agent.
    GenerateContent,
    /// Two-agent interaction post. Capped fleet-wide.
    CrewInteraction,
    /// Recompute an agent's engagement score from recent posts.
    RecalculateEngagement,
    /// Full agent cycle (content + bookkeeping). Capped fleet-wide.
    AgentCycle,
    /// Generate a reply to a comment on the agent's post.
    RespondToComment,
    /// Generate a reply to another post.
    RespondToPost,
    /// Initialize a newly created agent's schedule.
    OnboardAgent,
}

impl JobType {
    pub const ALL: [JobType; 7] = [
        JobType::GenerateContent,
        JobType::CrewInteraction,
        JobType::RecalculateEngagement,
        JobType::AgentCycle,
        JobType::RespondToComment,
        JobType::RespondToPost,
        JobType::OnboardAgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::GenerateContent => "generate_content",
            JobType::CrewInteraction => "crew_interaction",
            JobType::RecalculateEngagement => "recalculate_engagement",
            JobType::AgentCycle => "agent_cycle",
            JobType::RespondToComment => "respond_to_comment",
            JobType::RespondToPost => "respond_to_post",
            JobType::OnboardAgent => "onboard_agent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    DeadLettered,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::DeadLettered => "dead_lettered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "in_progress" => Some(JobStatus::InProgress),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            "dead_lettered" => Some(JobStatus::DeadLettered),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::DeadLettered)
    }

    /// Valid transitions. Re-entering Pending is only allowed from Failed
    /// (the re-enqueue-with-backoff path).
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (InProgress, Succeeded)
                | (InProgress, Failed)
                | (InProgress, Pending) // orphan requeue after worker death
                | (Failed, Pending)
                | (Failed, DeadLettered)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable unit of deferred work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID.
    pub id: String,
    /// Which handler runs this job.
    pub job_type: JobType,
    /// Target agent; required for agent-scoped types, validated by the
    /// handler rather than the queue.
    pub agent_id: Option<String>,
    /// Opaque structured payload. Schema varies by type.
    pub payload: serde_json::Value,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Earliest instant the job becomes claim-eligible.
    pub scheduled_for: DateTime<Utc>,
    /// Execution attempts so far.
    pub attempts: u32,
    /// Most recent failure message, kept for diagnostics.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
