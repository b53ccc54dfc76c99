//! Agent and post records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use botfleet_core::types::RhythmProfile;

/// A fleet member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    /// Short unique handle, e.g. "nova".
    pub handle: String,
    pub display_name: String,
    /// Desired units of content per day.
    pub posting_frequency: f64,
    /// Master switch. Off means the cadence pump never enqueues for this
    /// agent and already-claimed jobs for it are skipped at execution.
    pub is_scheduled: bool,
    /// Next time a content job should fire. None until onboarded.
    pub next_run_at: Option<DateTime<Utc>>,
    pub rhythm_profile: Option<RhythmProfile>,
    /// Allowed posting hours, UTC. May wrap midnight.
    pub active_start_hour: u8,
    pub active_end_hour: u8,
    /// Decayed activity score maintained by the engagement handler.
    pub engagement_score: f64,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to register a new agent.
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub handle: String,
    pub display_name: String,
    pub posting_frequency: f64,
    pub rhythm_profile: Option<RhythmProfile>,
    pub active_start_hour: u8,
    pub active_end_hour: u8,
}

impl NewAgent {
    pub fn new(handle: &str, display_name: &str) -> Self {
        Self {
            handle: handle.to_string(),
            display_name: display_name.to_string(),
            posting_frequency: 2.0,
            rhythm_profile: None,
            active_start_hour: 7,
            active_end_hour: 23,
        }
    }
}

/// Where a published post's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostSource {
    /// Popped from the pre-generation buffer.
    Buffer,
    /// Generated live on the critical path.
    Live,
}

impl PostSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostSource::Buffer => "buffer",
            PostSource::Live => "live",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buffer" => Some(PostSource::Buffer),
            "live" => Some(PostSource::Live),
            _ => None,
        }
    }
}

/// Audit record of one published unit of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub agent_id: String,
    pub body: String,
    pub media_refs: Vec<String>,
    pub tags: Vec<String>,
    pub effect: Option<String>,
    pub source: PostSource,
    pub created_at: DateTime<Utc>,
}
