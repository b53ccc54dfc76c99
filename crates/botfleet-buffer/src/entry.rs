//! Buffer entry records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use botfleet_core::types::GeneratedContent;

/// Lifecycle of a buffered content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferStatus {
    /// Available for a scheduled run to consume.
    Ready,
    /// Published; kept until the next sweep.
    Consumed,
    /// TTL elapsed before anyone consumed it.
    Expired,
}

impl BufferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferStatus::Ready => "ready",
            BufferStatus::Consumed => "consumed",
            BufferStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ready" => Some(BufferStatus::Ready),
            "consumed" => Some(BufferStatus::Consumed),
            "expired" => Some(BufferStatus::Expired),
            _ => None,
        }
    }
}

/// One pre-generated, not-yet-published content item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferEntry {
    pub id: String,
    pub agent_id: String,
    pub body: String,
    pub media_refs: Vec<String>,
    pub tags: Vec<String>,
    /// Treatment chosen at generation time, if any.
    pub effect: Option<String>,
    pub status: BufferStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BufferEntry {
    /// Repackage as the content type handlers publish.
    pub fn into_content(self) -> GeneratedContent {
        GeneratedContent {
            body: self.body,
            media_refs: self.media_refs,
            tags: self.tags,
            chosen_effect: self.effect,
        }
    }
}
