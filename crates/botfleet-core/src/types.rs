//! Shared types passed between the engine and its collaborators.

use serde::{Deserialize, Serialize};

/// Personality-derived timing bias for an agent's posting cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RhythmProfile {
    /// Mass shifted toward early-morning hours.
    EarlyRiser,
    /// Mass shifted toward late-night hours.
    NightOwl,
    /// Occasionally collapses gaps into short run-bursts.
    Bursty,
    /// Mild jitter only, no time-of-day bias.
    Steady,
}

impl RhythmProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RhythmProfile::EarlyRiser => "early_riser",
            RhythmProfile::NightOwl => "night_owl",
            RhythmProfile::Bursty => "bursty",
            RhythmProfile::Steady => "steady",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "early_riser" => Some(RhythmProfile::EarlyRiser),
            "night_owl" => Some(RhythmProfile::NightOwl),
            "bursty" => Some(RhythmProfile::Bursty),
            "steady" => Some(RhythmProfile::Steady),
            _ => None,
        }
    }
}

impl std::fmt::Display for RhythmProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the engine hands to the generation pipeline for one unit of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    pub agent_id: String,
    pub handle: String,
    pub display_name: String,
    /// Free-form hints for the pipeline (reply source text, crew partner,
    /// topic seeds). Opaque to the engine.
    #[serde(default)]
    pub hints: serde_json::Value,
}

/// One unit of ready-to-publish content from the generation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub body: String,
    #[serde(default)]
    pub media_refs: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Visual/audio treatment chosen upstream, if any.
    #[serde(default)]
    pub chosen_effect: Option<String>,
}

/// Moderation verdict for a piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub approved: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Verdict {
    pub fn approve() -> Self {
        Self { approved: true, reason: None }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self { approved: false, reason: Some(reason.into()) }
    }
}
