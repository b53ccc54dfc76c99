//! Collaborator traits — the narrow contracts around the engine.
//!
//! The generation pipeline, moderation, and effect selection live outside
//! this repository. Handlers talk to them only through these traits, so the
//! queue never learns how content is produced.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AgentContext, GeneratedContent, Verdict};

/// External content generation pipeline. Possibly slow, possibly failing,
/// possibly rate-limited — callers own retry policy.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, ctx: &AgentContext) -> Result<GeneratedContent>;
}

/// External moderation collaborator. A rejection is a verdict, not an error;
/// `Err` means the moderation call itself failed.
#[async_trait]
pub trait Moderator: Send + Sync {
    async fn moderate(&self, body: &str) -> Result<Verdict>;
}

/// Chooses a visual/audio treatment for media content. Irrelevant to queue
/// mechanics; content handlers consult it before publishing.
pub trait EffectSelector: Send + Sync {
    fn select(&self, content: &GeneratedContent) -> Option<String>;
}
