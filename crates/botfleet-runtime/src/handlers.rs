//! Job handlers — the business logic behind each job type.
//!
//! Handlers own payload interpretation, collaborator calls, and side
//! effects. The queue only routes to them and records what they report.
//! Every handler resolves a job whose agent has been disabled (or deleted)
//! since enqueue as a skip, never a failure.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;

use botfleet_agents::{Agent, AgentStore, PostSource};
use botfleet_buffer::BufferStore;
use botfleet_cadence::{next_run_at, ActiveWindow, AgentCadence, RunOutcome};
use botfleet_core::rng::RandomSource;
use botfleet_core::traits::{EffectSelector, Generator, Moderator};
use botfleet_core::types::AgentContext;
use botfleet_queue::{HandlerError, HandlerOutcome, Job, JobHandler};

/// Payload for crew-interaction jobs.
#[derive(Debug, Deserialize)]
pub struct CrewPayload {
    pub partner_id: String,
}

/// Payload for the two reply job types.
#[derive(Debug, Deserialize)]
pub struct ReplyPayload {
    pub source_text: String,
    #[serde(default)]
    pub source_ref: Option<String>,
}

/// Outcome of the agent gate: run, or resolve as a skip.
enum AgentGate {
    Active(Agent),
    Skip(String),
}

/// Shared plumbing for the content-producing handlers: agent gating,
/// buffer-first publishing, and cadence rescheduling.
pub struct ContentPublisher {
    pub agents: Arc<AgentStore>,
    pub buffer: Arc<BufferStore>,
    pub generator: Arc<dyn Generator>,
    pub moderator: Arc<dyn Moderator>,
    pub effects: Arc<dyn EffectSelector>,
    pub rng: Arc<RandomSource>,
    pub failure_retry: Duration,
    pub buffer_ttl: Duration,
}

impl ContentPublisher {
    pub fn cadence_of(agent: &Agent) -> AgentCadence {
        AgentCadence {
            posting_frequency: agent.posting_frequency,
            profile: agent.rhythm_profile,
            window: ActiveWindow::new(agent.active_start_hour, agent.active_end_hour),
        }
    }

    /// Resolve the job's agent. Missing agent_id is a payload bug
    /// (permanent); a vanished or unscheduled agent voids the job (skip).
    fn gate(&self, job: &Job) -> Result<AgentGate, HandlerError> {
        let agent_id = job
            .agent_id
            .as_deref()
            .ok_or_else(|| HandlerError::permanent("job has no agent_id"))?;
        let agent = self
            .agents
            .get(agent_id)
            .map_err(HandlerError::transient)?;
        Ok(match agent {
            None => AgentGate::Skip(format!("agent {agent_id} no longer exists")),
            Some(a) if !a.is_scheduled => {
                AgentGate::Skip(format!("agent @{} is unscheduled", a.handle))
            }
            Some(a) => AgentGate::Active(a),
        })
    }

    /// Produce and publish one unit of content for the agent: pop a warm
    /// buffer entry when allowed, else pay live generation; moderate;
    /// choose a treatment; append to the post audit trail.
    async fn publish(
        &self,
        agent: &Agent,
        hints: serde_json::Value,
        allow_buffer: bool,
        extra_tags: &[&str],
    ) -> Result<PostSource, HandlerError> {
        let buffered = if allow_buffer {
            self.buffer
                .consume(&agent.id)
                .map_err(HandlerError::transient)?
        } else {
            None
        };

        let (content, source) = match buffered {
            Some(entry) => (entry.into_content(), PostSource::Buffer),
            None => {
                let ctx = AgentContext {
                    agent_id: agent.id.clone(),
                    handle: agent.handle.clone(),
                    display_name: agent.display_name.clone(),
                    hints,
                };
                let content = self
                    .generator
                    .generate(&ctx)
                    .await
                    .map_err(HandlerError::transient)?;
                (content, PostSource::Live)
            }
        };

        let verdict = self
            .moderator
            .moderate(&content.body)
            .await
            .map_err(HandlerError::transient)?;
        if !verdict.approved {
            // Regenerating the same payload cannot help; the next cadence
            // slot gets a fresh job instead.
            return Err(HandlerError::permanent(format!(
                "moderation rejected content: {}",
                verdict.reason.unwrap_or_else(|| "no reason given".into())
            )));
        }

        let effect = self.effects.select(&content);
        let mut tags = content.tags.clone();
        tags.extend(extra_tags.iter().map(|t| t.to_string()));

        self.agents
            .record_post(
                &agent.id,
                &content.body,
                &content.media_refs,
                &tags,
                effect.as_deref(),
                source,
            )
            .map_err(HandlerError::transient)?;
        Ok(source)
    }

    /// Advance the agent's next run. A write failure here is logged rather
    /// than failing the job — the content is already published, and a
    /// retry would publish it again.
    fn reschedule(&self, agent: &Agent, outcome: RunOutcome) {
        let next = next_run_at(
            &Self::cadence_of(agent),
            outcome,
            Utc::now(),
            self.failure_retry,
            &self.rng,
        );
        if let Err(e) = self.agents.set_next_run_at(&agent.id, next) {
            tracing::warn!("⚠️ Could not advance next_run_at for @{}: {e}", agent.handle);
        } else {
            tracing::debug!("📆 @{} next run at {next}", agent.handle);
        }
    }

    /// Failure path for the runner hook: advance the agent's schedule by
    /// the short retry horizon so one poisoned job never stalls the agent.
    pub fn advance_after_failure(&self, job: &Job) {
        let Some(agent_id) = job.agent_id.as_deref() else { return };
        match self.agents.get(agent_id) {
            Ok(Some(agent)) if agent.is_scheduled => {
                self.reschedule(&agent, RunOutcome::Failure);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("⚠️ Failure hook could not load agent {agent_id}: {e}"),
        }
    }
}

/// Scheduled content run: buffer-first publish, then a fresh cadence slot.
pub struct GenerateContentHandler {
    pub p: Arc<ContentPublisher>,
}

#[async_trait]
impl JobHandler for GenerateContentHandler {
    async fn run(&self, job: &Job) -> Result<HandlerOutcome, HandlerError> {
        let agent = match self.p.gate(job)? {
            AgentGate::Skip(reason) => return Ok(HandlerOutcome::Skipped(reason)),
            AgentGate::Active(agent) => agent,
        };
        let source = self
            .p
            .publish(&agent, job.payload.clone(), true, &[])
            .await?;
        tracing::info!("📮 @{} published ({} content)", agent.handle, match source {
            PostSource::Buffer => "buffered",
            PostSource::Live => "live",
        });
        self.p.reschedule(&agent, RunOutcome::Success);
        Ok(HandlerOutcome::Completed)
    }
}

/// Full agent cycle: a content run plus engagement bookkeeping.
pub struct AgentCycleHandler {
    pub p: Arc<ContentPublisher>,
}

#[async_trait]
impl JobHandler for AgentCycleHandler {
    async fn run(&self, job: &Job) -> Result<HandlerOutcome, HandlerError> {
        let agent = match self.p.gate(job)? {
            AgentGate::Skip(reason) => return Ok(HandlerOutcome::Skipped(reason)),
            AgentGate::Active(agent) => agent,
        };
        self.p
            .publish(&agent, job.payload.clone(), true, &[])
            .await?;
        let score = recompute_engagement(&self.p.agents, &agent.id)?;
        tracing::info!("🔄 @{} cycle complete (engagement {score:.2})", agent.handle);
        self.p.reschedule(&agent, RunOutcome::Success);
        Ok(HandlerOutcome::Completed)
    }
}

/// Two-agent interaction. Always generated live — buffered content knows
/// nothing about the partner.
pub struct CrewInteractionHandler {
    pub p: Arc<ContentPublisher>,
}

#[async_trait]
impl JobHandler for CrewInteractionHandler {
    async fn run(&self, job: &Job) -> Result<HandlerOutcome, HandlerError> {
        let payload: CrewPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| HandlerError::permanent(format!("bad crew payload: {e}")))?;
        let agent = match self.p.gate(job)? {
            AgentGate::Skip(reason) => return Ok(HandlerOutcome::Skipped(reason)),
            AgentGate::Active(agent) => agent,
        };
        let partner = self
            .p
            .agents
            .get(&payload.partner_id)
            .map_err(HandlerError::transient)?;
        let partner = match partner {
            Some(p) if p.is_scheduled => p,
            _ => {
                return Ok(HandlerOutcome::Skipped(format!(
                    "crew partner {} unavailable",
                    payload.partner_id
                )))
            }
        };

        let hints = serde_json::json!({
            "purpose": "crew_interaction",
            "partner_handle": partner.handle,
            "partner_name": partner.display_name,
        });
        self.p.publish(&agent, hints, false, &["crew"]).await?;
        tracing::info!("👥 @{} × @{} crew post published", agent.handle, partner.handle);
        Ok(HandlerOutcome::Completed)
    }
}

/// Reply jobs (to a comment or to another post). One implementation,
/// registered under both types with its own purpose tag.
pub struct ReplyHandler {
    pub p: Arc<ContentPublisher>,
    pub purpose: &'static str,
}

#[async_trait]
impl JobHandler for ReplyHandler {
    async fn run(&self, job: &Job) -> Result<HandlerOutcome, HandlerError> {
        let payload: ReplyPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| HandlerError::permanent(format!("bad reply payload: {e}")))?;
        let agent = match self.p.gate(job)? {
            AgentGate::Skip(reason) => return Ok(HandlerOutcome::Skipped(reason)),
            AgentGate::Active(agent) => agent,
        };
        let hints = serde_json::json!({
            "purpose": self.purpose,
            "source_text": payload.source_text,
            "source_ref": payload.source_ref,
        });
        // Replies need the source context, so the buffer is never used
        self.p.publish(&agent, hints, false, &["reply"]).await?;
        Ok(HandlerOutcome::Completed)
    }
}

/// Recompute an agent's engagement score from its recent posts.
pub struct RecalculateEngagementHandler {
    pub agents: Arc<AgentStore>,
}

#[async_trait]
impl JobHandler for RecalculateEngagementHandler {
    async fn run(&self, job: &Job) -> Result<HandlerOutcome, HandlerError> {
        let agent_id = job
            .agent_id
            .as_deref()
            .ok_or_else(|| HandlerError::permanent("job has no agent_id"))?;
        match self.agents.get(agent_id).map_err(HandlerError::transient)? {
            None => {
                return Ok(HandlerOutcome::Skipped(format!(
                    "agent {agent_id} no longer exists"
                )))
            }
            Some(a) if !a.is_scheduled => {
                return Ok(HandlerOutcome::Skipped(format!(
                    "agent @{} is unscheduled",
                    a.handle
                )))
            }
            Some(_) => {}
        }
        let score = recompute_engagement(&self.agents, agent_id)?;
        tracing::debug!("📈 Engagement for {agent_id} now {score:.2}");
        Ok(HandlerOutcome::Completed)
    }
}

/// Seed a new agent's schedule and warm its buffer with one entry.
pub struct OnboardAgentHandler {
    pub p: Arc<ContentPublisher>,
}

#[async_trait]
impl JobHandler for OnboardAgentHandler {
    async fn run(&self, job: &Job) -> Result<HandlerOutcome, HandlerError> {
        let agent = match self.p.gate(job)? {
            AgentGate::Skip(reason) => return Ok(HandlerOutcome::Skipped(reason)),
            AgentGate::Active(agent) => agent,
        };

        // First run lands shortly after the next window opening
        let window = ActiveWindow::new(agent.active_start_hour, agent.active_end_hour);
        let first_run = window.next_open(Utc::now())
            + Duration::minutes(self.p.rng.index(30) as i64);
        self.p
            .agents
            .set_next_run_at(&agent.id, first_run)
            .map_err(HandlerError::transient)?;

        // Warm one buffer entry so the first run is instant. Best-effort:
        // a cold first run is slower, not wrong.
        let ctx = AgentContext {
            agent_id: agent.id.clone(),
            handle: agent.handle.clone(),
            display_name: agent.display_name.clone(),
            hints: serde_json::json!({ "purpose": "onboarding" }),
        };
        match self.p.generator.generate(&ctx).await {
            Ok(content) => {
                if let Err(e) = self.p.buffer.insert_ready(&agent.id, &content, self.p.buffer_ttl) {
                    tracing::warn!("⚠️ Could not pre-warm buffer for @{}: {e}", agent.handle);
                }
            }
            Err(e) => tracing::warn!("⚠️ Pre-warm generation failed for @{}: {e}", agent.handle),
        }

        tracing::info!("🚀 @{} onboarded, first run {first_run}", agent.handle);
        Ok(HandlerOutcome::Completed)
    }
}

/// Decayed post-activity score: each post in the last week contributes by
/// half-life of one day.
fn recompute_engagement(agents: &AgentStore, agent_id: &str) -> Result<f64, HandlerError> {
    let now = Utc::now();
    let posts = agents
        .recent_posts(agent_id, now - Duration::days(7))
        .map_err(HandlerError::transient)?;
    let score = posts
        .iter()
        .map(|p| {
            let age_hours = (now - p.created_at).num_minutes() as f64 / 60.0;
            0.5_f64.powf(age_hours / 24.0)
        })
        .sum();
    agents
        .set_engagement(agent_id, score)
        .map_err(HandlerError::transient)?;
    Ok(score)
}
