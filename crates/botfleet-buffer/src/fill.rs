//! Off-peak buffer fill pass.
//!
//! Walks schedulable agents that are below their Ready cap and asks the
//! generation collaborator for one item each. Bounded per invocation so a
//! single pass can't run unbounded or flood the external API, and one
//! agent's failure never aborts the pass for the rest.

use std::sync::Arc;

use chrono::Duration;

use botfleet_agents::AgentStore;
use botfleet_core::error::Result;
use botfleet_core::traits::Generator;
use botfleet_core::types::AgentContext;

use crate::store::BufferStore;

/// What one fill pass accomplished.
#[derive(Debug, Default, Clone, Copy)]
pub struct FillStats {
    /// Agents that needed (and got an attempt at) a top-up.
    pub agents_processed: usize,
    /// Entries actually created.
    pub filled: usize,
    /// Agents already at cap (not counted against the bound).
    pub at_cap: usize,
    /// Per-agent generation failures, logged and skipped.
    pub failures: usize,
}

/// Drives the fill pass.
pub struct BufferFiller {
    buffer: Arc<BufferStore>,
    agents: Arc<AgentStore>,
    generator: Arc<dyn Generator>,
    per_agent_cap: usize,
    ttl: Duration,
}

impl BufferFiller {
    pub fn new(
        buffer: Arc<BufferStore>,
        agents: Arc<AgentStore>,
        generator: Arc<dyn Generator>,
        per_agent_cap: usize,
        ttl: Duration,
    ) -> Self {
        Self { buffer, agents, generator, per_agent_cap, ttl }
    }

    /// Top up at most `max_agents` below-cap agents with one entry each.
    pub async fn fill(&self, max_agents: usize) -> Result<FillStats> {
        let mut stats = FillStats::default();

        for agent in self.agents.list_schedulable()? {
            if stats.agents_processed >= max_agents {
                break;
            }
            let ready = self.buffer.ready_count(&agent.id)?;
            if ready >= self.per_agent_cap {
                stats.at_cap += 1;
                continue;
            }
            stats.agents_processed += 1;

            let ctx = AgentContext {
                agent_id: agent.id.clone(),
                handle: agent.handle.clone(),
                display_name: agent.display_name.clone(),
                hints: serde_json::json!({ "purpose": "buffer_fill" }),
            };
            match self.generator.generate(&ctx).await {
                Ok(content) => {
                    self.buffer.insert_ready(&agent.id, &content, self.ttl)?;
                    stats.filled += 1;
                }
                Err(e) => {
                    // One agent's bad day is not the pass's problem
                    stats.failures += 1;
                    tracing::warn!("⚠️ Buffer fill failed for @{}: {e}", agent.handle);
                }
            }
        }

        tracing::info!(
            "🧺 Buffer fill: {} filled, {} at cap, {} failed",
            stats.filled, stats.at_cap, stats.failures
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use botfleet_agents::NewAgent;
    use botfleet_core::error::FleetError;
    use botfleet_core::types::GeneratedContent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Generates counted stub content; fails for handles listed as broken.
    struct StubGenerator {
        calls: AtomicUsize,
        broken_handle: Option<String>,
    }

    #[async_trait]
    impl Generator for StubGenerator {
        async fn generate(&self, ctx: &AgentContext) -> botfleet_core::error::Result<GeneratedContent> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken_handle.as_deref() == Some(ctx.handle.as_str()) {
                return Err(FleetError::Generation("pipeline 503".into()));
            }
            Ok(GeneratedContent {
                body: format!("post for {}", ctx.handle),
                media_refs: vec![],
                tags: vec![],
                chosen_effect: None,
            })
        }
    }

    fn stores(name: &str) -> (Arc<BufferStore>, Arc<AgentStore>) {
        let dir = std::env::temp_dir().join(format!("botfleet-fill-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        (
            Arc::new(BufferStore::open(&dir.join("buffer.db")).unwrap()),
            Arc::new(AgentStore::open(&dir.join("agents.db")).unwrap()),
        )
    }

    fn filler(
        buffer: &Arc<BufferStore>,
        agents: &Arc<AgentStore>,
        generator: StubGenerator,
        cap: usize,
    ) -> BufferFiller {
        BufferFiller::new(
            buffer.clone(),
            agents.clone(),
            Arc::new(generator),
            cap,
            Duration::hours(48),
        )
    }

    #[tokio::test]
    async fn test_fill_up_to_cap_is_idempotent() {
        let (buffer, agents) = stores("idempotent");
        let a = agents.create(&NewAgent::new("nova", "Nova")).unwrap();
        let f = filler(
            &buffer,
            &agents,
            StubGenerator { calls: AtomicUsize::new(0), broken_handle: None },
            2,
        );

        // One entry per pass until the cap
        assert_eq!(f.fill(10).await.unwrap().filled, 1);
        assert_eq!(f.fill(10).await.unwrap().filled, 1);
        assert_eq!(buffer.ready_count(&a.id).unwrap(), 2);

        // At cap: two more passes create zero new entries
        let stats = f.fill(10).await.unwrap();
        assert_eq!(stats.filled, 0);
        assert_eq!(stats.at_cap, 1);
        let stats = f.fill(10).await.unwrap();
        assert_eq!(stats.filled, 0);
        assert_eq!(buffer.ready_count(&a.id).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_one_agent_failure_does_not_abort_pass() {
        let (buffer, agents) = stores("isolate");
        agents.create(&NewAgent::new("ok1", "Ok One")).unwrap();
        let broken = agents.create(&NewAgent::new("broken", "Broken")).unwrap();
        agents.create(&NewAgent::new("ok2", "Ok Two")).unwrap();
        let f = filler(
            &buffer,
            &agents,
            StubGenerator { calls: AtomicUsize::new(0), broken_handle: Some("broken".into()) },
            1,
        );

        let stats = f.fill(10).await.unwrap();
        assert_eq!(stats.filled, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(buffer.ready_count(&broken.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fill_bounded_per_invocation() {
        let (buffer, agents) = stores("bounded");
        for i in 0..5 {
            agents.create(&NewAgent::new(&format!("a{i}"), "A")).unwrap();
        }
        let f = filler(
            &buffer,
            &agents,
            StubGenerator { calls: AtomicUsize::new(0), broken_handle: None },
            3,
        );

        let stats = f.fill(2).await.unwrap();
        assert_eq!(stats.agents_processed, 2);
        assert_eq!(stats.filled, 2);
    }

    #[tokio::test]
    async fn test_unscheduled_agents_not_filled() {
        let (buffer, agents) = stores("unscheduled");
        let a = agents.create(&NewAgent::new("off", "Off")).unwrap();
        agents.set_scheduled(&a.id, false).unwrap();
        let f = filler(
            &buffer,
            &agents,
            StubGenerator { calls: AtomicUsize::new(0), broken_handle: None },
            2,
        );

        let stats = f.fill(10).await.unwrap();
        assert_eq!(stats.agents_processed, 0);
        assert_eq!(buffer.ready_count(&a.id).unwrap(), 0);
    }
}
