//! Fleet engine — owns the stores, builds the handler registry, and drives
//! the pump / worker / fill / sweep loops.

use std::sync::Arc;

use chrono::{Duration, Utc};

use botfleet_agents::AgentStore;
use botfleet_buffer::{BufferFiller, BufferStore, FillStats};
use botfleet_core::config::FleetConfig;
use botfleet_core::error::Result;
use botfleet_core::rng::RandomSource;
use botfleet_core::traits::{EffectSelector, Generator, Moderator};
use botfleet_queue::{
    spawn_workers, HandlerRegistry, JobRunner, JobStatus, JobStore, JobType, TickStats,
};

use crate::handlers::{
    AgentCycleHandler, ContentPublisher, CrewInteractionHandler, GenerateContentHandler,
    OnboardAgentHandler, RecalculateEngagementHandler, ReplyHandler,
};

/// Snapshot for the admin surface.
#[derive(Debug, Clone)]
pub struct FleetStats {
    pub agents: u64,
    pub posts: u64,
    pub jobs_by_status: Vec<(JobStatus, u64)>,
    pub buffer_by_status: Vec<(botfleet_buffer::BufferStatus, u64)>,
}

/// The composition root. All shared state lives behind the stores; the
/// engine itself is freely cloneable via Arc and holds no hidden globals.
pub struct FleetEngine {
    config: FleetConfig,
    agents: Arc<AgentStore>,
    jobs: Arc<JobStore>,
    buffer: Arc<BufferStore>,
    runner: Arc<JobRunner>,
    filler: Arc<BufferFiller>,
}

impl FleetEngine {
    /// Open the stores (one SQLite file, three table families) and wire
    /// every job type through the single handler registry.
    pub fn new(
        config: FleetConfig,
        generator: Arc<dyn Generator>,
        moderator: Arc<dyn Moderator>,
        effects: Arc<dyn EffectSelector>,
        rng: Arc<RandomSource>,
    ) -> Result<Self> {
        let db_path = std::path::PathBuf::from(&config.db_path);
        let agents = Arc::new(AgentStore::open(&db_path)?);
        let jobs = Arc::new(JobStore::open(&db_path, &config.queue)?);
        let buffer = Arc::new(BufferStore::open(&db_path)?);

        let publisher = Arc::new(ContentPublisher {
            agents: agents.clone(),
            buffer: buffer.clone(),
            generator: generator.clone(),
            moderator,
            effects,
            rng: rng.clone(),
            failure_retry: Duration::seconds(config.cadence.failure_retry_secs as i64),
            buffer_ttl: Duration::hours(config.buffer.ttl_hours as i64),
        });

        let mut registry = HandlerRegistry::new();
        registry.register(
            JobType::GenerateContent,
            Arc::new(GenerateContentHandler { p: publisher.clone() }),
        );
        registry.register(
            JobType::AgentCycle,
            Arc::new(AgentCycleHandler { p: publisher.clone() }),
        );
        registry.register(
            JobType::CrewInteraction,
            Arc::new(CrewInteractionHandler { p: publisher.clone() }),
        );
        registry.register(
            JobType::RespondToComment,
            Arc::new(ReplyHandler { p: publisher.clone(), purpose: "respond_to_comment" }),
        );
        registry.register(
            JobType::RespondToPost,
            Arc::new(ReplyHandler { p: publisher.clone(), purpose: "respond_to_post" }),
        );
        registry.register(
            JobType::RecalculateEngagement,
            Arc::new(RecalculateEngagementHandler { agents: agents.clone() }),
        );
        registry.register(
            JobType::OnboardAgent,
            Arc::new(OnboardAgentHandler { p: publisher.clone() }),
        );

        let mut runner = JobRunner::new(jobs.clone(), Arc::new(registry));
        let hook_publisher = publisher.clone();
        runner.set_on_failure(move |job| {
            // Only content cycles drive next_run_at; other failures must
            // not shove an agent's posting schedule around.
            if matches!(job.job_type, JobType::GenerateContent | JobType::AgentCycle) {
                hook_publisher.advance_after_failure(job);
            }
        });

        let filler = Arc::new(BufferFiller::new(
            buffer.clone(),
            agents.clone(),
            generator,
            config.buffer.per_agent_cap,
            Duration::hours(config.buffer.ttl_hours as i64),
        ));

        Ok(Self {
            config,
            agents,
            jobs,
            buffer,
            runner: Arc::new(runner),
            filler,
        })
    }

    pub fn agents(&self) -> &Arc<AgentStore> {
        &self.agents
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    pub fn buffer(&self) -> &Arc<BufferStore> {
        &self.buffer
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Enqueue a content job for every schedulable agent whose
    /// `next_run_at` has arrived, skipping agents that already have an
    /// unresolved content job. Returns how many were enqueued.
    pub fn pump_due_agents(&self) -> Result<usize> {
        let now = Utc::now();
        let mut enqueued = 0;
        for agent in self.agents.due_agents(now, self.config.queue.claim_batch * 4)? {
            if self.jobs.has_pending_job(JobType::GenerateContent, &agent.id)? {
                continue;
            }
            self.jobs.enqueue(
                JobType::GenerateContent,
                Some(&agent.id),
                serde_json::json!({}),
                Some(now),
            )?;
            enqueued += 1;
        }
        if enqueued > 0 {
            tracing::info!("⏲️ Cadence pump enqueued {enqueued} content job(s)");
        }
        Ok(enqueued)
    }

    /// One full engine tick: pump due agents, then claim and execute.
    pub async fn tick(&self, max_jobs: usize) -> Result<TickStats> {
        self.pump_due_agents()?;
        self.runner.run_tick(max_jobs).await
    }

    /// Off-peak buffer top-up.
    pub async fn fill_buffer(&self, max_agents: usize) -> Result<FillStats> {
        self.filler.fill(max_agents).await
    }

    /// Buffer expiry/garbage sweep.
    pub fn sweep_buffer(&self) -> Result<u64> {
        self.buffer.sweep()
    }

    /// Snapshot counts for the admin surface.
    pub fn stats(&self) -> Result<FleetStats> {
        Ok(FleetStats {
            agents: self.agents.agent_count()?,
            posts: self.agents.post_count()?,
            jobs_by_status: self.jobs.counts_by_status()?,
            buffer_by_status: self.buffer.counts_by_status()?,
        })
    }

    /// Spawn every background loop: one cadence pump, `workers` claim
    /// loops, a fill loop, and a sweep loop. Returns their join handles.
    pub fn spawn_loops(self: Arc<Self>, workers: usize) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        let tick_secs = self.config.queue.tick_secs;

        // Cadence pump
        let engine = self.clone();
        handles.push(tokio::spawn(async move {
            let base = std::time::Duration::from_secs(tick_secs.max(1));
            let mut sleep = base;
            loop {
                tokio::time::sleep(sleep).await;
                match engine.pump_due_agents() {
                    Ok(_) => sleep = base,
                    Err(e) => {
                        sleep = (sleep * 2).min(base * 8);
                        tracing::warn!("⚠️ Cadence pump failed ({e}), backing off");
                    }
                }
            }
        }));

        // Claim/dispatch workers
        handles.extend(spawn_workers(
            self.runner.clone(),
            workers,
            tick_secs,
            self.config.queue.claim_batch,
        ));

        // Buffer fill
        let engine = self.clone();
        let fill_secs = self.config.buffer.fill_interval_secs;
        let fill_agents = self.config.buffer.fill_agents_per_run;
        handles.push(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(fill_secs.max(60)));
            loop {
                interval.tick().await;
                if let Err(e) = engine.fill_buffer(fill_agents).await {
                    tracing::warn!("⚠️ Buffer fill pass failed: {e}");
                }
            }
        }));

        // Buffer sweep
        let engine = self.clone();
        let sweep_secs = self.config.buffer.sweep_interval_secs;
        handles.push(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(sweep_secs.max(60)));
            loop {
                interval.tick().await;
                if let Err(e) = engine.sweep_buffer() {
                    tracing::warn!("⚠️ Buffer sweep failed: {e}");
                }
            }
        }));

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use botfleet_agents::{NewAgent, PostSource};
    use botfleet_cadence::ActiveWindow;
    use botfleet_core::error::FleetError;
    use botfleet_core::types::{AgentContext, GeneratedContent, Verdict};
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubGenerator {
        fail: AtomicBool,
    }

    #[async_trait]
    impl Generator for StubGenerator {
        async fn generate(&self, ctx: &AgentContext) -> Result<GeneratedContent> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(FleetError::Generation("pipeline down".into()));
            }
            Ok(GeneratedContent {
                body: format!("fresh take from {}", ctx.handle),
                media_refs: vec![],
                tags: vec!["daily".into()],
                chosen_effect: None,
            })
        }
    }

    struct StubModerator {
        reject_term: Option<&'static str>,
    }

    #[async_trait]
    impl Moderator for StubModerator {
        async fn moderate(&self, body: &str) -> Result<Verdict> {
            match self.reject_term {
                Some(term) if body.contains(term) => Ok(Verdict::reject("stub says no")),
                _ => Ok(Verdict::approve()),
            }
        }
    }

    struct NoEffect;

    impl EffectSelector for NoEffect {
        fn select(&self, _content: &GeneratedContent) -> Option<String> {
            None
        }
    }

    fn engine(name: &str, generator: StubGenerator, moderator: StubModerator) -> Arc<FleetEngine> {
        let dir = std::env::temp_dir().join(format!("botfleet-engine-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        let mut config = FleetConfig::default();
        config.db_path = dir.join("fleet.db").to_string_lossy().into_owned();
        config.queue.backoff_base_secs = 0;
        Arc::new(
            FleetEngine::new(
                config,
                Arc::new(generator),
                Arc::new(moderator),
                Arc::new(NoEffect),
                Arc::new(RandomSource::seeded(11)),
            )
            .unwrap(),
        )
    }

    fn ok_engine(name: &str) -> Arc<FleetEngine> {
        engine(
            name,
            StubGenerator { fail: AtomicBool::new(false) },
            StubModerator { reject_term: None },
        )
    }

    #[tokio::test]
    async fn test_full_cycle_publishes_and_reschedules() {
        let engine = ok_engine("cycle");
        let agent = engine.agents().create(&NewAgent::new("nova", "Nova")).unwrap();
        engine
            .agents()
            .set_next_run_at(&agent.id, Utc::now() - Duration::minutes(1))
            .unwrap();

        let stats = engine.tick(10).await.unwrap();
        assert_eq!(stats.claimed, 1);
        assert_eq!(stats.succeeded, 1);

        // Post recorded, live generation (no buffer yet)
        let posts = engine
            .agents()
            .recent_posts(&agent.id, Utc::now() - Duration::hours(1))
            .unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].source, PostSource::Live);

        // next_run_at advanced into the agent's window, strictly later
        let reloaded = engine.agents().get(&agent.id).unwrap().unwrap();
        let next = reloaded.next_run_at.unwrap();
        assert!(next > Utc::now());
        let window = ActiveWindow::new(reloaded.active_start_hour, reloaded.active_end_hour);
        assert!(window.contains(next));

        // Agent no longer due; pump enqueues nothing
        assert_eq!(engine.pump_due_agents().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scheduled_run_consumes_buffer_first() {
        let engine = ok_engine("buffer-first");
        let agent = engine.agents().create(&NewAgent::new("iris", "Iris")).unwrap();
        engine
            .buffer()
            .insert_ready(
                &agent.id,
                &GeneratedContent {
                    body: "prebaked".into(),
                    media_refs: vec![],
                    tags: vec![],
                    chosen_effect: None,
                },
                Duration::hours(2),
            )
            .unwrap();
        engine
            .agents()
            .set_next_run_at(&agent.id, Utc::now() - Duration::minutes(1))
            .unwrap();

        engine.tick(10).await.unwrap();

        let posts = engine
            .agents()
            .recent_posts(&agent.id, Utc::now() - Duration::hours(1))
            .unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].body, "prebaked");
        assert_eq!(posts[0].source, PostSource::Buffer);
        assert_eq!(engine.buffer().ready_count(&agent.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_agent_job_is_skipped_not_failed() {
        let engine = ok_engine("skip");
        let agent = engine.agents().create(&NewAgent::new("mute", "Mute")).unwrap();
        engine
            .agents()
            .set_next_run_at(&agent.id, Utc::now() - Duration::minutes(1))
            .unwrap();

        // Job enqueued while the agent was live…
        engine.pump_due_agents().unwrap();
        // …then the agent gets disabled before the worker picks it up
        engine.agents().set_scheduled(&agent.id, false).unwrap();

        let stats = engine.tick(10).await.unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);

        // No post, no dead letter — the job just resolved
        assert_eq!(engine.agents().post_count().unwrap(), 0);
        assert!(engine.jobs().dead_letters(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_moderation_rejection_dead_letters_and_advances_agent() {
        let engine = engine(
            "modreject",
            StubGenerator { fail: AtomicBool::new(false) },
            StubModerator { reject_term: Some("fresh") },
        );
        let agent = engine.agents().create(&NewAgent::new("edgy", "Edgy")).unwrap();
        engine
            .agents()
            .set_next_run_at(&agent.id, Utc::now() - Duration::minutes(1))
            .unwrap();

        let stats = engine.tick(10).await.unwrap();
        assert_eq!(stats.failed, 1);

        // Permanent: dead-lettered on first failure
        let dead = engine.jobs().dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert!(dead[0].last_error.as_deref().unwrap().contains("moderation"));

        // The agent's schedule advanced anyway — no permanent stall
        let reloaded = engine.agents().get(&agent.id).unwrap().unwrap();
        assert!(reloaded.next_run_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_transient_generation_failure_retries() {
        let generator = StubGenerator { fail: AtomicBool::new(true) };
        let engine = engine("transient", generator, StubModerator { reject_term: None });
        let agent = engine.agents().create(&NewAgent::new("flaky", "Flaky")).unwrap();
        engine
            .agents()
            .set_next_run_at(&agent.id, Utc::now() - Duration::minutes(1))
            .unwrap();

        let stats = engine.tick(10).await.unwrap();
        assert_eq!(stats.failed, 1);
        // Transient: still pending (zero backoff in tests), not dead
        assert!(engine.jobs().dead_letters(10).unwrap().is_empty());

        // Pump does not double-enqueue while the retry is unresolved
        engine
            .agents()
            .set_next_run_at(&agent.id, Utc::now() - Duration::minutes(1))
            .unwrap();
        assert_eq!(engine.pump_due_agents().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_onboard_seeds_schedule_and_warms_buffer() {
        let engine = ok_engine("onboard");
        let agent = engine.agents().create(&NewAgent::new("newbie", "Newbie")).unwrap();
        assert!(engine.agents().get(&agent.id).unwrap().unwrap().next_run_at.is_none());

        engine
            .jobs()
            .enqueue(
                JobType::OnboardAgent,
                Some(&agent.id),
                serde_json::json!({}),
                Some(Utc::now() - Duration::minutes(1)),
            )
            .unwrap();
        let stats = engine.tick(10).await.unwrap();
        assert_eq!(stats.succeeded, 1);

        let reloaded = engine.agents().get(&agent.id).unwrap().unwrap();
        assert!(reloaded.next_run_at.is_some());
        assert_eq!(engine.buffer().ready_count(&agent.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_crew_interaction_publishes_for_initiator() {
        let engine = ok_engine("crew");
        let a = engine.agents().create(&NewAgent::new("ace", "Ace")).unwrap();
        let b = engine.agents().create(&NewAgent::new("bee", "Bee")).unwrap();

        engine
            .jobs()
            .enqueue(
                JobType::CrewInteraction,
                Some(&a.id),
                serde_json::json!({ "partner_id": b.id }),
                Some(Utc::now() - Duration::minutes(1)),
            )
            .unwrap();
        let stats = engine.tick(10).await.unwrap();
        assert_eq!(stats.succeeded, 1);

        let posts = engine
            .agents()
            .recent_posts(&a.id, Utc::now() - Duration::hours(1))
            .unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].tags.contains(&"crew".to_string()));
    }

    #[tokio::test]
    async fn test_engagement_recalculation() {
        let engine = ok_engine("engagement");
        let agent = engine.agents().create(&NewAgent::new("busy", "Busy")).unwrap();
        engine
            .agents()
            .record_post(&agent.id, "one", &[], &[], None, PostSource::Live)
            .unwrap();
        engine
            .agents()
            .record_post(&agent.id, "two", &[], &[], None, PostSource::Live)
            .unwrap();

        engine
            .jobs()
            .enqueue(
                JobType::RecalculateEngagement,
                Some(&agent.id),
                serde_json::json!({}),
                Some(Utc::now() - Duration::minutes(1)),
            )
            .unwrap();
        engine.tick(10).await.unwrap();

        let reloaded = engine.agents().get(&agent.id).unwrap().unwrap();
        // Two fresh posts at half-life 24h each score ~1.0
        assert!(reloaded.engagement_score > 1.8);
        assert!(reloaded.engagement_score <= 2.0);
    }

    #[tokio::test]
    async fn test_bad_payload_is_permanent() {
        let engine = ok_engine("badpayload");
        let a = engine.agents().create(&NewAgent::new("ace2", "Ace")).unwrap();
        engine
            .jobs()
            .enqueue(
                JobType::RespondToComment,
                Some(&a.id),
                serde_json::json!({ "wrong": "shape" }),
                Some(Utc::now() - Duration::minutes(1)),
            )
            .unwrap();

        let stats = engine.tick(10).await.unwrap();
        assert_eq!(stats.failed, 1);
        let dead = engine.jobs().dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let engine = ok_engine("stats");
        engine.agents().create(&NewAgent::new("one", "One")).unwrap();
        let stats = engine.stats().unwrap();
        assert_eq!(stats.agents, 1);
        assert_eq!(stats.posts, 0);
    }
}
