//! SQLite-backed job store — durable records plus the atomic state
//! transitions the rest of the engine is built on.
//!
//! The claim is a single `UPDATE … WHERE id IN (SELECT …) RETURNING` inside
//! an immediate transaction: selecting due rows and flipping them to
//! InProgress is one step, so concurrent claimers can never return
//! overlapping job sets. Jobs are never deleted by the engine; terminal
//! rows stay as an audit trail until `prune` removes them.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, TransactionBehavior};

use botfleet_core::config::QueueConfig;
use botfleet_core::error::{FleetError, Result};

use crate::caps::TypeCaps;
use crate::job::{Job, JobStatus, JobType};

const JOB_COLUMNS: &str =
    "id, job_type, agent_id, payload, status, scheduled_for, attempts, last_error, created_at, updated_at";

/// Durable job store over a single SQLite database.
pub struct JobStore {
    conn: Mutex<Connection>,
    caps: TypeCaps,
    max_attempts: u32,
    backoff_base_secs: u64,
    backoff_cap_secs: u64,
    stale_after_secs: u64,
}

impl JobStore {
    /// Open or create the job database.
    pub fn open(path: &Path, cfg: &QueueConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(FleetError::store)?;
        Self::from_conn(conn, cfg)
    }

    fn from_conn(conn: Connection, cfg: &QueueConfig) -> Result<Self> {
        init_pragmas(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
            caps: TypeCaps::standard(cfg.agent_cycle_cap, cfg.crew_interaction_cap),
            max_attempts: cfg.max_attempts,
            backoff_base_secs: cfg.backoff_base_secs,
            backoff_cap_secs: cfg.backoff_cap_secs,
            stale_after_secs: cfg.stale_after_secs,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS jobs (
                    id TEXT PRIMARY KEY,
                    job_type TEXT NOT NULL,
                    agent_id TEXT,
                    payload TEXT NOT NULL DEFAULT '{}',
                    status TEXT NOT NULL DEFAULT 'pending',
                    scheduled_for TEXT NOT NULL,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    last_error TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_jobs_due
                    ON jobs (status, scheduled_for);
                CREATE INDEX IF NOT EXISTS idx_jobs_agent
                    ON jobs (agent_id, job_type, status);",
            )
            .map_err(FleetError::store)?;
        Ok(())
    }

    /// Create a Pending job. `scheduled_for` defaults to now. Content-level
    /// dedup is the caller's job — see [`JobStore::has_pending_job`].
    pub fn enqueue(
        &self,
        job_type: JobType,
        agent_id: Option<&str>,
        payload: serde_json::Value,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Result<Job> {
        let now = Utc::now();
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            job_type,
            agent_id: agent_id.map(|s| s.to_string()),
            payload,
            status: JobStatus::Pending,
            scheduled_for: scheduled_for.unwrap_or(now),
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO jobs (id, job_type, agent_id, payload, status, scheduled_for,
                                   attempts, last_error, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    job.id,
                    job.job_type.as_str(),
                    job.agent_id,
                    job.payload.to_string(),
                    job.status.as_str(),
                    ts(job.scheduled_for),
                    job.attempts,
                    job.last_error,
                    ts(job.created_at),
                    ts(job.updated_at),
                ],
            )
            .map_err(FleetError::store)?;
        tracing::debug!("📥 Enqueued {} job {} (agent: {:?})", job.job_type, job.id, job.agent_id);
        Ok(job)
    }

    /// True if an unresolved job of this type already exists for the agent.
    /// Counts InProgress too, so a running cycle also suppresses re-enqueue.
    pub fn has_pending_job(&self, job_type: JobType, agent_id: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM jobs
                 WHERE job_type = ?1 AND agent_id = ?2
                   AND status IN ('pending', 'in_progress')",
                params![job_type.as_str(), agent_id],
                |r| r.get(0),
            )
            .map_err(FleetError::store)?;
        Ok(count > 0)
    }

    /// Atomically claim up to `limit` due jobs, oldest `scheduled_for`
    /// first, transitioning them to InProgress in the same step that reads
    /// them. Capped types are claimed only up to their free fleet-wide
    /// slots. All-or-nothing per row; never partial.
    pub fn claim(&self, limit: usize) -> Result<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(FleetError::store)?;

        let mut claimed = Vec::new();

        // Uncapped types first, in one shot.
        let capped: Vec<JobType> = self.caps.iter().map(|(t, _)| t).collect();
        let exclude = if capped.is_empty() {
            String::new()
        } else {
            let list = capped
                .iter()
                .map(|t| format!("'{}'", t.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            format!("AND job_type NOT IN ({list})")
        };
        let sql = format!(
            "UPDATE jobs SET status = 'in_progress', updated_at = ?1
             WHERE id IN (
                 SELECT id FROM jobs
                 WHERE status = 'pending' AND scheduled_for <= ?1 {exclude}
                 ORDER BY scheduled_for ASC, rowid ASC
                 LIMIT ?2
             )
             RETURNING {JOB_COLUMNS}"
        );
        {
            let mut stmt = tx.prepare(&sql).map_err(FleetError::store)?;
            let rows = stmt
                .query_map(params![ts(now), limit as i64], row_to_job)
                .map_err(FleetError::store)?;
            collect_rows(rows, &mut claimed);
        }

        // Capped types: each gets at most its free in-flight slots. The
        // count sees claims made by every other worker, so the cap is
        // fleet-global.
        for (job_type, cap) in self.caps.iter() {
            let remaining = limit.saturating_sub(claimed.len());
            if remaining == 0 {
                break;
            }
            let in_flight: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM jobs
                     WHERE status = 'in_progress' AND job_type = ?1",
                    params![job_type.as_str()],
                    |r| r.get(0),
                )
                .map_err(FleetError::store)?;
            let slots = cap.saturating_sub(in_flight as usize).min(remaining);
            if slots == 0 {
                continue;
            }
            let sql = format!(
                "UPDATE jobs SET status = 'in_progress', updated_at = ?1
                 WHERE id IN (
                     SELECT id FROM jobs
                     WHERE status = 'pending' AND scheduled_for <= ?1 AND job_type = ?2
                     ORDER BY scheduled_for ASC, rowid ASC
                     LIMIT ?3
                 )
                 RETURNING {JOB_COLUMNS}"
            );
            let mut stmt = tx.prepare(&sql).map_err(FleetError::store)?;
            let rows = stmt
                .query_map(params![ts(now), job_type.as_str(), slots as i64], row_to_job)
                .map_err(FleetError::store)?;
            collect_rows(rows, &mut claimed);
        }

        tx.commit().map_err(FleetError::store)?;
        claimed.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for));
        if !claimed.is_empty() {
            tracing::debug!("🤝 Claimed {} job(s)", claimed.len());
        }
        Ok(claimed)
    }

    /// Mark a claimed job Succeeded. Terminal.
    pub fn succeed(&self, id: &str) -> Result<()> {
        let changed = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE jobs SET status = 'succeeded', updated_at = ?1
                 WHERE id = ?2 AND status = 'in_progress'",
                params![ts(Utc::now()), id],
            )
            .map_err(FleetError::store)?;
        if changed == 0 {
            return Err(FleetError::Store(format!("job {id} is not in progress")));
        }
        Ok(())
    }

    /// Record a failure for a claimed job. Transient failures re-enqueue
    /// with backoff until the attempt ceiling; permanent failures (and the
    /// ceiling itself) dead-letter. The error text is retained either way.
    pub fn fail(&self, id: &str, error: &str, permanent: bool) -> Result<()> {
        let now = Utc::now();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(FleetError::store)?;

        let attempts: u32 = tx
            .query_row(
                "SELECT attempts FROM jobs WHERE id = ?1 AND status = 'in_progress'",
                params![id],
                |r| r.get(0),
            )
            .map_err(|_| FleetError::Store(format!("job {id} is not in progress")))?;
        let attempts = attempts + 1;

        if permanent || attempts >= self.max_attempts {
            tx.execute(
                "UPDATE jobs SET status = 'dead_lettered', attempts = ?1,
                                 last_error = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![attempts, error, ts(now), id],
            )
            .map_err(FleetError::store)?;
            tracing::warn!(
                "☠️ Job {id} dead-lettered after {attempts} attempt(s){}: {error}",
                if permanent { " (permanent)" } else { "" }
            );
        } else {
            let delay = self.backoff(attempts);
            let retry_at = now + Duration::seconds(delay as i64);
            tx.execute(
                "UPDATE jobs SET status = 'pending', attempts = ?1, last_error = ?2,
                                 scheduled_for = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![attempts, error, ts(retry_at), ts(now), id],
            )
            .map_err(FleetError::store)?;
            tracing::info!("🔁 Job {id} retry {attempts} in {delay}s: {error}");
        }
        tx.commit().map_err(FleetError::store)?;
        Ok(())
    }

    /// Retry delay for the given attempt count: base doubled per attempt,
    /// capped. Non-decreasing in `attempts`.
    pub fn backoff(&self, attempts: u32) -> u64 {
        let exp = attempts.saturating_sub(1).min(16);
        self.backoff_base_secs
            .saturating_mul(1u64 << exp)
            .min(self.backoff_cap_secs)
    }

    /// Return orphaned InProgress rows (worker died mid-run) to Pending.
    /// Attempts are untouched — the next run is a fresh try, not a retry.
    pub fn requeue_stale(&self) -> Result<u64> {
        let cutoff = Utc::now() - Duration::seconds(self.stale_after_secs as i64);
        let changed = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE jobs SET status = 'pending', updated_at = ?1
                 WHERE status = 'in_progress' AND updated_at < ?2",
                params![ts(Utc::now()), ts(cutoff)],
            )
            .map_err(FleetError::store)?;
        if changed > 0 {
            tracing::warn!("♻️ Requeued {changed} stale in-progress job(s)");
        }
        Ok(changed as u64)
    }

    /// Fetch one job by ID.
    pub fn get(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let mut stmt = conn.prepare(&sql).map_err(FleetError::store)?;
        let mut rows = stmt
            .query_map(params![id], row_to_job)
            .map_err(FleetError::store)?;
        match rows.next() {
            Some(Ok(job)) => Ok(Some(job)),
            Some(Err(e)) => Err(FleetError::store(e)),
            None => Ok(None),
        }
    }

    /// Job counts by status, for the admin surface.
    pub fn counts_by_status(&self) -> Result<Vec<(JobStatus, u64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status")
            .map_err(FleetError::store)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(FleetError::store)?;
        Ok(rows
            .filter_map(|r| r.ok())
            .filter_map(|(s, n)| JobStatus::parse(&s).map(|st| (st, n as u64)))
            .collect())
    }

    /// Most recent dead-lettered jobs, for inspection.
    pub fn dead_letters(&self, limit: usize) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE status = 'dead_lettered'
             ORDER BY updated_at DESC LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql).map_err(FleetError::store)?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_job)
            .map_err(FleetError::store)?;
        let mut out = Vec::new();
        collect_rows(rows, &mut out);
        Ok(out)
    }

    /// Delete terminal rows older than the cutoff. The engine itself never
    /// deletes; this is the explicit audit-trail pruning operation.
    pub fn prune(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let changed = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM jobs
                 WHERE status IN ('succeeded', 'dead_lettered') AND updated_at < ?1",
                params![ts(older_than)],
            )
            .map_err(FleetError::store)?;
        Ok(changed as u64)
    }
}

/// WAL so concurrent workers on one DB file don't serialize on readers,
/// plus a busy timeout so claim transactions queue instead of erroring.
fn init_pragmas(conn: &Connection) -> Result<()> {
    conn.busy_timeout(std::time::Duration::from_millis(5000))
        .map_err(FleetError::store)?;
    let _: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))
        .map_err(FleetError::store)?;
    Ok(())
}

/// Uniform second-precision UTC timestamps so string comparison in SQL
/// matches chronological order.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let type_str: String = row.get(1)?;
    let job_type = JobType::parse(&type_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown job type: {type_str}").into(),
        )
    })?;
    let status_str: String = row.get(4)?;
    let status = JobStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown job status: {status_str}").into(),
        )
    })?;
    let payload_str: String = row.get(3)?;
    Ok(Job {
        id: row.get(0)?,
        job_type,
        agent_id: row.get(2)?,
        payload: serde_json::from_str(&payload_str).unwrap_or_default(),
        status,
        scheduled_for: parse_ts(&row.get::<_, String>(5)?),
        attempts: row.get(6)?,
        last_error: row.get(7)?,
        created_at: parse_ts(&row.get::<_, String>(8)?),
        updated_at: parse_ts(&row.get::<_, String>(9)?),
    })
}

fn collect_rows(
    rows: impl Iterator<Item = rusqlite::Result<Job>>,
    out: &mut Vec<Job>,
) {
    for row in rows {
        match row {
            Ok(job) => out.push(job),
            Err(e) => tracing::warn!("⚠️ Skipping unreadable job row: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_store(name: &str, cfg: &QueueConfig) -> JobStore {
        let dir = std::env::temp_dir().join(format!("botfleet-queue-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        JobStore::open(&dir.join("jobs.db"), cfg).unwrap()
    }

    fn due(store: &JobStore, job_type: JobType, agent: &str) -> Job {
        store
            .enqueue(
                job_type,
                Some(agent),
                serde_json::json!({}),
                Some(Utc::now() - Duration::seconds(5)),
            )
            .unwrap()
    }

    #[test]
    fn test_enqueue_and_claim() {
        let store = test_store("basic", &QueueConfig::default());
        let job = due(&store, JobType::GenerateContent, "a1");

        let claimed = store.claim(10).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, job.id);
        assert_eq!(claimed[0].status, JobStatus::InProgress);

        // Second claim finds nothing
        assert!(store.claim(10).unwrap().is_empty());
    }

    #[test]
    fn test_future_jobs_not_claimed() {
        let store = test_store("future", &QueueConfig::default());
        store
            .enqueue(
                JobType::GenerateContent,
                Some("a1"),
                serde_json::json!({}),
                Some(Utc::now() + Duration::minutes(10)),
            )
            .unwrap();
        assert!(store.claim(10).unwrap().is_empty());
    }

    #[test]
    fn test_claim_is_oldest_first() {
        let store = test_store("order", &QueueConfig::default());
        let old = store
            .enqueue(
                JobType::GenerateContent,
                Some("a1"),
                serde_json::json!({}),
                Some(Utc::now() - Duration::minutes(30)),
            )
            .unwrap();
        let newer = due(&store, JobType::RecalculateEngagement, "a2");

        let claimed = store.claim(10).unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].id, old.id);
        assert_eq!(claimed[1].id, newer.id);
    }

    #[test]
    fn test_concurrent_claims_disjoint() {
        let store = Arc::new(test_store("concurrent", &QueueConfig::default()));
        for i in 0..3 {
            due(&store, JobType::GenerateContent, &format!("a{i}"));
        }

        let mut handles = Vec::new();
        for _ in 0..2 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || store.claim(5).unwrap()));
        }
        let sets: Vec<Vec<Job>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let mut all: Vec<String> = sets.iter().flatten().map(|j| j.id.clone()).collect();
        let total = all.len();
        all.sort();
        all.dedup();
        // Disjoint subsets whose union is all 3 jobs, no duplicates
        assert_eq!(all.len(), total);
        assert_eq!(total, 3);
    }

    #[test]
    fn test_fail_then_retry_then_succeed() {
        let cfg = QueueConfig { backoff_base_secs: 0, ..QueueConfig::default() };
        let store = test_store("retry", &cfg);
        let job = due(&store, JobType::GenerateContent, "a1");

        let claimed = store.claim(10).unwrap();
        assert_eq!(claimed.len(), 1);
        store.fail(&job.id, "rate limited", false).unwrap();

        let after = store.get(&job.id).unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Pending);
        assert_eq!(after.attempts, 1);
        assert_eq!(after.last_error.as_deref(), Some("rate limited"));

        // Zero backoff: immediately claimable again
        let claimed = store.claim(10).unwrap();
        assert_eq!(claimed.len(), 1);
        store.succeed(&job.id).unwrap();
        let done = store.get(&job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
    }

    #[test]
    fn test_backoff_delays_retry() {
        let store = test_store("backoff-delay", &QueueConfig::default());
        let job = due(&store, JobType::GenerateContent, "a1");

        store.claim(10).unwrap();
        store.fail(&job.id, "timeout", false).unwrap();

        let after = store.get(&job.id).unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Pending);
        assert!(after.scheduled_for > Utc::now() + Duration::seconds(60));
        // Not yet due — claim returns nothing
        assert!(store.claim(10).unwrap().is_empty());
    }

    #[test]
    fn test_backoff_monotonic() {
        let store = test_store("backoff-mono", &QueueConfig::default());
        let mut prev = 0;
        for attempts in 1..=12 {
            let delay = store.backoff(attempts);
            assert!(delay >= prev, "backoff({attempts}) = {delay} < {prev}");
            prev = delay;
        }
        // Cap holds
        assert_eq!(store.backoff(30), QueueConfig::default().backoff_cap_secs);
    }

    #[test]
    fn test_dead_letter_after_exactly_max_attempts() {
        let cfg = QueueConfig {
            max_attempts: 3,
            backoff_base_secs: 0,
            ..QueueConfig::default()
        };
        let store = test_store("deadletter", &cfg);
        let job = due(&store, JobType::GenerateContent, "a1");

        for attempt in 1..=3u32 {
            let claimed = store.claim(10).unwrap();
            assert_eq!(claimed.len(), 1, "attempt {attempt} should be claimable");
            store.fail(&job.id, "still broken", false).unwrap();
            let j = store.get(&job.id).unwrap().unwrap();
            assert_eq!(j.attempts, attempt);
            if attempt < 3 {
                assert_eq!(j.status, JobStatus::Pending);
            } else {
                assert_eq!(j.status, JobStatus::DeadLettered);
            }
        }
        // Dead-lettered jobs are excluded from further processing
        assert!(store.claim(10).unwrap().is_empty());
    }

    #[test]
    fn test_permanent_failure_dead_letters_immediately() {
        let store = test_store("permanent", &QueueConfig::default());
        let job = due(&store, JobType::GenerateContent, "a1");

        store.claim(10).unwrap();
        store.fail(&job.id, "invalid payload", true).unwrap();
        let j = store.get(&job.id).unwrap().unwrap();
        assert_eq!(j.status, JobStatus::DeadLettered);
        assert_eq!(j.attempts, 1);
    }

    #[test]
    fn test_per_type_caps() {
        let cfg = QueueConfig { agent_cycle_cap: 2, ..QueueConfig::default() };
        let store = test_store("caps", &cfg);
        for i in 0..5 {
            due(&store, JobType::AgentCycle, &format!("a{i}"));
        }

        // Cap 2: first claim hands out two, second none while both in flight
        let first = store.claim(10).unwrap();
        assert_eq!(first.len(), 2);
        assert!(store.claim(10).unwrap().is_empty());

        // Completing one frees one slot
        store.succeed(&first[0].id).unwrap();
        assert_eq!(store.claim(10).unwrap().len(), 1);
    }

    #[test]
    fn test_caps_do_not_limit_other_types() {
        let cfg = QueueConfig { agent_cycle_cap: 1, ..QueueConfig::default() };
        let store = test_store("caps-other", &cfg);
        due(&store, JobType::AgentCycle, "a1");
        due(&store, JobType::AgentCycle, "a2");
        due(&store, JobType::GenerateContent, "a3");
        due(&store, JobType::GenerateContent, "a4");

        let claimed = store.claim(10).unwrap();
        let cycles = claimed.iter().filter(|j| j.job_type == JobType::AgentCycle).count();
        let content = claimed.iter().filter(|j| j.job_type == JobType::GenerateContent).count();
        assert_eq!(cycles, 1);
        assert_eq!(content, 2);
    }

    #[test]
    fn test_has_pending_job() {
        let store = test_store("haspending", &QueueConfig::default());
        assert!(!store.has_pending_job(JobType::GenerateContent, "a1").unwrap());

        let job = due(&store, JobType::GenerateContent, "a1");
        assert!(store.has_pending_job(JobType::GenerateContent, "a1").unwrap());
        assert!(!store.has_pending_job(JobType::AgentCycle, "a1").unwrap());
        assert!(!store.has_pending_job(JobType::GenerateContent, "a2").unwrap());

        // InProgress still counts as unresolved
        store.claim(10).unwrap();
        assert!(store.has_pending_job(JobType::GenerateContent, "a1").unwrap());

        store.succeed(&job.id).unwrap();
        assert!(!store.has_pending_job(JobType::GenerateContent, "a1").unwrap());
    }

    #[test]
    fn test_succeed_requires_in_progress() {
        let store = test_store("strict", &QueueConfig::default());
        let job = due(&store, JobType::GenerateContent, "a1");
        // Not claimed yet
        assert!(store.succeed(&job.id).is_err());
        assert!(store.fail(&job.id, "x", false).is_err());
    }

    #[test]
    fn test_requeue_stale_noop_on_fresh_claims() {
        let store = test_store("stale", &QueueConfig::default());
        due(&store, JobType::GenerateContent, "a1");
        store.claim(10).unwrap();
        // Freshly claimed — nothing is stale
        assert_eq!(store.requeue_stale().unwrap(), 0);
    }

    #[test]
    fn test_counts_and_prune() {
        let store = test_store("counts", &QueueConfig::default());
        let a = store
            .enqueue(
                JobType::GenerateContent,
                Some("a1"),
                serde_json::json!({}),
                Some(Utc::now() - Duration::minutes(2)),
            )
            .unwrap();
        due(&store, JobType::GenerateContent, "a2");
        // Oldest-first: claims `a`
        store.claim(1).unwrap();
        store.succeed(&a.id).unwrap();

        let counts = store.counts_by_status();
        let counts = counts.unwrap();
        let get = |s: JobStatus| counts.iter().find(|(st, _)| *st == s).map(|(_, n)| *n);
        assert_eq!(get(JobStatus::Succeeded), Some(1));
        assert_eq!(get(JobStatus::Pending), Some(1));

        // Prune removes only terminal rows
        let pruned = store.prune(Utc::now() + Duration::seconds(1)).unwrap();
        assert_eq!(pruned, 1);
        assert!(store.get(&a.id).unwrap().is_none());
    }
}
