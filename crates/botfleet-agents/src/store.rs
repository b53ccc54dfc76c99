//! SQLite-backed agent registry and post audit trail.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use botfleet_core::error::{FleetError, Result};
use botfleet_core::types::RhythmProfile;

use crate::agent::{Agent, NewAgent, Post, PostSource};

const AGENT_COLUMNS: &str =
    "id, handle, display_name, posting_frequency, is_scheduled, next_run_at, rhythm_profile,
     active_start_hour, active_end_hour, engagement_score, created_at";

/// Agent registry store.
pub struct AgentStore {
    conn: Mutex<Connection>,
}

impl AgentStore {
    /// Open or create the agent database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(FleetError::store)?;
        conn.busy_timeout(std::time::Duration::from_millis(5000))
            .map_err(FleetError::store)?;
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))
            .map_err(FleetError::store)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS agents (
                    id TEXT PRIMARY KEY,
                    handle TEXT NOT NULL UNIQUE,
                    display_name TEXT NOT NULL,
                    posting_frequency REAL NOT NULL DEFAULT 2.0,
                    is_scheduled INTEGER NOT NULL DEFAULT 1,
                    next_run_at TEXT,
                    rhythm_profile TEXT,
                    active_start_hour INTEGER NOT NULL DEFAULT 7,
                    active_end_hour INTEGER NOT NULL DEFAULT 23,
                    engagement_score REAL NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_agents_due
                    ON agents (is_scheduled, next_run_at);

                CREATE TABLE IF NOT EXISTS posts (
                    id TEXT PRIMARY KEY,
                    agent_id TEXT NOT NULL,
                    body TEXT NOT NULL,
                    media_refs TEXT NOT NULL DEFAULT '[]',
                    tags TEXT NOT NULL DEFAULT '[]',
                    effect TEXT,
                    source TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_posts_agent
                    ON posts (agent_id, created_at);",
            )
            .map_err(FleetError::store)?;
        Ok(())
    }

    /// Register a new agent. Scheduled by default, but with no `next_run_at`
    /// until onboarding seeds one.
    pub fn create(&self, new: &NewAgent) -> Result<Agent> {
        let agent = Agent {
            id: uuid::Uuid::new_v4().to_string(),
            handle: new.handle.clone(),
            display_name: new.display_name.clone(),
            posting_frequency: new.posting_frequency,
            is_scheduled: true,
            next_run_at: None,
            rhythm_profile: new.rhythm_profile,
            active_start_hour: new.active_start_hour.min(23),
            active_end_hour: new.active_end_hour.min(23),
            engagement_score: 0.0,
            created_at: Utc::now(),
        };
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO agents (id, handle, display_name, posting_frequency, is_scheduled,
                                     next_run_at, rhythm_profile, active_start_hour,
                                     active_end_hour, engagement_score, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    agent.id,
                    agent.handle,
                    agent.display_name,
                    agent.posting_frequency,
                    agent.is_scheduled as i32,
                    agent.next_run_at.map(ts),
                    agent.rhythm_profile.map(|p| p.as_str()),
                    agent.active_start_hour,
                    agent.active_end_hour,
                    agent.engagement_score,
                    ts(agent.created_at),
                ],
            )
            .map_err(FleetError::store)?;
        tracing::info!("🤖 Agent registered: @{} ({})", agent.handle, agent.id);
        Ok(agent)
    }

    /// Fetch one agent by ID.
    pub fn get(&self, id: &str) -> Result<Option<Agent>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1");
        conn.query_row(&sql, params![id], row_to_agent)
            .optional()
            .map_err(FleetError::store)
    }

    /// Fetch one agent by handle.
    pub fn get_by_handle(&self, handle: &str) -> Result<Option<Agent>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE handle = ?1");
        conn.query_row(&sql, params![handle], row_to_agent)
            .optional()
            .map_err(FleetError::store)
    }

    /// All agents, oldest first.
    pub fn list(&self) -> Result<Vec<Agent>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY created_at");
        let mut stmt = conn.prepare(&sql).map_err(FleetError::store)?;
        let rows = stmt.query_map([], row_to_agent).map_err(FleetError::store)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Agents with scheduling enabled.
    pub fn list_schedulable(&self) -> Result<Vec<Agent>> {
        let conn = self.conn.lock().unwrap();
        let sql =
            format!("SELECT {AGENT_COLUMNS} FROM agents WHERE is_scheduled = 1 ORDER BY created_at");
        let mut stmt = conn.prepare(&sql).map_err(FleetError::store)?;
        let rows = stmt.query_map([], row_to_agent).map_err(FleetError::store)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Schedulable agents whose `next_run_at` has arrived.
    pub fn due_agents(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Agent>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {AGENT_COLUMNS} FROM agents
             WHERE is_scheduled = 1 AND next_run_at IS NOT NULL AND next_run_at <= ?1
             ORDER BY next_run_at ASC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql).map_err(FleetError::store)?;
        let rows = stmt
            .query_map(params![ts(now), limit as i64], row_to_agent)
            .map_err(FleetError::store)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Flip the scheduling switch. Re-enabling an agent that lost its
    /// `next_run_at` seeds an immediate run so it wakes up.
    pub fn set_scheduled(&self, id: &str, scheduled: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE agents SET is_scheduled = ?1 WHERE id = ?2",
                params![scheduled as i32, id],
            )
            .map_err(FleetError::store)?;
        if changed == 0 {
            return Err(FleetError::UnknownAgent(id.to_string()));
        }
        if scheduled {
            conn.execute(
                "UPDATE agents SET next_run_at = ?1 WHERE id = ?2 AND next_run_at IS NULL",
                params![ts(Utc::now()), id],
            )
            .map_err(FleetError::store)?;
        }
        tracing::info!(
            "{} Scheduling {} for agent {id}",
            if scheduled { "▶️" } else { "⏸️" },
            if scheduled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Persist a freshly computed next run time.
    pub fn set_next_run_at(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let changed = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE agents SET next_run_at = ?1 WHERE id = ?2",
                params![ts(at), id],
            )
            .map_err(FleetError::store)?;
        if changed == 0 {
            return Err(FleetError::UnknownAgent(id.to_string()));
        }
        Ok(())
    }

    /// Persist a recomputed engagement score.
    pub fn set_engagement(&self, id: &str, score: f64) -> Result<()> {
        let changed = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE agents SET engagement_score = ?1 WHERE id = ?2",
                params![score, id],
            )
            .map_err(FleetError::store)?;
        if changed == 0 {
            return Err(FleetError::UnknownAgent(id.to_string()));
        }
        Ok(())
    }

    /// Append to the post audit trail.
    pub fn record_post(
        &self,
        agent_id: &str,
        body: &str,
        media_refs: &[String],
        tags: &[String],
        effect: Option<&str>,
        source: PostSource,
    ) -> Result<Post> {
        let post = Post {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            body: body.to_string(),
            media_refs: media_refs.to_vec(),
            tags: tags.to_vec(),
            effect: effect.map(|s| s.to_string()),
            source,
            created_at: Utc::now(),
        };
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO posts (id, agent_id, body, media_refs, tags, effect, source, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    post.id,
                    post.agent_id,
                    post.body,
                    serde_json::to_string(&post.media_refs).unwrap_or_else(|_| "[]".into()),
                    serde_json::to_string(&post.tags).unwrap_or_else(|_| "[]".into()),
                    post.effect,
                    post.source.as_str(),
                    ts(post.created_at),
                ],
            )
            .map_err(FleetError::store)?;
        Ok(post)
    }

    /// Posts by an agent since the cutoff, newest first.
    pub fn recent_posts(&self, agent_id: &str, since: DateTime<Utc>) -> Result<Vec<Post>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, agent_id, body, media_refs, tags, effect, source, created_at
                 FROM posts WHERE agent_id = ?1 AND created_at >= ?2
                 ORDER BY created_at DESC",
            )
            .map_err(FleetError::store)?;
        let rows = stmt
            .query_map(params![agent_id, ts(since)], row_to_post)
            .map_err(FleetError::store)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Total agents registered.
    pub fn agent_count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM agents", [], |r| r.get(0))
            .map_err(FleetError::store)?;
        Ok(n as u64)
    }

    /// Total posts published.
    pub fn post_count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))
            .map_err(FleetError::store)?;
        Ok(n as u64)
    }
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_agent(row: &rusqlite::Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        handle: row.get(1)?,
        display_name: row.get(2)?,
        posting_frequency: row.get(3)?,
        is_scheduled: row.get::<_, i32>(4)? != 0,
        next_run_at: row.get::<_, Option<String>>(5)?.map(|s| parse_ts(&s)),
        rhythm_profile: row
            .get::<_, Option<String>>(6)?
            .and_then(|s| RhythmProfile::parse(&s)),
        active_start_hour: row.get::<_, i64>(7)? as u8,
        active_end_hour: row.get::<_, i64>(8)? as u8,
        engagement_score: row.get(9)?,
        created_at: parse_ts(&row.get::<_, String>(10)?),
    })
}

fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    let media_str: String = row.get(3)?;
    let tags_str: String = row.get(4)?;
    let source_str: String = row.get(6)?;
    Ok(Post {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        body: row.get(2)?,
        media_refs: serde_json::from_str(&media_str).unwrap_or_default(),
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        effect: row.get(5)?,
        source: PostSource::parse(&source_str).unwrap_or(PostSource::Live),
        created_at: parse_ts(&row.get::<_, String>(7)?),
    })
}
