//! SQLite-backed buffer store.
//!
//! Consumption is a single `UPDATE … WHERE id = (SELECT …) RETURNING` so a
//! scheduled run atomically pops one entry — two concurrent consumers can
//! never publish the same buffered item. Expiry is enforced on the read
//! path (an expired entry is never returned, whatever its flag says) and
//! reclaimed by the sweep.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection};

use botfleet_core::error::{FleetError, Result};
use botfleet_core::types::GeneratedContent;

use crate::entry::{BufferEntry, BufferStatus};

const ENTRY_COLUMNS: &str =
    "id, agent_id, body, media_refs, tags, effect, status, created_at, expires_at";

/// Content buffer store.
pub struct BufferStore {
    conn: Mutex<Connection>,
}

impl BufferStore {
    /// Open or create the buffer database.
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
                "CREATE TABLE IF NOT EXISTS buffer_entries (
                    id TEXT PRIMARY KEY,
                    agent_id TEXT NOT NULL,
                    body TEXT NOT NULL,
                    media_refs TEXT NOT NULL DEFAULT '[]',
                    tags TEXT NOT NULL DEFAULT '[]',
                    effect TEXT,
                    status TEXT NOT NULL DEFAULT 'ready',
                    created_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_buffer_ready
                    ON buffer_entries (agent_id, status, expires_at);",
            )
            .map_err(FleetError::store)?;
        Ok(())
    }

    /// Store a freshly generated item as Ready with the given TTL.
    pub fn insert_ready(
        &self,
        agent_id: &str,
        content: &GeneratedContent,
        ttl: Duration,
    ) -> Result<BufferEntry> {
        let now = Utc::now();
        let entry = BufferEntry {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            body: content.body.clone(),
            media_refs: content.media_refs.clone(),
            tags: content.tags.clone(),
            effect: content.chosen_effect.clone(),
            status: BufferStatus::Ready,
            created_at: now,
            expires_at: now + ttl,
        };
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO buffer_entries (id, agent_id, body, media_refs, tags, effect,
                                             status, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.id,
                    entry.agent_id,
                    entry.body,
                    serde_json::to_string(&entry.media_refs).unwrap_or_else(|_| "[]".into()),
                    serde_json::to_string(&entry.tags).unwrap_or_else(|_| "[]".into()),
                    entry.effect,
                    entry.status.as_str(),
                    ts(entry.created_at),
                    ts(entry.expires_at),
                ],
            )
            .map_err(FleetError::store)?;
        tracing::debug!("🧺 Buffered entry {} for agent {}", entry.id, agent_id);
        Ok(entry)
    }

    /// Unexpired Ready entries held for an agent.
    pub fn ready_count(&self, agent_id: &str) -> Result<usize> {
        let n: i64 = self
            .conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM buffer_entries
                 WHERE agent_id = ?1 AND status = 'ready' AND expires_at > ?2",
                params![agent_id, ts(Utc::now())],
                |r| r.get(0),
            )
            .map_err(FleetError::store)?;
        Ok(n as usize)
    }

    /// Atomically pop the oldest unexpired Ready entry for an agent,
    /// marking it Consumed in the same step. Entries past `expires_at` are
    /// never returned, even if still flagged Ready.
    pub fn consume(&self, agent_id: &str) -> Result<Option<BufferEntry>> {
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE buffer_entries SET status = 'consumed'
             WHERE id = (
                 SELECT id FROM buffer_entries
                 WHERE agent_id = ?1 AND status = 'ready' AND expires_at > ?2
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT 1
             )
             RETURNING {ENTRY_COLUMNS}"
        );
        let mut stmt = conn.prepare(&sql).map_err(FleetError::store)?;
        let mut rows = stmt
            .query_map(params![agent_id, ts(now)], row_to_entry)
            .map_err(FleetError::store)?;
        match rows.next() {
            Some(Ok(entry)) => Ok(Some(entry)),
            Some(Err(e)) => Err(FleetError::store(e)),
            None => Ok(None),
        }
    }

    /// Garbage-collect: flag lingering expired Ready rows, then delete
    /// everything Consumed or Expired. Returns rows deleted.
    pub fn sweep(&self) -> Result<u64> {
        let now = ts(Utc::now());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE buffer_entries SET status = 'expired'
             WHERE status = 'ready' AND expires_at <= ?1",
            params![now],
        )
        .map_err(FleetError::store)?;
        let deleted = conn
            .execute(
                "DELETE FROM buffer_entries WHERE status IN ('consumed', 'expired')",
                [],
            )
            .map_err(FleetError::store)?;
        if deleted > 0 {
            tracing::info!("🧹 Buffer sweep removed {deleted} entr(y/ies)");
        }
        Ok(deleted as u64)
    }

    /// Entry counts by status, for the admin surface.
    pub fn counts_by_status(&self) -> Result<Vec<(BufferStatus, u64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM buffer_entries GROUP BY status ORDER BY status")
            .map_err(FleetError::store)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(FleetError::store)?;
        Ok(rows
            .filter_map(|r| r.ok())
            .filter_map(|(s, n)| BufferStatus::parse(&s).map(|st| (st, n as u64)))
            .collect())
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

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<BufferEntry> {
    let media_str: String = row.get(3)?;
    let tags_str: String = row.get(4)?;
    let status_str: String = row.get(6)?;
    Ok(BufferEntry {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        body: row.get(2)?,
        media_refs: serde_json::from_str(&media_str).unwrap_or_default(),
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        effect: row.get(5)?,
        status: BufferStatus::parse(&status_str).unwrap_or(BufferStatus::Ready),
        created_at: parse_ts(&row.get::<_, String>(7)?),
        expires_at: parse_ts(&row.get::<_, String>(8)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store(name: &str) -> BufferStore {
        let dir = std::env::temp_dir().join(format!("botfleet-buffer-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        BufferStore::open(&dir.join("buffer.db")).unwrap()
    }

    fn content(body: &str) -> GeneratedContent {
        GeneratedContent {
            body: body.to_string(),
            media_refs: vec![],
            tags: vec!["t".into()],
            chosen_effect: None,
        }
    }

    #[test]
    fn test_insert_and_consume_oldest_first() {
        let store = test_store("consume");
        store.insert_ready("a1", &content("first"), Duration::hours(2)).unwrap();
        store.insert_ready("a1", &content("second"), Duration::hours(2)).unwrap();

        let popped = store.consume("a1").unwrap().unwrap();
        assert_eq!(popped.body, "first");
        assert_eq!(popped.status, BufferStatus::Consumed);
        assert_eq!(store.ready_count("a1").unwrap(), 1);

        // Consumed entries never come back
        let popped = store.consume("a1").unwrap().unwrap();
        assert_eq!(popped.body, "second");
        assert!(store.consume("a1").unwrap().is_none());
    }

    #[test]
    fn test_consume_is_per_agent() {
        let store = test_store("peragent");
        store.insert_ready("a1", &content("mine"), Duration::hours(2)).unwrap();
        assert!(store.consume("a2").unwrap().is_none());
        assert!(store.consume("a1").unwrap().is_some());
    }

    #[test]
    fn test_expired_entry_never_consumed() {
        let store = test_store("expired");
        // Already past its TTL but still flagged Ready
        store.insert_ready("a1", &content("stale"), Duration::seconds(-5)).unwrap();
        assert!(store.consume("a1").unwrap().is_none());
        assert_eq!(store.ready_count("a1").unwrap(), 0);
    }

    #[test]
    fn test_sweep_removes_consumed_and_expired() {
        let store = test_store("sweep");
        store.insert_ready("a1", &content("keep"), Duration::hours(2)).unwrap();
        store.insert_ready("a1", &content("eat"), Duration::hours(2)).unwrap();
        store.insert_ready("a1", &content("rot"), Duration::seconds(-5)).unwrap();

        // Consume pops the oldest unexpired entry: "keep"
        let popped = store.consume("a1").unwrap().unwrap();
        assert_eq!(popped.body, "keep");

        let deleted = store.sweep().unwrap();
        assert_eq!(deleted, 2); // the consumed one + the rotten one
        assert_eq!(store.ready_count("a1").unwrap(), 1);

        let counts = store.counts_by_status().unwrap();
        assert_eq!(counts, vec![(BufferStatus::Ready, 1)]);
    }
}
