use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection};
use tracing::debug;

use harbormind_core::error::{HarbormindError, Result};
use harbormind_core::traits::{DocumentStore, MemoryStore};
use harbormind_core::types::{MemoryEntry, MemoryLane, SessionId};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS memory_entries (
        rowid_alias INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL,
        session_id TEXT NOT NULL,
        lane TEXT NOT NULL,
        tags TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_memory_session_lane
        ON memory_entries(session_id, lane, rowid_alias);

    CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
        content,
        id UNINDEXED,
        session_id UNINDEXED,
        lane UNINDEXED,
        tags UNINDEXED,
        timestamp UNINDEXED,
        tokenize='porter unicode61'
    );

    CREATE TRIGGER IF NOT EXISTS memory_ai AFTER INSERT ON memory_entries BEGIN
        INSERT INTO memory_fts(rowid, content, id, session_id, lane, tags, timestamp)
        VALUES (new.rowid_alias, new.content, new.id, new.session_id, new.lane, new.tags, new.timestamp);
    END;

    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        doc TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    );";

/// SQLite-backed store implementing both session memory lanes (with FTS5
/// search over entry content) and the JSON document repository handlers use
/// for domain data.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                HarbormindError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn =
            Connection::open(path).map_err(|e| HarbormindError::Database(e.to_string()))?;

        // WAL for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| HarbormindError::Database(e.to_string()))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| HarbormindError::Database(e.to_string()))?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing and db-less configs).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| HarbormindError::Database(e.to_string()))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| HarbormindError::Database(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| HarbormindError::Database(e.to_string()))
    }
}

fn parse_lane(raw: &str) -> MemoryLane {
    match raw {
        "working" => MemoryLane::Working,
        "episodic" => MemoryLane::Episodic,
        "semantic" => MemoryLane::Semantic,
        _ => MemoryLane::Procedural,
    }
}

fn row_to_entry(
    id: String,
    lane: String,
    tags: String,
    content: String,
    ts: String,
) -> MemoryEntry {
    MemoryEntry {
        id,
        lane: parse_lane(&lane),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        content: serde_json::from_str(&content).unwrap_or(serde_json::Value::Null),
        timestamp: DateTime::parse_from_rfc3339(&ts)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    }
}

impl MemoryStore for SqliteStore {
    fn append(&self, sid: &SessionId, entries: &[MemoryEntry]) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();
        let rows: Vec<_> = entries
            .iter()
            .map(|e| {
                (
                    e.id.clone(),
                    e.lane.as_str().to_string(),
                    serde_json::to_string(&e.tags).unwrap_or_else(|_| "[]".into()),
                    e.content.to_string(),
                    e.timestamp.to_rfc3339(),
                )
            })
            .collect();

        Box::pin(async move {
            let conn = self.lock()?;
            for (id, lane, tags, content, timestamp) in &rows {
                conn.execute(
                    "INSERT INTO memory_entries (id, session_id, lane, tags, content, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![id, sid, lane, tags, content, timestamp],
                )
                .map_err(|e| HarbormindError::Database(e.to_string()))?;
            }
            Ok(())
        })
    }

    fn load_lane(
        &self,
        sid: &SessionId,
        lane: MemoryLane,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<MemoryEntry>>> {
        let sid = sid.0.clone();

        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, lane, tags, content, timestamp FROM memory_entries
                     WHERE session_id = ?1 AND lane = ?2
                     ORDER BY rowid_alias ASC
                     LIMIT ?3",
                )
                .map_err(|e| HarbormindError::Database(e.to_string()))?;

            let rows = stmt
                .query_map(params![sid, lane.as_str(), limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(|e| HarbormindError::Database(e.to_string()))?;

            let mut entries = Vec::new();
            for row in rows {
                let (id, lane, tags, content, ts) =
                    row.map_err(|e| HarbormindError::Database(e.to_string()))?;
                entries.push(row_to_entry(id, lane, tags, content, ts));
            }
            Ok(entries)
        })
    }

    fn search(&self, query: &str, limit: usize) -> BoxFuture<'_, Result<Vec<MemoryEntry>>> {
        let query = query.to_string();

        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, lane, tags, content, timestamp
                     FROM memory_fts
                     WHERE memory_fts MATCH ?1
                     ORDER BY rank
                     LIMIT ?2",
                )
                .map_err(|e| HarbormindError::Database(e.to_string()))?;

            let rows = stmt
                .query_map(params![query, limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(|e| HarbormindError::Database(e.to_string()))?;

            let mut entries = Vec::new();
            for row in rows {
                let (id, lane, tags, content, ts) =
                    row.map_err(|e| HarbormindError::Database(e.to_string()))?;
                entries.push(row_to_entry(id, lane, tags, content, ts));
            }
            Ok(entries)
        })
    }
}

impl DocumentStore for SqliteStore {
    fn put(
        &self,
        collection: &str,
        id: &str,
        doc: serde_json::Value,
    ) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_string();
        let id = id.to_string();

        Box::pin(async move {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO documents (collection, id, doc, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, id) DO UPDATE SET
                     doc = excluded.doc,
                     updated_at = excluded.updated_at",
                params![collection, id, doc.to_string(), Utc::now().to_rfc3339()],
            )
            .map_err(|e| HarbormindError::Database(e.to_string()))?;
            Ok(())
        })
    }

    fn get(&self, collection: &str, id: &str) -> BoxFuture<'_, Result<serde_json::Value>> {
        let collection = collection.to_string();
        let id = id.to_string();

        Box::pin(async move {
            let conn = self.lock()?;
            let raw: Option<String> = conn
                .query_row(
                    "SELECT doc FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(HarbormindError::Database(other.to_string())),
                })?;

            match raw {
                Some(raw) => Ok(serde_json::from_str(&raw)?),
                None => Err(HarbormindError::DocumentNotFound { collection, id }),
            }
        })
    }

    fn list(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Vec<(String, serde_json::Value)>>> {
        let collection = collection.to_string();

        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, doc FROM documents WHERE collection = ?1 ORDER BY id ASC",
                )
                .map_err(|e| HarbormindError::Database(e.to_string()))?;

            let rows = stmt
                .query_map(params![collection], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| HarbormindError::Database(e.to_string()))?;

            let mut docs = Vec::new();
            for row in rows {
                let (id, raw) = row.map_err(|e| HarbormindError::Database(e.to_string()))?;
                docs.push((id, serde_json::from_str(&raw)?));
            }
            Ok(docs)
        })
    }

    fn delete(&self, collection: &str, id: &str) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_string();
        let id = id.to_string();

        Box::pin(async move {
            let conn = self.lock()?;
            let deleted = conn
                .execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                )
                .map_err(|e| HarbormindError::Database(e.to_string()))?;

            if deleted == 0 {
                return Err(HarbormindError::DocumentNotFound { collection, id });
            }
            Ok(())
        })
    }
}
