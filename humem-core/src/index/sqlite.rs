//! SQLite-backed similarity index.
//!
//! All tiers share one database file; each tier opens its own connection so
//! reads on different tiers never contend for a lock (WAL mode allows
//! concurrent readers alongside the single writer). Schema:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS memories (
//!     id         TEXT PRIMARY KEY,
//!     tier       TEXT NOT NULL,
//!     text       TEXT NOT NULL,
//!     metadata   TEXT NOT NULL,
//!     embedding  BLOB NOT NULL,
//!     created_at TEXT NOT NULL
//! );
//! ```
//!
//! Metadata is JSON so the schema stays stable as fields are added. A row
//! whose JSON cannot be read keeps its `created_at` and gets the rest
//! recomputed from its text through a [`MetadataRecovery`] hook; the
//! repaired metadata is written back.
//! Embeddings are little-endian `f32` blobs; search is a brute-force cosine
//! scan over the tier.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{info, warn};

use super::{IndexHit, MetadataFilter, MetadataRecovery, SimilarityIndex, nearest, newest};
use crate::embedding::{EmbeddingProvider, cosine_distance};
use crate::error::Result;
use crate::memory::RecordMetadata;
use crate::types::{Embedding, MemoryId, Tier};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS memories (
        id         TEXT PRIMARY KEY,
        tier       TEXT NOT NULL,
        text       TEXT NOT NULL,
        metadata   TEXT NOT NULL,
        embedding  BLOB NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_memories_tier ON memories(tier);";

/// Raw row before decoding: id, text, metadata, `created_at`, embedding.
type RawRow = (String, String, String, String, Option<Vec<u8>>);

/// One tier's view of the shared SQLite memory database.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
    tier: Tier,
    provider: Arc<dyn EmbeddingProvider>,
    recovery: Option<Arc<dyn MetadataRecovery>>,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex")
            .field("tier", &self.tier)
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqliteIndex {
    /// Open (or create) the database at `path` and bind to `tier`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HumemError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(
        path: P,
        tier: Tier,
        provider: Arc<dyn EmbeddingProvider>,
        wal_mode: bool,
    ) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        if wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            tier = %tier,
            wal = wal_mode,
            "memory index opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            tier,
            provider,
            recovery: None,
            db_path,
        })
    }

    /// Recompute unreadable metadata with `recovery` instead of keeping
    /// only the row's timestamps.
    #[must_use]
    pub fn with_recovery(mut self, recovery: Arc<dyn MetadataRecovery>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Open one index per tier over the same database file, in query order.
    ///
    /// # Errors
    ///
    /// Returns the first failure; no partially opened set is returned.
    pub fn open_all<P: AsRef<Path>>(
        path: P,
        provider: &Arc<dyn EmbeddingProvider>,
        wal_mode: bool,
    ) -> Result<Vec<Self>> {
        Tier::ALL
            .iter()
            .map(|tier| Self::open(path.as_ref(), *tier, Arc::clone(provider), wal_mode))
            .collect()
    }

    /// Tier this connection serves.
    #[must_use]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Path of the backing database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn select(&self, with_embedding: bool) -> Result<Vec<RawRow>> {
        let sql = if with_embedding {
            "SELECT id, text, metadata, created_at, embedding FROM memories WHERE tier = ?1"
        } else {
            "SELECT id, text, metadata, created_at, NULL FROM memories WHERE tier = ?1"
        };
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params![self.tier.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<std::result::Result<Vec<RawRow>, _>>()?;
        Ok(rows)
    }

    /// Decode a row. Malformed metadata is recomputed from the text and
    /// written back; rows with unreadable ids are skipped.
    fn decode(
        &self,
        id: &str,
        text: &str,
        metadata: &str,
        created_at: &str,
    ) -> Option<(MemoryId, RecordMetadata)> {
        let Ok(id) = id.parse::<MemoryId>() else {
            warn!(tier = %self.tier, id, "skipping row with malformed id");
            return None;
        };
        match serde_json::from_str(metadata) {
            Ok(meta) => Some((id, meta)),
            Err(e) => {
                warn!(
                    tier = %self.tier,
                    %id,
                    error = %e,
                    "malformed metadata, recomputed from text"
                );
                let created_at = DateTime::parse_from_rfc3339(created_at)
                    .map_or_else(|_| Utc::now(), |t| t.with_timezone(&Utc));
                let meta = self.recover(text, created_at);
                if let Err(e) = self.update_metadata(id, &meta) {
                    warn!(tier = %self.tier, %id, error = %e, "repaired metadata not saved");
                }
                Some((id, meta))
            }
        }
    }

    fn recover(&self, text: &str, created_at: DateTime<Utc>) -> RecordMetadata {
        match &self.recovery {
            Some(recovery) => recovery.recover(text, created_at, self.tier),
            None => RecordMetadata {
                timestamp: created_at,
                last_access: created_at,
                tier: self.tier,
                ..RecordMetadata::default()
            },
        }
    }

    fn stored_or_fresh(&self, text: &str, blob: Option<&[u8]>) -> Result<Embedding> {
        match blob {
            Some(bytes) if bytes.len() == self.provider.dimensions() * 4 => {
                Ok(Embedding::from_le_bytes(bytes))
            }
            _ => self.provider.embed(text),
        }
    }
}

impl SimilarityIndex for SqliteIndex {
    fn add(&self, id: MemoryId, text: &str, metadata: &RecordMetadata) -> Result<()> {
        let embedding = self.provider.embed(text)?;
        let json = serde_json::to_string(metadata)?;
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO memories (id, tier, text, metadata, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.to_string(),
                self.tier.as_str(),
                text,
                json,
                embedding.to_le_bytes(),
                metadata.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>> {
        let probe = self.provider.embed(text)?;
        let mut hits = Vec::new();
        for (id, row_text, metadata, created_at, blob) in self.select(true)? {
            let Some((id, metadata)) = self.decode(&id, &row_text, &metadata, &created_at) else {
                continue;
            };
            let embedding = self.stored_or_fresh(&row_text, blob.as_deref())?;
            hits.push(IndexHit {
                id,
                distance: cosine_distance(&probe, &embedding),
                text: row_text,
                metadata,
            });
        }
        Ok(nearest(hits, k))
    }

    fn query_by_metadata(&self, filter: &MetadataFilter, limit: usize) -> Result<Vec<IndexHit>> {
        let hits = self
            .select(false)?
            .into_iter()
            .filter_map(|(id, text, metadata, created_at, _)| {
                let (id, metadata) = self.decode(&id, &text, &metadata, &created_at)?;
                filter.matches(&metadata).then_some(IndexHit {
                    id,
                    text,
                    distance: 0.0,
                    metadata,
                })
            })
            .collect();
        Ok(newest(hits, limit))
    }

    fn get(&self, id: MemoryId) -> Result<Option<IndexHit>> {
        let row: Option<(String, String, String)> = self
            .conn
            .lock()
            .query_row(
                "SELECT text, metadata, created_at FROM memories WHERE id = ?1 AND tier = ?2",
                params![id.to_string(), self.tier.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        Ok(row.and_then(|(text, metadata, created_at)| {
            let (id, metadata) = self.decode(&id.to_string(), &text, &metadata, &created_at)?;
            Some(IndexHit {
                id,
                text,
                distance: 0.0,
                metadata,
            })
        }))
    }

    fn update_metadata(&self, id: MemoryId, metadata: &RecordMetadata) -> Result<()> {
        let json = serde_json::to_string(metadata)?;
        self.conn.lock().execute(
            "UPDATE memories SET metadata = ?1 WHERE id = ?2 AND tier = ?3",
            params![json, id.to_string(), self.tier.as_str()],
        )?;
        Ok(())
    }

    fn delete(&self, ids: &[MemoryId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM memories WHERE id = ?1 AND tier = ?2")?;
            for id in ids {
                removed += stmt.execute(params![id.to_string(), self.tier.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn count(&self) -> Result<usize> {
        let n: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM memories WHERE tier = ?1",
            params![self.tier.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::TextAnalyzer;
    use crate::config::AnalyzerConfig;
    use crate::embedding::NgramEmbeddingProvider;

    fn provider() -> Arc<dyn EmbeddingProvider> {
        Arc::new(NgramEmbeddingProvider::default())
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("memories.db");
        let id = MemoryId::new();
        {
            let idx = SqliteIndex::open(&path, Tier::LongTerm, provider(), true).expect("open");
            let meta = RecordMetadata {
                importance: 0.8,
                tier: Tier::LongTerm,
                ..RecordMetadata::default()
            };
            idx.add(id, "我住在上海", &meta).expect("add");
        }
        let idx = SqliteIndex::open(&path, Tier::LongTerm, provider(), true).expect("reopen");
        let hit = idx.get(id).expect("get").expect("row present");
        assert_eq!(hit.text, "我住在上海");
        assert!((hit.metadata.importance - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn tiers_are_isolated_within_one_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("memories.db");
        let all = SqliteIndex::open_all(&path, &provider(), true).expect("open all");
        all[0]
            .add(MemoryId::new(), "我很开心", &RecordMetadata::default())
            .expect("add");
        assert_eq!(all[0].count().expect("count"), 1);
        assert_eq!(all[1].count().expect("count"), 0);
        assert!(all[2].query("我很开心", 5).expect("query").is_empty());
    }

    fn corrupt(idx: &SqliteIndex) {
        idx.conn
            .lock()
            .execute("UPDATE memories SET metadata = 'not json'", [])
            .expect("corrupt row");
    }

    #[test]
    fn malformed_metadata_keeps_creation_time() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("memories.db");
        let idx = SqliteIndex::open(&path, Tier::Working, provider(), false).expect("open");
        let id = MemoryId::new();
        let created = Utc::now() - chrono::Duration::hours(5);
        let meta = RecordMetadata {
            timestamp: created,
            last_access: created,
            tier: Tier::Working,
            ..RecordMetadata::default()
        };
        idx.add(id, "我喜欢猫", &meta).expect("add");
        corrupt(&idx);

        let hits = idx.query("我喜欢猫", 1).expect("query still works");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.tier, Tier::Working);
        assert_eq!((hits[0].metadata.timestamp - created).num_seconds(), 0);
        assert_eq!(hits[0].metadata.last_access, hits[0].metadata.timestamp);
    }

    #[test]
    fn malformed_metadata_is_recomputed_and_saved() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("memories.db");
        let analyzer = Arc::new(TextAnalyzer::from_config(&AnalyzerConfig::default()));
        let idx = SqliteIndex::open(&path, Tier::LongTerm, provider(), false)
            .expect("open")
            .with_recovery(analyzer);
        let id = MemoryId::new();
        let meta = RecordMetadata {
            timestamp: Utc::now(),
            tier: Tier::LongTerm,
            ..RecordMetadata::default()
        };
        idx.add(id, "我住在北京", &meta).expect("add");
        corrupt(&idx);

        let hit = idx.get(id).expect("get").expect("row present");
        assert!(hit.metadata.importance >= 0.3);
        assert!(hit.metadata.entities.contains(&"北京".to_string()));

        let stored: String = idx
            .conn
            .lock()
            .query_row("SELECT metadata FROM memories", [], |row| row.get(0))
            .expect("metadata column");
        assert!(serde_json::from_str::<RecordMetadata>(&stored).is_ok());
    }

    #[test]
    fn delete_and_update_metadata() {
        let dir = tempfile::tempdir().expect("temp dir");
        let idx = SqliteIndex::open(dir.path().join("m.db"), Tier::Working, provider(), true)
            .expect("open");
        let id = MemoryId::new();
        idx.add(id, "今天加班", &RecordMetadata::default()).expect("add");
        let mut meta = RecordMetadata::default();
        meta.access_count = 4;
        idx.update_metadata(id, &meta).expect("update");
        let hit = idx.get(id).expect("get").expect("present");
        assert_eq!(hit.metadata.access_count, 4);
        assert_eq!(idx.delete(&[id]).expect("delete"), 1);
        assert_eq!(idx.count().expect("count"), 0);
    }
}
