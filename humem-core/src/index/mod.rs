//! Similarity index boundary.
//!
//! Each tier is backed by one [`SimilarityIndex`]: a collection of
//! `(id, text, metadata)` rows searchable by text similarity. Distances are
//! cosine distances; smaller means more similar. Implementations are
//! synchronous and are always called from blocking worker threads.

mod memory;
mod sqlite;

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::memory::{MemoryRecord, RecordMetadata};
use crate::types::{MemoryId, Tier};

/// One row returned by an index.
#[derive(Debug, Clone)]
pub struct IndexHit {
    /// Record id.
    pub id: MemoryId,
    /// Record text.
    pub text: String,
    /// Distance to the query (0.0 for non-similarity reads).
    pub distance: f32,
    /// Stored metadata.
    pub metadata: RecordMetadata,
}

impl IndexHit {
    /// Convert into a full record.
    #[must_use]
    pub fn into_record(self) -> MemoryRecord {
        MemoryRecord {
            id: self.id,
            text: self.text,
            meta: self.metadata,
        }
    }
}

/// Predicate for metadata-only reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataFilter {
    /// Every record.
    All,
    /// Preference records of one category.
    PreferenceCategory(String),
    /// Records created at or after the instant.
    CreatedSince(DateTime<Utc>),
}

impl MetadataFilter {
    /// Whether `meta` satisfies the filter.
    #[must_use]
    pub fn matches(&self, meta: &RecordMetadata) -> bool {
        match self {
            Self::All => true,
            Self::PreferenceCategory(category) => {
                meta.preference && meta.preference_category.as_deref() == Some(category.as_str())
            }
            Self::CreatedSince(since) => meta.timestamp >= *since,
        }
    }
}

/// Rebuilds a row's metadata from its text when the stored copy is
/// unreadable.
pub trait MetadataRecovery: Send + Sync {
    /// Metadata for `text`, created at `created_at` in `tier`.
    fn recover(&self, text: &str, created_at: DateTime<Utc>, tier: Tier) -> RecordMetadata;
}

/// A persistent, similarity-searchable collection.
pub trait SimilarityIndex: Send + Sync {
    /// Insert a record. Ids are unique; re-adding an id replaces the row.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the write.
    fn add(&self, id: MemoryId, text: &str, metadata: &RecordMetadata) -> Result<()>;

    /// The `k` nearest records to `text`, nearest first.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>>;

    /// Up to `limit` records matching `filter`, newest first.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    fn query_by_metadata(&self, filter: &MetadataFilter, limit: usize) -> Result<Vec<IndexHit>>;

    /// Fetch one record by id.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    fn get(&self, id: MemoryId) -> Result<Option<IndexHit>>;

    /// Replace a record's metadata. Unknown ids are ignored.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the write.
    fn update_metadata(&self, id: MemoryId, metadata: &RecordMetadata) -> Result<()>;

    /// Delete records; returns how many existed.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the write.
    fn delete(&self, ids: &[MemoryId]) -> Result<usize>;

    /// Every record.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    fn get_all(&self) -> Result<Vec<IndexHit>> {
        self.query_by_metadata(&MetadataFilter::All, usize::MAX)
    }

    /// Number of records.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    fn count(&self) -> Result<usize>;
}

/// A tier and the index backing it.
#[derive(Clone)]
pub struct Collection {
    /// Which tier this collection holds.
    pub tier: Tier,
    /// The backing index.
    pub index: Arc<dyn SimilarityIndex>,
}

impl Collection {
    /// Pair a tier with its index.
    #[must_use]
    pub fn new(tier: Tier, index: Arc<dyn SimilarityIndex>) -> Self {
        Self { tier, index }
    }

    /// Three in-memory collections (emotional, long-term, working) sharing
    /// one embedding provider.
    #[must_use]
    pub fn in_memory_set(provider: &Arc<dyn crate::embedding::EmbeddingProvider>) -> Vec<Self> {
        Tier::ALL
            .iter()
            .map(|tier| {
                let index: Arc<dyn SimilarityIndex> =
                    Arc::new(InMemoryIndex::new(Arc::clone(provider)));
                Self::new(*tier, index)
            })
            .collect()
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}

/// Sort hits nearest first and keep `k`.
pub(crate) fn nearest(mut hits: Vec<IndexHit>, k: usize) -> Vec<IndexHit> {
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits.truncate(k);
    hits
}

/// Sort hits newest first and keep `limit`.
pub(crate) fn newest(mut hits: Vec<IndexHit>, limit: usize) -> Vec<IndexHit> {
    hits.sort_by(|a, b| b.metadata.timestamp.cmp(&a.metadata.timestamp));
    hits.truncate(limit);
    hits
}
