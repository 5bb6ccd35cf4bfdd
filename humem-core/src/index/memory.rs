//! Ephemeral in-process index with brute-force cosine search.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{IndexHit, MetadataFilter, SimilarityIndex, nearest, newest};
use crate::embedding::{EmbeddingProvider, cosine_distance};
use crate::error::Result;
use crate::memory::RecordMetadata;
use crate::types::{Embedding, MemoryId};

struct Row {
    id: MemoryId,
    text: String,
    embedding: Embedding,
    metadata: RecordMetadata,
}

/// In-memory similarity index. Reads run concurrently; writes take a lock.
pub struct InMemoryIndex {
    rows: RwLock<Vec<Row>>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl InMemoryIndex {
    /// Empty index embedding text with `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            provider,
        }
    }

    fn hit(row: &Row, distance: f32) -> IndexHit {
        IndexHit {
            id: row.id,
            text: row.text.clone(),
            distance,
            metadata: row.metadata.clone(),
        }
    }
}

impl SimilarityIndex for InMemoryIndex {
    fn add(&self, id: MemoryId, text: &str, metadata: &RecordMetadata) -> Result<()> {
        let embedding = self.provider.embed(text)?;
        let mut rows = self.rows.write();
        rows.retain(|r| r.id != id);
        rows.push(Row {
            id,
            text: text.to_string(),
            embedding,
            metadata: metadata.clone(),
        });
        Ok(())
    }

    fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>> {
        let probe = self.provider.embed(text)?;
        let hits = self
            .rows
            .read()
            .iter()
            .map(|row| Self::hit(row, cosine_distance(&probe, &row.embedding)))
            .collect();
        Ok(nearest(hits, k))
    }

    fn query_by_metadata(&self, filter: &MetadataFilter, limit: usize) -> Result<Vec<IndexHit>> {
        let hits = self
            .rows
            .read()
            .iter()
            .filter(|row| filter.matches(&row.metadata))
            .map(|row| Self::hit(row, 0.0))
            .collect();
        Ok(newest(hits, limit))
    }

    fn get(&self, id: MemoryId) -> Result<Option<IndexHit>> {
        Ok(self
            .rows
            .read()
            .iter()
            .find(|r| r.id == id)
            .map(|r| Self::hit(r, 0.0)))
    }

    fn update_metadata(&self, id: MemoryId, metadata: &RecordMetadata) -> Result<()> {
        if let Some(row) = self.rows.write().iter_mut().find(|r| r.id == id) {
            row.metadata = metadata.clone();
        }
        Ok(())
    }

    fn delete(&self, ids: &[MemoryId]) -> Result<usize> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|r| !ids.contains(&r.id));
        Ok(before - rows.len())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.rows.read().len())
    }
}
