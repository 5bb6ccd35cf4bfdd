//! Conflict Resolution Pipeline: locate → retrieve → judge → delete.
//!
//! Runs synchronously on the caller's path before a new record is enqueued,
//! so superseded facts disappear before their replacement is committed.
//! Records still waiting in the store queue are judged too; a superseded
//! one is cancelled before it reaches an index. There is a short window
//! where a concurrent retrieval may still see the old record; that window
//! is accepted.

pub mod judge;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::analyzer::{TextAnalyzer, intent, rank_entities};
use crate::config::ConflictConfig;
use crate::embedding::{EmbeddingProvider, cosine_distance};
use crate::index::{Collection, IndexHit};
use crate::memory::{ConflictCandidate, MemoryRecord, RecordMetadata, SupersessionReason};
use crate::metrics::EngineCounters;
use crate::tiered::PendingCommits;
use crate::types::{MemoryId, Tier};
pub use judge::{Judge, Utterance};

/// What the pipeline did for one new utterance.
#[derive(Debug, Clone, Default)]
pub struct ConflictOutcome {
    /// Records deleted because the new utterance supersedes them.
    pub superseded: Vec<ConflictCandidate>,
    /// A stored record with exactly the same text, if any.
    pub exact_match: Option<(MemoryId, Tier)>,
}

/// Detects and removes stored records superseded by newer utterances.
#[derive(Clone)]
pub struct ConflictResolver {
    collections: Arc<[Collection]>,
    analyzer: Arc<TextAnalyzer>,
    provider: Arc<dyn EmbeddingProvider>,
    config: ConflictConfig,
    counters: Arc<EngineCounters>,
    pending: Option<Arc<PendingCommits>>,
}

impl std::fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConflictResolver {
    /// Resolver over `collections`.
    #[must_use]
    pub fn new(
        collections: Arc<[Collection]>,
        analyzer: Arc<TextAnalyzer>,
        provider: Arc<dyn EmbeddingProvider>,
        config: ConflictConfig,
        counters: Arc<EngineCounters>,
    ) -> Self {
        Self {
            collections,
            analyzer,
            provider,
            config,
            counters,
            pending: None,
        }
    }

    /// Cancel superseded records through `pending` while they are queued.
    #[must_use]
    pub fn with_pending(mut self, pending: Arc<PendingCommits>) -> Self {
        self.pending = Some(pending);
        self
    }

    fn judge(&self) -> Judge<'_> {
        Judge::new(&self.analyzer, &self.config)
    }

    /// Step 1: the highest-weight entities of the user-authored portion.
    #[must_use]
    pub fn locate(&self, text: &str) -> Vec<String> {
        let entities = self.analyzer.extract_entities(intent::user_input(text));
        let mut ranked = rank_entities(&entities);
        ranked.truncate(self.config.locate_top_n);
        ranked
    }

    /// Step 2: query every tier by each entity and by the full text, merge
    /// by record id, and measure each candidate's distance to `text`.
    #[must_use]
    pub fn retrieve(&self, text: &str, entities: &[String]) -> Vec<ConflictCandidate> {
        let k = self.config.candidates_per_query;
        let probe = match self.provider.embed(text) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "cannot embed utterance, skipping conflict scan");
                return Vec::new();
            }
        };

        let mut seen: HashSet<MemoryId> = HashSet::new();
        let mut candidates = Vec::new();
        let queries = entities.iter().map(String::as_str).chain(std::iter::once(text));
        for query in queries {
            for collection in self.collections.iter() {
                let hits = match collection.index.query(query, k) {
                    Ok(hits) => hits,
                    Err(e) => {
                        warn!(tier = %collection.tier, error = %e, "candidate query failed");
                        continue;
                    }
                };
                for hit in hits {
                    if !seen.insert(hit.id) {
                        continue;
                    }
                    let distance = self
                        .provider
                        .embed(&hit.text)
                        .map_or(hit.distance, |e| cosine_distance(&probe, &e));
                    candidates.push(ConflictCandidate {
                        record_id: hit.id,
                        text: hit.text,
                        distance,
                        metadata: hit.metadata,
                        source_tier: collection.tier,
                        reason: None,
                    });
                }
            }
        }
        candidates
    }

    /// Records from the store queue as candidates, measured against `text`.
    fn queued_candidates(&self, text: &str, queued: &[MemoryRecord]) -> Vec<ConflictCandidate> {
        if queued.is_empty() {
            return Vec::new();
        }
        let Ok(probe) = self.provider.embed(text) else {
            return Vec::new();
        };
        queued
            .iter()
            .filter_map(|record| {
                let embedding = self.provider.embed(&record.text).ok()?;
                Some(ConflictCandidate {
                    record_id: record.id,
                    text: record.text.clone(),
                    distance: cosine_distance(&probe, &embedding),
                    metadata: record.meta.clone(),
                    source_tier: record.tier(),
                    reason: None,
                })
            })
            .collect()
    }

    /// Run the whole pipeline for a new utterance and delete what it
    /// supersedes, including records in `queued` that are not yet written.
    /// Blocking.
    pub fn resolve(&self, text: &str, queued: &[MemoryRecord]) -> ConflictOutcome {
        let entities = self.locate(text);
        let utterance = Utterance::new(&self.analyzer, text);
        let judge = self.judge();
        let mut outcome = ConflictOutcome::default();

        let mut candidates = self.retrieve(text, &entities);
        let stored: HashSet<MemoryId> = candidates.iter().map(|c| c.record_id).collect();
        candidates.extend(
            self.queued_candidates(text, queued)
                .into_iter()
                .filter(|c| !stored.contains(&c.record_id)),
        );

        for mut candidate in candidates {
            if candidate.text.trim() == text.trim() {
                outcome
                    .exact_match
                    .get_or_insert((candidate.record_id, candidate.source_tier));
                continue;
            }
            let old_entities = self.entities_of(&candidate.text, &candidate.metadata);
            if let Some(reason) =
                judge.judge(&utterance, &candidate.text, &old_entities, candidate.distance)
            {
                candidate.reason = Some(reason);
                outcome.superseded.push(candidate);
            }
        }

        let queued_ids: HashSet<MemoryId> = queued.iter().map(|r| r.id).collect();
        let mut cancelled = 0u64;
        let victims: Vec<(MemoryId, Tier, SupersessionReason, &str)> = outcome
            .superseded
            .iter()
            .filter_map(|c| Some((c.record_id, c.source_tier, c.reason?, c.text.as_str())))
            .filter(|(id, tier, reason, text)| {
                let withdrawn = queued_ids.contains(id)
                    && self.pending.as_ref().is_some_and(|p| p.cancel(*id));
                if withdrawn {
                    cancelled += 1;
                    info!(%id, %tier, %reason, text, "queued memory superseded, commit cancelled");
                }
                !withdrawn
            })
            .collect();
        EngineCounters::add(&self.counters.records_superseded, cancelled);
        self.delete_all(&victims);
        debug!(
            entities = ?entities,
            superseded = outcome.superseded.len(),
            exact = outcome.exact_match.is_some(),
            "conflict scan finished"
        );
        outcome
    }

    /// Pairwise sweep over every stored record.
    ///
    /// Each record's nearest neighbours (within the sweep radius) are judged
    /// with the later record as the new side; the older side of every
    /// flagged pair is deleted. Blocking; returns the number deleted.
    pub fn resolve_all_semantic_conflicts(&self) -> usize {
        let judge = self.judge();
        let mut doomed: HashMap<MemoryId, (Tier, SupersessionReason, String)> = HashMap::new();

        for collection in self.collections.iter() {
            let rows = match collection.index.get_all() {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(tier = %collection.tier, error = %e, "sweep scan failed");
                    continue;
                }
            };
            'rows: for row in rows {
                if doomed.contains_key(&row.id) {
                    continue;
                }
                for other in self.collections.iter() {
                    let neighbours = match other.index.query(&row.text, self.config.sweep_neighbors) {
                        Ok(hits) => hits,
                        Err(e) => {
                            warn!(tier = %other.tier, error = %e, "sweep neighbour query failed");
                            continue;
                        }
                    };
                    for neighbour in neighbours {
                        if neighbour.id == row.id
                            || doomed.contains_key(&neighbour.id)
                            || neighbour.distance > self.config.sweep_max_distance
                        {
                            continue;
                        }
                        let row_is_newer = row.metadata.timestamp >= neighbour.metadata.timestamp;
                        let ((newer, _), (older, older_tier)) = if row_is_newer {
                            ((&row, collection.tier), (&neighbour, other.tier))
                        } else {
                            ((&neighbour, other.tier), (&row, collection.tier))
                        };
                        let utterance = Utterance::new(&self.analyzer, &newer.text);
                        let old_entities = self.entities_of(&older.text, &older.metadata);
                        if let Some(reason) =
                            judge.judge(&utterance, &older.text, &old_entities, neighbour.distance)
                        {
                            doomed.insert(older.id, (older_tier, reason, older.text.clone()));
                            if !row_is_newer {
                                continue 'rows;
                            }
                        }
                    }
                }
            }
        }

        let victims: Vec<(MemoryId, Tier, SupersessionReason, &str)> = doomed
            .iter()
            .map(|(id, (tier, reason, text))| (*id, *tier, *reason, text.as_str()))
            .collect();
        let removed = self.delete_all(&victims);
        info!(removed, "full contradiction sweep finished");
        removed
    }

    /// Delete every record within `max_distance` of `text` (up to `k` per
    /// tier). Blocking; returns the number deleted.
    pub fn purge_similar(&self, text: &str, k: usize, max_distance: f32) -> usize {
        let mut removed = 0;
        for collection in self.collections.iter() {
            let hits: Vec<IndexHit> = match collection.index.query(text, k) {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(tier = %collection.tier, error = %e, "purge query failed");
                    continue;
                }
            };
            let ids: Vec<MemoryId> = hits
                .iter()
                .filter(|h| h.distance < max_distance)
                .map(|h| h.id)
                .collect();
            if ids.is_empty() {
                continue;
            }
            match collection.index.delete(&ids) {
                Ok(n) => {
                    removed += n;
                    for hit in hits.iter().filter(|h| ids.contains(&h.id)) {
                        info!(id = %hit.id, tier = %collection.tier, text = %hit.text, "memory purged");
                    }
                }
                Err(e) => warn!(tier = %collection.tier, error = %e, "purge delete failed"),
            }
        }
        EngineCounters::add(&self.counters.records_superseded, removed as u64);
        removed
    }

    /// Entity names from metadata, recomputed from the text when missing.
    fn entities_of(&self, text: &str, metadata: &RecordMetadata) -> BTreeSet<String> {
        if metadata.entities.is_empty() {
            self.analyzer.extract_entities(text).into_keys().collect()
        } else {
            metadata.entities.iter().cloned().collect()
        }
    }

    fn delete_all(&self, victims: &[(MemoryId, Tier, SupersessionReason, &str)]) -> usize {
        let mut by_tier: HashMap<Tier, Vec<MemoryId>> = HashMap::new();
        for (id, tier, reason, text) in victims {
            info!(%id, %tier, %reason, text, "superseded memory deleted");
            by_tier.entry(*tier).or_default().push(*id);
        }
        let mut removed = 0;
        for (tier, ids) in by_tier {
            let Some(collection) = self.collections.iter().find(|c| c.tier == tier) else {
                continue;
            };
            match collection.index.delete(&ids) {
                Ok(n) => removed += n,
                Err(e) => warn!(%tier, error = %e, "delete of superseded memories failed"),
            }
        }
        EngineCounters::add(&self.counters.records_superseded, removed as u64);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::embedding::NgramEmbeddingProvider;
    use chrono::{Duration, Utc};

    struct Fixture {
        resolver: ConflictResolver,
        collections: Arc<[Collection]>,
        analyzer: Arc<TextAnalyzer>,
    }

    fn fixture() -> Fixture {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(NgramEmbeddingProvider::default());
        let collections: Arc<[Collection]> = Collection::in_memory_set(&provider).into();
        let analyzer = Arc::new(TextAnalyzer::from_config(&AnalyzerConfig::default()));
        let resolver = ConflictResolver::new(
            Arc::clone(&collections),
            Arc::clone(&analyzer),
            provider,
            ConflictConfig::default(),
            Arc::new(EngineCounters::new()),
        );
        Fixture {
            resolver,
            collections,
            analyzer,
        }
    }

    impl Fixture {
        fn put(&self, tier: Tier, text: &str, age_hours: i64) -> MemoryId {
            let id = MemoryId::new();
            let signals = self.analyzer.analyze(text);
            let at = Utc::now() - Duration::hours(age_hours);
            let meta = RecordMetadata {
                timestamp: at,
                last_access: at,
                importance: signals.importance,
                entities: signals.ranked_entities(),
                tier,
                ..RecordMetadata::default()
            };
            let collection = self
                .collections
                .iter()
                .find(|c| c.tier == tier)
                .expect("tier exists");
            collection.index.add(id, text, &meta).expect("add");
            id
        }

        fn total(&self) -> usize {
            self.collections
                .iter()
                .map(|c| c.index.count().expect("count"))
                .sum()
        }
    }

    #[test]
    fn locate_prefers_heavy_entities_from_user_words() {
        let fx = fixture();
        let located = fx.resolver.locate("用户: 周杰伦在上海开演唱会 AI: 北京也有");
        assert_eq!(located.first().map(String::as_str), Some("周杰伦"));
        assert!(!located.iter().any(|e| e == "北京"));
    }

    #[test]
    fn opposite_preference_deletes_old_record() {
        let fx = fixture();
        let old = fx.put(Tier::LongTerm, "我喜欢吃苹果", 2);
        let outcome = fx.resolver.resolve("我不喜欢吃苹果", &[]);
        assert_eq!(outcome.superseded.len(), 1);
        assert_eq!(outcome.superseded[0].record_id, old);
        assert_eq!(fx.total(), 0);
    }

    #[test]
    fn queued_record_is_cancelled_not_left_behind() {
        let fx = fixture();
        let pending = Arc::new(PendingCommits::default());
        let resolver = fx.resolver.clone().with_pending(Arc::clone(&pending));
        let signals = fx.analyzer.analyze("我喜欢吃苹果");
        let queued = MemoryRecord {
            id: MemoryId::new(),
            text: "我喜欢吃苹果".to_string(),
            meta: RecordMetadata {
                importance: signals.importance,
                entities: signals.ranked_entities(),
                tier: Tier::LongTerm,
                ..RecordMetadata::default()
            },
        };
        pending.reserve(&queued).expect("fresh text");

        let outcome = resolver.resolve("我不喜欢吃苹果", std::slice::from_ref(&queued));
        assert_eq!(outcome.superseded.len(), 1);
        assert_eq!(outcome.superseded[0].record_id, queued.id);
        assert!(pending.queued_before(u64::MAX).is_empty());
    }

    #[test]
    fn exact_text_is_reported_not_deleted() {
        let fx = fixture();
        let old = fx.put(Tier::Working, "我养了一只猫叫咪咪", 1);
        let outcome = fx.resolver.resolve("我养了一只猫叫咪咪", &[]);
        assert_eq!(outcome.exact_match, Some((old, Tier::Working)));
        assert!(outcome.superseded.is_empty());
        assert_eq!(fx.total(), 1);
    }

    #[test]
    fn unrelated_records_survive() {
        let fx = fixture();
        fx.put(Tier::LongTerm, "我住在北京", 3);
        fx.put(Tier::Emotional, "我今天特别开心", 3);
        let outcome = fx.resolver.resolve("我喜欢吃苹果", &[]);
        assert!(outcome.superseded.is_empty());
        assert_eq!(fx.total(), 2);
    }

    #[test]
    fn sweep_removes_the_older_side() {
        let fx = fixture();
        let older = fx.put(Tier::LongTerm, "我喜欢吃苹果", 48);
        let newer = fx.put(Tier::Emotional, "我不喜欢吃苹果", 1);
        let removed = fx.resolver.resolve_all_semantic_conflicts();
        assert_eq!(removed, 1);
        let survivors: Vec<MemoryId> = fx
            .collections
            .iter()
            .flat_map(|c| c.index.get_all().expect("get_all"))
            .map(|h| h.id)
            .collect();
        assert_eq!(survivors, vec![newer]);
        assert!(!survivors.contains(&older));
    }

    #[test]
    fn purge_similar_respects_radius() {
        let fx = fixture();
        fx.put(Tier::LongTerm, "我住在北京朝阳区", 5);
        fx.put(Tier::Working, "今天的晚饭很好吃", 5);
        let removed = fx.resolver.purge_similar("我住在北京", 10, 0.8);
        assert_eq!(removed, 1);
        assert_eq!(fx.total(), 1);
    }
}
