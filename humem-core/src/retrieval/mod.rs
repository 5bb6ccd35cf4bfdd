//! Retrieval Engine: parallel fan-out, filter, dedup, score, compose.
//!
//! Every tier is queried concurrently on the blocking pool (bounded by a
//! semaphore) under one deadline. Tiers that miss the deadline are left
//! behind and their results discarded, so a slow tier degrades recall but
//! never stalls the caller. Review questions ("do you remember what I
//! like?") add canned preference probes, because the question itself is
//! usually far from the statements it asks about.

pub mod dedup;
pub mod scoring;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::analyzer::lexicon::{CATEGORY_PREFERENCE_PROBES, GENERIC_PREFERENCE_PROBES};
use crate::analyzer::{TextAnalyzer, intent};
use crate::clock::Clock;
use crate::config::{ConflictConfig, MemoryConfig, RetrievalConfig};
use crate::conflict::Judge;
use crate::error::HumemError;
use crate::index::{Collection, IndexHit, MetadataFilter};
use crate::memory::MemoryRecord;
use crate::metrics::EngineCounters;
use crate::tiered::TieredStore;
use crate::types::{MemoryId, RetrievalScore, Tier};

/// Header of the recent-dialogue block in a composed context.
pub const RECENT_DIALOGUE_HEADER: &str = "【最近对话】";
/// Header of the related-memories block in a composed context.
pub const RELATED_MEMORIES_HEADER: &str = "【相关记忆】";

/// A hit tagged with the tier it came from.
#[derive(Debug, Clone)]
pub struct TieredHit {
    /// Originating tier.
    pub tier: Tier,
    /// The hit itself.
    pub hit: IndexHit,
}

/// A scored retrieval result.
#[derive(Debug, Clone)]
pub struct RankedMemory {
    /// The retrieved record.
    pub record: MemoryRecord,
    /// Tier it was found in.
    pub tier: Tier,
    /// Distance to the closest query that found it.
    pub distance: f32,
    /// Combined score.
    pub score: RetrievalScore,
    /// Per-factor breakdown.
    pub breakdown: ScoreBreakdown,
}

/// Breakdown of a retrieval score into its weighted factors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreBreakdown {
    /// Memory strength contribution.
    pub strength: f64,
    /// Recency contribution.
    pub recency: f64,
    /// Relevance contribution.
    pub relevance: f64,
    /// Preference bonus.
    pub preference: f64,
    /// Review-question bonus.
    pub review: f64,
}

impl ScoreBreakdown {
    /// Sum of all factors.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.strength + self.recency + self.relevance + self.preference + self.review
    }
}

/// Finds, ranks and formats memories relevant to a query.
pub struct RetrievalEngine {
    store: Arc<TieredStore>,
    analyzer: Arc<TextAnalyzer>,
    config: RetrievalConfig,
    conflict: ConflictConfig,
    memory: MemoryConfig,
    clock: Arc<dyn Clock>,
    counters: Arc<EngineCounters>,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetrievalEngine {
    /// Engine over `store`'s collections.
    #[must_use]
    pub fn new(
        store: Arc<TieredStore>,
        analyzer: Arc<TextAnalyzer>,
        config: RetrievalConfig,
        conflict: ConflictConfig,
        memory: MemoryConfig,
        clock: Arc<dyn Clock>,
        counters: Arc<EngineCounters>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.fanout_workers.max(1)));
        Self {
            store,
            analyzer,
            config,
            conflict,
            memory,
            clock,
            counters,
            permits,
        }
    }

    /// Ranked memories for `query`, best first, at most `k`.
    ///
    /// Schedules an access bump for every returned record.
    pub async fn recall(&self, query: &str, k: usize) -> Vec<RankedMemory> {
        EngineCounters::inc(&self.counters.retrievals);
        let review = intent::is_review_question(query);

        let jobs = self.plan(query, review);
        let hits = self.fan_out(jobs).await;
        let relevant = self.filter(hits);

        let judge = Judge::new(&self.analyzer, &self.conflict);
        let survivors = dedup::dedup(relevant, &judge, self.config.text_overlap_threshold);
        let ranked = self.rank(survivors, review, k);

        for memory in &ranked {
            self.store.update_access(memory.record.id, memory.tier);
        }
        debug!(
            review,
            returned = ranked.len(),
            "retrieval finished"
        );
        ranked
    }

    /// Compose the context string for a downstream language-model call.
    ///
    /// With no surviving memories the short-term context is returned alone.
    pub async fn retrieve(&self, query: &str, short_term_context: &str, k: usize) -> String {
        let ranked = self.recall(query, k).await;
        compose(short_term_context, &ranked)
    }

    /// Live preference records of `category`, deduplicated, newest first.
    pub async fn recall_category(&self, category: &str) -> Vec<MemoryRecord> {
        let collections: Vec<Collection> = self.store.get_collections().to_vec();
        let filter = MetadataFilter::PreferenceCategory(category.to_string());
        let found = tokio::task::spawn_blocking(move || {
            let mut hits = Vec::new();
            for collection in collections {
                match collection.index.query_by_metadata(&filter, usize::MAX) {
                    Ok(found) => hits.extend(found.into_iter().map(|hit| TieredHit {
                        tier: collection.tier,
                        hit,
                    })),
                    Err(e) => warn!(tier = %collection.tier, error = %e, "category scan failed"),
                }
            }
            hits
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "category scan task failed");
            Vec::new()
        });

        let judge = Judge::new(&self.analyzer, &self.conflict);
        dedup::dedup(found, &judge, self.config.text_overlap_threshold)
            .into_iter()
            .map(|t| t.hit.into_record())
            .collect()
    }

    /// One query per tier, plus preference probes for review questions.
    fn plan(&self, query: &str, review: bool) -> Vec<(Collection, String)> {
        let mut texts = vec![query.to_string()];
        if review {
            texts.extend(GENERIC_PREFERENCE_PROBES.iter().map(|p| (*p).to_string()));
            if let Some(category) = intent::preference_category(query) {
                if let Some((_, probes)) =
                    CATEGORY_PREFERENCE_PROBES.iter().find(|(c, _)| *c == category)
                {
                    texts.extend(probes.iter().map(|p| (*p).to_string()));
                }
            }
        }
        self.store
            .get_collections()
            .iter()
            .flat_map(|c| texts.iter().map(move |t| (c.clone(), t.clone())))
            .collect()
    }

    /// Run every job on the blocking pool under a single deadline.
    async fn fan_out(&self, jobs: Vec<(Collection, String)>) -> Vec<TieredHit> {
        let k = self.config.per_query_k;
        let mut set = JoinSet::new();
        for (collection, text) in jobs {
            let permits = Arc::clone(&self.permits);
            set.spawn(async move {
                let tier = collection.tier;
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (tier, Err(HumemError::Worker("fan-out pool closed".into())));
                };
                let result =
                    tokio::task::spawn_blocking(move || collection.index.query(&text, k)).await;
                (tier, result.map_err(HumemError::from).and_then(|r| r))
            });
        }

        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.timeout_ms);
        let mut hits = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((tier, Ok(found))))) => {
                    hits.extend(found.into_iter().map(|hit| TieredHit { tier, hit }));
                }
                Ok(Some(Ok((tier, Err(e))))) => {
                    warn!(%tier, error = %e, "tier query failed, skipping");
                }
                Ok(Some(Err(e))) => warn!(error = %e, "tier query task failed, skipping"),
                Ok(None) => break,
                Err(_) => {
                    let abandoned = set.len();
                    EngineCounters::add(&self.counters.fanout_timeouts, abandoned as u64);
                    warn!(
                        abandoned,
                        timeout_ms = self.config.timeout_ms,
                        "retrieval deadline reached, using partial results"
                    );
                    set.detach_all();
                    break;
                }
            }
        }
        hits
    }

    /// Drop distant hits and merge repeats of the same record, keeping the
    /// smallest distance.
    fn filter(&self, hits: Vec<TieredHit>) -> Vec<TieredHit> {
        let mut best: HashMap<MemoryId, TieredHit> = HashMap::new();
        for tiered in hits {
            if tiered.hit.distance >= self.config.similarity_threshold {
                continue;
            }
            match best.get_mut(&tiered.hit.id) {
                Some(existing) if existing.hit.distance <= tiered.hit.distance => {}
                Some(existing) => *existing = tiered,
                None => {
                    best.insert(tiered.hit.id, tiered);
                }
            }
        }
        best.into_values().collect()
    }

    fn rank(&self, survivors: Vec<TieredHit>, review: bool, k: usize) -> Vec<RankedMemory> {
        let now = self.clock.now();

        let mut newest_per_category: HashMap<&str, (chrono::DateTime<chrono::Utc>, MemoryId)> =
            HashMap::new();
        if review {
            for t in &survivors {
                let meta = &t.hit.metadata;
                let (true, Some(category)) = (meta.preference, meta.preference_category.as_deref())
                else {
                    continue;
                };
                let entry = newest_per_category
                    .entry(category)
                    .or_insert((meta.timestamp, t.hit.id));
                if meta.timestamp > entry.0 {
                    *entry = (meta.timestamp, t.hit.id);
                }
            }
        }

        let mut ranked: Vec<RankedMemory> = survivors
            .iter()
            .map(|t| {
                let newest = newest_per_category.values().any(|(_, id)| *id == t.hit.id);
                let breakdown = scoring::compute_breakdown(
                    &t.hit,
                    now,
                    &self.config,
                    self.memory.forgetting_rate,
                    newest,
                );
                RankedMemory {
                    record: t.hit.clone().into_record(),
                    tier: t.tier,
                    distance: t.hit.distance,
                    score: RetrievalScore::from(breakdown.total()),
                    breakdown,
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked.truncate(k);
        ranked
    }
}

/// Join the short-term context and the memory texts into one block.
#[must_use]
pub fn compose(short_term_context: &str, memories: &[RankedMemory]) -> String {
    if memories.is_empty() {
        return short_term_context.to_string();
    }
    let mut sections = Vec::with_capacity(2);
    if !short_term_context.is_empty() {
        sections.push(format!("{RECENT_DIALOGUE_HEADER}\n{short_term_context}"));
    }
    let texts: Vec<&str> = memories.iter().map(|m| m.record.text.as_str()).collect();
    sections.push(format!("{RELATED_MEMORIES_HEADER}\n{}", texts.join("\n")));
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordMetadata;

    fn ranked(text: &str) -> RankedMemory {
        RankedMemory {
            record: MemoryRecord {
                id: MemoryId::new(),
                text: text.to_string(),
                meta: RecordMetadata::default(),
            },
            tier: Tier::LongTerm,
            distance: 0.2,
            score: RetrievalScore::from(0.5),
            breakdown: ScoreBreakdown::default(),
        }
    }

    #[test]
    fn compose_without_memories_returns_short_term_only() {
        assert_eq!(compose("用户: 你好", &[]), "用户: 你好");
        assert_eq!(compose("", &[]), "");
    }

    #[test]
    fn compose_with_memories_has_both_sections() {
        let out = compose("用户: 你好", &[ranked("我住在北京"), ranked("我喜欢猫")]);
        assert_eq!(
            out,
            "【最近对话】\n用户: 你好\n\n【相关记忆】\n我住在北京\n我喜欢猫"
        );
    }

    #[test]
    fn compose_skips_empty_short_term() {
        let out = compose("", &[ranked("我住在北京")]);
        assert_eq!(out, "【相关记忆】\n我住在北京");
    }
}
