//! Memory Orchestrator: the public face of the engine.
//!
//! [`MemoryEngine`] owns the short-term buffer, the current-emotion state,
//! the analyzer, the tiered store, the conflict resolver and the retrieval
//! engine. Storage failures never reach the caller. An engine whose store
//! could not be opened runs disabled and answers every call neutrally.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::analyzer::{TextAnalyzer, clean_text, intent};
use crate::clock::{Clock, SystemClock};
use crate::config::HumemConfig;
use crate::conflict::{ConflictOutcome, ConflictResolver};
use crate::embedding::{EmbeddingProvider, NgramEmbeddingProvider};
use crate::error::Result;
use crate::index::{
    Collection, IndexHit, MetadataFilter, MetadataRecovery, SimilarityIndex, SqliteIndex,
};
use crate::memory::{MemoryRecord, ShortTermBuffer, ShortTermEntry};
use crate::metrics::{CounterSnapshot, EngineCounters};
use crate::retrieval::{RankedMemory, RetrievalEngine};
use crate::tiered::{StoreStats, TieredStore, classify_tier};
use crate::types::{EmotionReading, EmotionType, MemoryId, Tier};

/// Prefix of the utterance stored by [`MemoryEngine::force_update`].
pub const CORRECTION_PREFIX: &str = "用户更正: ";

/// Records considered per tier when purging for a forced update.
const FORCE_UPDATE_K: usize = 10;
/// Records considered per tier when clearing a topic.
const CLEAR_ABOUT_K: usize = 20;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why an utterance was not considered for storage at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Shorter than the minimum length after cleaning.
    TooShort,
    /// Asks the assistant to recall something; never persisted.
    ReviewQuestion,
}

/// Why an utterance was recognised as a repeat and not committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// An identical text is already waiting in the store queue.
    Pending,
    /// An identical text is already stored.
    Duplicate {
        /// The stored record, which received an access bump instead.
        existing: MemoryId,
    },
}

/// Result of [`MemoryEngine::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Enqueued for commit.
    Committed {
        /// Id of the new record.
        id: MemoryId,
        /// Tier it was classified into.
        tier: Tier,
        /// Records deleted because this one supersedes them.
        superseded: usize,
    },
    /// Not a storable utterance.
    Skipped(SkipReason),
    /// A repeat of something already stored or pending.
    Suppressed(Suppression),
    /// The store queue is gone; the record was dropped and logged.
    Dropped,
    /// The engine is disabled.
    Disabled,
}

impl StoreOutcome {
    /// Whether a new record was enqueued.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Counts from one [`MemoryEngine::maintain`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Faded records evicted.
    pub evicted: usize,
    /// Records removed by the full contradiction sweep.
    pub superseded: usize,
}

/// The most important memories of a trailing window.
#[derive(Debug, Clone)]
pub struct DailySummary {
    /// Start of the window.
    pub since: DateTime<Utc>,
    /// Records created inside the window, across all tiers.
    pub total: usize,
    /// Highest-importance records of the window, most important first.
    pub highlights: Vec<MemoryRecord>,
}

impl fmt::Display for DailySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "【今日摘要】共 {} 条新记忆", self.total)?;
        for (rank, record) in self.highlights.iter().enumerate() {
            write!(
                f,
                "\n{}. [{}] {} (重要度 {:.2})",
                rank + 1,
                record.tier(),
                record.text,
                record.meta.importance
            )?;
        }
        Ok(())
    }
}

/// Snapshot returned by [`MemoryEngine::stats`].
#[derive(Debug, Clone)]
pub struct MemoryStats {
    /// Whether the engine has a working store.
    pub enabled: bool,
    /// Per-tier counts and queue depths.
    pub store: StoreStats,
    /// Turns currently in the short-term buffer.
    pub short_term_len: usize,
    /// Short-term buffer capacity.
    pub short_term_capacity: usize,
    /// Most recent non-neutral emotion.
    pub current_emotion: EmotionReading,
    /// Event counters.
    pub counters: CounterSnapshot,
}

// ---------------------------------------------------------------------------
// MemoryEngine
// ---------------------------------------------------------------------------

struct Backend {
    store: Arc<TieredStore>,
    resolver: ConflictResolver,
    retrieval: RetrievalEngine,
}

/// Human-like conversational memory.
pub struct MemoryEngine {
    config: HumemConfig,
    analyzer: Arc<TextAnalyzer>,
    clock: Arc<dyn Clock>,
    counters: Arc<EngineCounters>,
    short_term: Mutex<ShortTermBuffer>,
    emotion: Mutex<EmotionReading>,
    backend: Option<Backend>,
}

impl fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("enabled", &self.backend.is_some())
            .field("short_term", &self.short_term.lock().len())
            .finish_non_exhaustive()
    }
}

impl MemoryEngine {
    /// Open the engine over the SQLite database named in `config`.
    ///
    /// Must be called inside a tokio runtime. Any failure to open the store
    /// is logged once and yields a disabled engine.
    #[must_use]
    pub fn open(config: HumemConfig) -> Self {
        if !config.general.enabled {
            info!("memory engine disabled by configuration");
            return Self::disabled(config);
        }
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(NgramEmbeddingProvider::new(
            config.store.embedding_dimensions,
        ));
        let analyzer = Arc::new(TextAnalyzer::from_config(&config.analyzer));
        let recovery: Arc<dyn MetadataRecovery> = Arc::clone(&analyzer) as _;
        let collections = match SqliteIndex::open_all(
            &config.store.db_path,
            &provider,
            config.store.wal_mode,
        ) {
            Ok(indexes) => indexes
                .into_iter()
                .map(|index| {
                    let tier = index.tier();
                    let index: Arc<dyn SimilarityIndex> =
                        Arc::new(index.with_recovery(Arc::clone(&recovery)));
                    Collection::new(tier, index)
                })
                .collect(),
            Err(e) => {
                error!(
                    path = %config.store.db_path.display(),
                    error = %e,
                    "memory store unavailable, engine disabled"
                );
                return Self::disabled(config);
            }
        };
        match Self::assemble(
            config.clone(),
            collections,
            provider,
            Arc::new(SystemClock),
            analyzer,
        ) {
            Ok(engine) => engine,
            Err(e) => {
                error!(error = %e, "memory engine failed to start, engine disabled");
                Self::disabled(config)
            }
        }
    }

    /// Build an engine over caller-supplied collections.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HumemError::NoRuntime`] outside a tokio runtime.
    pub fn with_collections(
        config: HumemConfig,
        collections: Vec<Collection>,
        provider: Arc<dyn EmbeddingProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let analyzer = Arc::new(TextAnalyzer::from_config(&config.analyzer));
        Self::assemble(config, collections, provider, clock, analyzer)
    }

    fn assemble(
        config: HumemConfig,
        collections: Vec<Collection>,
        provider: Arc<dyn EmbeddingProvider>,
        clock: Arc<dyn Clock>,
        analyzer: Arc<TextAnalyzer>,
    ) -> Result<Self> {
        let counters = Arc::new(EngineCounters::new());
        let store = Arc::new(TieredStore::start(
            collections,
            &config.store,
            config.memory.clone(),
            Arc::clone(&clock),
            Arc::clone(&counters),
        )?);
        let resolver = ConflictResolver::new(
            store.shared_collections(),
            Arc::clone(&analyzer),
            provider,
            config.conflict.clone(),
            Arc::clone(&counters),
        )
        .with_pending(store.pending());
        let retrieval = RetrievalEngine::new(
            Arc::clone(&store),
            Arc::clone(&analyzer),
            config.retrieval.clone(),
            config.conflict.clone(),
            config.memory.clone(),
            Arc::clone(&clock),
            Arc::clone(&counters),
        );
        info!(
            segmenter = ?analyzer,
            short_term = config.memory.short_term_capacity,
            "memory engine ready"
        );
        Ok(Self {
            short_term: Mutex::new(ShortTermBuffer::new(config.memory.short_term_capacity)),
            emotion: Mutex::new(EmotionReading::neutral()),
            backend: Some(Backend {
                store,
                resolver,
                retrieval,
            }),
            analyzer,
            clock,
            counters,
            config,
        })
    }

    /// An engine with no store. The short-term buffer still works; every
    /// persistent operation returns a neutral result.
    #[must_use]
    pub fn disabled(config: HumemConfig) -> Self {
        Self {
            analyzer: Arc::new(TextAnalyzer::from_config(&config.analyzer)),
            clock: Arc::new(SystemClock),
            counters: Arc::new(EngineCounters::new()),
            short_term: Mutex::new(ShortTermBuffer::new(config.memory.short_term_capacity)),
            emotion: Mutex::new(EmotionReading::neutral()),
            backend: None,
            config,
        }
    }

    /// Whether the engine has a working store.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// The analyzer shared by every component.
    #[must_use]
    pub fn analyzer(&self) -> &TextAnalyzer {
        &self.analyzer
    }

    // -- short-term ---------------------------------------------------------

    /// Append a conversational turn to the short-term buffer.
    pub fn ingest(&self, role: &str, text: &str) {
        self.short_term.lock().push(ShortTermEntry {
            role: role.to_string(),
            content: text.to_string(),
            timestamp: self.clock.now(),
        });
    }

    /// The short-term buffer rendered as `role: content` lines.
    #[must_use]
    pub fn short_term_context(&self) -> String {
        self.short_term.lock().render()
    }

    /// Most recent non-neutral emotion seen in a stored utterance.
    #[must_use]
    pub fn current_emotion(&self) -> EmotionReading {
        *self.emotion.lock()
    }

    // -- store --------------------------------------------------------------

    /// Analyze an utterance, resolve what it supersedes, and enqueue it.
    pub async fn store(&self, utterance: &str) -> StoreOutcome {
        let Some(backend) = &self.backend else {
            return StoreOutcome::Disabled;
        };

        let text = clean_text(utterance);
        if text.chars().count() < self.config.memory.min_utterance_chars {
            EngineCounters::inc(&self.counters.utterances_skipped);
            debug!(chars = text.chars().count(), "utterance too short, not stored");
            return StoreOutcome::Skipped(SkipReason::TooShort);
        }
        if intent::is_review_question(intent::user_input(&text)) {
            EngineCounters::inc(&self.counters.utterances_skipped);
            debug!(text = %text, "review question, not stored");
            return StoreOutcome::Skipped(SkipReason::ReviewQuestion);
        }

        let signals = self.analyzer.analyze(&text);
        if signals.emotion.kind != EmotionType::Neutral {
            *self.emotion.lock() = signals.emotion;
        }

        let tier = classify_tier(signals.importance, signals.emotion.intensity, signals.emotion.kind);
        let record = MemoryRecord {
            id: MemoryId::new(),
            text,
            meta: signals.into_metadata(self.clock.now(), tier),
        };

        let Some(ticket) = backend.store.reserve(&record) else {
            EngineCounters::inc(&self.counters.utterances_skipped);
            debug!(text = %record.text, "identical utterance already pending");
            return StoreOutcome::Suppressed(Suppression::Pending);
        };

        let queued = backend.store.pending().queued_before(ticket);
        let resolver = backend.resolver.clone();
        let scan_text = record.text.clone();
        let outcome = tokio::task::spawn_blocking(move || resolver.resolve(&scan_text, &queued))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "conflict scan task failed, storing without it");
                ConflictOutcome::default()
            });

        if let Some((existing, existing_tier)) = outcome.exact_match {
            backend.store.release(&record.text);
            backend.store.update_access(existing, existing_tier);
            EngineCounters::inc(&self.counters.utterances_skipped);
            info!(%existing, tier = %existing_tier, "exact repeat, existing memory reinforced");
            return StoreOutcome::Suppressed(Suppression::Duplicate { existing });
        }

        let id = record.id;
        debug!(
            %id,
            %tier,
            importance = record.meta.importance,
            emotion = %record.meta.emotion_type,
            preference = record.meta.preference,
            "memory classified"
        );

        match backend.store.store(record).await {
            Ok(()) => StoreOutcome::Committed {
                id,
                tier,
                superseded: outcome.superseded.len(),
            },
            Err(e) => {
                EngineCounters::inc(&self.counters.write_failures);
                warn!(%id, error = %e, "memory dropped");
                StoreOutcome::Dropped
            }
        }
    }

    // -- retrieval ----------------------------------------------------------

    /// Context string for `query`: recent dialogue plus the top memories.
    pub async fn retrieve(&self, query: &str) -> String {
        self.retrieve_with(query, self.config.retrieval.top_k).await
    }

    /// [`MemoryEngine::retrieve`] with an explicit result count.
    pub async fn retrieve_with(&self, query: &str, k: usize) -> String {
        let short_term = self.short_term_context();
        match &self.backend {
            Some(backend) => backend.retrieval.retrieve(query, &short_term, k).await,
            None => short_term,
        }
    }

    /// Ranked memories for `query` with per-factor scores.
    pub async fn recall(&self, query: &str, k: usize) -> Vec<RankedMemory> {
        match &self.backend {
            Some(backend) => backend.retrieval.recall(query, k).await,
            None => Vec::new(),
        }
    }

    /// Live preference records of `category` (`food`, `music`, ...), newest
    /// first.
    pub async fn recall_preferences(&self, category: &str) -> Vec<MemoryRecord> {
        match &self.backend {
            Some(backend) => backend.retrieval.recall_category(category).await,
            None => Vec::new(),
        }
    }

    // -- maintenance --------------------------------------------------------

    /// Evict faded records, then sweep every tier for contradictions.
    pub async fn maintain(&self) -> MaintenanceReport {
        let Some(backend) = &self.backend else {
            return MaintenanceReport::default();
        };
        backend.store.flush().await;
        let store = Arc::clone(&backend.store);
        let resolver = backend.resolver.clone();
        let report = tokio::task::spawn_blocking(move || MaintenanceReport {
            evicted: store.cleanup(),
            superseded: resolver.resolve_all_semantic_conflicts(),
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "maintenance task failed");
            MaintenanceReport::default()
        });
        info!(
            evicted = report.evicted,
            superseded = report.superseded,
            "maintenance finished"
        );
        report
    }

    /// The most important records of the trailing summary window.
    pub async fn summarize(&self) -> DailySummary {
        let since = self.clock.now() - Duration::hours(self.config.memory.summary_window_hours);
        let Some(backend) = &self.backend else {
            return DailySummary {
                since,
                total: 0,
                highlights: Vec::new(),
            };
        };
        let collections = backend.store.shared_collections();
        let mut recent = tokio::task::spawn_blocking(move || {
            let filter = MetadataFilter::CreatedSince(since);
            let mut recent = Vec::new();
            for collection in collections.iter() {
                match collection.index.query_by_metadata(&filter, usize::MAX) {
                    Ok(rows) => recent.extend(rows.into_iter().map(IndexHit::into_record)),
                    Err(e) => warn!(tier = %collection.tier, error = %e, "summary scan failed"),
                }
            }
            recent
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "summary task failed");
            Vec::new()
        });

        let total = recent.len();
        recent.sort_by(|a, b| b.meta.importance.total_cmp(&a.meta.importance));
        recent.truncate(self.config.memory.summary_top_n);
        let summary = DailySummary {
            since,
            total,
            highlights: recent,
        };
        info!(total, highlights = summary.highlights.len(), "daily summary\n{summary}");
        summary
    }

    /// Delete everything close to `old_info`, then store the correction.
    ///
    /// Returns whether the correction was committed.
    pub async fn force_update(&self, old_info: &str, new_info: &str) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        let resolver = backend.resolver.clone();
        let old = old_info.to_string();
        let radius = self.config.conflict.force_update_distance;
        let purged = tokio::task::spawn_blocking(move || {
            resolver.purge_similar(&old, FORCE_UPDATE_K, radius)
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "purge task failed");
            0
        });
        info!(purged, old = old_info, new = new_info, "forced update");
        self.store(&format!("{CORRECTION_PREFIX}{new_info}"))
            .await
            .is_committed()
    }

    /// Delete every record close to `keyword`. Returns how many went.
    pub async fn clear_about(&self, keyword: &str) -> usize {
        let Some(backend) = &self.backend else {
            return 0;
        };
        let resolver = backend.resolver.clone();
        let topic = keyword.to_string();
        let radius = self.config.conflict.clear_about_distance;
        let cleared = tokio::task::spawn_blocking(move || {
            resolver.purge_similar(&topic, CLEAR_ABOUT_K, radius)
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "purge task failed");
            0
        });
        info!(cleared, keyword, "memories cleared");
        cleared
    }

    /// Wait until every queued commit and access bump has been applied.
    pub async fn flush(&self) {
        if let Some(backend) = &self.backend {
            backend.store.flush().await;
        }
    }

    /// Tier counts, queue depths, short-term fill, emotion and counters.
    pub async fn stats(&self) -> MemoryStats {
        let store = match &self.backend {
            Some(backend) => {
                let store = Arc::clone(&backend.store);
                tokio::task::spawn_blocking(move || store.stats())
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "stats task failed");
                        StoreStats::default()
                    })
            }
            None => StoreStats::default(),
        };
        let short_term = self.short_term.lock();
        MemoryStats {
            enabled: self.is_enabled(),
            store,
            short_term_len: short_term.len(),
            short_term_capacity: short_term.capacity(),
            current_emotion: self.current_emotion(),
            counters: self.counters.snapshot(),
        }
    }

    /// Summarize, then drain both queues and stop the workers.
    ///
    /// Every utterance whose `store` returned before this call is committed.
    pub async fn shutdown(self) -> DailySummary {
        self.flush().await;
        let summary = self.summarize().await;
        if let Some(backend) = &self.backend {
            backend.store.shutdown().await;
        }
        info!(counters = ?self.counters.snapshot(), "memory engine stopped");
        summary
    }
}
