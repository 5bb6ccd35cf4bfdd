//! Integration Tests: End-to-End Memory Flows
//!
//! These tests drive the public `MemoryEngine` the way a chat loop would:
//! store → flush → retrieve, with conflicts, decay, persistence and a slow
//! tier thrown in.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, Utc};

use humem_core::clock::{Clock, ManualClock};
use humem_core::config::HumemConfig;
use humem_core::embedding::{EmbeddingProvider, NgramEmbeddingProvider};
use humem_core::error::Result;
use humem_core::index::{Collection, IndexHit, InMemoryIndex, MetadataFilter, SimilarityIndex};
use humem_core::memory::RecordMetadata;
use humem_core::types::{EmotionType, MemoryId, Polarity, Tier};
use humem_core::{MemoryEngine, SkipReason, StoreOutcome, Suppression};

struct Harness {
    engine: MemoryEngine,
    collections: Vec<Collection>,
    clock: Arc<ManualClock>,
}

fn provider() -> Arc<dyn EmbeddingProvider> {
    Arc::new(NgramEmbeddingProvider::default())
}

fn harness_with(config: HumemConfig, collections: Vec<Collection>) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = MemoryEngine::with_collections(
        config,
        collections.clone(),
        provider(),
        Arc::clone(&clock) as Arc<dyn Clock>,
    )
    .expect("inside a runtime");
    Harness {
        engine,
        collections,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(HumemConfig::default(), Collection::in_memory_set(&provider()))
}

impl Harness {
    fn texts(&self) -> Vec<String> {
        let mut texts: Vec<String> = self
            .collections
            .iter()
            .flat_map(|c| c.index.get_all().expect("scan"))
            .map(|hit| hit.text)
            .collect();
        texts.sort();
        texts
    }

    fn find(&self, id: MemoryId) -> Option<IndexHit> {
        self.collections
            .iter()
            .find_map(|c| c.index.get(id).expect("get"))
    }

    fn seed(&self, tier: Tier, text: &str, importance: f32, age: Duration) -> MemoryId {
        let then = self.clock.now() - age;
        let id = MemoryId::new();
        let meta = RecordMetadata {
            timestamp: then,
            last_access: then,
            importance,
            tier,
            ..RecordMetadata::default()
        };
        let collection = self
            .collections
            .iter()
            .find(|c| c.tier == tier)
            .expect("tier present");
        collection.index.add(id, text, &meta).expect("seed");
        id
    }
}

// ---------------------------------------------------------------------------
// Duplicate suppression
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeat_while_pending_is_suppressed() {
    let h = harness();
    let first = h.engine.store("我住在北京朝阳区").await;
    assert!(first.is_committed());
    let second = h.engine.store("我住在北京朝阳区").await;
    assert_eq!(second, StoreOutcome::Suppressed(Suppression::Pending));

    h.engine.flush().await;
    assert_eq!(h.texts(), vec!["我住在北京朝阳区".to_string()]);
}

#[tokio::test]
async fn repeat_after_commit_reinforces_existing_record() {
    let h = harness();
    let StoreOutcome::Committed { id, .. } = h.engine.store("我住在北京朝阳区").await else {
        panic!("first utterance should commit");
    };
    h.engine.flush().await;

    let second = h.engine.store("我住在北京朝阳区").await;
    assert_eq!(
        second,
        StoreOutcome::Suppressed(Suppression::Duplicate { existing: id })
    );

    h.engine.flush().await;
    assert_eq!(h.texts().len(), 1);
    let stored = h.find(id).expect("still stored");
    assert_eq!(stored.metadata.access_count, 1);
}

// ---------------------------------------------------------------------------
// Preference overrides
// ---------------------------------------------------------------------------

#[tokio::test]
async fn opposite_polarity_replaces_old_preference() {
    let h = harness();
    assert!(h.engine.store("我喜欢吃苹果").await.is_committed());
    h.engine.flush().await;

    let outcome = h.engine.store("我不喜欢吃苹果").await;
    assert!(
        matches!(outcome, StoreOutcome::Committed { superseded: 1, .. }),
        "got {outcome:?}"
    );
    h.engine.flush().await;

    assert_eq!(h.texts(), vec!["我不喜欢吃苹果".to_string()]);
    let food = h.engine.recall_preferences("food").await;
    assert_eq!(food.len(), 1);
    assert_eq!(food[0].meta.preference_polarity, Some(Polarity::Negative));
    let context = h.engine.retrieve("我喜欢吃苹果吗").await;
    assert!(context.contains("我不喜欢吃苹果"));
    assert!(!context.contains("\n我喜欢吃苹果"));
}

#[tokio::test]
async fn same_category_preference_replaces_old_one() {
    let h = harness();
    assert!(h.engine.store("我喜欢吃苹果").await.is_committed());
    h.engine.flush().await;
    h.clock.advance(Duration::minutes(5));
    assert!(h.engine.store("我现在喜欢吃香蕉").await.is_committed());
    h.engine.flush().await;

    let food: Vec<String> = h
        .engine
        .recall_preferences("food")
        .await
        .into_iter()
        .map(|r| r.text)
        .collect();
    assert_eq!(food, vec!["我现在喜欢吃香蕉".to_string()]);

    let context = h.engine.retrieve("你还记得我喜欢吃什么吗").await;
    assert!(context.contains("【相关记忆】"), "context was {context:?}");
    assert!(context.contains("我现在喜欢吃香蕉"));
    assert!(!context.contains("苹果"));
}

#[tokio::test]
async fn contradiction_of_a_queued_preference_cancels_it() {
    let h = harness();
    assert!(h.engine.store("我喜欢吃苹果").await.is_committed());
    let outcome = h.engine.store("我不喜欢吃苹果").await;
    assert!(
        matches!(outcome, StoreOutcome::Committed { superseded: 1, .. }),
        "got {outcome:?}"
    );
    h.engine.flush().await;

    assert_eq!(h.texts(), vec!["我不喜欢吃苹果".to_string()]);
    let food = h.engine.recall_preferences("food").await;
    assert_eq!(food.len(), 1);
    assert_eq!(food[0].meta.preference_polarity, Some(Polarity::Negative));
    assert_eq!(h.engine.stats().await.counters.records_superseded, 1);
}

#[tokio::test]
async fn back_to_back_category_change_keeps_latest() {
    let h = harness();
    assert!(h.engine.store("我喜欢吃苹果").await.is_committed());
    assert!(h.engine.store("我现在喜欢吃香蕉").await.is_committed());
    h.engine.flush().await;

    assert_eq!(h.texts(), vec!["我现在喜欢吃香蕉".to_string()]);
    let stats = h.engine.stats().await;
    assert_eq!(stats.store.total(), 1);
    assert_eq!(stats.store.pending_stores, 0);
}

// ---------------------------------------------------------------------------
// Review questions and short utterances
// ---------------------------------------------------------------------------

#[tokio::test]
async fn review_question_is_never_persisted() {
    let h = harness();
    let outcome = h.engine.store("你还记得我喜欢吃什么吗").await;
    assert_eq!(outcome, StoreOutcome::Skipped(SkipReason::ReviewQuestion));
    let outcome = h.engine.store("嗯好").await;
    assert_eq!(outcome, StoreOutcome::Skipped(SkipReason::TooShort));

    h.engine.flush().await;
    assert!(h.texts().is_empty());
    let stats = h.engine.stats().await;
    assert_eq!(stats.store.total(), 0);
    assert_eq!(stats.counters.utterances_skipped, 2);
}

// ---------------------------------------------------------------------------
// Decay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn decay_evicts_only_faded_unimportant_records() {
    let h = harness();
    let faded = h.seed(Tier::Working, "周末随便聊了聊天气", 0.2, Duration::days(60));
    let guarded = h.seed(Tier::Working, "我的护照号码要记住", 0.9, Duration::days(60));
    let emotional = h.seed(Tier::Emotional, "那天我哭得很伤心", 0.1, Duration::days(60));

    let report = h.engine.maintain().await;
    assert_eq!(report.evicted, 1);
    assert_eq!(report.superseded, 0);

    assert!(h.find(faded).is_none());
    assert!(h.find(guarded).is_some());
    assert!(h.find(emotional).is_some());
}

#[tokio::test]
async fn fresh_records_survive_maintenance() {
    let h = harness();
    h.seed(Tier::Working, "周末随便聊了聊天气", 0.2, Duration::hours(1));
    let report = h.engine.maintain().await;
    assert_eq!(report.evicted, 0);
    assert_eq!(h.texts().len(), 1);
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retrieval_bumps_access_count() {
    let h = harness();
    let StoreOutcome::Committed { id, .. } = h.engine.store("我住在北京朝阳区").await else {
        panic!("should commit");
    };
    h.engine.flush().await;

    let ranked = h.engine.recall("我住在北京", 3).await;
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].record.id, id);
    assert!(ranked[0].breakdown.relevance > 0.0);

    h.engine.flush().await;
    assert_eq!(h.find(id).expect("stored").metadata.access_count, 1);
}

#[tokio::test]
async fn context_joins_dialogue_and_memories() {
    let h = harness();
    h.engine.ingest("用户", "你好");
    h.engine.ingest("AI", "你好呀");
    assert!(h.engine.store("我住在北京朝阳区").await.is_committed());
    h.engine.flush().await;

    let context = h.engine.retrieve("我住在北京").await;
    assert_eq!(
        context,
        "【最近对话】\n用户: 你好\nAI: 你好呀\n\n【相关记忆】\n我住在北京朝阳区"
    );

    let nothing = h.engine.retrieve("明天下雨吗").await;
    assert_eq!(nothing, "用户: 你好\nAI: 你好呀");
}

/// Delegates to an in-memory index but takes far too long to answer queries.
struct SlowIndex {
    inner: InMemoryIndex,
    delay: StdDuration,
}

impl SimilarityIndex for SlowIndex {
    fn add(&self, id: MemoryId, text: &str, metadata: &RecordMetadata) -> Result<()> {
        self.inner.add(id, text, metadata)
    }

    fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>> {
        std::thread::sleep(self.delay);
        self.inner.query(text, k)
    }

    fn query_by_metadata(&self, filter: &MetadataFilter, limit: usize) -> Result<Vec<IndexHit>> {
        self.inner.query_by_metadata(filter, limit)
    }

    fn get(&self, id: MemoryId) -> Result<Option<IndexHit>> {
        self.inner.get(id)
    }

    fn update_metadata(&self, id: MemoryId, metadata: &RecordMetadata) -> Result<()> {
        self.inner.update_metadata(id, metadata)
    }

    fn delete(&self, ids: &[MemoryId]) -> Result<usize> {
        self.inner.delete(ids)
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_tier_degrades_to_partial_results() {
    let mut config = HumemConfig::default();
    config.retrieval.timeout_ms = 200;
    let slow: Arc<dyn SimilarityIndex> = Arc::new(SlowIndex {
        inner: InMemoryIndex::new(provider()),
        delay: StdDuration::from_millis(1500),
    });
    let long_term: Arc<dyn SimilarityIndex> = Arc::new(InMemoryIndex::new(provider()));
    let working: Arc<dyn SimilarityIndex> = Arc::new(InMemoryIndex::new(provider()));
    let collections = vec![
        Collection::new(Tier::Emotional, slow),
        Collection::new(Tier::LongTerm, long_term),
        Collection::new(Tier::Working, working),
    ];
    let h = harness_with(config, collections);
    h.seed(Tier::LongTerm, "我住在北京朝阳区", 0.5, Duration::hours(1));

    let started = Instant::now();
    let ranked = h.engine.recall("我住在北京", 3).await;
    let elapsed = started.elapsed();

    assert!(elapsed < StdDuration::from_secs(1), "took {elapsed:?}");
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].record.text, "我住在北京朝阳区");
    assert!(h.engine.stats().await.counters.fanout_timeouts >= 1);
}

// ---------------------------------------------------------------------------
// Corrections and topic clearing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn force_update_replaces_matching_records() {
    let h = harness();
    assert!(h.engine.store("我住在北京朝阳区").await.is_committed());
    h.engine.flush().await;

    assert!(h.engine.force_update("我住在北京", "我住在上海浦东").await);
    h.engine.flush().await;

    let texts = h.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("我住在上海浦东"));
}

#[tokio::test]
async fn clear_about_removes_only_the_topic() {
    let h = harness();
    assert!(h.engine.store("我养了一只叫小白的猫").await.is_committed());
    assert!(h.engine.store("我住在北京朝阳区").await.is_committed());
    h.engine.flush().await;

    assert_eq!(h.engine.clear_about("小白的猫").await, 1);
    assert_eq!(h.texts(), vec!["我住在北京朝阳区".to_string()]);
}

// ---------------------------------------------------------------------------
// Emotion state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn current_emotion_tracks_last_charged_utterance() {
    let h = harness();
    assert_eq!(h.engine.current_emotion().kind, EmotionType::Neutral);
    h.engine.store("今天真的好开心啊").await;
    assert_eq!(h.engine.current_emotion().kind, EmotionType::Positive);
    h.engine.store("我住在北京朝阳区").await;
    assert_eq!(h.engine.current_emotion().kind, EmotionType::Positive);
}

// ---------------------------------------------------------------------------
// Persistence and shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_drains_queue_into_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = HumemConfig::default();
    config.store.db_path = dir.path().join("humem.db");

    let engine = MemoryEngine::open(config.clone());
    assert!(engine.is_enabled());
    for text in ["我住在北京朝阳区", "我的生日是十月五号", "我养了一只叫小白的猫"] {
        assert!(engine.store(text).await.is_committed());
    }
    let summary = engine.shutdown().await;
    assert_eq!(summary.total, 3);
    assert_eq!(summary.highlights.len(), 3);

    let reopened = MemoryEngine::open(config);
    assert!(reopened.is_enabled());
    assert_eq!(reopened.stats().await.store.total(), 3);
    let ranked = reopened.recall("我住在北京", 3).await;
    assert_eq!(ranked[0].record.text, "我住在北京朝阳区");
    reopened.shutdown().await;
}

#[tokio::test]
async fn unreadable_metadata_is_recovered_not_evicted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = HumemConfig::default();
    config.store.db_path = dir.path().join("humem.db");

    let engine = MemoryEngine::open(config.clone());
    let StoreOutcome::Committed { id, .. } = engine.store("我下个月要搬家到深圳南山区工作").await
    else {
        panic!("should commit");
    };
    engine.flush().await;

    rusqlite::Connection::open(&config.store.db_path)
        .expect("open db")
        .execute("UPDATE memories SET metadata = '{not json'", [])
        .expect("corrupt metadata");

    let report = engine.maintain().await;
    assert_eq!(report.evicted, 0);
    assert_eq!(engine.stats().await.store.total(), 1);

    let summary = engine.summarize().await;
    assert_eq!(summary.total, 1);
    let record = &summary.highlights[0];
    assert_eq!(record.id, id);
    assert!(record.meta.importance >= 0.3);
    assert!(record.meta.entities.contains(&"深圳".to_string()));
    engine.shutdown().await;
}

// ---------------------------------------------------------------------------
// Disabled engine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unavailable_store_disables_engine() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = HumemConfig::default();
    config.store.db_path = dir.path().join("missing").join("humem.db");

    let engine = MemoryEngine::open(config);
    assert!(!engine.is_enabled());
    assert_eq!(engine.store("我住在北京朝阳区").await, StoreOutcome::Disabled);

    engine.ingest("用户", "你好");
    assert_eq!(engine.retrieve("我住在哪里").await, "用户: 你好");
    assert!(engine.recall("我住在哪里", 3).await.is_empty());
    assert!(engine.recall_preferences("food").await.is_empty());
    assert_eq!(engine.maintain().await.evicted, 0);
    assert_eq!(engine.clear_about("北京").await, 0);
    assert!(!engine.force_update("北京", "上海").await);
    assert!(!engine.stats().await.enabled);
}

#[tokio::test]
async fn disabled_by_configuration() {
    let mut config = HumemConfig::default();
    config.general.enabled = false;
    let engine = MemoryEngine::open(config);
    assert!(!engine.is_enabled());
    assert_eq!(engine.shutdown().await.total, 0);
}
