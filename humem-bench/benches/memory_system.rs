//! humem Benchmark Suite
//!
//! Targets:
//!   analyzer_analyze_utterance ........ < 50μs
//!   conflict_scan_200_records ......... < 5ms
//!   retrieval_recall_top3_from_200 .... < 10ms

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use humem_core::analyzer::TextAnalyzer;
use humem_core::clock::SystemClock;
use humem_core::config::{AnalyzerConfig, ConflictConfig, HumemConfig};
use humem_core::conflict::ConflictResolver;
use humem_core::embedding::{EmbeddingProvider, NgramEmbeddingProvider};
use humem_core::index::Collection;
use humem_core::memory::RecordMetadata;
use humem_core::metrics::EngineCounters;
use humem_core::tiered::classify_tier;
use humem_core::types::{MemoryId, Tier};
use humem_core::MemoryEngine;

const SUBJECTS: [&str; 8] = ["北京", "上海", "苹果", "香蕉", "音乐", "电影", "小猫", "游戏"];

fn make_text(i: usize) -> String {
    format!("第{i}次聊天时我提到了{}和{}", SUBJECTS[i % 8], SUBJECTS[(i / 8) % 8])
}

fn populated_collections(provider: &Arc<dyn EmbeddingProvider>, n: usize) -> Vec<Collection> {
    let collections = Collection::in_memory_set(provider);
    for i in 0..n {
        let tier = Tier::ALL[i % Tier::ALL.len()];
        let meta = RecordMetadata {
            importance: 0.4,
            tier,
            ..RecordMetadata::default()
        };
        if let Some(c) = collections.iter().find(|c| c.tier == tier) {
            c.index
                .add(MemoryId::new(), &make_text(i), &meta)
                .expect("in-memory add");
        }
    }
    collections
}

/// Benchmark: full analysis of one utterance (target: < 50μs).
fn bench_analyze(c: &mut Criterion) {
    let analyzer = TextAnalyzer::from_config(&AnalyzerConfig::default());
    let mut i = 0usize;
    c.bench_function("analyzer_analyze_utterance", |b| {
        b.iter(|| {
            // Vary the text so the token cache does not hide segmentation cost.
            i += 1;
            let text = format!("我真的很喜欢吃北京的烤鸭，第{i}次说了");
            black_box(analyzer.analyze(black_box(&text)));
        });
    });
}

/// Benchmark: tier classification.
fn bench_classify(c: &mut Criterion) {
    let analyzer = TextAnalyzer::from_config(&AnalyzerConfig::default());
    let signals = analyzer.analyze("这件事很重要，一定要记住我的生日");
    c.bench_function("classify_tier", |b| {
        b.iter(|| {
            black_box(classify_tier(
                black_box(signals.importance),
                signals.emotion.intensity,
                signals.emotion.kind,
            ))
        });
    });
}

/// Benchmark: conflict scan against 200 stored records (target: < 5ms).
fn bench_conflict_scan(c: &mut Criterion) {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(NgramEmbeddingProvider::default());
    let collections = populated_collections(&provider, 200);
    let resolver = ConflictResolver::new(
        collections.into(),
        Arc::new(TextAnalyzer::from_config(&AnalyzerConfig::default())),
        provider,
        ConflictConfig::default(),
        Arc::new(EngineCounters::new()),
    );
    c.bench_function("conflict_scan_200_records", |b| {
        b.iter(|| {
            black_box(resolver.retrieve(black_box("我现在住在上海"), &["上海".to_string()]));
        });
    });
}

/// Benchmark: retrieval top-3 from 200 records (target: < 10ms).
fn bench_recall(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(NgramEmbeddingProvider::default());
    let collections = populated_collections(&provider, 200);
    let engine = rt.block_on(async {
        MemoryEngine::with_collections(
            HumemConfig::default(),
            collections,
            provider,
            Arc::new(SystemClock),
        )
        .expect("inside a runtime")
    });

    c.bench_function("retrieval_recall_top3_from_200", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(engine.recall(black_box("我提到了北京和音乐"), 3).await);
            });
        });
    });

    rt.block_on(engine.shutdown());
}

criterion_group!(
    benches,
    bench_analyze,
    bench_classify,
    bench_conflict_scan,
    bench_recall,
);
criterion_main!(benches);
