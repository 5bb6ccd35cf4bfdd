//! Configuration for the humem memory engine.
//!
//! Maps directly to `humem.toml`. Every field has a default, so an empty file
//! (or no file at all) yields a working engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level humem configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HumemConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Short-term buffer, decay and summary settings.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Tokenizer and lexicon settings.
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    /// Persistent store and background queue settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Conflict detection thresholds.
    #[serde(default)]
    pub conflict: ConflictConfig,
    /// Retrieval fan-out and ranking settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl HumemConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `HumemError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::HumemError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether the memory engine is enabled. A disabled engine answers every
    /// call with a neutral result.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines instead of the compact human format.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Short-term buffer, decay and daily-summary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Ring buffer size for recent conversational turns.
    #[serde(default = "default_10")]
    pub short_term_capacity: usize,
    /// Exponential forgetting rate per day since last access.
    #[serde(default = "default_forgetting_rate")]
    pub forgetting_rate: f64,
    /// Records weaker than this are eviction candidates.
    #[serde(default = "default_0_1")]
    pub eviction_strength_floor: f64,
    /// Records at least this important are never evicted.
    #[serde(default = "default_0_5_f32")]
    pub eviction_importance_guard: f32,
    /// Utterances shorter than this (in characters, after cleaning) are not stored.
    #[serde(default = "default_5")]
    pub min_utterance_chars: usize,
    /// Window covered by the daily summary, in hours.
    #[serde(default = "default_24")]
    pub summary_window_hours: i64,
    /// Number of records listed in the daily summary.
    #[serde(default = "default_5")]
    pub summary_top_n: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_capacity: 10,
            forgetting_rate: 0.1,
            eviction_strength_floor: 0.1,
            eviction_importance_guard: 0.5,
            min_utterance_chars: 5,
            summary_window_hours: 24,
            summary_top_n: 5,
        }
    }
}

/// A user-supplied lexicon entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomWord {
    /// The word itself.
    pub word: String,
    /// Part-of-speech tag (`n`, `nr`, `ns`, `nt`, `nz`, `v`, ...).
    #[serde(default = "default_noun_tag")]
    pub tag: String,
}

/// Tokenizer and lexicon settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Extra words added to the built-in lexicon (names, pets, places...).
    #[serde(default)]
    pub custom_words: Vec<CustomWord>,
    /// Number of segmented texts kept in the analyzer's LRU cache.
    #[serde(default = "default_256")]
    pub cache_capacity: usize,
    /// Use the `jieba` segmenter (compiled in by default). `false` selects
    /// the built-in lexicon segmenter.
    #[serde(default = "default_true")]
    pub use_jieba: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            custom_words: Vec::new(),
            cache_capacity: 256,
            use_jieba: true,
        }
    }
}

/// Persistent store and background queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file holding all three tiers.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Enable WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Dimensionality of the n-gram embedding.
    #[serde(default = "default_512")]
    pub embedding_dimensions: usize,
    /// Bounded capacity of the store queue.
    #[serde(default = "default_1024")]
    pub store_queue_capacity: usize,
    /// Bounded capacity of the access-update queue.
    #[serde(default = "default_1024")]
    pub update_queue_capacity: usize,
    /// Flush access updates once this many are batched.
    #[serde(default = "default_10")]
    pub update_batch_size: usize,
    /// Flush access updates at least this often, in milliseconds.
    #[serde(default = "default_1000")]
    pub update_flush_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            wal_mode: true,
            embedding_dimensions: 512,
            store_queue_capacity: 1024,
            update_queue_capacity: 1024,
            update_batch_size: 10,
            update_flush_interval_ms: 1000,
        }
    }
}

/// Conflict detection thresholds. Distances are cosine distances in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Number of highest-weight entities used to locate candidates.
    #[serde(default = "default_3")]
    pub locate_top_n: usize,
    /// Results requested per tier per locate query.
    #[serde(default = "default_5")]
    pub candidates_per_query: usize,
    /// Below this distance two utterances are duplicates.
    #[serde(default = "default_duplicate")]
    pub duplicate_distance: f32,
    /// Below this distance an utterance with an update marker supersedes.
    #[serde(default = "default_update")]
    pub update_distance: f32,
    /// Below this distance opposite-polarity preferences contradict.
    #[serde(default = "default_0_5_f32")]
    pub preference_distance: f32,
    /// Neighbours examined per record during the full sweep.
    #[serde(default = "default_5")]
    pub sweep_neighbors: usize,
    /// Neighbours farther than this are ignored by the full sweep.
    #[serde(default = "default_0_7")]
    pub sweep_max_distance: f32,
    /// Radius used by `force_update` to find the facts being corrected.
    #[serde(default = "default_0_8")]
    pub force_update_distance: f32,
    /// Radius used by `clear_about`.
    #[serde(default = "default_0_7")]
    pub clear_about_distance: f32,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            locate_top_n: 3,
            candidates_per_query: 5,
            duplicate_distance: 0.15,
            update_distance: 0.4,
            preference_distance: 0.5,
            sweep_neighbors: 5,
            sweep_max_distance: 0.7,
            force_update_distance: 0.8,
            clear_about_distance: 0.7,
        }
    }
}

/// Retrieval fan-out and ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of memories placed in the composed context.
    #[serde(default = "default_3")]
    pub top_k: usize,
    /// Results requested per similarity query.
    #[serde(default = "default_5")]
    pub per_query_k: usize,
    /// Deadline for the whole fan-out, in milliseconds.
    #[serde(default = "default_2000")]
    pub timeout_ms: u64,
    /// Concurrent blocking index queries.
    #[serde(default = "default_10")]
    pub fanout_workers: usize,
    /// Hits at or beyond this distance are dropped.
    #[serde(default = "default_0_6")]
    pub similarity_threshold: f32,
    /// Character-set overlap above which two texts count as the same memory.
    #[serde(default = "default_0_6")]
    pub text_overlap_threshold: f32,
    /// Weight of memory strength.
    #[serde(default = "default_0_45")]
    pub w_strength: f64,
    /// Weight of recency.
    #[serde(default = "default_0_25")]
    pub w_recency: f64,
    /// Weight of relevance (1 - distance).
    #[serde(default = "default_0_2")]
    pub w_relevance: f64,
    /// Bonus for preference records.
    #[serde(default = "default_0_1")]
    pub preference_bonus: f64,
    /// Extra bonus for the newest record of a category on review questions.
    #[serde(default = "default_0_15")]
    pub review_bonus: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            per_query_k: 5,
            timeout_ms: 2000,
            fanout_workers: 10,
            similarity_threshold: 0.6,
            text_overlap_threshold: 0.6,
            w_strength: 0.45,
            w_recency: 0.25,
            w_relevance: 0.2,
            preference_bonus: 0.1,
            review_bonus: 0.15,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value helpers (serde requires functions)
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_noun_tag() -> String {
    "n".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("humem.db")
}
fn default_3() -> usize {
    3
}
fn default_5() -> usize {
    5
}
fn default_10() -> usize {
    10
}
fn default_24() -> i64 {
    24
}
fn default_256() -> usize {
    256
}
fn default_512() -> usize {
    512
}
fn default_1024() -> usize {
    1024
}
fn default_1000() -> u64 {
    1000
}
fn default_2000() -> u64 {
    2000
}
fn default_forgetting_rate() -> f64 {
    0.1
}
fn default_0_1() -> f64 {
    0.1
}
fn default_0_15() -> f64 {
    0.15
}
fn default_0_2() -> f64 {
    0.2
}
fn default_0_25() -> f64 {
    0.25
}
fn default_0_45() -> f64 {
    0.45
}
fn default_0_5_f32() -> f32 {
    0.5
}
fn default_0_6() -> f32 {
    0.6
}
fn default_0_7() -> f32 {
    0.7
}
fn default_0_8() -> f32 {
    0.8
}
fn default_duplicate() -> f32 {
    0.15
}
fn default_update() -> f32 {
    0.4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = HumemConfig::from_toml("").expect("empty config parses");
        assert!(config.general.enabled);
        assert_eq!(config.memory.short_term_capacity, 10);
        assert_eq!(config.retrieval.timeout_ms, 2000);
        assert!((config.conflict.duplicate_distance - 0.15).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let toml = r#"
            [retrieval]
            top_k = 7

            [[analyzer.custom_words]]
            word = "咪咪"
            tag = "nr"

            [[analyzer.custom_words]]
            word = "团子"
        "#;
        let config = HumemConfig::from_toml(toml).expect("config parses");
        assert_eq!(config.retrieval.top_k, 7);
        assert_eq!(config.retrieval.fanout_workers, 10);
        assert_eq!(config.analyzer.custom_words.len(), 2);
        assert_eq!(config.analyzer.custom_words[1].tag, "n");
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = HumemConfig::from_toml("retrieval = [").expect_err("must fail");
        assert!(matches!(err, crate::HumemError::Config(_)));
    }
}
