//! Text Analyzer: turns raw utterance text into structured signals.
//!
//! Every operation is total: empty or malformed input yields a neutral or
//! zero result, never an error. Lexicons are static; the only state is an
//! LRU cache of segmentation results for hot texts.

pub mod intent;
pub mod lexicon;
pub mod segment;

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock};

use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;

use chrono::{DateTime, Utc};

use crate::config::AnalyzerConfig;
use crate::index::MetadataRecovery;
use crate::memory::RecordMetadata;
use crate::types::{EmotionReading, EmotionType, Polarity, Tier};
use lexicon::{EMOTION_KEYWORDS, ENTITY_STOPWORDS, NEGATORS, entity_weight};
use segment::{LexiconSegmenter, Segmenter};

/// Symbols, emoji and invisible characters removed by [`clean_text`].
static NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{So}\p{Sk}\p{Cf}\p{Co}\u{FE0F}\u{200B}-\u{200D}]").expect("static regex")
});
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Weighted entity set: token → weight.
pub type Entities = BTreeMap<String, f32>;

/// A detected first-person preference.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceSignal {
    /// Category (`food`, `music`, ...), if one matched.
    pub category: Option<&'static str>,
    /// Like or dislike.
    pub polarity: Polarity,
    /// Noun objects of the preference.
    pub objects: Vec<String>,
}

/// Everything the analyzer derives from one utterance.
#[derive(Debug, Clone)]
pub struct Signals {
    /// Weighted entities of the whole utterance.
    pub entities: Entities,
    /// Emotion of the whole utterance.
    pub emotion: EmotionReading,
    /// Importance in `[0, 1]`.
    pub importance: f32,
    /// Preference carried by the user-authored portion.
    pub preference: Option<PreferenceSignal>,
}

impl Signals {
    /// Entity names ordered by weight (heaviest first), ties alphabetical.
    #[must_use]
    pub fn ranked_entities(&self) -> Vec<String> {
        rank_entities(&self.entities)
    }

    /// Metadata for a fresh record created at `at` in `tier`.
    #[must_use]
    pub fn into_metadata(self, at: DateTime<Utc>, tier: Tier) -> RecordMetadata {
        let entities = self.ranked_entities();
        let preference = self.preference;
        RecordMetadata {
            timestamp: at,
            last_access: at,
            access_count: 0,
            importance: self.importance,
            emotion_type: self.emotion.kind,
            emotion_intensity: self.emotion.intensity,
            entities,
            preference: preference.is_some(),
            preference_category: preference
                .as_ref()
                .and_then(|p| p.category.map(str::to_string)),
            preference_polarity: preference.as_ref().map(|p| p.polarity),
            preference_entities: preference.map(|p| p.objects).unwrap_or_default(),
            tier,
        }
    }
}

/// Entity names ordered by weight (heaviest first), ties alphabetical.
#[must_use]
pub fn rank_entities(entities: &Entities) -> Vec<String> {
    let mut ranked: Vec<(&String, &f32)> = entities.iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().map(|(name, _)| name.clone()).collect()
}

/// Stateless text analysis over a pluggable [`Segmenter`].
pub struct TextAnalyzer {
    segmenter: Arc<dyn Segmenter>,
    cache: Mutex<LruCache<String, Arc<Vec<(String, String)>>>>,
}

impl std::fmt::Debug for TextAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextAnalyzer")
            .field("segmenter", &self.segmenter.name())
            .finish_non_exhaustive()
    }
}

impl TextAnalyzer {
    /// Analyzer over `segmenter` with a cache of `cache_capacity` texts.
    #[must_use]
    pub fn new(segmenter: Arc<dyn Segmenter>, cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            segmenter,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Build the analyzer described by `config`.
    ///
    /// `use_jieba` falls back to the lexicon segmenter when the `jieba`
    /// feature is compiled out.
    #[must_use]
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        #[cfg(feature = "jieba")]
        if config.use_jieba {
            let seg = segment::JiebaSegmenter::with_custom_words(&config.custom_words);
            return Self::new(Arc::new(seg), config.cache_capacity);
        }
        #[cfg(not(feature = "jieba"))]
        if config.use_jieba {
            tracing::debug!("jieba not compiled in, using lexicon segmenter");
        }
        let seg = LexiconSegmenter::with_custom_words(&config.custom_words);
        Self::new(Arc::new(seg), config.cache_capacity)
    }

    /// Tagged tokens for `text`, served from the LRU cache when hot.
    pub fn tagged(&self, text: &str) -> Arc<Vec<(String, String)>> {
        if let Some(hit) = self.cache.lock().get(text) {
            return Arc::clone(hit);
        }
        let tokens = Arc::new(self.segmenter.segment_with_tags(text));
        self.cache.lock().put(text.to_string(), Arc::clone(&tokens));
        tokens
    }

    /// Weighted noun-like entities (at least two characters).
    ///
    /// A token seen under several tags keeps its highest weight.
    pub fn extract_entities(&self, text: &str) -> Entities {
        let mut entities = Entities::new();
        for (word, tag) in self.tagged(text).iter() {
            let Some(weight) = entity_weight(tag) else {
                continue;
            };
            if word.chars().count() < 2 || ENTITY_STOPWORDS.contains(&word.as_str()) {
                continue;
            }
            let slot = entities.entry(word.clone()).or_insert(weight);
            if weight > *slot {
                *slot = weight;
            }
        }
        entities
    }

    /// Unweighted noun tokens: any tag starting with `n`, at least two characters.
    pub fn extract_noun_entities(&self, text: &str) -> BTreeSet<String> {
        self.tagged(text)
            .iter()
            .filter(|(word, tag)| {
                tag.starts_with('n')
                    && word.chars().count() >= 2
                    && !ENTITY_STOPWORDS.contains(&word.as_str())
            })
            .map(|(word, _)| word.clone())
            .collect()
    }

    /// Run every analysis over one utterance.
    pub fn analyze(&self, text: &str) -> Signals {
        let entities = self.extract_entities(text);
        let emotion = analyze_emotion(text);
        let importance = calculate_importance(text, &entities, emotion);
        let preference = self.detect_preference(intent::user_input(text));
        Signals {
            entities,
            emotion,
            importance,
            preference,
        }
    }

    /// Preference carried by `user_text`, if it is a first-person statement.
    pub fn detect_preference(&self, user_text: &str) -> Option<PreferenceSignal> {
        if !intent::expresses_preference(user_text) {
            return None;
        }
        let polarity = intent::preference_polarity(user_text)?;
        Some(PreferenceSignal {
            category: intent::preference_category(user_text),
            polarity,
            objects: self.extract_noun_entities(user_text).into_iter().collect(),
        })
    }
}

impl MetadataRecovery for TextAnalyzer {
    fn recover(&self, text: &str, created_at: DateTime<Utc>, tier: Tier) -> RecordMetadata {
        self.analyze(text).into_metadata(created_at, tier)
    }
}

// ---------------------------------------------------------------------------
// Pure functions
// ---------------------------------------------------------------------------

/// Classify emotion by keyword buckets.
///
/// A keyword immediately preceded by a negator (不, 没, 别) does not count.
/// The bucket with the most hits wins, earlier buckets on ties; intensity is
/// the hit count capped at 5.
#[must_use]
pub fn analyze_emotion(text: &str) -> EmotionReading {
    let mut best: Option<(EmotionType, usize)> = None;
    for (kind, keywords) in EMOTION_KEYWORDS {
        let hits: usize = keywords
            .iter()
            .map(|kw| count_unnegated(text, kw))
            .sum();
        if hits > 0 && best.is_none_or(|(_, top)| hits > top) {
            best = Some((*kind, hits));
        }
    }
    match best {
        Some((kind, hits)) => EmotionReading {
            kind,
            intensity: u8::try_from(hits)
                .unwrap_or(u8::MAX)
                .min(EmotionReading::MAX_INTENSITY),
        },
        None => EmotionReading::neutral(),
    }
}

fn count_unnegated(text: &str, keyword: &str) -> usize {
    text.match_indices(keyword)
        .filter(|(at, _)| {
            !text[..*at]
                .chars()
                .next_back()
                .is_some_and(|prev| NEGATORS.contains(&prev))
        })
        .count()
}

/// Importance in `[0, 1]`.
///
/// `0.3` base, up to `+0.2` from average entity weight, `+0.08` per emotion
/// intensity point (non-neutral only), `+0.2` when flagged important and
/// `+0.1` for moderately long utterances (20 to 100 characters).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_importance(text: &str, entities: &Entities, emotion: EmotionReading) -> f32 {
    let mut score = 0.3_f32;
    if !entities.is_empty() {
        let avg = entities.values().sum::<f32>() / entities.len() as f32;
        score += (avg * 0.1).min(0.2);
    }
    if emotion.kind != EmotionType::Neutral {
        score += f32::from(emotion.intensity) * 0.08;
    }
    if emotion.kind == EmotionType::Important {
        score += 0.2;
    }
    if (20..=100).contains(&text.chars().count()) {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

/// Strip symbols, emoji and invisible characters; collapse whitespace; trim.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let stripped = NOISE.replace_all(text, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}
