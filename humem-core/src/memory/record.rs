//! Persisted memory records and their metadata.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EmotionType, MemoryId, Polarity, Tier};

/// Everything stored alongside a record's text.
///
/// Deserialization is lenient: every field has a default so rows written by
/// older builds, or partially corrupted rows, still load. Empty `entities`
/// signal that they must be recomputed from the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RecordMetadata {
    /// When the record was created. Never changes.
    pub timestamp: DateTime<Utc>,
    /// When the record was last retrieved. Never moves backwards.
    pub last_access: DateTime<Utc>,
    /// How many times the record was retrieved.
    pub access_count: u32,
    /// Importance in `[0, 1]`, fixed at creation.
    pub importance: f32,
    /// Emotion class of the utterance.
    pub emotion_type: EmotionType,
    /// Emotion keyword count, `0..=5`.
    pub emotion_intensity: u8,
    /// Noun-like entities, highest weight first.
    pub entities: Vec<String>,
    /// The user-authored part is a first-person preference statement.
    pub preference: bool,
    /// Preference category (`food`, `music`, ...), if any.
    pub preference_category: Option<String>,
    /// Preference direction, if any.
    pub preference_polarity: Option<Polarity>,
    /// Noun objects of the preference ("苹果" in "我喜欢吃苹果").
    pub preference_entities: Vec<String>,
    /// Tier the record was classified into.
    pub tier: Tier,
}

impl RecordMetadata {
    /// Record an access at `now`. `last_access` never decreases.
    pub fn touch(&mut self, now: DateTime<Utc>, times: u32) {
        self.access_count = self.access_count.saturating_add(times);
        if now > self.last_access {
            self.last_access = now;
        }
    }

    /// Hours elapsed since the last access (zero if the clock is behind).
    #[must_use]
    pub fn hours_since_access(&self, now: DateTime<Utc>) -> f64 {
        hours_between(self.last_access, now)
    }

    /// Hours elapsed since creation (zero if the clock is behind).
    #[must_use]
    pub fn hours_since_creation(&self, now: DateTime<Utc>) -> f64 {
        hours_between(self.timestamp, now)
    }

    /// The `(category, object)` key used to keep one record per preference.
    #[must_use]
    pub fn preference_key(&self) -> Option<(String, String)> {
        if !self.preference {
            return None;
        }
        let category = self.preference_category.clone()?;
        let object = self.preference_entities.first().cloned().unwrap_or_default();
        Some((category, object))
    }
}

#[allow(clippy::cast_precision_loss)]
fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds().max(0) as f64 / 3600.0
}

/// The unit of persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique id, stable for the record's lifetime.
    pub id: MemoryId,
    /// Cleaned utterance text.
    pub text: String,
    /// Analysis results and bookkeeping.
    pub meta: RecordMetadata,
}

impl MemoryRecord {
    /// The tier this record belongs to.
    #[must_use]
    pub fn tier(&self) -> Tier {
        self.meta.tier
    }
}

impl fmt::Display for MemoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.meta.tier, self.text)
    }
}

/// Why a stored record was superseded by a newer utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupersessionReason {
    /// Nearly the same utterance.
    Duplicate,
    /// The new utterance corrects the old one ("其实", "现在", ...).
    Update,
    /// Opposite preference about the same object.
    PreferenceContradiction,
    /// A newer preference in the same category replaces the old one.
    SameCategoryPreference,
}

impl fmt::Display for SupersessionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Duplicate => "duplicate",
            Self::Update => "update",
            Self::PreferenceContradiction => "preference contradiction",
            Self::SameCategoryPreference => "same-category preference",
        })
    }
}

/// A stored record judged against a new utterance. Never persisted.
#[derive(Debug, Clone)]
pub struct ConflictCandidate {
    /// The stored record's id.
    pub record_id: MemoryId,
    /// The stored record's text.
    pub text: String,
    /// Smallest distance observed between the record and the new utterance.
    pub distance: f32,
    /// The stored record's metadata.
    pub metadata: RecordMetadata,
    /// Tier the record was found in.
    pub source_tier: Tier,
    /// Verdict, once judged.
    pub reason: Option<SupersessionReason>,
}
