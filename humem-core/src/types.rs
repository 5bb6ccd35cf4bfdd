//! Core type definitions shared across the humem crate.

use std::fmt;
use std::str::FromStr;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a single persisted memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random memory ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// The persistent collection a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Important, durable facts.
    LongTerm,
    /// Emotionally charged or flagged-important utterances. Never evicted.
    Emotional,
    /// Low-importance chatter that fades quickly.
    #[default]
    Working,
}

impl Tier {
    /// All tiers in query order (emotional first).
    pub const ALL: [Tier; 3] = [Tier::Emotional, Tier::LongTerm, Tier::Working];

    /// Stable name used for storage keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LongTerm => "long_term",
            Self::Emotional => "emotional",
            Self::Working => "working",
        }
    }

    /// Whether the decay sweep may evict records from this tier.
    #[must_use]
    pub const fn is_evictable(self) -> bool {
        !matches!(self, Self::Emotional)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long_term" => Ok(Self::LongTerm),
            "emotional" => Ok(Self::Emotional),
            "working" => Ok(Self::Working),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Emotion
// ---------------------------------------------------------------------------

/// Coarse emotion class detected in an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionType {
    /// No emotional keywords.
    #[default]
    Neutral,
    /// Happiness, affection, gratitude.
    Positive,
    /// Sadness, dislike, worry.
    Negative,
    /// Anger and irritation.
    Angry,
    /// The speaker flagged the content as something to remember.
    Important,
}

impl EmotionType {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Angry => "angry",
            Self::Important => "important",
        }
    }
}

impl fmt::Display for EmotionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An emotion classification with its keyword-count intensity (0..=5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmotionReading {
    /// Dominant emotion class.
    pub kind: EmotionType,
    /// Number of matching keywords, capped at [`EmotionReading::MAX_INTENSITY`].
    pub intensity: u8,
}

impl EmotionReading {
    /// Upper bound on intensity.
    pub const MAX_INTENSITY: u8 = 5;

    /// The neutral reading `(neutral, 0)`.
    #[must_use]
    pub const fn neutral() -> Self {
        Self {
            kind: EmotionType::Neutral,
            intensity: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// Direction of a first-person preference statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// "I like X".
    Positive,
    /// "I don't like X".
    Negative,
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        })
    }
}

// ---------------------------------------------------------------------------
// Embeddings & scores
// ---------------------------------------------------------------------------

/// A dense vector embedding for similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Encode as little-endian `f32` bytes for blob storage.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Decode from little-endian `f32` bytes. Trailing partial chunks are ignored.
    #[must_use]
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        Self(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }
}

/// Total-ordered retrieval score used for ranking.
pub type RetrievalScore = OrderedFloat<f64>;
