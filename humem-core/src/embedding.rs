//! Vector embedding abstraction layer.
//!
//! Provides a trait-based interface for turning text into vectors used by the
//! similarity indexes. The default provider hashes character unigrams and
//! bigrams into a fixed number of buckets, which is deterministic across
//! processes (the hash is FNV-1a, not the randomly seeded std hasher) and so
//! safe to persist. Any sentence-embedding model can be plugged in instead.

use crate::error::{HumemError, Result};
use crate::types::Embedding;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Generate vector embeddings from text.
///
/// Implementations must be `Send + Sync` for use from blocking worker threads.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    ///
    /// Returns a vector of `dimensions()` floats.
    ///
    /// # Errors
    ///
    /// Returns [`HumemError::Serialization`] if the model fails to produce an
    /// embedding.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A human-readable name for the model.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Similarity
// ---------------------------------------------------------------------------

/// Compute the cosine similarity between two embedding vectors.
///
/// Returns a value in \[-1.0, 1.0\]. Returns `0.0` if the vectors differ in
/// length or either has zero magnitude.
#[must_use]
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.0.len() != b.0.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut mag_a = 0.0_f32;
    let mut mag_b = 0.0_f32;

    for (x, y) in a.0.iter().zip(b.0.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance `1 - cos`, in `[0, 2]`. Zero vectors are maximally far (1.0).
#[must_use]
pub fn cosine_distance(a: &Embedding, b: &Embedding) -> f32 {
    (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0)
}

// ---------------------------------------------------------------------------
// Character n-gram provider
// ---------------------------------------------------------------------------

/// Hashed character unigram + bigram embeddings, L2-normalised.
///
/// Whitespace is ignored. Two texts sharing most of their characters and
/// character pairs land close together, which is what duplicate and
/// contradiction detection on short utterances needs.
#[derive(Debug, Clone)]
pub struct NgramEmbeddingProvider {
    dims: usize,
}

impl NgramEmbeddingProvider {
    /// Create a provider with the given number of buckets (at least 1).
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dims: dimensions.max(1),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn bucket(&self, feature: &str) -> usize {
        (fnv1a(feature.as_bytes()) % self.dims as u64) as usize
    }
}

impl Default for NgramEmbeddingProvider {
    fn default() -> Self {
        Self::new(512)
    }
}

impl EmbeddingProvider for NgramEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        let mut vector = vec![0.0_f32; self.dims];
        let mut buf = [0u8; 8];

        for c in &chars {
            vector[self.bucket(c.encode_utf8(&mut buf))] += 1.0;
        }
        for pair in chars.windows(2) {
            let feature: String = pair.iter().collect();
            vector[self.bucket(&feature)] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(HumemError::Serialization(format!(
                "non-finite embedding for text of {} chars",
                chars.len()
            )));
        }
        Ok(Embedding(vector))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "char-ngram-fnv"
    }
}

/// 64-bit FNV-1a.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embed(text: &str) -> Embedding {
        NgramEmbeddingProvider::default()
            .embed(text)
            .expect("embedding never fails for finite input")
    }

    #[test]
    fn identical_texts_have_zero_distance() {
        let d = cosine_distance(&embed("我喜欢吃苹果"), &embed("我喜欢吃苹果"));
        assert!(d < 1e-5);
    }

    #[test]
    fn negation_stays_close_but_not_duplicate() {
        let d = cosine_distance(&embed("我喜欢吃苹果"), &embed("我不喜欢吃苹果"));
        assert!(d > 0.1 && d < 0.3, "distance was {d}");
    }

    #[test]
    fn unrelated_texts_are_far() {
        let d = cosine_distance(&embed("我喜欢吃苹果"), &embed("明天北京下雨"));
        assert!(d > 0.9, "distance was {d}");
    }

    #[test]
    fn whitespace_is_ignored() {
        let d = cosine_distance(&embed("我 喜欢 猫"), &embed("我喜欢猫"));
        assert!(d < 1e-5);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = embed("");
        assert!(e.0.iter().all(|v| *v == 0.0));
        assert!((cosine_distance(&e, &embed("猫")) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths() {
        let a = Embedding(vec![1.0, 2.0]);
        let b = Embedding(vec![1.0, 2.0, 3.0]);
        assert!(cosine_similarity(&a, &b).abs() < f32::EPSILON);
    }

    #[test]
    fn fnv_is_stable() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
