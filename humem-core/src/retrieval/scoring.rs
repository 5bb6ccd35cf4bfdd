//! Per-factor scoring for retrieved memories.
//!
//! Score = w₁·Strength + w₂·Recency + w₃·Relevance + PreferenceBonus + ReviewBonus
//!
//! Where:
//!   Strength   = forgetting-curve strength at query time (see `decay`)
//!   Recency    = 1 / (1 + hours_since_creation / 24)
//!   Relevance  = 1 - distance
//!   PreferenceBonus applies to preference records
//!   ReviewBonus applies, on review questions, to the newest preference
//!   record of each category

use chrono::{DateTime, Utc};

use super::ScoreBreakdown;
use crate::config::RetrievalConfig;
use crate::decay;
use crate::index::IndexHit;

/// Compute the weighted score breakdown for one hit.
#[must_use]
pub fn compute_breakdown(
    hit: &IndexHit,
    now: DateTime<Utc>,
    config: &RetrievalConfig,
    forgetting_rate: f64,
    newest_in_category_on_review: bool,
) -> ScoreBreakdown {
    let meta = &hit.metadata;
    let strength = config.w_strength * decay::memory_strength(meta, now, forgetting_rate);
    let recency = config.w_recency * decay::recency(meta, now);
    let relevance = config.w_relevance * (1.0 - f64::from(hit.distance)).clamp(0.0, 1.0);
    let preference = if meta.preference {
        config.preference_bonus
    } else {
        0.0
    };
    let review = if meta.preference && newest_in_category_on_review {
        config.review_bonus
    } else {
        0.0
    };

    ScoreBreakdown {
        strength,
        recency,
        relevance,
        preference,
        review,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordMetadata;
    use crate::types::MemoryId;
    use chrono::Duration;

    fn hit(distance: f32, age_hours: i64, preference: bool, now: DateTime<Utc>) -> IndexHit {
        let at = now - Duration::hours(age_hours);
        IndexHit {
            id: MemoryId::new(),
            text: String::new(),
            distance,
            metadata: RecordMetadata {
                timestamp: at,
                last_access: at,
                importance: 0.6,
                preference,
                ..RecordMetadata::default()
            },
        }
    }

    #[test]
    fn closer_and_newer_scores_higher() {
        let now = Utc::now();
        let config = RetrievalConfig::default();
        let near = compute_breakdown(&hit(0.1, 1, false, now), now, &config, 0.1, false);
        let far = compute_breakdown(&hit(0.5, 72, false, now), now, &config, 0.1, false);
        assert!(near.total() > far.total());
    }

    #[test]
    fn review_bonus_needs_a_preference() {
        let now = Utc::now();
        let config = RetrievalConfig::default();
        let plain = compute_breakdown(&hit(0.3, 1, false, now), now, &config, 0.1, true);
        let pref = compute_breakdown(&hit(0.3, 1, true, now), now, &config, 0.1, true);
        assert!(plain.review.abs() < f64::EPSILON);
        assert!((pref.preference - 0.1).abs() < f64::EPSILON);
        assert!((pref.review - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn fresh_record_breakdown_matches_weights() {
        let now = Utc::now();
        let config = RetrievalConfig::default();
        let b = compute_breakdown(&hit(0.0, 0, false, now), now, &config, 0.1, false);
        assert!((b.strength - 0.45 * 0.6).abs() < 1e-6);
        assert!((b.recency - 0.25).abs() < 1e-9);
        assert!((b.relevance - 0.2).abs() < 1e-9);
    }
}
