//! Forgetting curve: memory strength decay.
//!
//! Retention follows the Ebbinghaus curve `R = e^(-t/S)` where `t` is days
//! since the record was last accessed and the stability `S` is the inverse of
//! the configured forgetting rate. Rehearsal (retrieval) boosts strength
//! logarithmically:
//!
//! ```text
//! strength = importance × R × (1 + ln(1 + access_count) × 0.3),  clamped to [0, 1]
//! ```
//!
//! This is the only decay model; ranking and eviction both use it.

use chrono::{DateTime, Utc};

use crate::memory::RecordMetadata;

/// Weight of the rehearsal boost.
const REHEARSAL_FACTOR: f64 = 0.3;

/// Core Ebbinghaus forgetting curve: R = e^(-t/S).
///
/// # Arguments
/// * `delta_days`: Days since last access.
/// * `stability`: Stability S (higher = slower decay).
#[must_use]
pub fn ebbinghaus(delta_days: f64, stability: f64) -> f64 {
    if stability <= 0.0 {
        return 0.0;
    }
    (-delta_days.max(0.0) / stability).exp()
}

/// Current strength of a record in `[0, 1]`.
#[must_use]
pub fn memory_strength(meta: &RecordMetadata, now: DateTime<Utc>, forgetting_rate: f64) -> f64 {
    let stability = if forgetting_rate > 0.0 {
        1.0 / forgetting_rate
    } else {
        f64::INFINITY
    };
    let retention = ebbinghaus(meta.hours_since_access(now) / 24.0, stability);
    let rehearsal = 1.0 + (1.0 + f64::from(meta.access_count)).ln() * REHEARSAL_FACTOR;
    (f64::from(meta.importance) * retention * rehearsal).clamp(0.0, 1.0)
}

/// Recency of creation: `1 / (1 + hours / 24)`, in `(0, 1]`.
#[must_use]
pub fn recency(meta: &RecordMetadata, now: DateTime<Utc>) -> f64 {
    1.0 / (1.0 + meta.hours_since_creation(now) / 24.0)
}

/// Whether the decay sweep should evict a record.
///
/// Both conditions must hold: the record has faded below `strength_floor`
/// and was never important enough to be protected by `importance_guard`.
#[must_use]
pub fn should_evict(
    meta: &RecordMetadata,
    now: DateTime<Utc>,
    forgetting_rate: f64,
    strength_floor: f64,
    importance_guard: f32,
) -> bool {
    meta.importance < importance_guard
        && memory_strength(meta, now, forgetting_rate) < strength_floor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn meta(importance: f32, idle_days: i64, access_count: u32, now: DateTime<Utc>) -> RecordMetadata {
        RecordMetadata {
            timestamp: now - Duration::days(idle_days),
            last_access: now - Duration::days(idle_days),
            access_count,
            importance,
            ..RecordMetadata::default()
        }
    }

    #[test]
    fn ebbinghaus_at_zero_is_one() {
        assert!((ebbinghaus(0.0, 10.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ebbinghaus_decreases_over_time() {
        assert!(ebbinghaus(1.0, 10.0) > ebbinghaus(5.0, 10.0));
        assert!(ebbinghaus(5.0, 10.0) > ebbinghaus(50.0, 10.0));
    }

    #[test]
    fn fresh_record_keeps_its_importance() {
        let now = Utc::now();
        let s = memory_strength(&meta(0.6, 0, 0, now), now, 0.1);
        assert!((s - 0.6).abs() < 1e-6);
    }

    #[test]
    fn rehearsal_slows_forgetting() {
        let now = Utc::now();
        let cold = memory_strength(&meta(0.4, 10, 0, now), now, 0.1);
        let warm = memory_strength(&meta(0.4, 10, 8, now), now, 0.1);
        assert!(warm > cold);
    }

    #[test]
    fn strength_is_clamped() {
        let now = Utc::now();
        let s = memory_strength(&meta(1.0, 0, 1000, now), now, 0.1);
        assert!((s - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn important_records_are_never_evicted() {
        let now = Utc::now();
        let old_but_important = meta(0.9, 3650, 0, now);
        assert!(memory_strength(&old_but_important, now, 0.1) < 0.1);
        assert!(!should_evict(&old_but_important, now, 0.1, 0.1, 0.5));
        let old_and_minor = meta(0.3, 3650, 0, now);
        assert!(should_evict(&old_and_minor, now, 0.1, 0.1, 0.5));
    }

    #[test]
    fn recency_halves_after_a_day() {
        let now = Utc::now();
        let r = recency(&meta(0.5, 1, 0, now), now);
        assert!((r - 0.5).abs() < 1e-9);
    }
}
