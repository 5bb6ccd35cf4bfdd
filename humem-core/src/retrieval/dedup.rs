//! Deduplication of retrieved memories.
//!
//! Pass one walks candidates newest first (a dislike ahead of a like when
//! timestamps tie) and drops any that is textually near-identical to,
//! contradicted by, or replaced in its category by a record already kept. Pass two keeps one record per `(category, object)`
//! preference key, preferring a dislike over a like, otherwise the newest.

use std::collections::HashMap;

use super::TieredHit;
use crate::analyzer::intent;
use crate::conflict::Judge;
use crate::types::Polarity;

/// Run both dedup passes. Output is newest first.
#[must_use]
pub fn dedup(mut hits: Vec<TieredHit>, judge: &Judge<'_>, overlap_threshold: f32) -> Vec<TieredHit> {
    hits.sort_by(|a, b| {
        b.hit
            .metadata
            .timestamp
            .cmp(&a.hit.metadata.timestamp)
            .then_with(|| dislike_first(a).cmp(&dislike_first(b)))
    });

    let mut kept: Vec<TieredHit> = Vec::with_capacity(hits.len());
    for candidate in hits {
        let cand_user = intent::user_input(&candidate.hit.text);
        let shadowed = kept.iter().any(|k| {
            let kept_user = intent::user_input(&k.hit.text);
            intent::char_overlap(kept_user, cand_user) > overlap_threshold
                || judge.is_preference_contradiction(kept_user, cand_user)
                || judge.is_same_category_preference(kept_user, cand_user)
        });
        if !shadowed {
            kept.push(candidate);
        }
    }

    let mut slots: HashMap<(String, String), usize> = HashMap::new();
    let mut result: Vec<TieredHit> = Vec::with_capacity(kept.len());
    for candidate in kept {
        let Some(key) = candidate.hit.metadata.preference_key() else {
            result.push(candidate);
            continue;
        };
        match slots.get(&key) {
            Some(&slot) => {
                let held = result[slot].hit.metadata.preference_polarity;
                let incoming = candidate.hit.metadata.preference_polarity;
                if held == Some(Polarity::Positive) && incoming == Some(Polarity::Negative) {
                    result[slot] = candidate;
                }
            }
            None => {
                slots.insert(key, result.len());
                result.push(candidate);
            }
        }
    }
    result
}

fn dislike_first(hit: &TieredHit) -> u8 {
    match hit.hit.metadata.preference_polarity {
        Some(Polarity::Negative) => 0,
        _ => 1,
    }
}
