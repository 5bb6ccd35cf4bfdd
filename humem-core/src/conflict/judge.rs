//! Supersession rules.
//!
//! Rules are tried in order; the first that fires decides:
//!
//! 1. near-identical text → duplicate
//! 2. correction marker, shared entity, close text → update
//! 3. first-person preference, close text, shared object, opposite phrasing
//!    → preference contradiction
//! 4. both sides are first-person preferences of the same category →
//!    same-category preference (distance-independent)

use std::collections::BTreeSet;

use crate::analyzer::{TextAnalyzer, intent};
use crate::config::ConflictConfig;
use crate::memory::SupersessionReason;

/// A new utterance prepared for judging.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Full cleaned text.
    pub text: String,
    /// The user-authored portion.
    pub user_text: String,
    /// Entity names of the full text.
    pub entities: BTreeSet<String>,
    /// Carries a correction marker.
    pub update_intent: bool,
    /// The user-authored portion is a first-person preference statement.
    pub preference: bool,
}

impl Utterance {
    /// Analyze `text` once for judging against many candidates.
    #[must_use]
    pub fn new(analyzer: &TextAnalyzer, text: &str) -> Self {
        let user_text = intent::user_input(text).to_string();
        Self {
            entities: analyzer.extract_entities(text).into_keys().collect(),
            update_intent: intent::has_update_intent(&user_text),
            preference: intent::expresses_preference(&user_text),
            text: text.to_string(),
            user_text,
        }
    }
}

/// Applies the supersession rules with configured thresholds.
#[derive(Debug, Clone, Copy)]
pub struct Judge<'a> {
    analyzer: &'a TextAnalyzer,
    config: &'a ConflictConfig,
}

impl<'a> Judge<'a> {
    /// Judge with `analyzer` for noun extraction and `config` thresholds.
    #[must_use]
    pub fn new(analyzer: &'a TextAnalyzer, config: &'a ConflictConfig) -> Self {
        Self { analyzer, config }
    }

    /// Decide whether `new` supersedes the stored record `old_text`.
    #[must_use]
    pub fn judge(
        &self,
        new: &Utterance,
        old_text: &str,
        old_entities: &BTreeSet<String>,
        distance: f32,
    ) -> Option<SupersessionReason> {
        let old_user = intent::user_input(old_text);

        if distance < self.config.duplicate_distance {
            return Some(SupersessionReason::Duplicate);
        }
        if new.update_intent
            && distance < self.config.update_distance
            && !new.entities.is_disjoint(old_entities)
        {
            return Some(SupersessionReason::Update);
        }
        if new.preference
            && distance < self.config.preference_distance
            && self.is_preference_contradiction(&new.user_text, old_user)
        {
            return Some(SupersessionReason::PreferenceContradiction);
        }
        if self.is_same_category_preference(&new.user_text, old_user) {
            return Some(SupersessionReason::SameCategoryPreference);
        }
        None
    }

    /// Both are first-person, non-interrogative, share a noun object and
    /// carry opposite preference phrasing.
    #[must_use]
    pub fn is_preference_contradiction(&self, new_text: &str, old_text: &str) -> bool {
        if !new_text.contains('我') || !old_text.contains('我') {
            return false;
        }
        if intent::is_question(new_text) || intent::is_question(old_text) {
            return false;
        }
        let new_objects = self.analyzer.extract_noun_entities(new_text);
        let old_objects = self.analyzer.extract_noun_entities(old_text);
        if new_objects.is_disjoint(&old_objects) {
            return false;
        }
        intent::has_opposite_pair(new_text, old_text)
    }

    /// Both are first-person preference statements in the same category.
    #[must_use]
    pub fn is_same_category_preference(&self, new_text: &str, old_text: &str) -> bool {
        if !intent::expresses_preference(new_text) || !intent::expresses_preference(old_text) {
            return false;
        }
        match intent::preference_category(new_text) {
            Some(category) => intent::preference_category(old_text) == Some(category),
            None => false,
        }
    }
}
