//! Lexical intent predicates: questions, review questions, corrections and
//! first-person preference statements.

use crate::analyzer::lexicon::{
    ASSISTANT_MARKER, NEGATIVE_PREFERENCE, POSITIVE_PREFERENCE, PREFERENCE_CATEGORIES,
    PREFERENCE_PAIRS, QUESTION_INDICATORS, REVIEW_PATTERNS, UPDATE_INDICATORS, USER_MARKER,
};
use crate::types::Polarity;

/// The user-authored portion of a stored utterance.
///
/// Takes the text after the last user marker and before the assistant
/// marker. Text without markers is returned trimmed and unchanged.
#[must_use]
pub fn user_input(text: &str) -> &str {
    let after_user = text
        .rsplit_once(USER_MARKER)
        .map_or(text, |(_, rest)| rest);
    let before_reply = after_user
        .split_once(ASSISTANT_MARKER)
        .map_or(after_user, |(head, _)| head);
    before_reply.trim()
}

/// Whether the text reads as a question.
#[must_use]
pub fn is_question(text: &str) -> bool {
    QUESTION_INDICATORS.iter().any(|q| text.contains(q))
}

/// Whether the text asks the assistant to recall something said earlier.
#[must_use]
pub fn is_review_question(text: &str) -> bool {
    REVIEW_PATTERNS.iter().any(|p| text.contains(p))
}

/// Whether the text corrects or replaces an earlier statement.
#[must_use]
pub fn has_update_intent(text: &str) -> bool {
    UPDATE_INDICATORS.iter().any(|m| text.contains(m))
}

/// Direction of a preference phrase in `text`, negative phrases first.
#[must_use]
pub fn preference_polarity(text: &str) -> Option<Polarity> {
    if NEGATIVE_PREFERENCE.iter().any(|p| text.contains(p)) {
        Some(Polarity::Negative)
    } else if POSITIVE_PREFERENCE.iter().any(|p| text.contains(p)) {
        Some(Polarity::Positive)
    } else {
        None
    }
}

/// Whether `text` is a non-interrogative first-person preference statement.
#[must_use]
pub fn expresses_preference(text: &str) -> bool {
    text.contains('我') && !is_question(text) && preference_polarity(text).is_some()
}

/// First preference category whose indicator words appear in `text`.
#[must_use]
pub fn preference_category(text: &str) -> Option<&'static str> {
    PREFERENCE_CATEGORIES
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(category, _)| *category)
}

/// Whether the two texts hold a contradicting phrase pair, in either order.
///
/// A pair contradicts when one side carries the negative phrase while the
/// other carries the positive phrase without its negation.
#[must_use]
pub fn has_opposite_pair(new_text: &str, old_text: &str) -> bool {
    PREFERENCE_PAIRS.iter().any(|(pos, neg)| {
        let flips = |a: &str, b: &str| a.contains(neg) && b.contains(pos) && !b.contains(neg);
        flips(new_text, old_text) || flips(old_text, new_text)
    })
}

/// Character-set overlap of two texts: `|A ∩ B| / max(|A|, |B|)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn char_overlap(a: &str, b: &str) -> f32 {
    use std::collections::HashSet;
    let set_a: HashSet<char> = a.chars().filter(|c| !c.is_whitespace()).collect();
    let set_b: HashSet<char> = b.chars().filter(|c| !c.is_whitespace()).collect();
    let larger = set_a.len().max(set_b.len());
    if larger == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f32 / larger as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_input_strips_speaker_markers() {
        assert_eq!(user_input("用户: 我喜欢吃苹果 AI: 好的"), "我喜欢吃苹果");
        assert_eq!(user_input("我喜欢吃苹果"), "我喜欢吃苹果");
        assert_eq!(user_input("用户更正: 我住在上海"), "用户更正: 我住在上海");
    }

    #[test]
    fn negative_phrases_take_precedence() {
        assert_eq!(preference_polarity("我不喜欢吃苹果"), Some(Polarity::Negative));
        assert_eq!(preference_polarity("我喜欢吃苹果"), Some(Polarity::Positive));
        assert_eq!(preference_polarity("今天下雨"), None);
    }

    #[test]
    fn questions_are_not_preferences() {
        assert!(!expresses_preference("你还记得我喜欢吃什么吗"));
        assert!(expresses_preference("我喜欢吃苹果"));
        assert!(!expresses_preference("他喜欢吃苹果"));
    }

    #[test]
    fn review_questions_are_detected() {
        assert!(is_review_question("你还记得我喜欢吃什么吗"));
        assert!(is_review_question("我之前说过我住哪"));
        assert!(!is_review_question("我喜欢吃苹果"));
    }

    #[test]
    fn opposite_pairs_in_both_orders() {
        assert!(has_opposite_pair("我不喜欢吃苹果", "我喜欢吃苹果"));
        assert!(has_opposite_pair("我喜欢吃苹果", "我不喜欢吃苹果"));
        assert!(!has_opposite_pair("我喜欢吃苹果", "我喜欢吃香蕉"));
    }

    #[test]
    fn categories_follow_indicator_order() {
        assert_eq!(preference_category("我喜欢吃香蕉"), Some("food"));
        assert_eq!(preference_category("我喜欢听摇滚"), Some("music"));
        assert_eq!(preference_category("我喜欢你"), None);
    }

    #[test]
    fn char_overlap_is_symmetric_and_bounded() {
        let a = "我喜欢吃苹果";
        let b = "我喜欢吃香蕉";
        assert!((char_overlap(a, b) - char_overlap(b, a)).abs() < f32::EPSILON);
        assert!((char_overlap(a, a) - 1.0).abs() < f32::EPSILON);
        assert!(char_overlap("", "") < f32::EPSILON);
    }
}
