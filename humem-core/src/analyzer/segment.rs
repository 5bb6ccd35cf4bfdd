//! Tokenizer / part-of-speech boundary.
//!
//! The analyzer only needs `(word, tag)` pairs with jieba-style tags
//! (`n`, `nr`, `ns`, `nt`, `nz`, `v`, `eng`, ...). With the default `jieba`
//! feature the analyzer uses [`JiebaSegmenter`]. [`LexiconSegmenter`] is the
//! lightweight fallback: forward maximum matching over a small built-in
//! dictionary plus configured custom words.

use std::collections::HashMap;

use crate::analyzer::lexicon::BUILTIN_WORDS;
use crate::config::CustomWord;

/// Tag for unknown single characters and punctuation.
const UNKNOWN_TAG: &str = "x";
/// Tag for runs of unknown CJK characters (likely names or new words).
const NEW_WORD_TAG: &str = "nz";
/// Longest unknown run still treated as a single new word.
const MAX_NEW_WORD_CHARS: usize = 4;

/// Split text into tagged tokens.
///
/// Implementations must be `Send + Sync`; one segmenter is shared by every
/// worker and caller.
pub trait Segmenter: Send + Sync {
    /// Segment `text` into `(word, tag)` pairs in reading order.
    fn segment_with_tags(&self, text: &str) -> Vec<(String, String)>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Lexicon segmenter
// ---------------------------------------------------------------------------

/// Dictionary-driven forward-maximum-matching segmenter.
#[derive(Debug, Clone)]
pub struct LexiconSegmenter {
    dictionary: HashMap<String, String>,
    max_word_chars: usize,
}

impl LexiconSegmenter {
    /// Built-in dictionary only.
    #[must_use]
    pub fn new() -> Self {
        Self::with_custom_words(&[])
    }

    /// Built-in dictionary extended (and overridden) by `custom`.
    #[must_use]
    pub fn with_custom_words(custom: &[CustomWord]) -> Self {
        let mut dictionary: HashMap<String, String> = BUILTIN_WORDS
            .iter()
            .map(|(w, t)| ((*w).to_string(), (*t).to_string()))
            .collect();
        for entry in custom {
            let word = entry.word.trim();
            if !word.is_empty() {
                dictionary.insert(word.to_string(), entry.tag.clone());
            }
        }
        let max_word_chars = dictionary
            .keys()
            .map(|w| w.chars().count())
            .max()
            .unwrap_or(1);
        Self {
            dictionary,
            max_word_chars,
        }
    }

    /// Number of dictionary entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dictionary.len()
    }

    /// Whether the dictionary is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dictionary.is_empty()
    }

    fn longest_match(&self, chars: &[char], start: usize) -> Option<(usize, &str)> {
        let limit = self.max_word_chars.min(chars.len() - start);
        (1..=limit).rev().find_map(|len| {
            let candidate: String = chars[start..start + len].iter().collect();
            self.dictionary
                .get(&candidate)
                .map(|tag| (len, tag.as_str()))
        })
    }
}

impl Default for LexiconSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fff}' | '\u{3400}'..='\u{4dbf}')
}

impl Segmenter for LexiconSegmenter {
    fn segment_with_tags(&self, text: &str) -> Vec<(String, String)> {
        let chars: Vec<char> = text.chars().collect();
        let mut tokens = Vec::new();
        let mut unknown = String::new();
        let mut i = 0;

        let flush_unknown = |unknown: &mut String, tokens: &mut Vec<(String, String)>| {
            if unknown.is_empty() {
                return;
            }
            let len = unknown.chars().count();
            if (2..=MAX_NEW_WORD_CHARS).contains(&len) {
                tokens.push((std::mem::take(unknown), NEW_WORD_TAG.to_string()));
            } else {
                for c in unknown.chars() {
                    tokens.push((c.to_string(), UNKNOWN_TAG.to_string()));
                }
                unknown.clear();
            }
        };

        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                flush_unknown(&mut unknown, &mut tokens);
                i += 1;
                continue;
            }
            if c.is_ascii_alphanumeric() {
                flush_unknown(&mut unknown, &mut tokens);
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let tag = if word.chars().all(|c| c.is_ascii_digit()) {
                    "m"
                } else {
                    "eng"
                };
                tokens.push((word, tag.to_string()));
                continue;
            }
            if let Some((len, tag)) = self.longest_match(&chars, i) {
                flush_unknown(&mut unknown, &mut tokens);
                let word: String = chars[i..i + len].iter().collect();
                tokens.push((word, tag.to_string()));
                i += len;
                continue;
            }
            if is_cjk(c) {
                unknown.push(c);
            } else {
                flush_unknown(&mut unknown, &mut tokens);
                tokens.push((c.to_string(), UNKNOWN_TAG.to_string()));
            }
            i += 1;
        }
        flush_unknown(&mut unknown, &mut tokens);
        tokens
    }

    fn name(&self) -> &str {
        "lexicon-fmm"
    }
}

// ---------------------------------------------------------------------------
// Optional: jieba
// ---------------------------------------------------------------------------

/// The bundled jieba dictionary, loaded once per process.
#[cfg(feature = "jieba")]
static BUNDLED_JIEBA: std::sync::LazyLock<std::sync::Arc<jieba_rs::Jieba>> =
    std::sync::LazyLock::new(|| std::sync::Arc::new(jieba_rs::Jieba::new()));

/// Statistical segmenter backed by `jieba-rs`.
#[cfg(feature = "jieba")]
pub struct JiebaSegmenter {
    inner: std::sync::Arc<jieba_rs::Jieba>,
}

#[cfg(feature = "jieba")]
impl JiebaSegmenter {
    /// The bundled jieba dictionary plus `custom` words.
    ///
    /// Without custom words every segmenter shares one loaded dictionary.
    #[must_use]
    pub fn with_custom_words(custom: &[CustomWord]) -> Self {
        let custom: Vec<&CustomWord> = custom
            .iter()
            .filter(|entry| !entry.word.trim().is_empty())
            .collect();
        if custom.is_empty() {
            return Self {
                inner: std::sync::Arc::clone(&BUNDLED_JIEBA),
            };
        }
        let mut inner = jieba_rs::Jieba::new();
        for entry in custom {
            inner.add_word(entry.word.trim(), None, Some(&entry.tag));
        }
        Self {
            inner: std::sync::Arc::new(inner),
        }
    }
}

#[cfg(feature = "jieba")]
impl Segmenter for JiebaSegmenter {
    fn segment_with_tags(&self, text: &str) -> Vec<(String, String)> {
        self.inner
            .tag(text, true)
            .into_iter()
            .filter(|t| !t.word.trim().is_empty())
            .map(|t| (t.word.to_string(), t.tag.to_string()))
            .collect()
    }

    fn name(&self) -> &str {
        "jieba"
    }
}
