//! Shingling of raw text into token sets.

use std::hash::{Hash, Hasher};

use fasthash::{CityHasher, FastHasher};
use hashbrown::HashSet;

use crate::errors::{EngineError, Result};

/// Tokenization unit for shingling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShingleMode {
    /// Shingles are windows of consecutive characters.
    Chars,
    /// Shingles are windows of consecutive whitespace-separated words.
    Words,
}

/// Configuration for shingle extraction.
#[derive(Clone, Copy, Debug)]
pub struct ShingleConfig {
    pub(crate) window: usize,
    pub(crate) mode: ShingleMode,
    pub(crate) fold_case: bool,
    pub(crate) collapse_whitespace: bool,
    pub(crate) seed: u64,
}

impl ShingleConfig {
    /// Creates a configuration.
    ///
    /// # Arguments
    ///
    /// * `window` - Number of units per shingle (must be more than 0).
    /// * `mode` - Tokenization unit.
    /// * `seed` - Seed value for hashing shingles into the token universe.
    ///
    /// Case folding and whitespace collapsing are enabled by default.
    pub fn new(window: usize, mode: ShingleMode, seed: u64) -> Result<Self> {
        if window == 0 {
            return Err(EngineError::config("Shingle window must not be 0."));
        }
        Ok(Self {
            window,
            mode,
            fold_case: true,
            collapse_whitespace: true,
            seed,
        })
    }

    /// Folds text to lowercase before shingling?
    pub const fn fold_case(mut self, yes: bool) -> Self {
        self.fold_case = yes;
        self
    }

    /// Collapses runs of whitespace to single spaces before shingling?
    pub const fn collapse_whitespace(mut self, yes: bool) -> Self {
        self.collapse_whitespace = yes;
        self
    }

    /// Hashes one shingle into the 64-bit token universe.
    pub(crate) fn hash(&self, shingle: &str) -> u64 {
        let mut s = CityHasher::with_seed(self.seed);
        shingle.hash(&mut s);
        s.finish()
    }
}

/// Converts raw text into a set of shingles.
///
/// Extraction is deterministic: identical text and configuration always
/// produce an identical shingle set.
pub struct Shingler {
    config: ShingleConfig,
}

impl Shingler {
    /// Creates an instance.
    pub const fn new(config: ShingleConfig) -> Self {
        Self { config }
    }

    /// Gets the configuration.
    pub const fn config(&self) -> ShingleConfig {
        self.config
    }

    /// Normalizes text according to the configuration.
    pub fn normalize(&self, text: &str) -> String {
        let text = if self.config.fold_case {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        if self.config.collapse_whitespace {
            text.split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            text.trim().to_string()
        }
    }

    /// Extracts the set of distinct shingles, in first-seen order.
    ///
    /// A document shorter than the window yields a single shingle equal to
    /// the whole normalized text. An empty or whitespace-only document
    /// yields an empty set.
    pub fn shingles(&self, text: &str) -> Vec<String> {
        let text = self.normalize(text);
        if text.is_empty() {
            return vec![];
        }
        let shingles: Vec<String> = match self.config.mode {
            ShingleMode::Words => {
                let words: Vec<&str> = text.split_whitespace().collect();
                if words.len() < self.config.window {
                    vec![text]
                } else {
                    words
                        .windows(self.config.window)
                        .map(|w| w.join(" "))
                        .collect()
                }
            }
            ShingleMode::Chars => {
                let chars: Vec<char> = text.chars().collect();
                if chars.len() < self.config.window {
                    vec![text]
                } else {
                    chars
                        .windows(self.config.window)
                        .map(|w| w.iter().collect())
                        .collect()
                }
            }
        };
        let mut seen = HashSet::new();
        shingles.into_iter().filter(|s| seen.insert(s.clone())).collect()
    }

    /// Extracts the token set: shingles hashed into the 64-bit universe,
    /// sorted and deduplicated.
    pub fn tokens(&self, text: &str) -> Vec<u64> {
        let mut tokens: Vec<u64> = self
            .shingles(text)
            .iter()
            .map(|s| self.config.hash(s))
            .collect();
        tokens.sort_unstable();
        tokens.dedup();
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shingler(window: usize, mode: ShingleMode) -> Shingler {
        Shingler::new(ShingleConfig::new(window, mode, 42).unwrap())
    }

    #[test]
    fn test_word_unigrams() {
        let s = shingler(1, ShingleMode::Words);
        assert_eq!(
            s.shingles("Who was the first king of England"),
            vec!["who", "was", "the", "first", "king", "of", "england"]
        );
    }

    #[test]
    fn test_word_bigrams() {
        let s = shingler(2, ShingleMode::Words);
        assert_eq!(s.shingles("abc de fgh"), vec!["abc de", "de fgh"]);
    }

    #[test]
    fn test_char_trigrams() {
        let s = shingler(3, ShingleMode::Chars);
        assert_eq!(s.shingles("abcd"), vec!["abc", "bcd"]);
    }

    #[test]
    fn test_duplicates_collapse() {
        let s = shingler(1, ShingleMode::Words);
        assert_eq!(s.shingles("to be or not to be"), vec!["to", "be", "or", "not"]);
    }

    #[test]
    fn test_short_document_yields_whole_text() {
        let s = shingler(5, ShingleMode::Words);
        assert_eq!(s.shingles("tiny doc"), vec!["tiny doc"]);
        let s = shingler(8, ShingleMode::Chars);
        assert_eq!(s.shingles("tiny"), vec!["tiny"]);
    }

    #[test]
    fn test_empty_document_yields_empty_set() {
        let s = shingler(3, ShingleMode::Chars);
        assert!(s.shingles("").is_empty());
        assert!(s.shingles("   \t\n ").is_empty());
        assert!(s.tokens("").is_empty());
    }

    #[test]
    fn test_normalization() {
        let s = shingler(1, ShingleMode::Words);
        assert_eq!(s.normalize("  Hello\t WORLD \n"), "hello world");
        let raw = Shingler::new(
            ShingleConfig::new(1, ShingleMode::Words, 42)
                .unwrap()
                .fold_case(false),
        );
        assert_eq!(raw.normalize("Hello WORLD"), "Hello WORLD");
    }

    #[test]
    fn test_tokens_deterministic() {
        let s1 = shingler(3, ShingleMode::Chars);
        let s2 = shingler(3, ShingleMode::Chars);
        assert_eq!(s1.tokens("determinism"), s2.tokens("determinism"));
        assert_ne!(
            s1.tokens("determinism"),
            Shingler::new(ShingleConfig::new(3, ShingleMode::Chars, 43).unwrap())
                .tokens("determinism")
        );
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(ShingleConfig::new(0, ShingleMode::Chars, 42).is_err());
    }
}
