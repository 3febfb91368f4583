use std::sync::Arc;

const SIMPLE_CHARS_PER_TOKEN: usize = 4;
const ENHANCED_WORD_MULTIPLIER: f64 = 1.3;
const ENHANCED_SPECIAL_DIVISOR: usize = 10;

/// Type of tokenizer used for the prompt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenizerKind {
    /// Character-based estimate (~4 chars per token)
    #[default]
    Simple,
    /// Word and punctuation heuristic
    Enhanced,
}

impl TokenizerKind {
    /// Creates a tokenizer instance of this kind.
    #[must_use]
    pub fn create(self) -> Arc<dyn TokenEstimator> {
        match self {
            Self::Simple => Arc::new(SimpleTokenizer),
            Self::Enhanced => Arc::new(EnhancedTokenizer),
        }
    }
}

/// Estimates token counts so prompts stay inside the model's input window.
pub trait TokenEstimator: Send + Sync {
    /// Estimates the number of tokens in the given text.
    fn estimate(&self, text: &str) -> usize;

    /// Returns the longest prefix of `text` (cut on a char boundary) whose
    /// estimate does not exceed `budget`.
    fn fit_prefix<'a>(&self, text: &'a str, budget: usize) -> &'a str {
        if self.estimate(text) <= budget {
            return text;
        }

        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        // estimates grow with the prefix, so binary search the cut point
        let (mut lo, mut hi) = (0, boundaries.len() - 1);
        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            if self.estimate(&text[..boundaries[mid]]) <= budget {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        &text[..boundaries[lo]]
    }
}

/// Character-based tokenizer, ~4 characters per token.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimpleTokenizer;

impl TokenEstimator for SimpleTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        text.chars()
            .count()
            .div_ceil(SIMPLE_CHARS_PER_TOKEN)
            .max(1)
    }
}

/// Averages a word-based and a character-based estimate, plus a penalty for
/// punctuation-heavy text such as source code.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnhancedTokenizer;

impl TokenEstimator for EnhancedTokenizer {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let mut words = 0usize;
        let mut chars = 0usize;
        let mut special = 0usize;
        let mut in_word = false;

        for c in text.chars() {
            chars += 1;
            if c.is_whitespace() {
                in_word = false;
                continue;
            }
            if !in_word {
                words += 1;
                in_word = true;
            }
            if !c.is_alphanumeric() {
                special += 1;
            }
        }

        let word_estimate = (words as f64 * ENHANCED_WORD_MULTIPLIER) as usize;
        let char_estimate = chars / SIMPLE_CHARS_PER_TOKEN;

        (word_estimate.saturating_add(char_estimate) / 2)
            .saturating_add(special / ENHANCED_SPECIAL_DIVISOR)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tokenizer() {
        let tokenizer = SimpleTokenizer;
        assert_eq!(tokenizer.estimate(""), 0);
        assert_eq!(tokenizer.estimate("test"), 1);
        assert_eq!(tokenizer.estimate("hello world"), 3);
        assert_eq!(tokenizer.estimate(&"a".repeat(1000)), 250);
    }

    #[test]
    fn test_simple_counts_chars_not_bytes() {
        let tokenizer = SimpleTokenizer;
        assert_eq!(tokenizer.estimate("привет"), 2);
    }

    #[test]
    fn test_enhanced_tokenizer() {
        let tokenizer = EnhancedTokenizer;
        assert_eq!(tokenizer.estimate(""), 0);

        let prose = tokenizer.estimate("hello world");
        assert!(prose > 0 && prose < 10);

        let code = tokenizer.estimate("fn main() {\n    println!(\"Hello, world!\");\n}\n");
        assert!(code > 5 && code < 30);
    }

    #[test]
    fn test_fit_prefix_whole_text() {
        let tokenizer = SimpleTokenizer;
        assert_eq!(tokenizer.fit_prefix("short", 100), "short");
    }

    #[test]
    fn test_fit_prefix_cuts_to_budget() {
        let tokenizer = SimpleTokenizer;
        let text = "a".repeat(100);
        let prefix = tokenizer.fit_prefix(&text, 10);
        assert_eq!(prefix.len(), 40);
        assert!(tokenizer.estimate(prefix) <= 10);
    }

    #[test]
    fn test_fit_prefix_char_boundary() {
        let tokenizer = SimpleTokenizer;
        let text = "é".repeat(50);
        let prefix = tokenizer.fit_prefix(&text, 3);
        assert_eq!(prefix.chars().count(), 12);
    }

    #[test]
    fn test_fit_prefix_zero_budget() {
        let tokenizer = EnhancedTokenizer;
        assert_eq!(tokenizer.fit_prefix("some words here", 0), "");
    }

    #[test]
    fn test_kind_creates_matching_estimator() {
        let text = "fn main() { let x = 1; }";
        assert_eq!(
            TokenizerKind::Simple.create().estimate(text),
            SimpleTokenizer.estimate(text)
        );
        assert_eq!(
            TokenizerKind::Enhanced.create().estimate(text),
            EnhancedTokenizer.estimate(text)
        );
    }
}
