use std::collections::HashSet;

use regex::Regex;

use crate::error::{AnalyticsError, Result};

/// Words ignored when counting keyword frequencies
pub const STOPWORDS: [&str; 9] = ["that", "this", "with", "from", "they", "have", "will", "been", "were"];

/// Characters kept in a sample excerpt before the ellipsis
pub const EXCERPT_CHARS: usize = 100;

/// Word extraction for keyword frequency reports
#[derive(Debug, Clone)]
pub struct TextProcessor {
    word_regex: Regex,
    stopwords: HashSet<&'static str>,
}

impl TextProcessor {
    /// Create a processor with the default stopword list
    pub fn new() -> Result<Self> {
        // Words of four or more word characters
        let word_regex = Regex::new(r"\b\w{4,}\b")
            .map_err(|e| AnalyticsError::Other(format!("Failed to compile word regex: {e}")))?;

        Ok(Self {
            word_regex,
            stopwords: STOPWORDS.into_iter().collect(),
        })
    }

    /// Lowercased words of `text`, stopwords removed, in order of appearance
    #[must_use]
    pub fn words(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.word_regex
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|word| !self.stopwords.contains(word))
            .map(ToString::to_string)
            .collect()
    }

    /// True if `word` is on the stopword list
    #[must_use]
    pub fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }
}

/// Case-insensitive substring test; `needle` must already be lowercase
#[must_use]
pub fn contains_term(lowered_text: &str, needle: &str) -> bool {
    !needle.is_empty() && lowered_text.contains(needle)
}

/// First `EXCERPT_CHARS` characters of `text`, with `...` appended when cut
#[must_use]
pub fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_drop_short_words_and_stopwords() {
        let processor = TextProcessor::new().expect("Failed to create text processor");

        let words = processor.words("This syrup WITH vitamin is good for kids, they said");

        assert_eq!(words, vec!["syrup", "vitamin", "good", "kids", "said"]);
        assert!(processor.is_stopword("they"));
    }

    #[test]
    fn test_words_handle_unicode() {
        let processor = TextProcessor::new().expect("Failed to create text processor");

        // Amharic word characters count towards the length
        let words = processor.words("ፓራሲታሞል paracetamol");
        assert_eq!(words.len(), 2);
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let short = "take paracetamol daily";
        assert_eq!(excerpt(short), short);

        let exact = "a".repeat(EXCERPT_CHARS);
        assert_eq!(excerpt(&exact), exact);

        let long = "é".repeat(EXCERPT_CHARS + 5);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 3);

        // Cut on the text as stored, whitespace included
        let padded = format!("  {}", "b".repeat(EXCERPT_CHARS - 1));
        assert_eq!(excerpt(&padded), format!("  {}...", "b".repeat(EXCERPT_CHARS - 2)));
        assert_eq!(excerpt(" in stock\n"), " in stock\n");
    }

    #[test]
    fn test_contains_term() {
        assert!(contains_term("buy vitamin c", "vitamin"));
        assert!(contains_term("multivitamins", "vitamin"));
        assert!(!contains_term("buy vitamin c", ""));
    }
}
