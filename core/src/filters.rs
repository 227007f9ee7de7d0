//! Content filter deciding which cell texts bypass translation.
//!
//! Every rule is evaluated in a fixed order and the first match wins. The
//! filter is a pure function of `(text, filters)`; invalid custom patterns
//! are treated as non-matching.
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SQUARE_BRACKET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[.*?\]").expect("valid square bracket pattern"));

static JAPANESE_QUOTE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)「.*?」").expect("valid japanese quote pattern"));

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("valid url pattern"));

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email pattern")
});

static NUMBER_ONLY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\d\s.,\-+()%$€¥£]+$").expect("valid number pattern")
});

/// Toggles for text that should be passed through untranslated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFilters {
    /// Skip text containing a `[...]` span.
    #[serde(default = "default_true")]
    pub ignore_square_brackets: bool,
    /// Skip text containing a `「...」` span.
    #[serde(default = "default_true")]
    pub ignore_japanese_quotes: bool,
    #[serde(default = "default_true")]
    pub ignore_urls: bool,
    #[serde(default = "default_true")]
    pub ignore_emails: bool,
    /// Skip text made only of digits, spaces and numeric punctuation.
    #[serde(default = "default_true")]
    pub ignore_numbers_only: bool,
    /// Extra regular expressions; any match skips the text.
    #[serde(default)]
    pub custom_patterns: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ContentFilters {
    fn default() -> Self {
        Self {
            ignore_square_brackets: true,
            ignore_japanese_quotes: true,
            ignore_urls: true,
            ignore_emails: true,
            ignore_numbers_only: true,
            custom_patterns: Vec::new(),
        }
    }
}

impl ContentFilters {
    /// Filters with every toggle off. Only empty text is skipped.
    pub fn none() -> Self {
        Self {
            ignore_square_brackets: false,
            ignore_japanese_quotes: false,
            ignore_urls: false,
            ignore_emails: false,
            ignore_numbers_only: false,
            custom_patterns: Vec::new(),
        }
    }

    /// Compiles the custom patterns once so the filter can be applied to many
    /// cells. Patterns that fail to compile are dropped.
    pub fn compile(&self) -> CompiledFilters {
        let custom = self
            .custom_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    debug!("ignoring invalid custom filter pattern {pattern:?}: {err}");
                    None
                }
            })
            .collect();

        CompiledFilters {
            filters: self.clone(),
            custom,
        }
    }
}

/// [`ContentFilters`] with the custom patterns already compiled.
#[derive(Debug, Clone)]
pub struct CompiledFilters {
    filters: ContentFilters,
    custom: Vec<Regex>,
}

impl CompiledFilters {
    pub fn should_skip(&self, text: &str) -> bool {
        self.skip_reason(text).is_some()
    }

    /// Returns the first rule that matches `text`, if any.
    pub fn skip_reason(&self, text: &str) -> Option<SkipReason> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Some(SkipReason::Empty);
        }

        let filters = &self.filters;
        if filters.ignore_square_brackets && SQUARE_BRACKET_PATTERN.is_match(text) {
            return Some(SkipReason::SquareBrackets);
        }
        if filters.ignore_japanese_quotes && JAPANESE_QUOTE_PATTERN.is_match(text) {
            return Some(SkipReason::JapaneseQuotes);
        }
        if filters.ignore_urls && URL_PATTERN.is_match(text) {
            return Some(SkipReason::Url);
        }
        if filters.ignore_emails && EMAIL_PATTERN.is_match(text) {
            return Some(SkipReason::Email);
        }
        if filters.ignore_numbers_only && NUMBER_ONLY_PATTERN.is_match(trimmed) {
            return Some(SkipReason::NumbersOnly);
        }
        if self.custom.iter().any(|regex| regex.is_match(text)) {
            return Some(SkipReason::CustomPattern);
        }

        None
    }
}

/// Rule that caused a text to be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Empty,
    SquareBrackets,
    JapaneseQuotes,
    Url,
    Email,
    NumbersOnly,
    CustomPattern,
}

/// Decides whether `text` should bypass translation under `filters`.
pub fn should_skip(text: &str, filters: &ContentFilters) -> bool {
    filters.compile().should_skip(text)
}
