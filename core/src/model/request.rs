use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::filters::ContentFilters;

/// Sheet bucket used for cells that carry no sheet name.
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// One extracted text fragment with its worksheet coordinates (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellUnit {
    pub text: String,
    pub row: u32,
    pub column: u32,
    #[serde(default)]
    pub sheet_name: String,
}

impl CellUnit {
    pub fn new(sheet_name: impl Into<String>, text: impl Into<String>, row: u32, column: u32) -> Self {
        Self {
            text: text.into(),
            row,
            column,
            sheet_name: sheet_name.into(),
        }
    }

    /// Sheet used when grouping; falls back to [`DEFAULT_SHEET_NAME`].
    pub fn sheet_or_default(&self) -> &str {
        if self.sheet_name.trim().is_empty() {
            DEFAULT_SHEET_NAME
        } else {
            &self.sheet_name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub max_concurrent_requests: usize,
    pub retry_attempts: u32,
    pub retry_delay_seconds: f64,
    pub ignore_empty_cells: bool,
    pub ignore_formula_cells: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_concurrent_requests: 5,
            retry_attempts: 3,
            retry_delay_seconds: 1.0,
            ignore_empty_cells: true,
            ignore_formula_cells: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageSettings {
    /// `None` lets the provider (or the auto-detect stage) pick the source.
    pub source_language: Option<String>,
    pub target_language: String,
    #[serde(default)]
    pub auto_detect_source: bool,
}

impl LanguageSettings {
    pub fn new(source_language: Option<&str>, target_language: &str) -> Self {
        Self {
            source_language: source_language.map(str::to_string),
            target_language: target_language.to_string(),
            auto_detect_source: source_language.is_none(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    pub file_path: PathBuf,
    /// Empty means every sheet in the workbook.
    #[serde(default)]
    pub sheet_names: Vec<String>,
    pub language_settings: LanguageSettings,
    #[serde(default)]
    pub batch_settings: BatchSettings,
    #[serde(default)]
    pub content_filters: ContentFilters,
    #[serde(default)]
    pub cells: Vec<CellUnit>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TranslationRequest {
    /// Request with default batch settings and filters and no cells yet.
    pub fn simple(file_path: impl Into<PathBuf>, source_lang: Option<&str>, target_lang: &str) -> Self {
        Self {
            file_path: file_path.into(),
            sheet_names: Vec::new(),
            language_settings: LanguageSettings::new(source_lang, target_lang),
            batch_settings: BatchSettings::default(),
            content_filters: ContentFilters::default(),
            cells: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn add_cell(&mut self, sheet_name: &str, text: &str, row: u32, column: u32) {
        self.cells.push(CellUnit::new(sheet_name, text, row, column));
    }

    pub fn total_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn total_characters(&self) -> usize {
        self.cells.iter().map(|cell| cell.text.chars().count()).sum()
    }

    pub fn should_ignore_text(&self, text: &str) -> bool {
        crate::filters::should_skip(text, &self.content_filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_request_enables_auto_detect_without_source() {
        let request = TranslationRequest::simple("book.xlsx", None, "ja");
        assert!(request.language_settings.auto_detect_source);
        assert_eq!(request.batch_settings.batch_size, 50);

        let explicit = TranslationRequest::simple("book.xlsx", Some("en"), "ja");
        assert!(!explicit.language_settings.auto_detect_source);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let mut request = TranslationRequest::simple("book.xlsx", Some("ja"), "en");
        request.add_cell("A", "こんにちは", 1, 1);
        request.add_cell("A", "abc", 2, 1);
        assert_eq!(request.total_cells(), 2);
        assert_eq!(request.total_characters(), 8);
    }

    #[test]
    fn unnamed_cells_use_default_sheet() {
        let cell = CellUnit::new("", "x", 1, 1);
        assert_eq!(cell.sheet_or_default(), DEFAULT_SHEET_NAME);
        let named = CellUnit::new("Data", "x", 1, 1);
        assert_eq!(named.sheet_or_default(), "Data");
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{
            "filePath": "/tmp/book.xlsx",
            "languageSettings": { "sourceLanguage": null, "targetLanguage": "vi" }
        }"#;
        let request: TranslationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.batch_settings, BatchSettings::default());
        assert!(request.content_filters.ignore_urls);
        assert!(request.cells.is_empty());
    }
}
