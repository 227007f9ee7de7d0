use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::CellUnit;
use crate::files::TranslatedCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    Success,
    PartialSuccess,
    Failed,
    Cancelled,
}

impl TranslationStatus {
    /// `Failed` without successes, `Success` without failures, otherwise
    /// `PartialSuccess`.
    pub fn derive(successful: usize, failed: usize) -> Self {
        if successful == 0 {
            TranslationStatus::Failed
        } else if failed == 0 {
            TranslationStatus::Success
        } else {
            TranslationStatus::PartialSuccess
        }
    }
}

/// How a single cell left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellOutcome {
    Translated,
    /// Passed through by the content filter; never sent to the provider.
    Skipped,
    /// Provider call failed after all retries.
    Failed,
    /// Never dispatched because the run was cancelled.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellResult {
    pub original_text: String,
    /// `None` when the cell failed.
    pub translated_text: Option<String>,
    pub row: u32,
    pub column: u32,
    pub detected_source_language: Option<String>,
    pub confidence_score: Option<f64>,
    pub processing_time_seconds: f64,
    pub error_message: Option<String>,
    pub outcome: CellOutcome,
}

impl CellResult {
    pub fn translated(
        unit: &CellUnit,
        translated_text: String,
        source_language: Option<String>,
        processing_time_seconds: f64,
    ) -> Self {
        Self {
            original_text: unit.text.clone(),
            translated_text: Some(translated_text),
            row: unit.row,
            column: unit.column,
            detected_source_language: source_language,
            confidence_score: Some(1.0),
            processing_time_seconds,
            error_message: None,
            outcome: CellOutcome::Translated,
        }
    }

    pub fn skipped(unit: &CellUnit) -> Self {
        Self::pass_through(unit, CellOutcome::Skipped)
    }

    pub fn cancelled(unit: &CellUnit) -> Self {
        Self::pass_through(unit, CellOutcome::Cancelled)
    }

    pub fn failed(unit: &CellUnit, message: impl Into<String>) -> Self {
        Self {
            original_text: unit.text.clone(),
            translated_text: None,
            row: unit.row,
            column: unit.column,
            detected_source_language: None,
            confidence_score: None,
            processing_time_seconds: 0.0,
            error_message: Some(message.into()),
            outcome: CellOutcome::Failed,
        }
    }

    fn pass_through(unit: &CellUnit, outcome: CellOutcome) -> Self {
        Self {
            original_text: unit.text.clone(),
            translated_text: Some(unit.text.clone()),
            row: unit.row,
            column: unit.column,
            detected_source_language: None,
            confidence_score: None,
            processing_time_seconds: 0.0,
            error_message: None,
            outcome,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.outcome == CellOutcome::Translated
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetTranslationResult {
    pub sheet_name: String,
    pub total_cells: usize,
    pub success_count: usize,
    pub failed_count: usize,
    /// Includes cancelled cells.
    pub skipped_count: usize,
    pub cancelled_count: usize,
    pub cell_results: Vec<CellResult>,
    pub processing_time_seconds: f64,
    pub error_message: Option<String>,
}

impl SheetTranslationResult {
    /// Builds the aggregate by counting each cell's outcome.
    pub fn from_results(
        sheet_name: impl Into<String>,
        cell_results: Vec<CellResult>,
        processing_time_seconds: f64,
    ) -> Self {
        let mut success_count = 0;
        let mut failed_count = 0;
        let mut skipped_count = 0;
        let mut cancelled_count = 0;
        for result in &cell_results {
            match result.outcome {
                CellOutcome::Translated => success_count += 1,
                CellOutcome::Failed => failed_count += 1,
                CellOutcome::Skipped => skipped_count += 1,
                CellOutcome::Cancelled => {
                    skipped_count += 1;
                    cancelled_count += 1;
                }
            }
        }

        Self {
            sheet_name: sheet_name.into(),
            total_cells: cell_results.len(),
            success_count,
            failed_count,
            skipped_count,
            cancelled_count,
            cell_results,
            processing_time_seconds,
            error_message: None,
        }
    }

    /// Every cell failed with `message`.
    pub fn failed_sheet(
        sheet_name: impl Into<String>,
        cells: &[CellUnit],
        message: &str,
        processing_time_seconds: f64,
    ) -> Self {
        let results = cells
            .iter()
            .map(|cell| CellResult::failed(cell, message))
            .collect();
        let mut sheet = Self::from_results(sheet_name, results, processing_time_seconds);
        sheet.error_message = Some(message.to_string());
        sheet
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_cells == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_cells as f64 * 100.0
    }

    pub fn is_successful(&self) -> bool {
        self.error_message.is_none() && self.success_count > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationMetrics {
    pub total_files: usize,
    pub total_sheets: usize,
    pub total_cells: usize,
    pub total_characters: usize,
    pub successful_translations: usize,
    pub failed_translations: usize,
    pub skipped_cells: usize,
    /// Approximation: `ceil(cells / batch_size)` per sheet.
    pub api_calls_made: usize,
    pub total_processing_time: f64,
    pub average_time_per_cell: f64,
    pub characters_per_second: f64,
}

impl TranslationMetrics {
    pub fn overall_success_rate(&self) -> f64 {
        if self.total_cells == 0 {
            return 0.0;
        }
        self.successful_translations as f64 / self.total_cells as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub error_type: String,
    pub error_message: String,
    pub sheet_name: Option<String>,
    pub cell_position: Option<(u32, u32)>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSummary {
    pub status: TranslationStatus,
    pub total_sheets: usize,
    pub successful_sheets: usize,
    pub failed_sheets: usize,
    pub total_cells: usize,
    pub successful_translations: usize,
    pub failed_translations: usize,
    pub success_rate: f64,
    pub processing_time: f64,
    pub errors_count: usize,
    pub warnings_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResponse {
    pub request_id: String,
    pub status: TranslationStatus,
    pub file_path: PathBuf,
    pub output_file_path: Option<PathBuf>,
    pub sheet_results: Vec<SheetTranslationResult>,
    pub metrics: TranslationMetrics,
    pub errors: Vec<ErrorInfo>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl TranslationResponse {
    /// A `Failed` response with no sheet results and zeroed metrics.
    pub fn failed(
        request_id: String,
        file_path: PathBuf,
        started_at: DateTime<Utc>,
        error_type: &str,
        message: impl Into<String>,
    ) -> Self {
        let mut response = Self {
            request_id,
            status: TranslationStatus::Failed,
            file_path,
            output_file_path: None,
            sheet_results: Vec::new(),
            metrics: TranslationMetrics::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
            started_at,
            completed_at: Utc::now(),
        };
        response.add_error(error_type, message, None, None);
        response
    }

    pub fn total_processing_time(&self) -> f64 {
        (self.completed_at - self.started_at)
            .to_std()
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn is_successful(&self) -> bool {
        matches!(
            self.status,
            TranslationStatus::Success | TranslationStatus::PartialSuccess
        )
    }

    pub fn successful_sheets(&self) -> Vec<&SheetTranslationResult> {
        self.sheet_results
            .iter()
            .filter(|sheet| sheet.is_successful())
            .collect()
    }

    pub fn failed_sheets(&self) -> Vec<&SheetTranslationResult> {
        self.sheet_results
            .iter()
            .filter(|sheet| !sheet.is_successful())
            .collect()
    }

    pub fn add_error(
        &mut self,
        error_type: &str,
        message: impl Into<String>,
        sheet_name: Option<&str>,
        cell_position: Option<(u32, u32)>,
    ) {
        self.errors.push(ErrorInfo {
            error_type: error_type.to_string(),
            error_message: message.into(),
            sheet_name: sheet_name.map(str::to_string),
            cell_position,
            timestamp: Utc::now(),
        });
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Translated cells grouped by sheet, in the shape the writer consumes.
    /// Skipped, failed and cancelled cells are left untouched in the file.
    pub fn translations_by_sheet(&self) -> BTreeMap<String, Vec<TranslatedCell>> {
        let mut map = BTreeMap::new();
        for sheet in self.sheet_results.iter().filter(|sheet| sheet.is_successful()) {
            let cells: Vec<TranslatedCell> = sheet
                .cell_results
                .iter()
                .filter(|cell| cell.is_successful())
                .filter_map(|cell| {
                    cell.translated_text.as_ref().map(|text| TranslatedCell {
                        translated_text: text.clone(),
                        row: cell.row,
                        column: cell.column,
                    })
                })
                .collect();
            map.insert(sheet.sheet_name.clone(), cells);
        }
        map
    }

    pub fn summary(&self) -> ResponseSummary {
        ResponseSummary {
            status: self.status,
            total_sheets: self.sheet_results.len(),
            successful_sheets: self.successful_sheets().len(),
            failed_sheets: self.failed_sheets().len(),
            total_cells: self.metrics.total_cells,
            successful_translations: self.metrics.successful_translations,
            failed_translations: self.metrics.failed_translations,
            success_rate: self.metrics.overall_success_rate(),
            processing_time: self.total_processing_time(),
            errors_count: self.errors.len(),
            warnings_count: self.warnings.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(text: &str, row: u32) -> CellUnit {
        CellUnit::new("Sheet", text, row, 1)
    }

    #[test]
    fn status_derivation_rule() {
        assert_eq!(TranslationStatus::derive(0, 0), TranslationStatus::Failed);
        assert_eq!(TranslationStatus::derive(0, 4), TranslationStatus::Failed);
        assert_eq!(TranslationStatus::derive(3, 0), TranslationStatus::Success);
        assert_eq!(
            TranslationStatus::derive(3, 1),
            TranslationStatus::PartialSuccess
        );
    }

    #[test]
    fn sheet_counts_follow_outcomes() {
        let results = vec![
            CellResult::translated(&unit("a", 1), "A".into(), None, 0.1),
            CellResult::skipped(&unit("", 2)),
            CellResult::failed(&unit("b", 3), "boom"),
            CellResult::cancelled(&unit("c", 4)),
        ];
        let sheet = SheetTranslationResult::from_results("Sheet", results, 0.5);
        assert_eq!(sheet.total_cells, 4);
        assert_eq!(sheet.success_count, 1);
        assert_eq!(sheet.failed_count, 1);
        assert_eq!(sheet.skipped_count, 2);
        assert_eq!(sheet.cancelled_count, 1);
        assert_eq!(
            sheet.success_count + sheet.failed_count + sheet.skipped_count,
            sheet.total_cells
        );
    }

    #[test]
    fn skipped_and_translated_cells_are_distinguishable() {
        let same_text = unit("OK", 1);
        let skipped = CellResult::skipped(&same_text);
        let noop = CellResult::translated(&same_text, "OK".into(), None, 0.0);
        assert_eq!(skipped.translated_text, noop.translated_text);
        assert!(!skipped.is_successful());
        assert!(noop.is_successful());
    }

    #[test]
    fn failed_sheet_marks_every_cell() {
        let cells = vec![unit("a", 1), unit("b", 2)];
        let sheet = SheetTranslationResult::failed_sheet("Sheet", &cells, "bad", 0.0);
        assert_eq!(sheet.failed_count, 2);
        assert_eq!(sheet.error_message.as_deref(), Some("bad"));
        assert!(!sheet.is_successful());
    }

    #[test]
    fn translations_by_sheet_only_carries_translated_cells() {
        let sheet = SheetTranslationResult::from_results(
            "Data",
            vec![
                CellResult::translated(&unit("a", 1), "A".into(), None, 0.0),
                CellResult::skipped(&unit("[b]", 2)),
                CellResult::failed(&unit("c", 3), "x"),
            ],
            0.0,
        );
        let mut response = TranslationResponse::failed(
            "id".into(),
            PathBuf::from("book.xlsx"),
            Utc::now(),
            "X",
            "placeholder",
        );
        response.sheet_results.push(sheet);

        let map = response.translations_by_sheet();
        let cells = &map["Data"];
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].translated_text, "A");
        assert_eq!((cells[0].row, cells[0].column), (1, 1));
    }

    #[test]
    fn failed_response_carries_an_error() {
        let response = TranslationResponse::failed(
            "id".into(),
            PathBuf::from("book.xlsx"),
            Utc::now(),
            "PROCESSING_FAILED",
            "nope",
        );
        assert_eq!(response.status, TranslationStatus::Failed);
        assert_eq!(response.errors.len(), 1);
        assert!(!response.is_successful());
        assert_eq!(response.summary().errors_count, 1);
    }
}
