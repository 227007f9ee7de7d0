use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use log::{error, info, warn};
use uuid::Uuid;

use super::sheet::{panic_message, SheetTranslator};
use crate::batch::{BatchProcessor, ProgressCallback};
use crate::model::{
    CellOutcome, CellUnit, SheetTranslationResult, TranslationMetrics, TranslationRequest,
    TranslationResponse, TranslationStatus,
};
use crate::translation_log::TranslationLog;

/// Translates every cell of a request, sheet by sheet, and folds the sheet
/// results into one [`TranslationResponse`].
pub struct TranslateTextUseCase {
    processor: Arc<BatchProcessor>,
    log: Option<Arc<TranslationLog>>,
    progress: Option<ProgressCallback>,
}

impl TranslateTextUseCase {
    pub fn new(processor: Arc<BatchProcessor>) -> Self {
        Self {
            processor,
            log: None,
            progress: None,
        }
    }

    pub fn with_log(mut self, log: Arc<TranslationLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Receives `(cells done, cells in request)` across all sheets.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn processor(&self) -> &Arc<BatchProcessor> {
        &self.processor
    }

    /// Never fails: unexpected errors become a `Failed` response. Starting a
    /// run clears any earlier cancellation of the processor.
    pub async fn execute(&self, request: &TranslationRequest) -> TranslationResponse {
        self.processor.reset();
        self.execute_in_run(request).await
    }

    /// [`Self::execute`] for a caller that already started the run, so a
    /// cancel issued during its earlier stages still applies.
    pub(crate) async fn execute_in_run(&self, request: &TranslationRequest) -> TranslationResponse {
        let request_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            "translation {request_id} started: {} cells, {} -> {}",
            request.total_cells(),
            request
                .language_settings
                .source_language
                .as_deref()
                .unwrap_or("auto"),
            request.language_settings.target_language
        );

        let outcome = AssertUnwindSafe(self.run(request, &request_id, started_at))
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(panic) => {
                let message = format!("Translation failed: {}", panic_message(panic.as_ref()));
                error!("translation {request_id} aborted: {message}");
                TranslationResponse::failed(
                    request_id,
                    request.file_path.clone(),
                    started_at,
                    "PROCESSING_FAILED",
                    message,
                )
            }
        };

        info!(
            "translation {} finished with {:?}: {} translated, {} failed, {} skipped",
            response.request_id,
            response.status,
            response.metrics.successful_translations,
            response.metrics.failed_translations,
            response.metrics.skipped_cells
        );

        if let Some(log) = &self.log {
            if let Err(err) = log.record(&response) {
                warn!("failed to write translation log: {err}");
            }
        }
        response
    }

    async fn run(
        &self,
        request: &TranslationRequest,
        request_id: &str,
        started_at: chrono::DateTime<Utc>,
    ) -> TranslationResponse {
        let clock = Instant::now();
        let total = request.total_cells();
        let mut sheet_results = Vec::new();
        let mut offset = 0usize;

        for (sheet_name, cells) in group_by_sheet(&request.cells) {
            let mut translator = SheetTranslator::new(self.processor.clone());
            if let Some(progress) = &self.progress {
                let progress = progress.clone();
                let base = offset;
                translator = translator.with_progress(Arc::new(move |done: usize, _sheet_total: usize| {
                    progress(base + done, total);
                }));
            }

            let result = translator
                .translate_sheet(
                    &sheet_name,
                    &cells,
                    &request.language_settings,
                    &request.batch_settings,
                    &request.content_filters,
                )
                .await;
            offset += cells.len();
            sheet_results.push(result);
        }

        let elapsed = clock.elapsed().as_secs_f64();
        let metrics = aggregate_metrics(request, &sheet_results, elapsed);
        let cancelled = self.processor.is_cancelled()
            || sheet_results.iter().any(|sheet| sheet.cancelled_count > 0);
        let status = if cancelled {
            TranslationStatus::Cancelled
        } else {
            TranslationStatus::derive(metrics.successful_translations, metrics.failed_translations)
        };

        let mut response = TranslationResponse {
            request_id: request_id.to_string(),
            status,
            file_path: request.file_path.clone(),
            output_file_path: None,
            sheet_results: Vec::new(),
            metrics,
            errors: Vec::new(),
            warnings: Vec::new(),
            started_at,
            completed_at: Utc::now(),
        };

        for sheet in &sheet_results {
            record_sheet_errors(&mut response, sheet);
        }
        if cancelled {
            response.add_warning("Translation was cancelled before all cells were processed");
        }
        if response.status == TranslationStatus::Failed && response.errors.is_empty() {
            let message = if total == 0 {
                "No cells were translated: the request contains no cells"
            } else {
                "No cells were translated"
            };
            response.add_error("TRANSLATION_FAILED", message, None, None);
        }

        response.sheet_results = sheet_results;
        response
    }
}

/// Buckets cells by sheet name, keeping first-appearance order.
fn group_by_sheet(cells: &[CellUnit]) -> Vec<(String, Vec<CellUnit>)> {
    let mut order: Vec<(String, Vec<CellUnit>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for cell in cells {
        let name = cell.sheet_or_default();
        match index.get(name) {
            Some(&position) => order[position].1.push(cell.clone()),
            None => {
                index.insert(name.to_string(), order.len());
                order.push((name.to_string(), vec![cell.clone()]));
            }
        }
    }
    order
}

fn aggregate_metrics(
    request: &TranslationRequest,
    sheets: &[SheetTranslationResult],
    elapsed: f64,
) -> TranslationMetrics {
    let batch_size = request.batch_settings.batch_size;
    let total_cells: usize = sheets.iter().map(|sheet| sheet.total_cells).sum();
    let total_characters = request.total_characters();

    TranslationMetrics {
        total_files: 1,
        total_sheets: sheets.len(),
        total_cells,
        total_characters,
        successful_translations: sheets.iter().map(|sheet| sheet.success_count).sum(),
        failed_translations: sheets.iter().map(|sheet| sheet.failed_count).sum(),
        skipped_cells: sheets.iter().map(|sheet| sheet.skipped_count).sum(),
        // estimate: one call per chunk, retries not counted
        api_calls_made: if batch_size == 0 {
            0
        } else {
            sheets
                .iter()
                .map(|sheet| sheet.total_cells.div_ceil(batch_size))
                .sum()
        },
        total_processing_time: elapsed,
        average_time_per_cell: if total_cells == 0 {
            0.0
        } else {
            elapsed / total_cells as f64
        },
        characters_per_second: total_characters as f64 / elapsed.max(0.1),
    }
}

fn record_sheet_errors(response: &mut TranslationResponse, sheet: &SheetTranslationResult) {
    if let Some(message) = &sheet.error_message {
        response.add_error(
            "SHEET_TRANSLATION_FAILED",
            message.as_str(),
            Some(&sheet.sheet_name),
            None,
        );
        return;
    }

    let mut failures = sheet
        .cell_results
        .iter()
        .filter(|cell| cell.outcome == CellOutcome::Failed);
    if let Some(first) = failures.next() {
        let message = format!(
            "{} cell(s) failed in sheet {}: {}",
            sheet.failed_count,
            sheet.sheet_name,
            first.error_message.as_deref().unwrap_or("unknown error")
        );
        response.add_error(
            "CELL_TRANSLATION_FAILED",
            message,
            Some(&sheet.sheet_name),
            Some((first.row, first.column)),
        );
    }
}
