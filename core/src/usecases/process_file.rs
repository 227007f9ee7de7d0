use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{error, info, warn};
use serde::Serialize;
use uuid::Uuid;

use super::detect_language::DetectLanguageUseCase;
use super::sheet::panic_message;
use super::translate::TranslateTextUseCase;
use super::validate::{RequestValidator, ValidateRequestUseCase};
use crate::batch::{BatchProcessor, ProgressCallback};
use crate::config::TranslatorConfig;
use crate::files::{FileContentProvider, SheetCells};
use crate::model::{CellUnit, FileInfo, TranslationRequest, TranslationResponse};
use crate::pipeline::{PipelinePlan, PipelineStage};
use crate::translation_log::TranslationLog;

/// Cost and time forecast for a request, from file analysis alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub estimated_characters: usize,
    pub estimated_cost: f64,
    pub estimated_time_seconds: f64,
    pub estimated_time_minutes: f64,
    pub file_complexity: f64,
    pub recommended_batch_size: usize,
    pub estimated_api_calls: usize,
    /// Set when analysis failed; every figure is then zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct StageFailure {
    stage: PipelineStage,
    reason: String,
    details: Vec<String>,
}

impl StageFailure {
    fn new(stage: PipelineStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
            details: Vec::new(),
        }
    }

    fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

/// End-to-end run over one workbook: validate, analyze, back up, extract,
/// translate, write and clean up.
pub struct ProcessFileUseCase {
    config: TranslatorConfig,
    files: Arc<dyn FileContentProvider>,
    validate: ValidateRequestUseCase,
    translate: TranslateTextUseCase,
    detect: DetectLanguageUseCase,
    log: Option<Arc<TranslationLog>>,
}

impl ProcessFileUseCase {
    pub fn new(
        config: TranslatorConfig,
        processor: Arc<BatchProcessor>,
        files: Arc<dyn FileContentProvider>,
    ) -> Self {
        let detect = DetectLanguageUseCase::new(processor.provider().clone());
        Self {
            config,
            files,
            validate: ValidateRequestUseCase::default(),
            translate: TranslateTextUseCase::new(processor),
            detect,
            log: None,
        }
    }

    pub fn with_validators(mut self, validators: Vec<Arc<dyn RequestValidator>>) -> Self {
        self.validate = ValidateRequestUseCase::new(validators);
        self
    }

    pub fn with_log(mut self, log: Arc<TranslationLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.translate = self.translate.with_progress(progress);
        self
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    pub fn processor(&self) -> &Arc<BatchProcessor> {
        self.translate.processor()
    }

    /// Stages a run of `request` will go through.
    pub fn plan(&self, request: &TranslationRequest, output_path: Option<&Path>) -> PipelinePlan {
        let file_name = request
            .file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| request.file_path.display().to_string());
        PipelinePlan::default_for(
            &file_name,
            request.language_settings.auto_detect_source,
            self.config.backup.enabled,
            output_path.is_some(),
        )
    }

    /// Never fails: a stage that cannot complete yields a `Failed` response
    /// naming that stage. Starting a run clears any earlier cancellation.
    pub async fn execute(
        &self,
        request: &TranslationRequest,
        output_path: Option<&Path>,
    ) -> TranslationResponse {
        self.processor().reset();
        let started_at = Utc::now();
        let plan = self.plan(request, output_path);
        info!(
            "{}: {}",
            plan.target,
            plan.stages
                .iter()
                .map(|stage| stage.label())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        let mut warnings = Vec::new();
        let outcome = AssertUnwindSafe(self.run(request, output_path, &mut warnings))
            .catch_unwind()
            .await;

        let mut response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(failure)) => {
                error!("{}", failure.stage.failure_message(&failure.reason));
                failed_response(request, started_at, &failure)
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!("processing aborted: {reason}");
                TranslationResponse::failed(
                    Uuid::new_v4().to_string(),
                    request.file_path.clone(),
                    started_at,
                    "PROCESSING_FAILED",
                    format!("Processing failed: {reason}"),
                )
            }
        };
        for warning in warnings {
            response.add_warning(warning);
        }

        info!(
            "processed {} in {:.2}s: {:?}",
            request.file_path.display(),
            (Utc::now() - started_at)
                .to_std()
                .map(|elapsed| elapsed.as_secs_f64())
                .unwrap_or(0.0),
            response.status
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
        output_path: Option<&Path>,
        warnings: &mut Vec<String>,
    ) -> Result<TranslationResponse, StageFailure> {
        let mut request = request.clone();
        let path = request.file_path.clone();

        info!("stage: {}", PipelineStage::Validate.label());
        let report = self.validate.execute(&request).await;
        if !report.is_valid() {
            let errors = report.errors();
            return Err(StageFailure::new(
                PipelineStage::Validate,
                format!("{} error(s)", errors.len()),
            )
            .with_details(errors.iter().map(|entry| entry.message.clone()).collect()));
        }

        info!("stage: {}", PipelineStage::Analyze.label());
        let file_info = self
            .files
            .analyze_file(&path)
            .await
            .map_err(|err| StageFailure::new(PipelineStage::Analyze, err.to_string()))?;
        if !file_info.validation_result.can_process() {
            return Err(
                StageFailure::new(PipelineStage::Analyze, "file cannot be processed")
                    .with_details(file_info.validation_result.errors.clone()),
            );
        }

        if self.config.backup.enabled {
            info!("stage: {}", PipelineStage::Backup.label());
            match self
                .files
                .create_backup(&path, self.config.backup.directory.as_deref())
                .await
            {
                Ok(backup) => info!("backup created: {}", backup.display()),
                Err(err) => {
                    warn!("failed to create backup: {err}");
                    warnings.push(format!("Failed to create backup: {err}"));
                }
            }
        }

        info!("stage: {}", PipelineStage::Extract.label());
        let sheet_names = if request.sheet_names.is_empty() {
            file_info
                .sheet_names()
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            request.sheet_names.clone()
        };
        let content = self
            .files
            .extract_content(&path, &sheet_names)
            .await
            .map_err(|err| StageFailure::new(PipelineStage::Extract, err.to_string()))?;

        info!("stage: {}", PipelineStage::PopulateCells.label());
        populate_cells(&mut request, &content);

        if request.language_settings.auto_detect_source {
            info!("stage: {}", PipelineStage::AutoDetectSourceLanguage.label());
            if let Some(warning) = self.auto_detect_source(&mut request).await {
                warn!("{warning}");
                warnings.push(warning);
            }
        }

        info!("stage: {}", PipelineStage::Translate.label());
        let mut response = self.translate.execute_in_run(&request).await;

        if let Some(output) = output_path {
            if response.is_successful() {
                info!("stage: {}", PipelineStage::ApplyTranslations.label());
                self.apply_translations(&path, &mut response, output).await;
            }
        }

        info!("stage: {}", PipelineStage::Cleanup.label());
        self.cleanup(&path).await;

        Ok(response)
    }

    /// Resolves the source language from a sample of cell texts. Returns a
    /// warning when no usable language was found.
    async fn auto_detect_source(&self, request: &mut TranslationRequest) -> Option<String> {
        let options = &self.config.detection;
        let sample: Vec<String> = request
            .cells
            .iter()
            .map(|cell| cell.text.clone())
            .filter(|text| !text.trim().is_empty())
            .take(options.sample_size)
            .collect();
        if sample.is_empty() {
            return Some("No text available to detect the source language".into());
        }

        match self
            .detect
            .detect_most_common_language(&sample, options.min_confidence)
            .await
        {
            Some(code)
                if code.eq_ignore_ascii_case(&request.language_settings.target_language) =>
            {
                Some(format!(
                    "Detected source language {code} matches the target language; source left unresolved"
                ))
            }
            Some(code) => {
                info!("auto-detected source language: {code}");
                request.language_settings.source_language = Some(code);
                None
            }
            None => {
                Some("Could not auto-detect source language with sufficient confidence".into())
            }
        }
    }

    async fn apply_translations(
        &self,
        path: &Path,
        response: &mut TranslationResponse,
        output: &Path,
    ) {
        let translations = response.translations_by_sheet();
        match self
            .files
            .apply_translations(path, &translations, output)
            .await
        {
            Ok(true) => {
                info!("translations written to {}", output.display());
                response.output_file_path = Some(output.to_path_buf());
            }
            Ok(false) => {
                warn!("writer declined to save {}", output.display());
                response.add_warning("Failed to save translated file");
            }
            Err(err) => {
                warn!("failed to save {}: {err}", output.display());
                response.add_warning(format!("Failed to save translated file: {err}"));
            }
        }
    }

    async fn cleanup(&self, path: &Path) {
        if let Err(err) = self.files.cleanup_temporary_files().await {
            warn!("cleanup of temporary files failed: {err}");
        }

        let backup_dir = self
            .config
            .backup
            .directory
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf));
        if let Some(dir) = backup_dir {
            match self
                .files
                .cleanup_backups(&dir, self.config.backup.max_age_days)
                .await
            {
                Ok(0) => {}
                Ok(removed) => info!("removed {removed} stale backup(s)"),
                Err(err) => warn!("backup cleanup failed: {err}"),
            }
        }
    }

    /// File analysis without processing. Falls back to filesystem facts with
    /// the failure recorded in the validation result.
    pub async fn get_file_analysis(&self, path: &Path) -> FileInfo {
        info!("analyzing {}", path.display());
        match self.files.analyze_file(path).await {
            Ok(info) => info,
            Err(err) => {
                error!("file analysis failed: {err}");
                let mut info = FileInfo::from_path(path);
                info.validation_result.is_valid = false;
                info.validation_result.errors.push(err.to_string());
                info
            }
        }
    }

    pub async fn estimate_processing_cost(&self, request: &TranslationRequest) -> CostEstimate {
        let file_info = match self.files.analyze_file(&request.file_path).await {
            Ok(info) => info,
            Err(err) => {
                error!("cost estimation failed: {err}");
                return CostEstimate {
                    error: Some(err.to_string()),
                    ..CostEstimate::default()
                };
            }
        };

        let characters = file_info.estimated_translation_characters;
        let seconds = file_info.estimate_processing_time(WORDS_PER_MINUTE);
        CostEstimate {
            estimated_characters: characters,
            estimated_cost: self.processor().provider().estimate_cost(characters),
            estimated_time_seconds: seconds,
            estimated_time_minutes: seconds / 60.0,
            file_complexity: file_info.calculate_complexity_score(),
            recommended_batch_size: file_info.characteristics.recommended_batch_size,
            estimated_api_calls: file_info.characteristics.estimated_api_calls,
            error: None,
        }
    }
}

const WORDS_PER_MINUTE: f64 = 1000.0;

/// Replaces the request's cells with the extracted ones that pass the
/// content filter.
fn populate_cells(request: &mut TranslationRequest, content: &[SheetCells]) {
    let filters = request.content_filters.compile();
    request.cells = content
        .iter()
        .flat_map(|sheet| {
            sheet
                .cells
                .iter()
                .filter(|cell| !filters.should_skip(&cell.text))
                .map(|cell| CellUnit::new(sheet.sheet_name.as_str(), cell.text.as_str(), cell.row, cell.column))
        })
        .collect();
    info!(
        "prepared {} cells across {} sheet(s)",
        request.cells.len(),
        content.len()
    );
}

fn failed_response(
    request: &TranslationRequest,
    started_at: DateTime<Utc>,
    failure: &StageFailure,
) -> TranslationResponse {
    let mut response = TranslationResponse::failed(
        Uuid::new_v4().to_string(),
        request.file_path.clone(),
        started_at,
        "PROCESSING_FAILED",
        failure.stage.failure_message(&failure.reason),
    );
    response.metrics.total_files = 1;
    for detail in &failure.details {
        response.add_error("VALIDATION_ERROR", detail.as_str(), None, None);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellOutcome, TranslationStatus};
    use crate::test_support::{processor_for, MemoryWorkbook, ScriptedProvider};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        request: TranslationRequest,
        output: PathBuf,
    }

    fn fixture(config: &TranslatorConfig, source: Option<&str>) -> Fixture {
        let dir = tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        fs::write(&path, b"PK").unwrap();
        let output = dir.path().join("book_ja.xlsx");
        let request = config.request_for(path, source, "ja");
        Fixture {
            _dir: dir,
            request,
            output,
        }
    }

    fn use_case(
        config: TranslatorConfig,
        provider: ScriptedProvider,
        workbook: MemoryWorkbook,
    ) -> (ProcessFileUseCase, Arc<MemoryWorkbook>) {
        let processor = processor_for(Arc::new(provider), &config.batch);
        let workbook = Arc::new(workbook);
        (
            ProcessFileUseCase::new(config, processor, workbook.clone()),
            workbook,
        )
    }

    #[tokio::test]
    async fn translates_and_writes_the_workbook() {
        let config = TranslatorConfig::default();
        let fx = fixture(&config, Some("en"));
        let workbook = MemoryWorkbook::new()
            .with_sheet("Menu", &["Start", "[ui_key]", "Options"])
            .with_sheet("Help", &["Press any key"]);
        let (use_case, workbook) = use_case(config, ScriptedProvider::new(), workbook);

        let response = use_case.execute(&fx.request, Some(&fx.output)).await;

        assert_eq!(response.status, TranslationStatus::Success);
        assert_eq!(response.output_file_path.as_deref(), Some(fx.output.as_path()));
        // filtered cells are dropped before translation
        assert_eq!(response.metrics.total_cells, 3);
        let applied = workbook.applied.lock().unwrap().clone().unwrap();
        assert_eq!(applied["Menu"].len(), 2);
        assert_eq!(applied["Menu"][1].translated_text, "OPTIONS");
        assert_eq!(applied["Menu"][1].row, 3);
        assert_eq!(applied["Help"][0].translated_text, "PRESS ANY KEY");
        assert_eq!(workbook.backups.load(Ordering::SeqCst), 1);
        assert_eq!(workbook.cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pipeline_runs_on_a_spawned_task_after_a_stale_cancel() {
        let config = TranslatorConfig::default();
        let fx = fixture(&config, Some("en"));
        let (use_case, _workbook) = use_case(
            config,
            ScriptedProvider::new(),
            MemoryWorkbook::new().with_sheet("Menu", &["Start", "Quit"]),
        );
        use_case.processor().cancel();
        let use_case = Arc::new(use_case);
        let request = fx.request.clone();
        let output = fx.output.clone();

        let handle =
            tokio::spawn(async move { use_case.execute(&request, Some(&output)).await });
        let response = handle.await.unwrap();

        assert_eq!(response.status, TranslationStatus::Success);
        assert_eq!(response.metrics.successful_translations, 2);
        assert_eq!(response.output_file_path.as_deref(), Some(fx.output.as_path()));
    }

    #[tokio::test]
    async fn invalid_request_fails_at_validation() {
        let config = TranslatorConfig::default();
        let mut fx = fixture(&config, Some("en"));
        fx.request.language_settings.target_language = String::new();
        let (use_case, workbook) =
            use_case(config, ScriptedProvider::new(), MemoryWorkbook::new().with_sheet("A", &["x"]));

        let response = use_case.execute(&fx.request, Some(&fx.output)).await;

        assert_eq!(response.status, TranslationStatus::Failed);
        assert_eq!(response.errors[0].error_type, "PROCESSING_FAILED");
        assert!(response.errors[0]
            .error_message
            .starts_with("Request validation failed"));
        assert!(response
            .errors
            .iter()
            .any(|error| error.error_type == "VALIDATION_ERROR"
                && error.error_message == "Target language is required"));
        assert_eq!(workbook.backups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn analysis_failure_names_the_stage() {
        let config = TranslatorConfig::default();
        let fx = fixture(&config, Some("en"));
        let mut workbook = MemoryWorkbook::new().with_sheet("A", &["x"]);
        workbook.fail_analysis = true;
        let (use_case, _) = use_case(config, ScriptedProvider::new(), workbook);

        let response = use_case.execute(&fx.request, None).await;

        assert_eq!(response.status, TranslationStatus::Failed);
        assert_eq!(
            response.errors[0].error_message,
            "File analysis failed: workbook is corrupted: broken central directory"
        );
    }

    #[tokio::test]
    async fn best_effort_stages_only_warn() {
        let config = TranslatorConfig::default();
        let fx = fixture(&config, Some("en"));
        let mut workbook = MemoryWorkbook::new().with_sheet("A", &["hello"]);
        workbook.fail_backup = true;
        workbook.fail_apply = true;
        let (use_case, _) = use_case(config, ScriptedProvider::new(), workbook);

        let response = use_case.execute(&fx.request, Some(&fx.output)).await;

        assert_eq!(response.status, TranslationStatus::Success);
        assert!(response.output_file_path.is_none());
        assert_eq!(response.warnings.len(), 2);
        assert!(response.warnings.iter().any(|w| w.starts_with("Failed to create backup")));
        assert!(response
            .warnings
            .iter()
            .any(|w| w.starts_with("Failed to save translated file")));
    }

    #[tokio::test]
    async fn auto_detects_the_source_language() {
        let config = TranslatorConfig::default();
        let fx = fixture(&config, None);
        let provider = ScriptedProvider::new()
            .detecting("Hello", "en", 0.95)
            .detecting("Goodbye", "en", 0.9);
        let workbook = MemoryWorkbook::new().with_sheet("A", &["Hello", "Goodbye"]);
        let (use_case, _) = use_case(config, provider, workbook);

        let response = use_case.execute(&fx.request, None).await;

        assert_eq!(response.status, TranslationStatus::Success);
        assert!(response.warnings.is_empty());
        let cell = &response.sheet_results[0].cell_results[0];
        assert_eq!(cell.detected_source_language.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn undetectable_source_only_warns() {
        let config = TranslatorConfig::default();
        let fx = fixture(&config, None);
        let provider = ScriptedProvider::new().detecting("Hello", "en", 0.3);
        let workbook = MemoryWorkbook::new().with_sheet("A", &["Hello"]);
        let (use_case, _) = use_case(config, provider, workbook);

        let response = use_case.execute(&fx.request, None).await;

        assert_eq!(response.status, TranslationStatus::Success);
        assert_eq!(
            response.warnings,
            vec!["Could not auto-detect source language with sufficient confidence"]
        );
        assert_eq!(
            response.sheet_results[0].cell_results[0].outcome,
            CellOutcome::Translated
        );
    }

    #[tokio::test]
    async fn source_matching_target_is_not_applied() {
        let config = TranslatorConfig::default();
        let fx = fixture(&config, None);
        let provider = ScriptedProvider::new().detecting("こんにちは", "ja", 0.99);
        let workbook = MemoryWorkbook::new().with_sheet("A", &["こんにちは"]);
        let (use_case, _) = use_case(config, provider, workbook);

        let response = use_case.execute(&fx.request, None).await;

        assert_eq!(response.warnings.len(), 1);
        assert!(response.warnings[0].contains("matches the target language"));
        assert_eq!(
            response.sheet_results[0].cell_results[0].detected_source_language,
            None
        );
    }

    #[tokio::test]
    async fn unknown_sheet_fails_extraction() {
        let config = TranslatorConfig::default();
        let mut fx = fixture(&config, Some("en"));
        fx.request.sheet_names = vec!["Missing".into()];
        let (use_case, _) =
            use_case(config, ScriptedProvider::new(), MemoryWorkbook::new().with_sheet("A", &["x"]));

        let response = use_case.execute(&fx.request, None).await;

        assert_eq!(
            response.errors[0].error_message,
            "Content extraction failed: sheet not found: Missing"
        );
    }

    #[tokio::test]
    async fn estimates_cost_from_analysis() {
        let config = TranslatorConfig::default();
        let fx = fixture(&config, Some("en"));
        let workbook = MemoryWorkbook::new().with_sheet("A", &["aaaaa", "bbbbb"]);
        let (use_case, _) = use_case(config, ScriptedProvider::new(), workbook);

        let estimate = use_case.estimate_processing_cost(&fx.request).await;

        assert_eq!(estimate.estimated_characters, 10);
        assert!((estimate.estimated_cost - 10.0 * 25.0 / 1_000_000.0).abs() < 1e-12);
        assert!((estimate.estimated_time_seconds - 0.144).abs() < 1e-9);
        assert_eq!(estimate.recommended_batch_size, 28);
        assert_eq!(estimate.estimated_api_calls, 1);
        assert!(estimate.error.is_none());
    }

    #[tokio::test]
    async fn failed_analysis_is_reported_not_raised() {
        let config = TranslatorConfig::default();
        let fx = fixture(&config, Some("en"));
        let mut workbook = MemoryWorkbook::new();
        workbook.fail_analysis = true;
        let (use_case, _) = use_case(config, ScriptedProvider::new(), workbook);

        let estimate = use_case.estimate_processing_cost(&fx.request).await;
        assert_eq!(estimate.estimated_characters, 0);
        assert!(estimate.error.is_some());

        let info = use_case.get_file_analysis(&fx.request.file_path).await;
        assert!(!info.validation_result.is_valid);
        assert_eq!(info.file_size, 2);
        assert_eq!(info.validation_result.errors.len(), 1);
    }
}
