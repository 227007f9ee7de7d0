use std::fs::{self, File};
use std::io::ErrorKind;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use log::{error, info};

use super::sheet::panic_message;
use crate::model::file_info::{file_extension, SUPPORTED_EXTENSIONS};
use crate::model::TranslationRequest;
use crate::provider::is_common_language;
use crate::validator::{ValidationCode, ValidationReport};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const MAX_FILE_SIZE_MB: f64 = 500.0;
const LARGE_FILE_SIZE_MB: f64 = 100.0;
const LARGE_BATCH_SIZE: usize = 100;
const HIGH_CONCURRENT_REQUESTS: usize = 10;
const HIGH_RETRY_ATTEMPTS: u32 = 5;
const LONG_RETRY_DELAY_SECS: f64 = 10.0;
const MAX_CELLS: usize = 50_000;
const MANY_CELLS: usize = 10_000;
const MAX_CHARACTERS: usize = 1_000_000;
const MANY_CHARACTERS: usize = 100_000;
const REPORTED_POSITIONS: usize = 10;

/// Extra checks plugged in after the built-in rules.
#[async_trait]
pub trait RequestValidator: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, request: &TranslationRequest) -> anyhow::Result<ValidationReport>;
}

/// Pre-flight checks for a [`TranslationRequest`]. Findings are collected in
/// the report; nothing here returns an error.
pub struct ValidateRequestUseCase {
    validators: Vec<Arc<dyn RequestValidator>>,
}

impl Default for ValidateRequestUseCase {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ValidateRequestUseCase {
    pub fn new(validators: Vec<Arc<dyn RequestValidator>>) -> Self {
        Self { validators }
    }

    pub async fn execute(&self, request: &TranslationRequest) -> ValidationReport {
        info!("validating request for {}", request.file_path.display());

        let outcome = AssertUnwindSafe(self.run(request)).catch_unwind().await;
        let report = match outcome {
            Ok(report) => report,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!("validation aborted: {reason}");
                let mut report = ValidationReport::new();
                report.add_error(
                    ValidationCode::ValidationFailed,
                    format!("Validation process failed: {reason}"),
                );
                report
            }
        };

        info!(
            "validation finished: valid={}, {} error(s), {} warning(s)",
            report.is_valid(),
            report.errors().len(),
            report.warnings().len()
        );
        report
    }

    async fn run(&self, request: &TranslationRequest) -> ValidationReport {
        let mut report = ValidationReport::new();
        check_file(request, &mut report);
        check_languages(request, &mut report);
        check_batch_settings(request, &mut report);
        check_content(request, &mut report);

        for validator in &self.validators {
            match validator.validate(request).await {
                Ok(extra) => report.merge(extra),
                Err(err) => {
                    error!("validator {} failed: {err:#}", validator.name());
                    report.add_error(
                        ValidationCode::ValidatorError,
                        format!("Validator {} failed: {err}", validator.name()),
                    );
                }
            }
        }
        report
    }
}

fn check_file(request: &TranslationRequest, report: &mut ValidationReport) {
    let path = request.file_path.as_path();
    if path.as_os_str().is_empty() {
        report.add_error(ValidationCode::MissingFilePath, "File path is required");
        return;
    }

    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            report.add_error(
                ValidationCode::FileNotFound,
                format!("File does not exist: {}", path.display()),
            );
            return;
        }
        Err(err) => {
            report.add_error(
                ValidationCode::FileValidationError,
                format!("File validation failed: {err}"),
            );
            return;
        }
    };
    let shown = display_path(path);

    if !metadata.is_file() {
        report.add_error(ValidationCode::NotAFile, format!("Path is not a file: {shown}"));
        return;
    }

    let extension = file_extension(path);
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        report.add_error(
            ValidationCode::UnsupportedFormat,
            format!(
                "Unsupported file format: .{extension}. Supported formats: {}",
                SUPPORTED_EXTENSIONS
                    .iter()
                    .map(|ext| format!(".{ext}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
    }

    let size_mb = metadata.len() as f64 / BYTES_PER_MB;
    if size_mb > MAX_FILE_SIZE_MB {
        report.add_error(
            ValidationCode::FileTooLarge,
            format!("File too large ({size_mb:.1} MB). Maximum supported size is 500 MB."),
        );
    } else if size_mb > LARGE_FILE_SIZE_MB {
        report.add_warning(
            ValidationCode::LargeFile,
            format!("Large file detected ({size_mb:.1} MB). Processing may take longer."),
        );
    }

    match File::open(path) {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            report.add_error(
                ValidationCode::NoReadPermission,
                format!("No read permission for file: {shown}"),
            );
        }
        Err(err) => {
            report.add_error(
                ValidationCode::FileValidationError,
                format!("File validation failed: {err}"),
            );
        }
    }
}

fn display_path(path: &Path) -> String {
    dunce::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

fn check_languages(request: &TranslationRequest, report: &mut ValidationReport) {
    let languages = &request.language_settings;
    let target = languages.target_language.trim();
    let source = languages
        .source_language
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty());

    if target.is_empty() {
        report.add_error(ValidationCode::MissingTargetLanguage, "Target language is required");
    } else if !is_common_language(target) {
        report.add_warning(
            ValidationCode::UncommonTargetLanguage,
            format!("Uncommon target language: {target}. Please verify this is correct."),
        );
    }

    if let Some(source) = source {
        if !is_common_language(source) {
            report.add_warning(
                ValidationCode::UncommonSourceLanguage,
                format!("Uncommon source language: {source}. Please verify this is correct."),
            );
        }
        if source.eq_ignore_ascii_case(target) {
            report.add_error(
                ValidationCode::SameSourceTargetLanguage,
                "Source and target languages cannot be the same",
            );
        }
        if languages.auto_detect_source {
            report.add_warning(
                ValidationCode::ConflictingLanguageSettings,
                "Auto-detect is enabled but source language is specified. Source language will be ignored.",
            );
        }
    }
}

fn check_batch_settings(request: &TranslationRequest, report: &mut ValidationReport) {
    let batch = &request.batch_settings;

    if batch.batch_size == 0 {
        report.add_error(ValidationCode::InvalidBatchSize, "Batch size must be greater than 0");
    } else if batch.batch_size > LARGE_BATCH_SIZE {
        report.add_warning(
            ValidationCode::LargeBatchSize,
            format!(
                "Large batch size ({}). Consider using smaller batches for better performance.",
                batch.batch_size
            ),
        );
    }

    if batch.max_concurrent_requests == 0 {
        report.add_error(
            ValidationCode::InvalidConcurrentRequests,
            "Max concurrent requests must be greater than 0",
        );
    } else if batch.max_concurrent_requests > HIGH_CONCURRENT_REQUESTS {
        report.add_warning(
            ValidationCode::HighConcurrentRequests,
            format!(
                "High concurrent requests ({}). This may trigger rate limits.",
                batch.max_concurrent_requests
            ),
        );
    }

    if batch.retry_attempts > HIGH_RETRY_ATTEMPTS {
        report.add_warning(
            ValidationCode::HighRetryAttempts,
            format!(
                "High retry attempts ({}). This may slow down processing.",
                batch.retry_attempts
            ),
        );
    }

    if !batch.retry_delay_seconds.is_finite() || batch.retry_delay_seconds < 0.0 {
        report.add_error(ValidationCode::InvalidRetryDelay, "Retry delay cannot be negative");
    } else if batch.retry_delay_seconds > LONG_RETRY_DELAY_SECS {
        report.add_warning(
            ValidationCode::LongRetryDelay,
            format!(
                "Long retry delay ({}s). This may slow down processing.",
                batch.retry_delay_seconds
            ),
        );
    }
}

fn check_content(request: &TranslationRequest, report: &mut ValidationReport) {
    if request.cells.is_empty() {
        report.add_warning(
            ValidationCode::NoCellsToTranslate,
            "No cells specified for translation",
        );
        return;
    }

    let cell_count = request.total_cells();
    if cell_count > MAX_CELLS {
        report.add_error(
            ValidationCode::TooManyCells,
            format!("Too many cells to translate ({cell_count}). Maximum supported is 50,000 cells."),
        );
    } else if cell_count > MANY_CELLS {
        report.add_warning(
            ValidationCode::ManyCells,
            format!(
                "Large number of cells to translate ({cell_count}). Processing may take significant time."
            ),
        );
    }

    let characters = request.total_characters();
    if characters > MAX_CHARACTERS {
        report.add_error(
            ValidationCode::TooMuchText,
            format!(
                "Too much text to translate ({characters} characters). Maximum supported is 1,000,000 characters."
            ),
        );
    } else if characters > MANY_CHARACTERS {
        report.add_warning(
            ValidationCode::MuchText,
            format!(
                "Large amount of text to translate ({characters} characters). Processing may take significant time."
            ),
        );
    }

    let empty = request
        .cells
        .iter()
        .filter(|cell| cell.text.trim().is_empty())
        .count();
    if empty > 0 {
        report.add_info(
            ValidationCode::EmptyCellsFound,
            format!("Found {empty} empty cells that will be skipped"),
        );
    }

    let invalid: Vec<usize> = request
        .cells
        .iter()
        .enumerate()
        .filter(|(_, cell)| cell.row < 1 || cell.column < 1)
        .map(|(index, _)| index)
        .collect();
    if !invalid.is_empty() {
        let shown: Vec<String> = invalid
            .iter()
            .take(REPORTED_POSITIONS)
            .map(usize::to_string)
            .collect();
        let more = if invalid.len() > REPORTED_POSITIONS { ", ..." } else { "" };
        report.add_error(
            ValidationCode::InvalidCellPositions,
            format!(
                "Invalid cell positions found at indices: [{}{more}]",
                shown.join(", ")
            ),
        );
    }
}
