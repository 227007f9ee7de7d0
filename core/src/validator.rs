//! Validation report types shared by the request validator and pluggable
//! custom validators.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Stable machine-readable validation codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValidationCode {
    MissingFilePath,
    FileNotFound,
    NotAFile,
    UnsupportedFormat,
    /// More than 500 MB.
    FileTooLarge,
    /// More than 100 MB.
    LargeFile,
    NoReadPermission,
    FileValidationError,
    MissingTargetLanguage,
    SameSourceTargetLanguage,
    ConflictingLanguageSettings,
    UncommonSourceLanguage,
    UncommonTargetLanguage,
    InvalidBatchSize,
    LargeBatchSize,
    InvalidConcurrentRequests,
    HighConcurrentRequests,
    HighRetryAttempts,
    InvalidRetryDelay,
    LongRetryDelay,
    NoCellsToTranslate,
    TooManyCells,
    ManyCells,
    TooMuchText,
    MuchText,
    EmptyCellsFound,
    InvalidCellPositions,
    ValidatorError,
    ValidationFailed,
    /// Code emitted by a custom validator.
    Custom(String),
}

const KNOWN_CODES: &[ValidationCode] = &[
    ValidationCode::MissingFilePath,
    ValidationCode::FileNotFound,
    ValidationCode::NotAFile,
    ValidationCode::UnsupportedFormat,
    ValidationCode::FileTooLarge,
    ValidationCode::LargeFile,
    ValidationCode::NoReadPermission,
    ValidationCode::FileValidationError,
    ValidationCode::MissingTargetLanguage,
    ValidationCode::SameSourceTargetLanguage,
    ValidationCode::ConflictingLanguageSettings,
    ValidationCode::UncommonSourceLanguage,
    ValidationCode::UncommonTargetLanguage,
    ValidationCode::InvalidBatchSize,
    ValidationCode::LargeBatchSize,
    ValidationCode::InvalidConcurrentRequests,
    ValidationCode::HighConcurrentRequests,
    ValidationCode::HighRetryAttempts,
    ValidationCode::InvalidRetryDelay,
    ValidationCode::LongRetryDelay,
    ValidationCode::NoCellsToTranslate,
    ValidationCode::TooManyCells,
    ValidationCode::ManyCells,
    ValidationCode::TooMuchText,
    ValidationCode::MuchText,
    ValidationCode::EmptyCellsFound,
    ValidationCode::InvalidCellPositions,
    ValidationCode::ValidatorError,
    ValidationCode::ValidationFailed,
];

impl ValidationCode {
    pub fn as_str(&self) -> &str {
        match self {
            ValidationCode::MissingFilePath => "MISSING_FILE_PATH",
            ValidationCode::FileNotFound => "FILE_NOT_FOUND",
            ValidationCode::NotAFile => "NOT_A_FILE",
            ValidationCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ValidationCode::FileTooLarge => "FILE_TOO_LARGE",
            ValidationCode::LargeFile => "LARGE_FILE",
            ValidationCode::NoReadPermission => "NO_READ_PERMISSION",
            ValidationCode::FileValidationError => "FILE_VALIDATION_ERROR",
            ValidationCode::MissingTargetLanguage => "MISSING_TARGET_LANGUAGE",
            ValidationCode::SameSourceTargetLanguage => "SAME_SOURCE_TARGET_LANGUAGE",
            ValidationCode::ConflictingLanguageSettings => "CONFLICTING_LANGUAGE_SETTINGS",
            ValidationCode::UncommonSourceLanguage => "UNCOMMON_SOURCE_LANGUAGE",
            ValidationCode::UncommonTargetLanguage => "UNCOMMON_TARGET_LANGUAGE",
            ValidationCode::InvalidBatchSize => "INVALID_BATCH_SIZE",
            ValidationCode::LargeBatchSize => "LARGE_BATCH_SIZE",
            ValidationCode::InvalidConcurrentRequests => "INVALID_CONCURRENT_REQUESTS",
            ValidationCode::HighConcurrentRequests => "HIGH_CONCURRENT_REQUESTS",
            ValidationCode::HighRetryAttempts => "HIGH_RETRY_ATTEMPTS",
            ValidationCode::InvalidRetryDelay => "INVALID_RETRY_DELAY",
            ValidationCode::LongRetryDelay => "LONG_RETRY_DELAY",
            ValidationCode::NoCellsToTranslate => "NO_CELLS_TO_TRANSLATE",
            ValidationCode::TooManyCells => "TOO_MANY_CELLS",
            ValidationCode::ManyCells => "MANY_CELLS",
            ValidationCode::TooMuchText => "TOO_MUCH_TEXT",
            ValidationCode::MuchText => "MUCH_TEXT",
            ValidationCode::EmptyCellsFound => "EMPTY_CELLS_FOUND",
            ValidationCode::InvalidCellPositions => "INVALID_CELL_POSITIONS",
            ValidationCode::ValidatorError => "VALIDATOR_ERROR",
            ValidationCode::ValidationFailed => "VALIDATION_FAILED",
            ValidationCode::Custom(code) => code,
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ValidationCode {
    fn from(value: String) -> Self {
        KNOWN_CODES
            .iter()
            .find(|code| code.as_str() == value)
            .cloned()
            .unwrap_or(ValidationCode::Custom(value))
    }
}

impl From<&str> for ValidationCode {
    fn from(value: &str) -> Self {
        ValidationCode::from(value.to_string())
    }
}

impl From<ValidationCode> for String {
    fn from(code: ValidationCode) -> Self {
        code.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationEntry {
    pub severity: Severity,
    pub code: ValidationCode,
    pub message: String,
}

/// Accumulated INFO/WARNING/ERROR entries. Never signals failure by
/// returning an error; callers inspect [`ValidationReport::is_valid`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub results: Vec<ValidationEntry>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, severity: Severity, code: ValidationCode, message: impl Into<String>) {
        self.results.push(ValidationEntry {
            severity,
            code,
            message: message.into(),
        });
    }

    pub fn add_error(&mut self, code: ValidationCode, message: impl Into<String>) {
        self.add(Severity::Error, code, message);
    }

    pub fn add_warning(&mut self, code: ValidationCode, message: impl Into<String>) {
        self.add(Severity::Warning, code, message);
    }

    pub fn add_info(&mut self, code: ValidationCode, message: impl Into<String>) {
        self.add(Severity::Info, code, message);
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.results.extend(other.results);
    }

    pub fn has_errors(&self) -> bool {
        self.results
            .iter()
            .any(|entry| entry.severity == Severity::Error)
    }

    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    pub fn errors(&self) -> Vec<&ValidationEntry> {
        self.with_severity(Severity::Error)
    }

    pub fn warnings(&self) -> Vec<&ValidationEntry> {
        self.with_severity(Severity::Warning)
    }

    pub fn infos(&self) -> Vec<&ValidationEntry> {
        self.with_severity(Severity::Info)
    }

    fn with_severity(&self, severity: Severity) -> Vec<&ValidationEntry> {
        self.results
            .iter()
            .filter(|entry| entry.severity == severity)
            .collect()
    }

    pub fn has_code(&self, code: &ValidationCode) -> bool {
        self.results.iter().any(|entry| &entry.code == code)
    }

    /// Codes in emission order.
    pub fn codes(&self) -> Vec<&ValidationCode> {
        self.results.iter().map(|entry| &entry.code).collect()
    }

    pub fn summary(&self) -> ValidationSummary {
        let errors = self.errors();
        let warnings = self.warnings();
        ValidationSummary {
            is_valid: self.is_valid(),
            total_checks: self.results.len(),
            errors: errors.len(),
            warnings: warnings.len(),
            error_messages: errors.iter().map(|entry| entry.message.clone()).collect(),
            warning_messages: warnings.iter().map(|entry| entry.message.clone()).collect(),
            can_proceed: self.is_valid(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub is_valid: bool,
    pub total_checks: usize,
    pub errors: usize,
    pub warnings: usize,
    pub error_messages: Vec<String>,
    pub warning_messages: Vec<String>,
    pub can_proceed: bool,
}
