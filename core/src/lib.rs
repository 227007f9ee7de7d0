pub mod backup;
pub mod batch;
pub mod config;
pub mod files;
pub mod filters;
pub mod job;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod translation_log;
pub mod usecases;
pub mod validator;

#[cfg(test)]
mod integration_tests;
#[cfg(test)]
mod test_support;

pub use backup::{cleanup_backups, create_backup, verify_backup, BackupError, BackupOutcome};
pub use batch::{
    compute_optimal_batch_size, BatchProcessor, ChunkFingerprint, ChunkOutcome, ProcessedText,
    ProgressCallback, MAX_BATCH_SIZE, MIN_BATCH_SIZE,
};
pub use config::{
    BackupOptions, ConfigError, DetectionOptions, ProcessorOptions, TranslatorConfig,
};
pub use files::{
    ExtractedCell, FileContentProvider, FileProviderError, SheetCells, TranslatedCell,
};
pub use filters::{should_skip, CompiledFilters, ContentFilters, SkipReason};
pub use job::{JobEvent, JobMsg, JobRunner};
pub use model::{
    BatchSettings, CellOutcome, CellResult, CellUnit, ErrorInfo, FileCharacteristics, FileInfo,
    FileValidationResult, LanguageSettings, ResponseSummary, SheetInfo, SheetTranslationResult,
    TranslationMetrics, TranslationRequest, TranslationResponse, TranslationStatus,
};
pub use pipeline::{PipelinePlan, PipelineStage};
pub use provider::{
    LanguageDetection, ProviderError, ProviderKind, RetryPolicy, TranslationProvider,
    UsageStatistics,
};
pub use translation_log::{
    default_log_path, TranslationLog, TranslationLogEntry, TranslationLogMetrics,
};
pub use usecases::{
    CostEstimate, DetectLanguageUseCase, LanguageShare, ProcessFileUseCase, RequestValidator,
    SheetTranslator, TranslateTextUseCase, ValidateRequestUseCase,
};
pub use validator::{Severity, ValidationCode, ValidationEntry, ValidationReport, ValidationSummary};
