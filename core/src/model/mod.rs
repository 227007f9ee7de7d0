pub mod file_info;
pub mod request;
pub mod response;

pub use file_info::{FileCharacteristics, FileInfo, FileValidationResult, SheetInfo};
pub use request::{
    BatchSettings, CellUnit, LanguageSettings, TranslationRequest, DEFAULT_SHEET_NAME,
};
pub use response::{
    CellOutcome, CellResult, ErrorInfo, ResponseSummary, SheetTranslationResult,
    TranslationMetrics, TranslationResponse, TranslationStatus,
};
