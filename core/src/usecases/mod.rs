pub mod detect_language;
pub mod process_file;
pub mod sheet;
pub mod translate;
pub mod validate;

pub use detect_language::{DetectLanguageUseCase, LanguageShare};
pub use process_file::{CostEstimate, ProcessFileUseCase};
pub use sheet::SheetTranslator;
pub use translate::TranslateTextUseCase;
pub use validate::{RequestValidator, ValidateRequestUseCase};
