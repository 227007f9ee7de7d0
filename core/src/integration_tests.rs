//! Cross-module scenarios: filter, processor, orchestrators and validation
//! working together against the scripted provider.

use std::sync::{Arc, Mutex};

use crate::batch::{compute_optimal_batch_size, ProgressCallback};
use crate::filters::ContentFilters;
use crate::model::{
    BatchSettings, CellOutcome, CellUnit, LanguageSettings, TranslationRequest, TranslationStatus,
};
use crate::provider::ProviderError;
use crate::test_support::{processor_for, ScriptedProvider};
use crate::usecases::{SheetTranslator, TranslateTextUseCase, ValidateRequestUseCase};
use crate::validator::ValidationCode;

#[tokio::test]
async fn test_filtered_cells_pass_through_unchanged() {
    let mut request = TranslationRequest::simple("book.xlsx", Some("en"), "ja");
    for (row, text) in ["Hello", "[skip this]", "", "2024-01-01"].iter().enumerate() {
        request.add_cell("Sheet1", text, row as u32 + 1, 1);
    }
    let provider = Arc::new(ScriptedProvider::new());
    let use_case = TranslateTextUseCase::new(processor_for(provider, &request.batch_settings));

    let response = use_case.execute(&request).await;

    let sheet = &response.sheet_results[0];
    let texts: Vec<_> = sheet
        .cell_results
        .iter()
        .map(|cell| cell.translated_text.as_deref())
        .collect();
    assert_eq!(
        texts,
        vec![Some("HELLO"), Some("[skip this]"), Some(""), Some("2024-01-01")]
    );
    assert_eq!(sheet.skipped_count, 3);
    assert_eq!(sheet.success_count, 1);
    assert_eq!(response.status, TranslationStatus::Success);
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_cumulative_per_slice() {
    let provider = Arc::new(ScriptedProvider::new());
    let processor = processor_for(provider.clone(), &BatchSettings::default());
    processor.configure_batch_size(50);
    let texts: Vec<String> = (0..237).map(|i| format!("text {i}")).collect();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: ProgressCallback = Arc::new(move |done: usize, total: usize| {
        sink.lock().unwrap().push((done, total));
    });

    let translated = processor
        .process_texts(&texts, "ja", Some("en"), Some(callback))
        .await;

    assert_eq!(provider.calls(), 5);
    let sizes: Vec<usize> = provider.batches.lock().unwrap().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![50, 50, 50, 50, 37]);
    let counts: Vec<usize> = seen.lock().unwrap().iter().map(|(done, _)| *done).collect();
    assert_eq!(counts, vec![50, 100, 150, 200, 237]);
    assert!(seen.lock().unwrap().iter().all(|(_, total)| *total == 237));
    assert_eq!(translated.len(), 237);
    assert_eq!(translated[236], "TEXT 236");
}

#[tokio::test(start_paused = true)]
async fn test_failing_chunk_is_retried_then_marked_failed() {
    let provider = Arc::new(ScriptedProvider::new().failing_when(|texts| {
        texts
            .iter()
            .any(|text| text.starts_with("bad"))
            .then(|| ProviderError::Network("connection reset by peer".into()))
    }));
    let batch = BatchSettings {
        batch_size: 10,
        max_concurrent_requests: 1,
        retry_attempts: 3,
        ..BatchSettings::default()
    };
    let translator = SheetTranslator::new(processor_for(provider.clone(), &batch));
    let cells: Vec<CellUnit> = (0..30)
        .map(|i| {
            let text = if (10..20).contains(&i) {
                format!("bad {i}")
            } else {
                format!("good {i}")
            };
            CellUnit::new("Sheet1", text, i + 1, 1)
        })
        .collect();

    let result = translator
        .translate_sheet(
            "Sheet1",
            &cells,
            &LanguageSettings::new(Some("en"), "ja"),
            &batch,
            &ContentFilters::none(),
        )
        .await;

    let failing_calls = provider
        .batches
        .lock()
        .unwrap()
        .iter()
        .filter(|texts| texts[0].starts_with("bad"))
        .count();
    assert_eq!(failing_calls, 3);
    assert_eq!(result.failed_count, 10);
    assert_eq!(result.success_count, 20);
    for cell in &result.cell_results[10..20] {
        assert_eq!(cell.outcome, CellOutcome::Failed);
        assert_eq!(
            cell.error_message.as_deref(),
            Some("network error: connection reset by peer")
        );
    }
    assert_eq!(result.cell_results[25].translated_text.as_deref(), Some("GOOD 25"));
}

#[tokio::test]
async fn test_missing_target_language_invalidates_request() {
    let mut request = TranslationRequest::simple("book.xlsx", Some("en"), "");
    request.add_cell("Sheet1", "Hello", 1, 1);

    let report = ValidateRequestUseCase::default().execute(&request).await;

    assert!(!report.is_valid());
    let entry = report
        .errors()
        .into_iter()
        .find(|entry| entry.code == ValidationCode::MissingTargetLanguage)
        .unwrap();
    assert_eq!(entry.message, "Target language is required");
}

#[tokio::test(start_paused = true)]
async fn test_one_failed_sheet_gives_partial_success() {
    let provider = Arc::new(ScriptedProvider::new().failing_when(|texts| {
        texts
            .iter()
            .any(|text| text.starts_with("B"))
            .then(|| ProviderError::Other("unsupported language pair".into()))
    }));
    let mut request = TranslationRequest::simple("book.xlsx", Some("en"), "ja");
    request.content_filters = ContentFilters::none();
    for row in 1..=5 {
        request.add_cell("A", &format!("A{row}"), row, 1);
    }
    for row in 1..=3 {
        request.add_cell("B", &format!("B{row}"), row, 1);
    }
    let use_case = TranslateTextUseCase::new(processor_for(provider, &request.batch_settings));

    let response = use_case.execute(&request).await;

    assert_eq!(response.status, TranslationStatus::PartialSuccess);
    assert_eq!(response.metrics.successful_translations, 5);
    assert_eq!(response.metrics.failed_translations, 3);
    assert_eq!(response.successful_sheets().len(), 1);
    let summary = response.summary();
    assert_eq!(summary.failed_translations, 3);
    assert_eq!(summary.errors_count, 1);
    let writable = response.translations_by_sheet();
    assert_eq!(writable["A"].len(), 5);
    assert!(writable.get("B").is_none());
}

#[test]
fn test_optimal_batch_size_for_large_long_text_file() {
    assert_eq!(compute_optimal_batch_size(2000, 300.0, 10.0), 91);
}

#[tokio::test]
async fn test_sheet_accounting_always_adds_up() {
    let provider = Arc::new(ScriptedProvider::new().failing_when(|texts| {
        texts
            .iter()
            .any(|text| text == "fail")
            .then(|| ProviderError::Other("rejected".into()))
    }));
    let batch = BatchSettings {
        batch_size: 2,
        max_concurrent_requests: 3,
        retry_attempts: 1,
        ..BatchSettings::default()
    };
    let translator = SheetTranslator::new(processor_for(provider, &batch));
    let texts = ["ok", "[tag]", "fail", "ok", "", "https://example.com", "fine", "fail"];
    let cells: Vec<CellUnit> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| CellUnit::new("S", *text, i as u32 + 1, 1))
        .collect();

    let result = translator
        .translate_sheet(
            "S",
            &cells,
            &LanguageSettings::new(Some("en"), "ja"),
            &batch,
            &ContentFilters::default(),
        )
        .await;

    assert_eq!(result.total_cells, cells.len());
    assert_eq!(result.cell_results.len(), cells.len());
    assert_eq!(
        result.success_count + result.failed_count + result.skipped_count,
        result.total_cells
    );
    assert_eq!(result.skipped_count, 3);
    assert_eq!(result.failed_count, 4);
    assert_eq!(result.success_count, 1);
}
