use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use log::{debug, error, info};

use crate::batch::{BatchProcessor, ChunkFingerprint, ChunkOutcome, ProgressCallback};
use crate::filters::{CompiledFilters, ContentFilters};
use crate::model::{BatchSettings, CellResult, CellUnit, LanguageSettings, SheetTranslationResult};
use crate::provider::RetryPolicy;

/// Translates the cells of one sheet chunk by chunk.
///
/// Up to `max_concurrent_requests` chunks run at once. Results are written
/// into slots indexed by chunk position, so output order never depends on
/// completion order.
pub struct SheetTranslator {
    processor: Arc<BatchProcessor>,
    progress: Option<ProgressCallback>,
}

struct ChunkJob<'a> {
    sheet_name: &'a str,
    /// Keeps fingerprints of concurrent runs apart.
    scope: String,
    filters: &'a CompiledFilters,
    languages: &'a LanguageSettings,
    policy: RetryPolicy,
    done: &'a AtomicUsize,
    total: usize,
}

impl SheetTranslator {
    pub fn new(processor: Arc<BatchProcessor>) -> Self {
        Self {
            processor,
            progress: None,
        }
    }

    /// Receives `(cells done, cells in sheet)` after every chunk.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Honours the processor's cancellation flag but never clears it; the
    /// run that owns the processor does that.
    pub async fn translate_sheet(
        &self,
        sheet_name: &str,
        cells: &[CellUnit],
        languages: &LanguageSettings,
        settings: &BatchSettings,
        filters: &ContentFilters,
    ) -> SheetTranslationResult {
        let started = Instant::now();
        info!("translating sheet {sheet_name:?}: {} cells", cells.len());

        let outcome = AssertUnwindSafe(self.run(sheet_name, cells, languages, settings, filters))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(results)) => SheetTranslationResult::from_results(
                sheet_name,
                results,
                started.elapsed().as_secs_f64(),
            ),
            Ok(Err(message)) => {
                error!("sheet {sheet_name:?} failed: {message}");
                SheetTranslationResult::failed_sheet(
                    sheet_name,
                    cells,
                    &message,
                    started.elapsed().as_secs_f64(),
                )
            }
            Err(panic) => {
                let message = format!(
                    "Unexpected error while translating sheet: {}",
                    panic_message(panic.as_ref())
                );
                error!("sheet {sheet_name:?} failed: {message}");
                SheetTranslationResult::failed_sheet(
                    sheet_name,
                    cells,
                    &message,
                    started.elapsed().as_secs_f64(),
                )
            }
        };

        info!(
            "sheet {sheet_name:?} done: {} translated, {} failed, {} skipped in {:.2}s",
            result.success_count,
            result.failed_count,
            result.skipped_count,
            result.processing_time_seconds
        );
        result
    }

    async fn run(
        &self,
        sheet_name: &str,
        cells: &[CellUnit],
        languages: &LanguageSettings,
        settings: &BatchSettings,
        filters: &ContentFilters,
    ) -> Result<Vec<CellResult>, String> {
        if settings.batch_size == 0 {
            return Err("Batch size must be greater than 0".into());
        }

        let compiled = filters.compile();
        let done = AtomicUsize::new(0);
        let job = ChunkJob {
            sheet_name,
            scope: self.processor.next_scope(),
            filters: &compiled,
            languages,
            policy: self.processor.policy_for(settings),
            done: &done,
            total: cells.len(),
        };
        let job = &job;
        let concurrency = settings.max_concurrent_requests.max(1);
        let chunk_count = cells.len().div_ceil(settings.batch_size);

        // owned and boxed so the whole future stays `Send` for tokio::spawn
        let chunks: Vec<(usize, Vec<CellUnit>)> = cells
            .chunks(settings.batch_size)
            .map(<[CellUnit]>::to_vec)
            .enumerate()
            .collect();
        let finished: Vec<(usize, Vec<CellResult>)> = stream::iter(chunks)
            .map(|(index, chunk)| {
                async move {
                    let results = self.translate_chunk(job, index, &chunk).await;
                    (index, results)
                }
                .boxed()
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut slots: Vec<Option<Vec<CellResult>>> = vec![None; chunk_count];
        for (index, results) in finished {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(results);
            }
        }

        let mut ordered = Vec::with_capacity(cells.len());
        for (index, slot) in slots.into_iter().enumerate() {
            let results = slot.ok_or_else(|| format!("chunk {index} produced no results"))?;
            ordered.extend(results);
        }
        if ordered.len() != cells.len() {
            return Err(format!(
                "expected {} cell results, got {}",
                cells.len(),
                ordered.len()
            ));
        }
        Ok(ordered)
    }

    async fn translate_chunk(
        &self,
        job: &ChunkJob<'_>,
        index: usize,
        chunk: &[CellUnit],
    ) -> Vec<CellResult> {
        let mut results: Vec<Option<CellResult>> = vec![None; chunk.len()];
        let mut pending = Vec::new();
        for (position, cell) in chunk.iter().enumerate() {
            if job.filters.should_skip(&cell.text) {
                results[position] = Some(CellResult::skipped(cell));
            } else {
                pending.push(position);
            }
        }

        if !pending.is_empty() {
            let texts: Vec<String> = pending
                .iter()
                .map(|&position| chunk[position].text.clone())
                .collect();
            let fingerprint =
                ChunkFingerprint::new(format!("{}/{}", job.scope, job.sheet_name), index);
            let source = job.languages.source_language.as_deref();

            let started = Instant::now();
            let outcome = if self.processor.is_cancelled() {
                ChunkOutcome::Cancelled
            } else {
                self.processor
                    .translate_chunk(
                        &fingerprint,
                        &texts,
                        &job.languages.target_language,
                        source,
                        job.policy,
                    )
                    .await
            };
            let per_cell = started.elapsed().as_secs_f64() / pending.len() as f64;

            match outcome {
                ChunkOutcome::Translated(translated) => {
                    for (&position, text) in pending.iter().zip(translated) {
                        results[position] = Some(CellResult::translated(
                            &chunk[position],
                            text,
                            job.languages.source_language.clone(),
                            per_cell,
                        ));
                    }
                }
                ChunkOutcome::Failed { message, .. } => {
                    for &position in &pending {
                        results[position] =
                            Some(CellResult::failed(&chunk[position], message.as_str()));
                    }
                }
                ChunkOutcome::Cancelled => {
                    debug!("chunk {fingerprint} not started: cancelled");
                    for &position in &pending {
                        results[position] = Some(CellResult::cancelled(&chunk[position]));
                    }
                }
            }
        }

        let processed = job.done.fetch_add(chunk.len(), Ordering::SeqCst) + chunk.len();
        if let Some(progress) = &self.progress {
            progress(processed, job.total);
        }

        results
            .into_iter()
            .zip(chunk)
            .map(|(result, cell)| result.unwrap_or_else(|| CellResult::failed(cell, "cell was not processed")))
            .collect()
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
