//! Batch processor: slices texts, drives the provider with retry and backoff,
//! and honours cancellation between slices.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time::{sleep, timeout};

use crate::config::ProcessorOptions;
use crate::model::{BatchSettings, CellOutcome};
use crate::provider::{evaluate_retry, ProviderError, RetryPolicy, TranslationProvider};

pub const MIN_BATCH_SIZE: usize = 10;
pub const MAX_BATCH_SIZE: usize = 200;
const BASE_BATCH_SIZE: f64 = 50.0;

/// Called with `(processed, total)` after every slice.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Identity of one chunk within one sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkFingerprint {
    pub sheet: String,
    pub chunk: usize,
}

impl ChunkFingerprint {
    pub fn new(sheet: impl Into<String>, chunk: usize) -> Self {
        Self {
            sheet: sheet.into(),
            chunk,
        }
    }
}

impl fmt::Display for ChunkFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.sheet, self.chunk)
    }
}

/// Result of one retry-wrapped provider call for a slice.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// Same length and order as the submitted texts.
    Translated(Vec<String>),
    Failed { message: String, attempts: u32 },
    /// Cancellation was observed before the provider was called.
    Cancelled,
}

/// One entry of [`BatchProcessor::process_texts_detailed`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedText {
    pub text: String,
    pub outcome: CellOutcome,
    pub error_message: Option<String>,
}

/// Heuristic batch size from content statistics, clamped to
/// `[MIN_BATCH_SIZE, MAX_BATCH_SIZE]`. Non-positive length or size inputs
/// leave their factor at 1.0.
pub fn compute_optimal_batch_size(total_texts: usize, avg_text_length: f64, file_size_mb: f64) -> usize {
    let count_factor = match total_texts {
        0..=99 => 0.6,
        100..=499 => 1.0,
        500..=999 => 1.5,
        _ => 2.0,
    };

    let length_factor = if !avg_text_length.is_finite() || avg_text_length <= 0.0 {
        1.0
    } else if avg_text_length < 50.0 {
        1.2
    } else if avg_text_length < 200.0 {
        1.0
    } else {
        // long texts risk the provider's per-call limit
        0.7
    };

    let size_factor = if !file_size_mb.is_finite() || file_size_mb <= 0.0 {
        1.0
    } else if file_size_mb < 1.0 {
        0.8
    } else if file_size_mb < 5.0 {
        1.0
    } else {
        1.3
    };

    let raw = BASE_BATCH_SIZE * count_factor * length_factor * size_factor;
    // absorb float noise such as 90.99999999999999
    let truncated = (raw + 1e-9).floor() as usize;
    truncated.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
}

struct InFlightGuard<'a> {
    registry: &'a Mutex<HashSet<ChunkFingerprint>>,
    fingerprint: ChunkFingerprint,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(
        registry: &'a Mutex<HashSet<ChunkFingerprint>>,
        fingerprint: &ChunkFingerprint,
    ) -> Option<Self> {
        let mut active = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(fingerprint.clone()) {
            return None;
        }
        Some(Self {
            registry,
            fingerprint: fingerprint.clone(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        active.remove(&self.fingerprint);
    }
}

pub struct BatchProcessor {
    provider: Arc<dyn TranslationProvider>,
    batch_size: AtomicUsize,
    max_concurrent: usize,
    policy: RetryPolicy,
    options: ProcessorOptions,
    cancel_requested: AtomicBool,
    in_flight: Mutex<HashSet<ChunkFingerprint>>,
    next_run: AtomicU64,
}

impl BatchProcessor {
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        settings: &BatchSettings,
        options: &ProcessorOptions,
    ) -> Self {
        Self {
            provider,
            batch_size: AtomicUsize::new(settings.batch_size.max(1)),
            max_concurrent: settings.max_concurrent_requests.max(1),
            policy: RetryPolicy::from_settings(settings, options),
            options: options.clone(),
            cancel_requested: AtomicBool::new(false),
            in_flight: Mutex::new(HashSet::new()),
            next_run: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> &Arc<dyn TranslationProvider> {
        &self.provider
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Retry policy for a request carrying its own batch settings.
    pub fn policy_for(&self, settings: &BatchSettings) -> RetryPolicy {
        RetryPolicy::from_settings(settings, &self.options)
    }

    pub fn configure_batch_size(&self, size: usize) {
        self.batch_size.store(size.max(1), Ordering::SeqCst);
        debug!("batch size set to {}", size.max(1));
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.load(Ordering::SeqCst)
    }

    /// Applies [`compute_optimal_batch_size`] and returns the chosen size.
    pub fn set_optimal_batch_size(&self, total_texts: usize, avg_text_length: f64, file_size_mb: f64) -> usize {
        let size = compute_optimal_batch_size(total_texts, avg_text_length, file_size_mb);
        info!(
            "optimal batch size {size} for {total_texts} texts (avg {avg_text_length:.1} chars, {file_size_mb:.2} MB)"
        );
        self.configure_batch_size(size);
        size
    }

    /// Stops new slices from starting. Calls already in flight complete.
    pub fn cancel(&self) {
        if !self.cancel_requested.swap(true, Ordering::SeqCst) {
            info!("cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Clears a previous cancellation before a new run.
    pub fn reset(&self) {
        self.cancel_requested.store(false, Ordering::SeqCst);
    }

    /// Fresh fingerprint scope, so chunks of concurrent runs sharing this
    /// processor never collide in the in-flight registry.
    pub(crate) fn next_scope(&self) -> String {
        format!("run-{}", self.next_run.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.options.pacing_delay_ms)
    }

    fn request_timeout(&self) -> Option<Duration> {
        match self.options.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    async fn call_provider(
        &self,
        texts: &[String],
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> Result<Vec<String>, ProviderError> {
        let call = self.provider.translate_batch(texts, target_lang, source_lang);
        let translated = match self.request_timeout() {
            Some(limit) => match timeout(limit, call).await {
                Ok(result) => result?,
                Err(_) => return Err(ProviderError::Timeout(limit)),
            },
            None => call.await?,
        };

        if translated.len() != texts.len() {
            return Err(ProviderError::LengthMismatch {
                expected: texts.len(),
                actual: translated.len(),
            });
        }
        Ok(translated)
    }

    /// Translates one slice with retry and backoff. Never returns an error:
    /// exhausted retries become [`ChunkOutcome::Failed`].
    pub async fn translate_chunk(
        &self,
        fingerprint: &ChunkFingerprint,
        texts: &[String],
        target_lang: &str,
        source_lang: Option<&str>,
        policy: RetryPolicy,
    ) -> ChunkOutcome {
        if texts.is_empty() {
            return ChunkOutcome::Translated(Vec::new());
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, fingerprint) else {
            warn!("chunk {fingerprint} is already in flight, refusing duplicate call");
            return ChunkOutcome::Failed {
                message: format!("chunk {fingerprint} is already being translated"),
                attempts: 0,
            };
        };

        let mut attempts = 0;
        loop {
            if self.is_cancelled() {
                debug!("chunk {fingerprint} cancelled after {attempts} attempt(s)");
                return ChunkOutcome::Cancelled;
            }

            attempts += 1;
            let err = match self.call_provider(texts, target_lang, source_lang).await {
                Ok(translated) => return ChunkOutcome::Translated(translated),
                Err(err) => err,
            };

            let decision = evaluate_retry(err.retry_class(), policy, attempts);
            if !decision.should_retry {
                error!(
                    "chunk {fingerprint} failed after {attempts} attempt(s) ({} texts): {err}",
                    texts.len()
                );
                return ChunkOutcome::Failed {
                    message: err.to_string(),
                    attempts,
                };
            }

            let wait = decision.total_wait();
            if decision.pause_ms > 0 {
                warn!(
                    "chunk {fingerprint} attempt {attempts}/{} rate limited: {err}; waiting {wait:?}",
                    policy.max_attempts
                );
            } else {
                warn!(
                    "chunk {fingerprint} attempt {attempts}/{} failed: {err}; retrying in {wait:?}",
                    policy.max_attempts
                );
            }
            sleep(wait).await;
        }
    }

    /// Translates `texts` in consecutive slices and returns one string per
    /// input, in input order. Failed or cancelled positions keep the source.
    pub async fn process_texts(
        &self,
        texts: &[String],
        target_lang: &str,
        source_lang: Option<&str>,
        on_progress: Option<ProgressCallback>,
    ) -> Vec<String> {
        self.process_texts_detailed(texts, target_lang, source_lang, on_progress)
            .await
            .into_iter()
            .map(|processed| processed.text)
            .collect()
    }

    /// Like [`Self::process_texts`] but keeps each position's outcome.
    /// Starting a run clears any earlier cancellation.
    pub async fn process_texts_detailed(
        &self,
        texts: &[String],
        target_lang: &str,
        source_lang: Option<&str>,
        on_progress: Option<ProgressCallback>,
    ) -> Vec<ProcessedText> {
        self.reset();
        let total = texts.len();
        let batch_size = self.batch_size();
        let scope = self.next_scope();
        let mut output: Vec<Option<ProcessedText>> = vec![None; total];

        let slice_count = total.div_ceil(batch_size);
        let mut processed = 0;
        for (index, slice) in texts.chunks(batch_size).enumerate() {
            if self.is_cancelled() {
                info!("stopping before slice {}/{slice_count}: cancelled", index + 1);
                break;
            }

            let fingerprint = ChunkFingerprint::new(scope.as_str(), index);
            let outcome = self
                .translate_chunk(&fingerprint, slice, target_lang, source_lang, self.policy)
                .await;
            let start = index * batch_size;
            fill_slice(&mut output[start..start + slice.len()], slice, outcome);

            processed += slice.len();
            if let Some(callback) = on_progress.as_ref() {
                callback(processed, total);
            }

            if index + 1 < slice_count && !self.pacing_delay().is_zero() {
                sleep(self.pacing_delay()).await;
            }
        }

        output
            .into_iter()
            .zip(texts)
            .map(|(slot, original)| {
                slot.unwrap_or_else(|| ProcessedText {
                    text: original.clone(),
                    outcome: CellOutcome::Cancelled,
                    error_message: None,
                })
            })
            .collect()
    }
}

fn fill_slice(slots: &mut [Option<ProcessedText>], originals: &[String], outcome: ChunkOutcome) {
    match outcome {
        ChunkOutcome::Translated(translated) => {
            for (slot, text) in slots.iter_mut().zip(translated) {
                *slot = Some(ProcessedText {
                    text,
                    outcome: CellOutcome::Translated,
                    error_message: None,
                });
            }
        }
        ChunkOutcome::Failed { message, .. } => {
            for (slot, original) in slots.iter_mut().zip(originals) {
                *slot = Some(ProcessedText {
                    text: original.clone(),
                    outcome: CellOutcome::Failed,
                    error_message: Some(message.clone()),
                });
            }
        }
        ChunkOutcome::Cancelled => {
            for (slot, original) in slots.iter_mut().zip(originals) {
                *slot = Some(ProcessedText {
                    text: original.clone(),
                    outcome: CellOutcome::Cancelled,
                    error_message: None,
                });
            }
        }
    }
}
