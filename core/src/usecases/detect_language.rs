use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::provider::{LanguageDetection, TranslationProvider};

/// Share of a single language across a set of texts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageShare {
    pub language_code: String,
    pub count: usize,
    pub avg_confidence: f64,
    pub high_confidence_count: usize,
    /// Of all texts.
    pub percentage: f64,
    /// Of all confidently detected texts.
    pub high_confidence_percentage: f64,
}

pub struct DetectLanguageUseCase {
    provider: Arc<dyn TranslationProvider>,
}

impl DetectLanguageUseCase {
    pub fn new(provider: Arc<dyn TranslationProvider>) -> Self {
        Self { provider }
    }

    /// Blank text and provider errors both yield `("unknown", 0.0)`.
    pub async fn execute(&self, text: &str) -> LanguageDetection {
        if text.trim().is_empty() {
            return LanguageDetection::unknown();
        }

        match self.provider.detect_language(text).await {
            Ok(detection) => {
                info!(
                    "detected {} ({:.2}) for {} chars",
                    detection.language_code,
                    detection.confidence,
                    text.chars().count()
                );
                detection
            }
            Err(err) => {
                warn!("language detection failed: {err}");
                LanguageDetection::unknown()
            }
        }
    }

    /// One detection per input, same order.
    pub async fn execute_batch(&self, texts: &[String]) -> Vec<LanguageDetection> {
        let mut detections = Vec::with_capacity(texts.len());
        for text in texts {
            detections.push(self.execute(text).await);
        }
        detections
    }

    /// Most frequent language among detections at or above `min_confidence`.
    /// Ties go to the language seen first.
    pub async fn detect_most_common_language(
        &self,
        texts: &[String],
        min_confidence: f64,
    ) -> Option<String> {
        let detections = self.execute_batch(texts).await;

        let mut counts: Vec<(String, usize)> = Vec::new();
        for detection in detections
            .iter()
            .filter(|d| !d.is_unknown() && d.confidence >= min_confidence)
        {
            match counts
                .iter_mut()
                .find(|(code, _)| *code == detection.language_code)
            {
                Some((_, count)) => *count += 1,
                None => counts.push((detection.language_code.clone(), 1)),
            }
        }

        let mut best: Option<(String, usize)> = None;
        for (code, count) in counts {
            if best.as_ref().map_or(true, |(_, top)| count > *top) {
                best = Some((code, count));
            }
        }

        match best {
            Some((code, count)) => {
                info!("most common language: {code} ({count} of {})", texts.len());
                Some(code)
            }
            None => {
                warn!("no language detected with confidence >= {min_confidence}");
                None
            }
        }
    }

    /// Per-language statistics, most frequent first.
    pub async fn analyze_language_distribution(
        &self,
        texts: &[String],
        min_confidence: f64,
    ) -> Vec<LanguageShare> {
        if texts.is_empty() {
            return Vec::new();
        }
        let detections = self.execute_batch(texts).await;

        let mut shares: Vec<(LanguageShare, f64)> = Vec::new();
        let mut confident_total = 0usize;
        for detection in &detections {
            let position = match shares
                .iter()
                .position(|(share, _)| share.language_code == detection.language_code)
            {
                Some(position) => position,
                None => {
                    shares.push((
                        LanguageShare {
                            language_code: detection.language_code.clone(),
                            count: 0,
                            avg_confidence: 0.0,
                            high_confidence_count: 0,
                            percentage: 0.0,
                            high_confidence_percentage: 0.0,
                        },
                        0.0,
                    ));
                    shares.len() - 1
                }
            };
            let (share, confidence_sum) = &mut shares[position];
            share.count += 1;
            *confidence_sum += detection.confidence;
            if detection.confidence >= min_confidence {
                share.high_confidence_count += 1;
                confident_total += 1;
            }
        }

        let mut result: Vec<LanguageShare> = shares
            .into_iter()
            .map(|(mut share, confidence_sum)| {
                share.avg_confidence = confidence_sum / share.count as f64;
                share.percentage = share.count as f64 / texts.len() as f64 * 100.0;
                share.high_confidence_percentage =
                    share.high_confidence_count as f64 / confident_total.max(1) as f64 * 100.0;
                share
            })
            .collect();
        result.sort_by(|a, b| b.count.cmp(&a.count));

        info!("language distribution: {} language(s)", result.len());
        result
    }

    /// More than one known language holds at least `threshold_percentage`
    /// of the confident detections.
    pub async fn is_multilingual_content(
        &self,
        texts: &[String],
        min_confidence: f64,
        threshold_percentage: f64,
    ) -> bool {
        let significant = self
            .analyze_language_distribution(texts, min_confidence)
            .await
            .iter()
            .filter(|share| {
                share.language_code != "unknown"
                    && share.high_confidence_percentage >= threshold_percentage
            })
            .count();
        significant > 1
    }
}
