//! Translation provider capability.
//!
//! Concrete vendor clients live outside this crate; they implement
//! [`TranslationProvider`] and are chosen when the use cases are composed.

pub mod retry;

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use retry::{
    evaluate_retry, parse_retry_after, RetryDecision, RetryError, RetryHint, RetryPolicy,
};

/// Language codes accepted without an "uncommon language" warning.
pub const COMMON_LANGUAGES: &[&str] = &[
    "en", "ja", "vi", "zh", "ko", "es", "fr", "de", "it", "pt", "ru", "ar", "hi", "th", "id",
    "ms", "tl", "auto",
];

pub fn is_common_language(code: &str) -> bool {
    COMMON_LANGUAGES.contains(&code.trim().to_ascii_lowercase().as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    DeepL,
    Google,
}

impl ProviderKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::DeepL => "DeepL",
            ProviderKind::Google => "Google Translate",
        }
    }

    /// List price in USD per million characters.
    pub fn cost_per_million_chars(&self) -> f64 {
        match self {
            ProviderKind::DeepL => 25.0,
            ProviderKind::Google => 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageDetection {
    pub language_code: String,
    /// In `[0, 1]`.
    pub confidence: f64,
}

impl LanguageDetection {
    pub fn new(language_code: impl Into<String>, confidence: f64) -> Self {
        Self {
            language_code: language_code.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn unknown() -> Self {
        Self {
            language_code: "unknown".into(),
            confidence: 0.0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.language_code == "unknown"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatistics {
    pub character_count: u64,
    pub character_limit: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("provider returned HTTP {status}: {message}")]
    Http { status: StatusCode, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),
    #[error("provider returned {actual} translations for {expected} texts")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Maps a failed HTTP exchange onto the error taxonomy. `retry_after` is
    /// the raw `Retry-After` header, if the server sent one.
    pub fn from_response(status: StatusCode, body: &str, retry_after: Option<&str>) -> Self {
        let message = body.trim().to_string();
        let hint = retry_after.and_then(|value| parse_retry_after(value, SystemTime::now()));
        match status {
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
                message,
                retry_after: hint,
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthorized(message),
            _ => ProviderError::Http { status, message },
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } => true,
            ProviderError::Http { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS,
            other => other.to_string().to_lowercase().contains("rate limit"),
        }
    }

    /// Classification consumed by [`evaluate_retry`].
    pub fn retry_class(&self) -> RetryError {
        if self.is_rate_limit() {
            let retry_hint = match self {
                ProviderError::RateLimited { retry_after, .. } => retry_after.map(RetryHint::new),
                _ => None,
            };
            return RetryError::Http {
                status: StatusCode::TOO_MANY_REQUESTS,
                retry_hint,
            };
        }

        match self {
            ProviderError::Http { status, .. } => RetryError::Http {
                status: *status,
                retry_hint: None,
            },
            ProviderError::Network(_) | ProviderError::Timeout(_) | ProviderError::Other(_) => {
                RetryError::Network { retry_hint: None }
            }
            ProviderError::RateLimited { .. }
            | ProviderError::UnsupportedLanguage(_)
            | ProviderError::Unauthorized(_)
            | ProviderError::LengthMismatch { .. } => RetryError::Fatal,
        }
    }
}

/// A translation vendor behind a fixed interface.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn translate_text(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> Result<String, ProviderError>;

    /// Translates `texts` preserving order and length. Fails wholesale.
    async fn translate_batch(
        &self,
        texts: &[String],
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> Result<Vec<String>, ProviderError> {
        let mut translated = Vec::with_capacity(texts.len());
        for text in texts {
            translated.push(self.translate_text(text, target_lang, source_lang).await?);
        }
        Ok(translated)
    }

    async fn detect_language(&self, text: &str) -> Result<LanguageDetection, ProviderError>;

    async fn supported_languages(&self) -> Result<Vec<String>, ProviderError> {
        Ok(COMMON_LANGUAGES
            .iter()
            .filter(|code| **code != "auto")
            .map(|code| code.to_string())
            .collect())
    }

    async fn usage_statistics(&self) -> Result<UsageStatistics, ProviderError> {
        Ok(UsageStatistics::default())
    }

    /// Estimated USD cost for translating `character_count` characters.
    fn estimate_cost(&self, character_count: usize) -> f64 {
        character_count as f64 / 1_000_000.0 * self.kind().cost_per_million_chars()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    #[async_trait]
    impl TranslationProvider for Upper {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Google
        }

        async fn translate_text(
            &self,
            text: &str,
            _target_lang: &str,
            _source_lang: Option<&str>,
        ) -> Result<String, ProviderError> {
            Ok(text.to_uppercase())
        }

        async fn detect_language(&self, _text: &str) -> Result<LanguageDetection, ProviderError> {
            Ok(LanguageDetection::new("en", 0.9))
        }
    }

    #[tokio::test]
    async fn default_batch_translates_in_order() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let out = Upper.translate_batch(&texts, "ja", None).await.unwrap();
        assert_eq!(out, vec!["A", "B"]);
        assert!(!Upper
            .supported_languages()
            .await
            .unwrap()
            .contains(&"auto".to_string()));
    }

    #[test]
    fn cost_uses_provider_price() {
        assert!((Upper.estimate_cost(1_000_000) - 20.0).abs() < f64::EPSILON);
        assert!((ProviderKind::DeepL.cost_per_million_chars() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rate_limits_are_detected_from_status_and_message() {
        let from_status = ProviderError::from_response(StatusCode::TOO_MANY_REQUESTS, "slow down", Some("7"));
        assert!(from_status.is_rate_limit());
        assert_eq!(
            from_status.retry_class(),
            RetryError::Http {
                status: StatusCode::TOO_MANY_REQUESTS,
                retry_hint: Some(RetryHint::new(Duration::from_secs(7))),
            }
        );

        let from_message = ProviderError::Other("Rate limit reached for key".into());
        assert!(from_message.is_rate_limit());
    }

    #[test]
    fn permanent_errors_are_fatal() {
        let unauthorized = ProviderError::from_response(StatusCode::FORBIDDEN, "bad key", None);
        assert_eq!(unauthorized.retry_class(), RetryError::Fatal);
        assert_eq!(
            ProviderError::UnsupportedLanguage("xx".into()).retry_class(),
            RetryError::Fatal
        );
        assert_eq!(
            ProviderError::Timeout(Duration::from_secs(1)).retry_class(),
            RetryError::Network { retry_hint: None }
        );
    }

    #[test]
    fn common_language_lookup_is_case_insensitive() {
        assert!(is_common_language("EN"));
        assert!(is_common_language("auto"));
        assert!(!is_common_language("xx"));
    }
}
