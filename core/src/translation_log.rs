//! JSONL history and running metrics for translation runs.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::model::{TranslationResponse, TranslationStatus};

/// One line of the history file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationLogEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub status: TranslationStatus,
    pub file: PathBuf,
    pub output_file: Option<PathBuf>,
    pub sheets: usize,
    pub total_cells: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub characters: usize,
    pub processing_time: f64,
    pub errors: Vec<String>,
}

impl From<&TranslationResponse> for TranslationLogEntry {
    fn from(response: &TranslationResponse) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: response.request_id.clone(),
            status: response.status,
            file: response.file_path.clone(),
            output_file: response.output_file_path.clone(),
            sheets: response.sheet_results.len(),
            total_cells: response.metrics.total_cells,
            successful: response.metrics.successful_translations,
            failed: response.metrics.failed_translations,
            skipped: response.metrics.skipped_cells,
            characters: response.metrics.total_characters,
            processing_time: response.total_processing_time(),
            errors: response
                .errors
                .iter()
                .map(|error| format!("{}: {}", error.error_type, error.error_message))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranslationLogMetrics {
    pub total_runs: u64,
    pub total_cells: u64,
    pub total_characters: u64,
    pub successful_cells: u64,
    pub failed_cells: u64,
    pub by_status: BTreeMap<String, u64>,
}

impl TranslationLogMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: &TranslationLogEntry) {
        self.total_runs += 1;
        self.total_cells += entry.total_cells as u64;
        self.total_characters += entry.characters as u64;
        self.successful_cells += entry.successful as u64;
        self.failed_cells += entry.failed as u64;
        let status = serde_json::to_value(entry.status)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{:?}", entry.status));
        *self.by_status.entry(status).or_insert(0) += 1;
    }

    pub fn cell_failure_rate(&self) -> f64 {
        let attempted = self.successful_cells + self.failed_cells;
        if attempted == 0 {
            0.0
        } else {
            self.failed_cells as f64 / attempted as f64
        }
    }
}

/// Append-only run log. Passed explicitly to the use cases that record runs.
pub struct TranslationLog {
    log_file: Mutex<Option<BufWriter<File>>>,
    metrics: Mutex<TranslationLogMetrics>,
}

impl TranslationLog {
    /// Metrics only, no file.
    pub fn in_memory() -> Self {
        Self {
            log_file: Mutex::new(None),
            metrics: Mutex::new(TranslationLogMetrics::new()),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            log_file: Mutex::new(Some(BufWriter::new(file))),
            metrics: Mutex::new(TranslationLogMetrics::new()),
        })
    }

    /// Appends one entry and updates metrics. Metrics are updated even when
    /// the file write fails.
    pub fn record(&self, response: &TranslationResponse) -> io::Result<()> {
        let entry = TranslationLogEntry::from(response);

        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record(&entry);
        }

        let mut guard = match self.log_file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(writer) = guard.as_mut() {
            let json = serde_json::to_string(&entry)?;
            writeln!(writer, "{json}")?;
            writer.flush()?;
        }
        Ok(())
    }

    pub fn metrics(&self) -> TranslationLogMetrics {
        self.metrics
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn reset_metrics(&self) {
        if let Ok(mut guard) = self.metrics.lock() {
            *guard = TranslationLogMetrics::new();
        }
    }

    pub fn export_metrics_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.metrics())
    }
}

/// `<local data dir>/sheet-translator/logs/translations-YYYYmmdd.jsonl`
pub fn default_log_path() -> PathBuf {
    let app_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sheet-translator")
        .join("logs");

    let timestamp = chrono::Local::now().format("%Y%m%d");
    app_dir.join(format!("translations-{timestamp}.jsonl"))
}
