//! Scripted provider and in-memory workbook shared by unit and cross-module
//! tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::batch::BatchProcessor;
use crate::config::ProcessorOptions;
use crate::files::{ExtractedCell, FileContentProvider, FileProviderError, SheetCells, TranslatedCell};
use crate::model::{BatchSettings, FileInfo, SheetInfo};
use crate::provider::{LanguageDetection, ProviderError, ProviderKind, TranslationProvider};

type FailRule = Box<dyn Fn(&[String]) -> Option<ProviderError> + Send + Sync>;
type DelayRule = Box<dyn Fn(&[String]) -> Duration + Send + Sync>;

/// Upper-cases every text unless a rule says otherwise.
pub struct ScriptedProvider {
    fail_rule: Option<FailRule>,
    delay_rule: Option<DelayRule>,
    detections: HashMap<String, LanguageDetection>,
    pub calls: AtomicUsize,
    pub batches: Mutex<Vec<Vec<String>>>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            fail_rule: None,
            delay_rule: None,
            detections: HashMap::new(),
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing_when(
        mut self,
        rule: impl Fn(&[String]) -> Option<ProviderError> + Send + Sync + 'static,
    ) -> Self {
        self.fail_rule = Some(Box::new(rule));
        self
    }

    pub fn delayed_by(mut self, rule: impl Fn(&[String]) -> Duration + Send + Sync + 'static) -> Self {
        self.delay_rule = Some(Box::new(rule));
        self
    }

    pub fn detecting(mut self, text: &str, language: &str, confidence: f64) -> Self {
        self.detections
            .insert(text.to_string(), LanguageDetection::new(language, confidence));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DeepL
    }

    async fn translate_text(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> Result<String, ProviderError> {
        let mut out = self
            .translate_batch(&[text.to_string()], target_lang, source_lang)
            .await?;
        out.pop().ok_or(ProviderError::LengthMismatch { expected: 1, actual: 0 })
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        _target_lang: &str,
        _source_lang: Option<&str>,
    ) -> Result<Vec<String>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().unwrap().push(texts.to_vec());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay_rule.as_ref().map(|rule| rule(texts)) {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.fail_rule.as_ref().and_then(|rule| rule(texts)) {
            return Err(err);
        }
        Ok(texts.iter().map(|text| text.to_uppercase()).collect())
    }

    async fn detect_language(&self, text: &str) -> Result<LanguageDetection, ProviderError> {
        if text == "explode" {
            return Err(ProviderError::Network("detector offline".into()));
        }
        Ok(self
            .detections
            .get(text)
            .cloned()
            .unwrap_or_else(LanguageDetection::unknown))
    }
}

/// Processor with no pacing so tests only wait for backoff.
pub fn processor_for(provider: Arc<ScriptedProvider>, settings: &BatchSettings) -> Arc<BatchProcessor> {
    let options = ProcessorOptions {
        pacing_delay_ms: 0,
        ..ProcessorOptions::default()
    };
    Arc::new(BatchProcessor::new(provider, settings, &options))
}

/// Workbook served from memory. Analysis reports every sheet as plain text.
pub struct MemoryWorkbook {
    sheets: Vec<SheetCells>,
    pub fail_analysis: bool,
    pub fail_backup: bool,
    pub fail_apply: bool,
    pub applied: Mutex<Option<BTreeMap<String, Vec<TranslatedCell>>>>,
    pub backups: AtomicUsize,
    pub cleanups: AtomicUsize,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self {
            sheets: Vec::new(),
            fail_analysis: false,
            fail_backup: false,
            fail_apply: false,
            applied: Mutex::new(None),
            backups: AtomicUsize::new(0),
            cleanups: AtomicUsize::new(0),
        }
    }

    pub fn with_sheet(mut self, name: &str, texts: &[&str]) -> Self {
        let cells = texts
            .iter()
            .enumerate()
            .map(|(index, text)| ExtractedCell::new(*text, index as u32 + 1, 1))
            .collect();
        self.sheets.push(SheetCells {
            sheet_name: name.to_string(),
            cells,
        });
        self
    }
}

#[async_trait]
impl FileContentProvider for MemoryWorkbook {
    async fn analyze_file(&self, path: &Path) -> Result<FileInfo, FileProviderError> {
        if self.fail_analysis {
            return Err(FileProviderError::Corrupted("broken central directory".into()));
        }
        let mut info = FileInfo::from_path(path);
        info.validation_result.is_valid = true;
        info.validation_result.is_supported_format = true;
        info.validation_result.is_readable = true;
        for (index, sheet) in self.sheets.iter().enumerate() {
            info.add_sheet_info(SheetInfo {
                name: sheet.sheet_name.clone(),
                index,
                total_cells: sheet.cells.len(),
                text_cells: sheet.cells.len(),
                ..SheetInfo::default()
            });
            info.estimated_translation_characters += sheet
                .cells
                .iter()
                .map(|cell| cell.text.chars().count())
                .sum::<usize>();
        }
        info.refresh_characteristics();
        Ok(info)
    }

    async fn extract_content(
        &self,
        _path: &Path,
        sheet_names: &[String],
    ) -> Result<Vec<SheetCells>, FileProviderError> {
        let mut selected = Vec::new();
        for name in sheet_names {
            let sheet = self
                .sheets
                .iter()
                .find(|sheet| &sheet.sheet_name == name)
                .ok_or_else(|| FileProviderError::SheetNotFound(name.clone()))?;
            selected.push(sheet.clone());
        }
        Ok(selected)
    }

    async fn apply_translations(
        &self,
        _path: &Path,
        translations: &BTreeMap<String, Vec<TranslatedCell>>,
        _output_path: &Path,
    ) -> Result<bool, FileProviderError> {
        if self.fail_apply {
            return Err(FileProviderError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "output is read-only",
            )));
        }
        *self.applied.lock().unwrap() = Some(translations.clone());
        Ok(true)
    }

    async fn create_backup(
        &self,
        path: &Path,
        _backup_dir: Option<&Path>,
    ) -> Result<std::path::PathBuf, FileProviderError> {
        if self.fail_backup {
            return Err(FileProviderError::NotFound(path.to_path_buf()));
        }
        self.backups.fetch_add(1, Ordering::SeqCst);
        Ok(path.with_extension("bak"))
    }

    async fn cleanup_temporary_files(&self) -> Result<usize, FileProviderError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}
