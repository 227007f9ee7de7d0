//! Spreadsheet reader/writer capability.
//!
//! Cell extraction and style-preserving writes are done by an external
//! collaborator. The core only relies on the contract below.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backup::{self, BackupError};
use crate::model::FileInfo;

/// One text cell read from a sheet (1-based coordinates).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedCell {
    pub text: String,
    pub row: u32,
    pub column: u32,
}

impl ExtractedCell {
    pub fn new(text: impl Into<String>, row: u32, column: u32) -> Self {
        Self {
            text: text.into(),
            row,
            column,
        }
    }
}

/// Cells of one sheet in extraction order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetCells {
    pub sheet_name: String,
    pub cells: Vec<ExtractedCell>,
}

/// A translated value to write back at `(row, column)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatedCell {
    pub translated_text: String,
    pub row: u32,
    pub column: u32,
}

#[derive(Debug, Error)]
pub enum FileProviderError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("unsupported spreadsheet format: {0}")]
    UnsupportedFormat(String),
    #[error("sheet not found: {0}")]
    SheetNotFound(String),
    #[error("workbook is corrupted: {0}")]
    Corrupted(String),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait FileContentProvider: Send + Sync {
    async fn analyze_file(&self, path: &Path) -> Result<FileInfo, FileProviderError>;

    /// Text cells per sheet, in workbook order. An empty `sheet_names`
    /// selects every sheet.
    async fn extract_content(
        &self,
        path: &Path,
        sheet_names: &[String],
    ) -> Result<Vec<SheetCells>, FileProviderError>;

    /// Writes `translations` into a copy of `path` at `output_path`.
    /// `Ok(false)` means the writer declined without an error.
    async fn apply_translations(
        &self,
        path: &Path,
        translations: &BTreeMap<String, Vec<TranslatedCell>>,
        output_path: &Path,
    ) -> Result<bool, FileProviderError>;

    /// Timestamped copy of `path`; returns the backup location.
    async fn create_backup(
        &self,
        path: &Path,
        backup_dir: Option<&Path>,
    ) -> Result<PathBuf, FileProviderError> {
        let source = path.to_path_buf();
        let dir = backup_dir.map(Path::to_path_buf);
        let outcome = tokio::task::spawn_blocking(move || backup::create_backup(&source, dir.as_deref()))
            .await
            .map_err(|err| FileProviderError::Task(err.to_string()))??;
        Ok(outcome.backup_path)
    }

    /// Removes scratch files left by the reader/writer. Returns how many.
    async fn cleanup_temporary_files(&self) -> Result<usize, FileProviderError> {
        Ok(0)
    }

    async fn cleanup_backups(&self, backup_dir: &Path, max_age_days: u32) -> Result<usize, FileProviderError> {
        let dir = backup_dir.to_path_buf();
        let removed = tokio::task::spawn_blocking(move || backup::cleanup_backups(&dir, max_age_days))
            .await
            .map_err(|err| FileProviderError::Task(err.to_string()))??;
        Ok(removed)
    }
}
