use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::compute_optimal_batch_size;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls"];

const OLE2_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const CONTENT_TYPES_ENTRY: &str = "[Content_Types].xml";
const WORKSHEET_PREFIX: &str = "xl/worksheets/";
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetInfo {
    pub name: String,
    pub index: usize,
    pub total_rows: u32,
    pub total_columns: u32,
    pub total_cells: usize,
    pub text_cells: usize,
    pub formula_cells: usize,
    pub empty_cells: usize,
    pub merged_cell_ranges: usize,
    pub has_formatting: bool,
    pub has_comments: bool,
    pub has_images: bool,
    pub is_hidden: bool,
    pub is_protected: bool,
}

impl SheetInfo {
    pub fn translatable_cells(&self) -> usize {
        self.text_cells
    }

    /// Share of non-empty cells, in percent.
    pub fn completion_percentage(&self) -> f64 {
        if self.total_cells == 0 {
            return 0.0;
        }
        (self.total_cells - self.empty_cells.min(self.total_cells)) as f64 / self.total_cells as f64
            * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileValidationResult {
    pub is_valid: bool,
    pub is_supported_format: bool,
    pub is_readable: bool,
    pub is_corrupted: bool,
    pub has_password_protection: bool,
    pub file_size_mb: f64,
    pub estimated_processing_time: f64,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl FileValidationResult {
    pub fn can_process(&self) -> bool {
        self.is_valid && self.is_supported_format && self.is_readable && !self.is_corrupted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCharacteristics {
    pub total_size_mb: f64,
    pub total_cells: usize,
    pub total_translatable_cells: usize,
    pub total_characters: usize,
    pub largest_sheet_cells: usize,
    /// 0 to 100.
    pub complexity_score: f64,
    pub recommended_batch_size: usize,
    pub estimated_api_calls: usize,
    pub estimated_processing_time: f64,
}

impl Default for FileCharacteristics {
    fn default() -> Self {
        Self {
            total_size_mb: 0.0,
            total_cells: 0,
            total_translatable_cells: 0,
            total_characters: 0,
            largest_sheet_cells: 0,
            complexity_score: 0.0,
            recommended_batch_size: 50,
            estimated_api_calls: 0,
            estimated_processing_time: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub file_path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    /// Lower-case extension without the dot.
    pub file_format: String,
    pub created_date: Option<DateTime<Utc>>,
    pub modified_date: Option<DateTime<Utc>>,
    pub total_sheets: usize,
    pub sheets: Vec<SheetInfo>,
    pub total_cells: usize,
    pub total_translatable_cells: usize,
    pub estimated_translation_characters: usize,
    pub validation_result: FileValidationResult,
    pub characteristics: FileCharacteristics,
    pub analyzed_at: DateTime<Utc>,
    pub analysis_time: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl FileInfo {
    /// Filesystem facts only; content fields start empty.
    pub fn from_path(path: &Path) -> Self {
        let metadata = fs::metadata(path).ok();
        let file_size = metadata.as_ref().map(|meta| meta.len()).unwrap_or(0);
        let created_date = metadata
            .as_ref()
            .and_then(|meta| meta.created().ok())
            .map(DateTime::<Utc>::from);
        let modified_date = metadata
            .as_ref()
            .and_then(|meta| meta.modified().ok())
            .map(DateTime::<Utc>::from);

        Self {
            file_path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_size,
            file_format: file_extension(path),
            created_date,
            modified_date,
            total_sheets: 0,
            sheets: Vec::new(),
            total_cells: 0,
            total_translatable_cells: 0,
            estimated_translation_characters: 0,
            validation_result: FileValidationResult::default(),
            characteristics: FileCharacteristics::default(),
            analyzed_at: Utc::now(),
            analysis_time: 0.0,
            metadata: BTreeMap::new(),
        }
    }

    /// Inspects the container without parsing cells. OOXML workbooks must be
    /// zip archives with `[Content_Types].xml`; `.xls` must carry the OLE2
    /// signature. An OOXML name on an OLE2 file means the workbook is
    /// password-encrypted.
    pub fn inspect(path: &Path) -> Self {
        let started = Instant::now();
        let mut info = Self::from_path(path);
        let result = &mut info.validation_result;
        result.file_size_mb = info.file_size as f64 / BYTES_PER_MB;
        result.is_supported_format = SUPPORTED_EXTENSIONS.contains(&info.file_format.as_str());

        if !path.is_file() {
            result.errors.push(format!("File not found: {}", path.display()));
            info.analysis_time = started.elapsed().as_secs_f64();
            return info;
        }
        if !result.is_supported_format {
            result
                .errors
                .push(format!("Unsupported file format: .{}", info.file_format));
        }

        let mut header = [0u8; 8];
        let is_ole2 = match File::open(path).and_then(|mut file| file.read_exact(&mut header)) {
            Ok(()) => {
                result.is_readable = true;
                header == OLE2_MAGIC
            }
            Err(err) => {
                result.is_readable = err.kind() == std::io::ErrorKind::UnexpectedEof;
                if !result.is_readable {
                    result.errors.push(format!("Cannot read file: {err}"));
                }
                false
            }
        };

        match info.file_format.as_str() {
            "xls" => {
                if !is_ole2 {
                    result.is_corrupted = true;
                    result.errors.push("Not a legacy Excel workbook".into());
                }
            }
            "xlsx" | "xlsm" if is_ole2 => {
                result.has_password_protection = true;
                result.warnings.push("Workbook is password protected".into());
            }
            "xlsx" | "xlsm" => match count_worksheets(path) {
                Ok(count) => info.total_sheets = count,
                Err(reason) => {
                    result.is_corrupted = true;
                    result.errors.push(reason);
                }
            },
            _ => {}
        }

        result.is_valid = result.errors.is_empty();
        info.refresh_characteristics();
        info.analysis_time = started.elapsed().as_secs_f64();
        info
    }

    pub fn add_sheet_info(&mut self, sheet: SheetInfo) {
        self.total_cells += sheet.total_cells;
        self.total_translatable_cells += sheet.translatable_cells();
        self.sheets.push(sheet);
        self.total_sheets = self.sheets.len();
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<&SheetInfo> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|sheet| sheet.name.as_str()).collect()
    }

    pub fn translatable_sheets(&self) -> Vec<&SheetInfo> {
        self.sheets
            .iter()
            .filter(|sheet| sheet.translatable_cells() > 0)
            .collect()
    }

    pub fn file_size_mb(&self) -> f64 {
        self.file_size as f64 / BYTES_PER_MB
    }

    pub fn is_large_file(&self) -> bool {
        self.file_size_mb() > 10.0 || self.total_translatable_cells > 10_000
    }

    /// Score from 0 to 100 built from size, cell count, sheet count,
    /// formatting and protected/image sheets.
    pub fn calculate_complexity_score(&self) -> f64 {
        let mut score = 0.0;

        let size_mb = self.file_size_mb();
        score += if size_mb > 100.0 {
            30.0
        } else if size_mb > 50.0 {
            20.0
        } else if size_mb > 10.0 {
            10.0
        } else if size_mb > 1.0 {
            5.0
        } else {
            0.0
        };

        score += match self.total_cells {
            n if n > 100_000 => 25.0,
            n if n > 50_000 => 20.0,
            n if n > 10_000 => 15.0,
            n if n > 1_000 => 10.0,
            _ => 0.0,
        };

        score += match self.total_sheets {
            n if n > 20 => 15.0,
            n if n > 10 => 10.0,
            n if n > 5 => 5.0,
            _ => 0.0,
        };

        let formatted = self.sheets.iter().filter(|sheet| sheet.has_formatting).count() as f64;
        let sheet_count = self.total_sheets as f64;
        score += if formatted > sheet_count * 0.8 {
            15.0
        } else if formatted > sheet_count * 0.5 {
            10.0
        } else if formatted > 0.0 {
            5.0
        } else {
            0.0
        };

        let protected = self.sheets.iter().filter(|sheet| sheet.is_protected).count();
        let with_images = self.sheets.iter().filter(|sheet| sheet.has_images).count();
        score += ((protected + with_images) as f64 * 3.0).min(15.0);

        score.min(100.0)
    }

    /// Seconds, assuming five characters per word and a fixed overhead
    /// factor (1.5 above complexity 50, else 1.2).
    pub fn estimate_processing_time(&self, words_per_minute: f64) -> f64 {
        if words_per_minute <= 0.0 {
            return 0.0;
        }
        let words = self.estimated_translation_characters as f64 / 5.0;
        let minutes = words / words_per_minute;
        let overhead = if self.characteristics.complexity_score > 50.0 {
            1.5
        } else {
            1.2
        };
        minutes * 60.0 * overhead
    }

    /// Recomputes [`FileCharacteristics`] from the current totals.
    pub fn refresh_characteristics(&mut self) {
        let size_mb = self.file_size_mb();
        let translatable = self.total_translatable_cells;
        let avg_length = if translatable == 0 {
            0.0
        } else {
            self.estimated_translation_characters as f64 / translatable as f64
        };
        let batch_size = compute_optimal_batch_size(translatable, avg_length, size_mb);

        self.characteristics = FileCharacteristics {
            total_size_mb: size_mb,
            total_cells: self.total_cells,
            total_translatable_cells: translatable,
            total_characters: self.estimated_translation_characters,
            largest_sheet_cells: self
                .sheets
                .iter()
                .map(|sheet| sheet.total_cells)
                .max()
                .unwrap_or(0),
            complexity_score: self.calculate_complexity_score(),
            recommended_batch_size: batch_size,
            estimated_api_calls: translatable.div_ceil(batch_size),
            estimated_processing_time: 0.0,
        };
        let seconds = self.estimate_processing_time(1000.0);
        self.characteristics.estimated_processing_time = seconds;
        self.validation_result.estimated_processing_time = seconds;
    }
}

pub(crate) fn file_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn count_worksheets(path: &Path) -> Result<usize, String> {
    let file = File::open(path).map_err(|err| format!("Cannot open workbook: {err}"))?;
    let archive =
        zip::ZipArchive::new(file).map_err(|err| format!("Workbook is not a valid archive: {err}"))?;

    let mut has_content_types = false;
    let mut worksheets = 0;
    for name in archive.file_names() {
        if name == CONTENT_TYPES_ENTRY {
            has_content_types = true;
        } else if name.starts_with(WORKSHEET_PREFIX) && name.ends_with(".xml") {
            worksheets += 1;
        }
    }

    if !has_content_types {
        return Err(format!("Workbook archive is missing {CONTENT_TYPES_ENTRY}"));
    }
    Ok(worksheets)
}
