use chrono::{Duration, Local, NaiveDateTime};
use log::{debug, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

const BACKUP_MARKER: &str = ".bak.";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupOutcome {
    pub source_path: PathBuf,
    pub backup_path: PathBuf,
    /// Hex SHA-256 of the copied bytes.
    pub sha256: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("source file does not exist: {0}")]
    MissingSource(PathBuf),
    #[error("failed to create backup: {0}")]
    BackupCreate(String),
}

/// Copies `source` to `<dir>/<file name>.bak.<YYYYmmddHHMMSS>`.
///
/// `dir` defaults to the source's own directory.
pub fn create_backup(source: &Path, dir: Option<&Path>) -> Result<BackupOutcome, BackupError> {
    if !source.is_file() {
        return Err(BackupError::MissingSource(source.to_path_buf()));
    }

    let file_name = source
        .file_name()
        .ok_or_else(|| BackupError::BackupCreate("source path has no file name".into()))?;
    let target_dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => source
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| BackupError::BackupCreate("source path has no parent".into()))?,
    };
    fs::create_dir_all(&target_dir)?;

    let timestamp = Local::now().format(TIMESTAMP_FORMAT);
    let mut name = file_name.to_os_string();
    name.push(format!("{BACKUP_MARKER}{timestamp}"));
    let backup_path = target_dir.join(name);

    fs::copy(source, &backup_path).map_err(|err| BackupError::BackupCreate(err.to_string()))?;
    let sha256 = hash_file(&backup_path)?;
    debug!("backup written to {}", backup_path.display());

    Ok(BackupOutcome {
        source_path: source.to_path_buf(),
        backup_path,
        sha256,
    })
}

/// True when the backup still exists and matches the recorded hash.
pub fn verify_backup(outcome: &BackupOutcome) -> Result<bool, BackupError> {
    if !outcome.backup_path.is_file() {
        return Ok(false);
    }
    Ok(hash_file(&outcome.backup_path)? == outcome.sha256)
}

/// Removes backups in `dir` older than `max_age_days`, judged by the
/// timestamp embedded in the file name. Returns how many were deleted.
pub fn cleanup_backups(dir: &Path, max_age_days: u32) -> Result<usize, BackupError> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let cutoff = Local::now().naive_local() - Duration::days(i64::from(max_age_days));
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(created) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(backup_timestamp)
        else {
            continue;
        };

        if created < cutoff {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("removed stale backup {}", path.display());
                    removed += 1;
                }
                Err(err) => warn!("failed to remove backup {}: {err}", path.display()),
            }
        }
    }
    Ok(removed)
}

fn backup_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let (_, stamp) = file_name.rsplit_once(BACKUP_MARKER)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

fn hash_file(path: &Path) -> Result<String, BackupError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
