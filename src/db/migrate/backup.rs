//! Pre-migration backups.
//!
//! A backup is a byte-for-byte copy of the database file placed in a
//! `backups/` directory beside it and named
//! `<dbname>.backup.<YYYYMMDD_HHMMSS>.before_v<N>`. Only the most recent
//! [`BACKUP_RETENTION`] backups are kept. A name already taken gets a
//! numeric suffix (`.1`, `.2`, ...) instead of being overwritten.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::db::DbLocation;

/// Number of backups kept per database file.
pub(crate) const BACKUP_RETENTION: usize = 5;

const BACKUP_DIR: &str = "backups";

#[derive(Debug, thiserror::Error)]
pub(crate) enum BackupError {
    #[error("backup file not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("{action} {}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BackupError {
    fn io(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BackupFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

impl BackupFile {
    pub(crate) fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Copy the database file before migrating it to `target_version`.
///
/// Returns `Ok(None)` when there is nothing to copy (in-memory database, or
/// a file that does not exist yet).
pub(crate) fn create_backup(
    location: &DbLocation,
    target_version: u32,
) -> Result<Option<PathBuf>, BackupError> {
    let db_path = match location {
        DbLocation::InMemory => {
            tracing::debug!("Skipping backup for in-memory database");
            return Ok(None);
        }
        DbLocation::File(path) => path,
    };
    if !db_path.exists() {
        tracing::info!(path = %db_path.display(), "No existing database file to back up");
        return Ok(None);
    }

    let backup_dir = backup_dir(db_path);
    fs::create_dir_all(&backup_dir)
        .map_err(BackupError::io("failed to create backup directory", &backup_dir))?;

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let name = format!(
        "{}{timestamp}.before_v{target_version}",
        backup_prefix(db_path)
    );
    let backup_path = copy_to_new_file(db_path, &backup_dir, &name)?;
    tracing::info!(path = %backup_path.display(), target_version, "Backup created");

    prune_backups(db_path, BACKUP_RETENTION);

    Ok(Some(backup_path))
}

/// Copy `db_path` to `<dir>/<name>`, or `<name>.1`, `<name>.2`, ... when
/// earlier backups already hold those names. Existing backups are never
/// overwritten.
fn copy_to_new_file(db_path: &Path, dir: &Path, name: &str) -> Result<PathBuf, BackupError> {
    let mut source =
        File::open(db_path).map_err(BackupError::io("failed to open database", db_path))?;
    let mut attempt = 0u32;
    loop {
        let path = if attempt == 0 {
            dir.join(name)
        } else {
            dir.join(format!("{name}.{attempt}"))
        };
        let mut target = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                attempt += 1;
                continue;
            }
            Err(e) => return Err(BackupError::io("failed to create backup", &path)(e)),
        };
        let copied = io::copy(&mut source, &mut target).and_then(|_| target.sync_all());
        if let Err(e) = copied {
            drop(target);
            if let Err(cleanup) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %cleanup, "Failed to remove partial backup");
            }
            return Err(BackupError::io("failed to copy database to", &path)(e));
        }
        return Ok(path);
    }
}

/// Overwrite the live database file with the contents of `backup_path`.
pub(crate) fn restore_from_backup(backup_path: &Path, db_path: &Path) -> Result<(), BackupError> {
    if !backup_path.is_file() {
        return Err(BackupError::Missing(backup_path.to_path_buf()));
    }
    fs::copy(backup_path, db_path)
        .map_err(BackupError::io("failed to restore database to", db_path))?;
    tracing::info!(
        backup = %backup_path.display(),
        path = %db_path.display(),
        "Database restored from backup"
    );
    Ok(())
}

/// Backups of `db_path`, newest first.
pub(crate) fn list_backups(db_path: &Path) -> Result<Vec<BackupFile>, BackupError> {
    let backup_dir = backup_dir(db_path);
    if !backup_dir.is_dir() {
        return Ok(Vec::new());
    }
    let prefix = backup_prefix(db_path);

    let entries = fs::read_dir(&backup_dir)
        .map_err(BackupError::io("failed to read backup directory", &backup_dir))?;
    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry.map_err(BackupError::io("failed to read backup directory", &backup_dir))?;
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let path = entry.path();
        let meta = entry
            .metadata()
            .map_err(BackupError::io("failed to stat backup", &path))?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta
            .modified()
            .map_err(BackupError::io("failed to stat backup", &path))?;
        backups.push(BackupFile {
            path,
            modified,
            size: meta.len(),
        });
    }

    // Newest first; same-instant copies fall back to the name, whose
    // timestamp component sorts chronologically.
    backups.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| b.path.cmp(&a.path))
    });
    Ok(backups)
}

/// Delete all but the `keep` newest backups. Failures are logged only.
fn prune_backups(db_path: &Path, keep: usize) {
    let backups = match list_backups(db_path) {
        Ok(backups) => backups,
        Err(e) => {
            tracing::warn!(error = ?e, "Could not list backups for cleanup");
            return;
        }
    };
    for old in backups.iter().skip(keep) {
        match fs::remove_file(&old.path) {
            Ok(()) => tracing::info!(path = %old.path.display(), "Deleted old backup"),
            Err(e) => {
                tracing::warn!(path = %old.path.display(), error = %e, "Failed to delete old backup")
            }
        }
    }
}

fn backup_dir(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(BACKUP_DIR)
}

fn backup_prefix(db_path: &Path) -> String {
    let name = db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "database".to_string());
    format!("{name}.backup.")
}
