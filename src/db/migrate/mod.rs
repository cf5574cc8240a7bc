//! Versioned, backup-guarded schema migrations.
//!
//! [`run_migrations`] drives a small state machine:
//!
//! ```text
//! Idle -> VersionChecking -> UpToDate
//!                         -> BackingUp -> Migrating -> Committed
//!                                      |            -> RollingBack -> Restoring -> Failed
//!                                      -> Failed
//! ```
//!
//! All pending migrations run in a single transaction, each followed by its
//! `schema_version` row. Any failure rolls the whole run back and restores
//! the pre-migration backup; the first error is what gets reported.

mod backup;
mod detect;
mod registry;

pub(crate) use backup::{list_backups, restore_from_backup, BackupError};
pub(crate) use detect::{detect_version, table_exists};
pub(crate) use registry::{Migration, Registry};

use std::path::PathBuf;

use rusqlite::{params, Connection, Transaction};

use super::schema;
use super::DbLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MigrationState {
    Idle,
    VersionChecking,
    UpToDate,
    BackingUp,
    Migrating,
    Committed,
    RollingBack,
    Restoring,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum MigrationError {
    #[error("could not determine schema version")]
    Detect(#[source] rusqlite::Error),
    #[error("failed to create backup before migrations")]
    Backup(#[source] BackupError),
    #[error("could not start migration transaction")]
    Begin(#[source] rusqlite::Error),
    #[error("could not prepare version history")]
    History(#[source] rusqlite::Error),
    #[error("migration {version} ({description}) failed")]
    Transform {
        version: u32,
        description: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("could not record migration {version}")]
    Record {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },
    #[error("could not commit migrations")]
    Commit(#[source] rusqlite::Error),
}

/// Outcome of one [`run_migrations`] call.
#[derive(Debug)]
pub(crate) struct MigrationReport {
    pub state: MigrationState,
    /// Every state entered, in order, starting with `Idle`.
    pub transitions: Vec<MigrationState>,
    /// Version after the run on success; version detected before the run on failure.
    pub current_version: u32,
    pub target_version: u32,
    pub migrations_run: Vec<u32>,
    pub error: Option<MigrationError>,
    pub backup_path: Option<PathBuf>,
    /// `Some(ok)` when a restore from `backup_path` was attempted.
    pub restored: Option<bool>,
}

impl MigrationReport {
    fn new(target_version: u32) -> Self {
        Self {
            state: MigrationState::Idle,
            transitions: vec![MigrationState::Idle],
            current_version: 0,
            target_version,
            migrations_run: Vec::new(),
            error: None,
            backup_path: None,
            restored: None,
        }
    }

    pub(crate) fn success(&self) -> bool {
        matches!(
            self.state,
            MigrationState::UpToDate | MigrationState::Committed
        )
    }

    fn enter(&mut self, state: MigrationState) {
        tracing::debug!(from = ?self.state, to = ?state, "Migration state change");
        self.state = state;
        self.transitions.push(state);
    }

    fn fail(mut self, error: MigrationError) -> Self {
        tracing::error!(error = ?error, "Migration process failed");
        self.error = Some(error);
        self.migrations_run.clear();
        self.enter(MigrationState::Failed);
        self
    }

    /// What a failed run did to the database file, for the user-facing
    /// error. Empty for successful runs.
    pub(crate) fn failure_summary(&self) -> String {
        if self.success() {
            return String::new();
        }
        let recovery = match (&self.backup_path, self.restored) {
            (Some(path), Some(true)) => {
                format!("database restored from backup {}", path.display())
            }
            (Some(path), Some(false)) => format!(
                "restore from backup {} FAILED; restore it manually",
                path.display()
            ),
            (Some(path), None) => format!("backup kept at {}", path.display()),
            (None, _) => "no backup was taken".to_string(),
        };
        format!(
            "Schema migration v{} -> v{} failed; {recovery}",
            self.current_version, self.target_version
        )
    }
}

/// Bring the database behind `conn` up to `registry.latest_version()`.
///
/// Never panics and never leaves a partially migrated schema: the result
/// describes either success or a rolled-back failure.
pub(crate) fn run_migrations(
    conn: &mut Connection,
    location: &DbLocation,
    registry: &Registry,
) -> MigrationReport {
    let target = registry.latest_version();
    let mut report = MigrationReport::new(target);

    report.enter(MigrationState::VersionChecking);
    let current = match detect_version(conn) {
        Ok(v) => v,
        Err(e) => return report.fail(MigrationError::Detect(e)),
    };
    report.current_version = current;
    tracing::info!(current, target, "Checking schema version");

    if current >= target {
        if current > target {
            tracing::warn!(
                current,
                target,
                "Database schema is newer than this release; leaving it untouched"
            );
        } else {
            tracing::debug!(version = current, "Schema is up to date");
        }
        report.enter(MigrationState::UpToDate);
        return report;
    }

    report.enter(MigrationState::BackingUp);
    match backup::create_backup(location, target) {
        Ok(path) => report.backup_path = path,
        Err(e) => return report.fail(MigrationError::Backup(e)),
    }

    report.enter(MigrationState::Migrating);
    // Nothing was opened, so there is nothing to roll back or restore.
    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => return report.fail(MigrationError::Begin(e)),
    };
    let applied = apply_pending(&tx, registry, current);
    let outcome = match applied {
        Ok(applied) => tx.commit().map(|()| applied).map_err(MigrationError::Commit),
        Err(error) => {
            report.enter(MigrationState::RollingBack);
            if let Err(e) = tx.rollback() {
                tracing::error!(error = %e, "Rollback failed");
            } else {
                tracing::info!("Transaction rolled back");
            }
            Err(error)
        }
    };

    match outcome {
        Ok(applied) => {
            report.migrations_run = applied;
            report.current_version = target;
            report.enter(MigrationState::Committed);
            tracing::info!(
                versions = ?report.migrations_run,
                version = target,
                "All migrations completed successfully"
            );
            report
        }
        Err(error) => {
            // A failed COMMIT rolls back when the transaction drops.
            if report.state != MigrationState::RollingBack {
                report.enter(MigrationState::RollingBack);
            }
            restore(&mut report, location);
            report.fail(error)
        }
    }
}

fn apply_pending(
    tx: &Transaction<'_>,
    registry: &Registry,
    current: u32,
) -> Result<Vec<u32>, MigrationError> {
    let had_history = table_exists(tx, "schema_version").map_err(MigrationError::History)?;
    tx.execute_batch(schema::SCHEMA_VERSION_TABLE)
        .map_err(MigrationError::History)?;
    if !had_history && current > 0 {
        record_legacy_history(tx, registry, current)?;
    }

    let mut applied = Vec::new();
    for migration in registry.pending(current) {
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "Running migration"
        );
        (migration.apply)(tx).map_err(|source| MigrationError::Transform {
            version: migration.version,
            description: migration.description,
            source,
        })?;
        record(tx, migration.version, migration.description).map_err(|source| {
            MigrationError::Record {
                version: migration.version,
                source,
            }
        })?;
        tracing::info!(version = migration.version, "Migration completed");
        applied.push(migration.version);
    }
    Ok(applied)
}

/// Databases from before version tracking get history rows for the
/// versions their shape already reflects.
fn record_legacy_history(
    tx: &Transaction<'_>,
    registry: &Registry,
    detected: u32,
) -> Result<(), MigrationError> {
    tracing::info!(version = detected, "Recording history for legacy schema");
    for version in 1..=detected {
        let description = registry
            .get(version)
            .map_or("unknown migration", |m| m.description);
        record(tx, version, &format!("{description} (legacy schema, detected)"))
            .map_err(|source| MigrationError::Record { version, source })?;
    }
    Ok(())
}

fn record(tx: &Transaction<'_>, version: u32, description: &str) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO schema_version (version, applied_at, description) VALUES (?1, ?2, ?3)",
        params![version, schema::timestamp_now(), description],
    )?;
    Ok(())
}

fn restore(report: &mut MigrationReport, location: &DbLocation) {
    let DbLocation::File(db_path) = location else {
        return;
    };
    let Some(backup) = report.backup_path.clone() else {
        return;
    };
    report.enter(MigrationState::Restoring);
    tracing::info!(backup = %backup.display(), "Attempting to restore database from backup");
    let restored = match restore_from_backup(&backup, db_path) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = ?e, "Failed to restore database from backup");
            false
        }
    };
    report.restored = Some(restored);
}
