use rusqlite::Connection;

/// Forward transform for one schema version. Runs inside the runner's
/// transaction; must not commit or roll back itself.
pub(crate) type Transform = fn(&Connection) -> rusqlite::Result<()>;

#[derive(Clone, Copy)]
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub apply: Transform,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum RegistryError {
    #[error("migration at position {position} declares version {found}, expected {expected}")]
    VersionMismatch {
        position: usize,
        expected: u32,
        found: u32,
    },
}

/// Ordered, validated list of migrations. `all()[i].version == i + 1`.
#[derive(Debug)]
pub(crate) struct Registry {
    migrations: Vec<Migration>,
}

impl Registry {
    pub(crate) fn new(migrations: Vec<Migration>) -> Result<Self, RegistryError> {
        for (position, migration) in migrations.iter().enumerate() {
            let expected = u32::try_from(position + 1).unwrap_or(u32::MAX);
            if migration.version != expected {
                return Err(RegistryError::VersionMismatch {
                    position,
                    expected,
                    found: migration.version,
                });
            }
        }
        Ok(Self { migrations })
    }

    /// The migrations shipped with this release.
    pub(crate) fn builtin() -> Result<Self, RegistryError> {
        Self::new(crate::db::schema::builtin_migrations())
    }

    pub(crate) fn all(&self) -> &[Migration] {
        &self.migrations
    }

    pub(crate) fn latest_version(&self) -> u32 {
        self.migrations.last().map_or(0, |m| m.version)
    }

    /// Migrations with a version above `current`, ascending.
    pub(crate) fn pending(&self, current: u32) -> &[Migration] {
        let start = usize::try_from(current)
            .unwrap_or(usize::MAX)
            .min(self.migrations.len());
        &self.migrations[start..]
    }

    pub(crate) fn get(&self, version: u32) -> Option<&Migration> {
        let index = usize::try_from(version).ok()?.checked_sub(1)?;
        self.migrations.get(index)
    }
}
