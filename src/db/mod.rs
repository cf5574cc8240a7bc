mod migrate;
mod schema;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::models::*;

pub(crate) use migrate::{list_backups, restore_from_backup};
use migrate::Registry;

/// Where a database lives. In-memory databases are never backed up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DbLocation {
    #[cfg_attr(not(test), allow(dead_code))]
    InMemory,
    File(PathBuf),
}

impl DbLocation {
    pub(crate) fn file_path(&self) -> Option<&Path> {
        match self {
            Self::InMemory => None,
            Self::File(path) => Some(path),
        }
    }
}

/// Operations refused because of application rules, reported distinctly
/// from storage errors so callers can show them as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum Conflict {
    #[error("a category named \"{0}\" already exists")]
    DuplicateCategoryName(String),
    #[error("category \"{name}\" is used by {blocks} time block(s); move or delete them first")]
    CategoryInUse { id: i64, name: String, blocks: i64 },
}

/// One row of `schema_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AppliedVersion {
    pub version: u32,
    pub applied_at: String,
    pub description: String,
}

const CATEGORY_COLUMNS: &str = "id, name, color, sort_order, include_in_totals";
const BLOCK_COLUMNS: &str = r#"id, title, start, "end", category_id"#;

pub(crate) struct Database {
    conn: Connection,
    location: DbLocation,
}

impl Database {
    /// Open (creating if needed) and migrate the database at `path`.
    ///
    /// Fails if the schema cannot be brought to the current version; in that
    /// case the file has been restored from its pre-migration backup when one
    /// was taken, and the error says so.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        Self::open_at(DbLocation::File(path.to_path_buf()))
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        Self::open_at(DbLocation::InMemory)
    }

    fn open_at(location: DbLocation) -> Result<Self> {
        let registry = Registry::builtin().context("Invalid migration registry")?;
        Self::open_with_registry(location, &registry)
    }

    fn open_with_registry(location: DbLocation, registry: &Registry) -> Result<Self> {
        let mut conn = match &location {
            DbLocation::File(path) => Connection::open(path)
                .with_context(|| format!("Failed to open database: {}", path.display()))?,
            DbLocation::InMemory => Connection::open_in_memory()?,
        };
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .context("Failed to set database pragmas")?;
        conn.execute_batch(schema::BASE_SCHEMA)
            .context("Failed to create base schema")?;

        let mut report = migrate::run_migrations(&mut conn, &location, registry);
        if let Some(error) = report.error.take() {
            return Err(anyhow::Error::new(error).context(report.failure_summary()));
        }
        if !report.migrations_run.is_empty() {
            tracing::info!(
                version = report.current_version,
                applied = ?report.migrations_run,
                "Database migrated"
            );
        }

        Ok(Self { conn, location })
    }

    pub(crate) fn location(&self) -> &DbLocation {
        &self.location
    }

    // ── Schema ────────────────────────────────────────────────

    pub(crate) fn schema_version(&self) -> Result<u32> {
        Ok(migrate::detect_version(&self.conn)?)
    }

    /// Migrations this build knows about that the open database has not had.
    /// Empty after a successful open unless the database is newer than the build.
    pub(crate) fn pending_migrations(&self) -> Result<Vec<(u32, &'static str)>> {
        let current = self.schema_version()?;
        let registry = Registry::builtin()?;
        Ok(registry
            .all()
            .iter()
            .filter(|m| m.version > current)
            .map(|m| (m.version, m.description))
            .collect())
    }

    pub(crate) fn latest_schema_version() -> Result<u32> {
        Ok(Registry::builtin()?.latest_version())
    }

    pub(crate) fn get_schema_history(&self) -> Result<Vec<AppliedVersion>> {
        let mut stmt = self.conn.prepare(
            "SELECT version, applied_at, description FROM schema_version ORDER BY version",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AppliedVersion {
                version: row.get(0)?,
                applied_at: row.get(1)?,
                description: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    // ── Categories ────────────────────────────────────────────

    pub(crate) fn get_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY sort_order, id"
        ))?;
        let rows = stmt.query_map([], category_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub(crate) fn get_category_by_id(&self, id: i64) -> Result<Option<Category>> {
        let result = self.conn.query_row(
            &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
            params![id],
            category_from_row,
        );
        match result {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Category names are unique ignoring case.
    pub(crate) fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let result = self.conn.query_row(
            &format!(
                "SELECT {CATEGORY_COLUMNS} FROM categories
                 WHERE name = ?1 COLLATE NOCASE ORDER BY id LIMIT 1"
            ),
            params![name],
            category_from_row,
        );
        match result {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert a category at the end of the sort order.
    pub(crate) fn insert_category(&self, cat: &Category) -> Result<i64> {
        let name = validate_category_name(&cat.name)?;
        validate_color(&cat.color)?;
        if self.get_category_by_name(name)?.is_some() {
            return Err(Conflict::DuplicateCategoryName(name.to_string()).into());
        }

        self.conn.execute(
            "INSERT INTO categories (name, color, sort_order, include_in_totals)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(sort_order) + 1, 0) FROM categories), ?3)",
            params![name, cat.color, cat.include_in_totals],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn update_category(&self, id: i64, update: &CategoryUpdate) -> Result<()> {
        let Some(mut cat) = self.get_category_by_id(id)? else {
            bail!("Category {id} not found");
        };

        if let Some(name) = &update.name {
            let name = validate_category_name(name)?;
            if let Some(other) = self.get_category_by_name(name)? {
                if other.id != Some(id) {
                    return Err(Conflict::DuplicateCategoryName(name.to_string()).into());
                }
            }
            cat.name = name.to_string();
        }
        if let Some(color) = &update.color {
            validate_color(color)?;
            cat.color = color.clone();
        }
        if let Some(include) = update.include_in_totals {
            cat.include_in_totals = include;
        }

        self.conn.execute(
            "UPDATE categories SET name = ?1, color = ?2, include_in_totals = ?3 WHERE id = ?4",
            params![cat.name, cat.color, cat.include_in_totals, id],
        )?;
        Ok(())
    }

    /// Delete an unused category and close the gap in the sort order.
    pub(crate) fn delete_category(&mut self, id: i64) -> Result<()> {
        let Some(cat) = self.get_category_by_id(id)? else {
            bail!("Category {id} not found");
        };
        let blocks: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM blocks WHERE category_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if blocks > 0 {
            return Err(Conflict::CategoryInUse {
                id,
                name: cat.name,
                blocks,
            }
            .into());
        }

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
        let remaining: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM categories ORDER BY sort_order, id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        for (position, cat_id) in remaining.iter().enumerate() {
            tx.execute(
                "UPDATE categories SET sort_order = ?1 WHERE id = ?2",
                params![position as i64, cat_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Rewrite the sort order of every category. `ordered_ids` must name each
    /// category exactly once.
    pub(crate) fn reorder_categories(&mut self, ordered_ids: &[i64]) -> Result<()> {
        let existing: HashSet<i64> = self
            .get_categories()?
            .iter()
            .filter_map(|c| c.id)
            .collect();
        let requested: HashSet<i64> = ordered_ids.iter().copied().collect();
        if requested.len() != ordered_ids.len() {
            bail!("Category order lists a category more than once");
        }
        if requested != existing {
            bail!(
                "Category order must list all {} categories exactly once",
                existing.len()
            );
        }

        let tx = self.conn.transaction()?;
        for (position, id) in ordered_ids.iter().enumerate() {
            tx.execute(
                "UPDATE categories SET sort_order = ?1 WHERE id = ?2",
                params![position as i64, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ── Time blocks ───────────────────────────────────────────

    pub(crate) fn insert_block(&self, block: &Block) -> Result<i64> {
        validate_block(&block.title, &block.start, &block.end)?;
        let BlockCategory::Assigned(category_id) = block.category else {
            bail!("Time blocks must be assigned a category");
        };
        self.require_category(category_id)?;

        self.conn.execute(
            r#"INSERT INTO blocks (title, start, "end", category_id) VALUES (?1, ?2, ?3, ?4)"#,
            params![
                block.title.trim(),
                schema::format_timestamp(&block.start),
                schema::format_timestamp(&block.end),
                category_id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn get_block_by_id(&self, id: i64) -> Result<Option<Block>> {
        let result = self.conn.query_row(
            &format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE id = ?1"),
            params![id],
            block_from_row,
        );
        match result {
            Ok(b) => Ok(Some(b)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Blocks overlapping `[from, to)`, earliest first.
    pub(crate) fn get_blocks_in_range(
        &self,
        from: &DateTime<Utc>,
        to: &DateTime<Utc>,
    ) -> Result<Vec<Block>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT {BLOCK_COLUMNS} FROM blocks
               WHERE start < ?2 AND "end" > ?1
               ORDER BY start, id"#
        ))?;
        let rows = stmt.query_map(
            params![schema::format_timestamp(from), schema::format_timestamp(to)],
            block_from_row,
        )?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub(crate) fn update_block_time(
        &self,
        id: i64,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> Result<()> {
        if end <= start {
            bail!("Block end must be after its start");
        }
        let changed = self.conn.execute(
            r#"UPDATE blocks SET start = ?1, "end" = ?2 WHERE id = ?3"#,
            params![
                schema::format_timestamp(start),
                schema::format_timestamp(end),
                id
            ],
        )?;
        if changed == 0 {
            bail!("Time block {id} not found");
        }
        Ok(())
    }

    pub(crate) fn update_block_title(&self, id: i64, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            bail!("Block title cannot be empty");
        }
        let changed = self.conn.execute(
            "UPDATE blocks SET title = ?1 WHERE id = ?2",
            params![title, id],
        )?;
        if changed == 0 {
            bail!("Time block {id} not found");
        }
        Ok(())
    }

    pub(crate) fn update_block_category(&self, id: i64, category_id: i64) -> Result<()> {
        self.require_category(category_id)?;
        let changed = self.conn.execute(
            "UPDATE blocks SET category_id = ?1 WHERE id = ?2",
            params![category_id, id],
        )?;
        if changed == 0 {
            bail!("Time block {id} not found");
        }
        Ok(())
    }

    pub(crate) fn delete_block(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM blocks WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    /// The earliest block starting inside `[window_start, window_end)`.
    pub(crate) fn get_next_upcoming_block(
        &self,
        window_start: &DateTime<Utc>,
        window_end: &DateTime<Utc>,
    ) -> Result<Option<Block>> {
        let result = self.conn.query_row(
            &format!(
                "SELECT {BLOCK_COLUMNS} FROM blocks
                 WHERE start >= ?1 AND start < ?2
                 ORDER BY start, id LIMIT 1"
            ),
            params![
                schema::format_timestamp(window_start),
                schema::format_timestamp(window_end)
            ],
            block_from_row,
        );
        match result {
            Ok(b) => Ok(Some(b)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Hours per category for one UTC day, in sidebar order. Blocks crossing
    /// midnight only count their part inside the day; categories excluded
    /// from totals are skipped.
    pub(crate) fn get_daily_totals(&self, day: NaiveDate) -> Result<Vec<CategoryTotal>> {
        let day_start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
        let day_end = day_start + Duration::days(1);
        let blocks = self.get_blocks_in_range(&day_start, &day_end)?;

        let totals = self
            .get_categories()?
            .into_iter()
            .filter(|c| c.include_in_totals)
            .filter_map(|c| {
                let id = c.id?;
                let hours = blocks
                    .iter()
                    .filter(|b| b.category == BlockCategory::Assigned(id))
                    .map(|b| b.hours_within(day_start, day_end))
                    .sum();
                Some(CategoryTotal {
                    category_id: id,
                    name: c.name,
                    color: c.color,
                    hours,
                })
            })
            .collect();
        Ok(totals)
    }

    fn require_category(&self, id: i64) -> Result<()> {
        if self.get_category_by_id(id)?.is_none() {
            bail!("Category {id} not found");
        }
        Ok(())
    }
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        color: row.get(2)?,
        sort_order: row.get(3)?,
        include_in_totals: row.get(4)?,
    })
}

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<Block> {
    Ok(Block {
        id: Some(row.get(0)?),
        title: row.get(1)?,
        start: timestamp_column(row, 2)?,
        end: timestamp_column(row, 3)?,
        category: BlockCategory::from(row.get::<_, Option<i64>>(4)?),
    })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    schema::parse_timestamp(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn validate_category_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Category name cannot be empty");
    }
    Ok(name)
}

fn validate_color(color: &str) -> Result<()> {
    if !Category::is_palette_color(color) {
        bail!(
            "Color {color} is not in the palette ({})",
            PALETTE.join(", ")
        );
    }
    Ok(())
}

fn validate_block(title: &str, start: &DateTime<Utc>, end: &DateTime<Utc>) -> Result<()> {
    if title.trim().is_empty() {
        bail!("Block title cannot be empty");
    }
    if end <= start {
        bail!("Block end must be after its start");
    }
    Ok(())
}
