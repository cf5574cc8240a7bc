use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};

use super::migrate::Migration;
use crate::models::{DEFAULT_CATEGORY_COLOR, DEFAULT_CATEGORY_NAME};

/// Tables every release has had. Created before version detection so a
/// brand-new file looks like a version 0 database.
pub(crate) const BASE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    id    INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    start TEXT NOT NULL,
    "end" TEXT NOT NULL
);
"#;

pub(crate) const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL,
    description TEXT NOT NULL
);
"#;

/// Migrations from version N-1 to N, in order. Append only.
pub(crate) fn builtin_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Create categories table with default General category",
            apply: create_categories,
        },
        Migration {
            version: 2,
            description: "Add category_id column to blocks table",
            apply: add_block_category,
        },
        Migration {
            version: 3,
            description: "Add include_in_totals flag to categories",
            apply: add_include_in_totals,
        },
        Migration {
            version: 4,
            description: "Index blocks by start time and category",
            apply: index_blocks,
        },
    ]
}

fn create_categories(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE categories (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            name       TEXT NOT NULL UNIQUE,
            color      TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        );
        "#,
    )?;
    conn.execute(
        "INSERT INTO categories (name, color, sort_order) VALUES (?1, ?2, 0)",
        params![DEFAULT_CATEGORY_NAME, DEFAULT_CATEGORY_COLOR],
    )?;
    Ok(())
}

fn add_block_category(conn: &Connection) -> rusqlite::Result<()> {
    // The new column carries a foreign key, so the table is rebuilt rather
    // than altered in place.
    rebuild_table(
        conn,
        "blocks",
        r#"
        id          INTEGER PRIMARY KEY,
        title       TEXT NOT NULL,
        start       TEXT NOT NULL,
        "end"       TEXT NOT NULL,
        category_id INTEGER,
        FOREIGN KEY (category_id) REFERENCES categories(id)
        "#,
        r#"id, title, start, "end""#,
    )?;

    let general: Option<i64> = conn
        .query_row(
            "SELECT id FROM categories WHERE name = ?1 LIMIT 1",
            params![DEFAULT_CATEGORY_NAME],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e),
        })?;
    if let Some(general) = general {
        let updated = conn.execute(
            "UPDATE blocks SET category_id = ?1 WHERE category_id IS NULL",
            params![general],
        )?;
        tracing::info!(blocks = updated, "Assigned existing blocks to default category");
    }
    Ok(())
}

fn add_include_in_totals(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "ALTER TABLE categories ADD COLUMN include_in_totals INTEGER NOT NULL DEFAULT 1;",
    )
}

fn index_blocks(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_blocks_start ON blocks(start);
        CREATE INDEX IF NOT EXISTS idx_blocks_category ON blocks(category_id);
        "#,
    )
}

/// Shadow-table rebuild: create `<table>_new` with `columns`, copy
/// `copied_columns` across, drop the original and rename the shadow into
/// place. Columns not listed in `copied_columns` start out with their
/// defaults (NULL unless declared otherwise).
pub(crate) fn rebuild_table(
    conn: &Connection,
    table: &str,
    columns: &str,
    copied_columns: &str,
) -> rusqlite::Result<()> {
    let shadow = format!("{table}_new");
    conn.execute_batch(&format!(
        "CREATE TABLE {shadow} ({columns});
         INSERT INTO {shadow} ({copied_columns}) SELECT {copied_columns} FROM {table};
         DROP TABLE {table};
         ALTER TABLE {shadow} RENAME TO {table};"
    ))
}

/// Timestamps are stored as RFC 3339 UTC with millisecond precision, which
/// sorts lexicographically.
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn timestamp_now() -> String {
    format_timestamp(&Utc::now())
}
