//! Schema version detection.
//!
//! Databases created before version tracking existed were evolved ad hoc,
//! so the absence of `schema_version` does not mean version 0. The table
//! shapes tell us which of those early releases wrote the file.

use rusqlite::{params, Connection};

pub(crate) fn detect_version(conn: &Connection) -> rusqlite::Result<u32> {
    if table_exists(conn, "schema_version")? {
        let version: Option<u32> =
            conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })?;
        return Ok(version.unwrap_or(0));
    }

    if !table_exists(conn, "categories")? {
        return Ok(0);
    }

    if column_exists(conn, "blocks", "category_id")? {
        Ok(2)
    } else {
        Ok(1)
    }
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
        params![table],
        |row| row.get(0),
    )
}

pub(crate) fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pragma_table_info(?1) WHERE name=?2)",
        params![table, column],
        |row| row.get(0),
    )
}
