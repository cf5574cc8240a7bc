#![allow(clippy::unwrap_used)]

use super::*;
use chrono::DateTime;
use tempfile::TempDir;

fn cli(args: &[&str], db_path: &Path) -> Result<()> {
    let mut full = vec!["willcal".to_string()];
    full.extend(args.iter().map(|a| a.to_string()));
    as_cli(&full, db_path)
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, 0, 0).unwrap()
}

/// A database file with a "Work" category and one General block.
fn seeded(dir: &TempDir) -> (std::path::PathBuf, i64, i64) {
    let path = dir.path().join("willcal.db");
    let db = Database::open(&path).unwrap();
    let work = db
        .insert_category(&Category::new("Work".into(), "#90CAF9".into()))
        .unwrap();
    let general = db
        .get_category_by_name(DEFAULT_CATEGORY_NAME)
        .unwrap()
        .unwrap()
        .id
        .unwrap();
    let block = db
        .insert_block(&Block::new("Draft".into(), at(9), at(10), general))
        .unwrap();
    (path, work, block)
}

#[test]
fn test_edit_block_title_and_category() {
    let dir = TempDir::new().unwrap();
    let (path, work, block) = seeded(&dir);

    let id = block.to_string();
    cli(
        &["edit-block", &id, "--title", "Final draft", "--category", "work"],
        &path,
    )
    .unwrap();

    let db = Database::open(&path).unwrap();
    let edited = db.get_block_by_id(block).unwrap().unwrap();
    assert_eq!(edited.title, "Final draft");
    assert_eq!(edited.category, BlockCategory::Assigned(work));
    assert_eq!(edited.start, at(9));
}

#[test]
fn test_edit_block_bad_category_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let (path, _, block) = seeded(&dir);

    let id = block.to_string();
    let err = cli(
        &["edit-block", &id, "--title", "Renamed", "--category", "Gym"],
        &path,
    )
    .unwrap_err();
    assert!(err.to_string().contains("Gym"));

    let db = Database::open(&path).unwrap();
    assert_eq!(db.get_block_by_id(block).unwrap().unwrap().title, "Draft");
}

#[test]
fn test_edit_block_requires_a_change() {
    let dir = TempDir::new().unwrap();
    let (path, _, block) = seeded(&dir);
    assert!(cli(&["edit-block", &block.to_string()], &path).is_err());
    assert!(cli(&["edit-block"], &path).is_err());
}

#[test]
fn test_add_block_category_lookup_ignores_case() {
    let dir = TempDir::new().unwrap();
    let (path, work, _) = seeded(&dir);

    // A second "work" cannot exist, so the lookup is unambiguous
    assert!(cli(&["add-category", "work"], &path).is_err());
    cli(
        &[
            "add-block",
            "Standup",
            "2024-03-04T11:00",
            "2024-03-04T11:15",
            "--category",
            "WORK",
        ],
        &path,
    )
    .unwrap();

    let db = Database::open(&path).unwrap();
    let blocks = db.get_blocks_in_range(&at(11), &at(12)).unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].category, BlockCategory::Assigned(work));
}

#[test]
fn test_unknown_command_does_not_create_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("willcal.db");
    assert!(cli(&["frobnicate"], &path).is_err());
    assert!(!path.exists());
}

#[test]
fn test_backups_does_not_open_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("willcal.db");
    cli(&["backups"], &path).unwrap();
    assert!(!path.exists());
}
