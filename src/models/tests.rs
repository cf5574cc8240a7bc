#![allow(clippy::unwrap_used)]

use chrono::{DateTime, TimeZone, Utc};

use super::*;

fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, min, 0).unwrap()
}

// ── Block ─────────────────────────────────────────────────────

#[test]
fn test_block_new_is_assigned() {
    let block = Block::new("Deep work".into(), at(9, 0), at(11, 30), 7);
    assert!(block.id.is_none());
    assert_eq!(block.category, BlockCategory::Assigned(7));
    assert_eq!(block.duration().num_minutes(), 150);
}

#[test]
fn test_block_category_from_option() {
    assert_eq!(BlockCategory::from(Some(3)), BlockCategory::Assigned(3));
    assert_eq!(BlockCategory::from(None), BlockCategory::Unassigned);
    assert_eq!(BlockCategory::Assigned(3).id(), Some(3));
    assert_eq!(BlockCategory::Unassigned.id(), None);
}

#[test]
fn test_hours_within_fully_inside() {
    let block = Block::new("Gym".into(), at(6, 0), at(7, 30), 1);
    assert_eq!(block.hours_within(at(0, 0), at(23, 59)), 1.5);
}

#[test]
fn test_hours_within_clips_to_window() {
    let block = Block::new("Late".into(), at(22, 0), at(23, 0), 1);
    // Window ends halfway through the block
    assert_eq!(block.hours_within(at(0, 0), at(22, 30)), 0.5);
}

#[test]
fn test_hours_within_outside_window() {
    let block = Block::new("Early".into(), at(5, 0), at(6, 0), 1);
    assert_eq!(block.hours_within(at(8, 0), at(12, 0)), 0.0);
    // Touching boundaries contribute nothing
    assert_eq!(block.hours_within(at(6, 0), at(12, 0)), 0.0);
}

// ── Category ──────────────────────────────────────────────────

#[test]
fn test_category_new() {
    let cat = Category::new("Work".into(), "#90CAF9".into());
    assert!(cat.id.is_none());
    assert_eq!(cat.name, "Work");
    assert_eq!(cat.color, "#90CAF9");
    assert_eq!(cat.sort_order, 0);
    assert!(cat.include_in_totals);
}

#[test]
fn test_category_display() {
    let cat = Category::new("Reading".into(), DEFAULT_CATEGORY_COLOR.into());
    assert_eq!(format!("{cat}"), "Reading");
}

#[test]
fn test_category_find_by_id() {
    let mut work = Category::new("Work".into(), "#90CAF9".into());
    work.id = Some(2);
    let cats = vec![work];
    assert!(Category::find_by_id(&cats, 2).is_some());
    assert!(Category::find_by_id(&cats, 3).is_none());
}

#[test]
fn test_palette_contains_default_color() {
    assert_eq!(PALETTE[0], DEFAULT_CATEGORY_COLOR);
    assert!(Category::is_palette_color("#90a4ae"));
    assert!(!Category::is_palette_color("#000000"));
    assert!(!Category::is_palette_color("blue"));
}

#[test]
fn test_category_update_is_empty() {
    assert!(CategoryUpdate::default().is_empty());
    let update = CategoryUpdate {
        include_in_totals: Some(false),
        ..Default::default()
    };
    assert!(!update.is_empty());
}
