#![allow(clippy::unwrap_used)]

use super::*;
use chrono::TimeZone;

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_split_db_flag() {
    let (path, args) =
        split_db_flag(strings(&["willcal", "--db", "/tmp/cal.db", "blocks"])).unwrap();
    assert_eq!(path, Some(PathBuf::from("/tmp/cal.db")));
    assert_eq!(args, strings(&["willcal", "blocks"]));
}

#[test]
fn test_split_db_flag_after_command() {
    let (path, args) =
        split_db_flag(strings(&["willcal", "totals", "2024-03-04", "--db", "x.db"])).unwrap();
    assert_eq!(path, Some(PathBuf::from("x.db")));
    assert_eq!(args, strings(&["willcal", "totals", "2024-03-04"]));
}

#[test]
fn test_split_db_flag_absent_or_missing_value() {
    let (path, args) = split_db_flag(strings(&["willcal", "status"])).unwrap();
    assert!(path.is_none());
    assert_eq!(args.len(), 2);

    assert!(split_db_flag(strings(&["willcal", "status", "--db"])).is_err());
}

#[test]
fn test_parse_time_arg_formats() {
    let expected = Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap();
    assert_eq!(parse_time_arg("2024-03-04T09:30").unwrap(), expected);
    assert_eq!(parse_time_arg("2024-03-04 09:30").unwrap(), expected);
    assert_eq!(parse_time_arg("2024-03-04T09:30:00Z").unwrap(), expected);
    assert_eq!(parse_time_arg("2024-03-04T11:30:00+02:00").unwrap(), expected);
}

#[test]
fn test_parse_time_arg_rejects_garbage() {
    assert!(parse_time_arg("9:30").is_err());
    assert!(parse_time_arg("2024-13-01T09:00").is_err());
    assert!(parse_time_arg("").is_err());
}

#[test]
fn test_parse_day_arg() {
    let day = "2024-03-04".to_string();
    assert_eq!(
        parse_day_arg(Some(&day)).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    );
    assert_eq!(parse_day_arg(None).unwrap(), Utc::now().date_naive());

    // Flags are not dates
    let flag = "--within".to_string();
    assert!(parse_day_arg(Some(&flag)).is_ok());

    let bad = "03/04/2024".to_string();
    assert!(parse_day_arg(Some(&bad)).is_err());
}

#[test]
fn test_parse_id() {
    assert_eq!(parse_id("42").unwrap(), 42);
    assert!(parse_id("forty-two").is_err());
}

#[test]
fn test_format_hours() {
    assert_eq!(format_hours(0.0), "0h 00m");
    assert_eq!(format_hours(1.5), "1h 30m");
    assert_eq!(format_hours(2.0 + 5.0 / 60.0), "2h 05m");
}

#[test]
fn test_shellexpand() {
    std::env::set_var("HOME", "/home/test");
    assert_eq!(shellexpand("~/cal.db"), "/home/test/cal.db");
    assert_eq!(shellexpand("/abs/cal.db"), "/abs/cal.db");
}
