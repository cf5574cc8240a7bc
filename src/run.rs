mod cli;

pub(crate) use cli::{as_cli, print_usage};

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::path::PathBuf;

/// Pull `--db <path>` out of the raw arguments so commands only see their own.
pub(crate) fn split_db_flag(mut args: Vec<String>) -> Result<(Option<PathBuf>, Vec<String>)> {
    let Some(pos) = args.iter().position(|a| a == "--db") else {
        return Ok((None, args));
    };
    if pos + 1 >= args.len() {
        bail!("--db requires a path");
    }
    let path = args.remove(pos + 1);
    args.remove(pos);
    Ok((Some(PathBuf::from(shellexpand(&path))), args))
}

/// Block boundaries from the command line. Times without an offset are UTC.
pub(crate) fn parse_time_arg(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(input) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(t) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(t.and_utc());
        }
    }
    bail!("Invalid time '{input}' (expected YYYY-MM-DDTHH:MM or RFC 3339)");
}

/// Optional `YYYY-MM-DD` positional argument, defaulting to today (UTC).
pub(crate) fn parse_day_arg(arg: Option<&String>) -> Result<NaiveDate> {
    match arg.filter(|a| !a.starts_with('-')) {
        Some(day) => NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|_| anyhow!("Invalid date '{day}' (expected YYYY-MM-DD)")),
        None => Ok(Utc::now().date_naive()),
    }
}

pub(crate) fn parse_id(arg: &str) -> Result<i64> {
    arg.parse()
        .map_err(|_| anyhow!("Invalid ID '{arg}' (expected a number)"))
}

pub(crate) fn format_hours(hours: f64) -> String {
    let minutes = (hours * 60.0).round() as i64;
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}

pub(crate) fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        format!("{home}/{rest}")
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests;
