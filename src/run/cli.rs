use anyhow::{bail, Result};
use chrono::{Duration, NaiveTime, TimeZone, Utc};
use std::path::Path;

use super::{format_hours, parse_day_arg, parse_id, parse_time_arg, shellexpand};
use crate::db::{self, Database};
use crate::models::*;

pub(crate) fn as_cli(args: &[String], db_path: &Path) -> Result<()> {
    match args[1].as_str() {
        // Backup commands work on the file alone; opening it would migrate it.
        "backups" => cli_backups(db_path),
        "restore" => cli_restore(&args[2..], db_path),
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        "--version" | "-V" | "version" => {
            println!("willcal {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command @ ("status" | "categories" | "add-category" | "edit-category"
        | "delete-category" | "reorder-categories" | "blocks" | "add-block"
        | "edit-block" | "move-block" | "delete-block" | "totals" | "next") => {
            let mut db = Database::open(db_path)?;
            with_db(command, &args[2..], &mut db)
        }
        other => {
            print_usage();
            bail!("Unknown command: {other}");
        }
    }
}

fn with_db(command: &str, args: &[String], db: &mut Database) -> Result<()> {
    match command {
        "status" => cli_status(db),
        "categories" => cli_categories(db),
        "add-category" => cli_add_category(args, db),
        "edit-category" => cli_edit_category(args, db),
        "delete-category" => cli_delete_category(args, db),
        "reorder-categories" => cli_reorder_categories(args, db),
        "blocks" => cli_blocks(args, db),
        "add-block" => cli_add_block(args, db),
        "edit-block" => cli_edit_block(args, db),
        "move-block" => cli_move_block(args, db),
        "delete-block" => cli_delete_block(args, db),
        "totals" => cli_totals(args, db),
        "next" => cli_next(args, db),
        other => bail!("Unknown command: {other}"),
    }
}

pub(crate) fn print_usage() {
    println!("WillCal: local-only time-blocking calendar");
    println!();
    println!("Usage: willcal [--db <path>] <command>");
    println!();
    println!("Commands:");
    println!("  status                              Show database location and schema version");
    println!("  categories                          List categories in sidebar order");
    println!("  add-category <name>                 Add a category");
    println!("    --color <hex>                     Palette color (default: first unused)");
    println!("  edit-category <id>                  Change a category");
    println!("    --name <name> --color <hex> --totals on|off");
    println!("  delete-category <id>                Delete a category with no blocks");
    println!("  reorder-categories <id>...          Set the order of all categories");
    println!("  blocks [YYYY-MM-DD]                 List blocks for a day (default: today)");
    println!("  add-block <title> <start> <end>     Add a time block (times in UTC)");
    println!("    --category <name>                 Category (default: General)");
    println!("  edit-block <id>                     Change a block's title or category");
    println!("    --title <title> --category <name>");
    println!("  move-block <id> <start> <end>       Change a block's times");
    println!("  delete-block <id>                   Delete a time block");
    println!("  totals [YYYY-MM-DD]                 Hours per category for a day");
    println!("  next                                Show the next block starting soon");
    println!("    --within <minutes>                Look-ahead window (default: 60)");
    println!("  backups                             List pre-migration backups");
    println!("  restore <backup-file>               Replace the database with a backup");
    println!("  --help, -h                          Show this help");
    println!("  --version, -V                       Show version");
    println!();
    println!("Times: YYYY-MM-DDTHH:MM (UTC) or RFC 3339. Log level: RUST_LOG.");
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}

// ── Schema and backups ───────────────────────────────────────

fn cli_status(db: &mut Database) -> Result<()> {
    let location = match db.location().file_path() {
        Some(path) => path.display().to_string(),
        None => "(in memory)".to_string(),
    };
    let version = db.schema_version()?;
    let latest = Database::latest_schema_version()?;

    println!("WillCal: {location}");
    println!("{}", "─".repeat(40));
    println!("  Schema version:  v{version} (latest v{latest})");
    println!("  Categories:      {}", db.get_categories()?.len());
    if let Some(path) = db.location().file_path() {
        println!("  Backups:         {}", db::list_backups(path)?.len());
    }

    let history = db.get_schema_history()?;
    if !history.is_empty() {
        println!();
        println!("Applied migrations:");
        for applied in &history {
            println!(
                "  v{:<3} {:<26} {}",
                applied.version, applied.applied_at, applied.description
            );
        }
    }

    let pending = db.pending_migrations()?;
    if !pending.is_empty() {
        println!();
        println!("Pending migrations:");
        for (version, description) in &pending {
            println!("  v{version:<3} {description}");
        }
    }
    Ok(())
}

fn cli_backups(db_path: &Path) -> Result<()> {
    let backups = db::list_backups(db_path)?;
    if backups.is_empty() {
        println!("No backups for {}", db_path.display());
        return Ok(());
    }

    println!("{:<52} {:>10}  Modified (UTC)", "Backup", "Size");
    println!("{}", "─".repeat(84));
    for backup in &backups {
        let modified: chrono::DateTime<Utc> = backup.modified.into();
        println!(
            "{:<52} {:>10}  {}",
            backup.file_name(),
            backup.size,
            modified.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn cli_restore(args: &[String], db_path: &Path) -> Result<()> {
    let Some(backup) = args.first() else {
        bail!("Usage: willcal restore <backup-file>");
    };
    // Bare names refer to the backups directory beside the database.
    let mut backup_path = std::path::PathBuf::from(shellexpand(backup));
    if !backup_path.exists() && backup_path.components().count() == 1 {
        if let Some(listed) = db::list_backups(db_path)?
            .into_iter()
            .find(|b| b.file_name() == *backup)
        {
            backup_path = listed.path;
        }
    }

    db::restore_from_backup(&backup_path, db_path)?;
    println!(
        "Restored {} from {}",
        db_path.display(),
        backup_path.display()
    );
    Ok(())
}

// ── Categories ───────────────────────────────────────────────

fn cli_categories(db: &mut Database) -> Result<()> {
    let categories = db.get_categories()?;
    println!("{:<4} {:<24} {:<8} {:<6} Totals", "ID", "Name", "Color", "Order");
    println!("{}", "─".repeat(52));
    for cat in &categories {
        println!(
            "{:<4} {:<24} {:<8} {:<6} {}",
            cat.id.unwrap_or(0),
            cat.name,
            cat.color,
            cat.sort_order,
            if cat.include_in_totals { "on" } else { "off" },
        );
    }
    Ok(())
}

fn cli_add_category(args: &[String], db: &mut Database) -> Result<()> {
    let Some(name) = args.first().filter(|a| !a.starts_with('-')) else {
        bail!("Usage: willcal add-category <name> [--color <hex>]");
    };

    let color = match flag(args, "--color") {
        Some(color) => color.to_string(),
        None => {
            let used: Vec<String> = db
                .get_categories()?
                .into_iter()
                .map(|c| c.color.to_uppercase())
                .collect();
            PALETTE
                .iter()
                .find(|p| !used.contains(&p.to_string()))
                .unwrap_or(&DEFAULT_CATEGORY_COLOR)
                .to_string()
        }
    };

    let id = db.insert_category(&Category::new(name.clone(), color.clone()))?;
    println!("Added category {id}: {} ({color})", name.trim());
    Ok(())
}

fn cli_edit_category(args: &[String], db: &mut Database) -> Result<()> {
    let Some(id) = args.first() else {
        bail!("Usage: willcal edit-category <id> [--name <name>] [--color <hex>] [--totals on|off]");
    };
    let id = parse_id(id)?;

    let include_in_totals = match flag(args, "--totals") {
        Some("on") => Some(true),
        Some("off") => Some(false),
        Some(other) => bail!("--totals expects on or off, got '{other}'"),
        None => None,
    };
    let update = CategoryUpdate {
        name: flag(args, "--name").map(String::from),
        color: flag(args, "--color").map(String::from),
        include_in_totals,
    };
    if update.is_empty() {
        bail!("Nothing to change: pass --name, --color or --totals");
    }

    db.update_category(id, &update)?;
    println!("Updated category {id}");
    Ok(())
}

fn cli_delete_category(args: &[String], db: &mut Database) -> Result<()> {
    let Some(id) = args.first() else {
        bail!("Usage: willcal delete-category <id>");
    };
    let id = parse_id(id)?;
    db.delete_category(id)?;
    println!("Deleted category {id}");
    Ok(())
}

fn cli_reorder_categories(args: &[String], db: &mut Database) -> Result<()> {
    if args.is_empty() {
        bail!("Usage: willcal reorder-categories <id>...");
    }
    let ids = args
        .iter()
        .map(|a| parse_id(a))
        .collect::<Result<Vec<_>>>()?;
    db.reorder_categories(&ids)?;
    cli_categories(db)
}

// ── Time blocks ──────────────────────────────────────────────

fn cli_blocks(args: &[String], db: &mut Database) -> Result<()> {
    let day = parse_day_arg(args.first())?;
    let day_start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
    let blocks = db.get_blocks_in_range(&day_start, &(day_start + Duration::days(1)))?;
    if blocks.is_empty() {
        println!("No blocks on {day}");
        return Ok(());
    }

    let categories = db.get_categories()?;
    println!(
        "{:<5} {:<17} {:<8} {:<16} Title",
        "ID", "Time (UTC)", "Length", "Category"
    );
    println!("{}", "─".repeat(64));
    for block in &blocks {
        let category = block
            .category
            .id()
            .and_then(|id| Category::find_by_id(&categories, id))
            .map_or("-", |c| c.name.as_str());
        let minutes = block.duration().num_minutes();
        println!(
            "{:<5} {}-{:<11} {:<8} {:<16} {}",
            block.id.unwrap_or(0),
            block.start.format("%H:%M"),
            block.end.format("%H:%M"),
            format!("{}h {:02}m", minutes / 60, minutes % 60),
            category,
            block.title,
        );
    }
    Ok(())
}

fn cli_add_block(args: &[String], db: &mut Database) -> Result<()> {
    if args.len() < 3 {
        bail!("Usage: willcal add-block <title> <start> <end> [--category <name>]");
    }
    let start = parse_time_arg(&args[1])?;
    let end = parse_time_arg(&args[2])?;

    let name = flag(args, "--category").unwrap_or(DEFAULT_CATEGORY_NAME);
    let category_id = category_id_by_name(db, name)?;

    let id = db.insert_block(&Block::new(args[0].clone(), start, end, category_id))?;
    println!("Added block {id}: {}", args[0].trim());
    Ok(())
}

fn cli_edit_block(args: &[String], db: &mut Database) -> Result<()> {
    let Some(id) = args.first() else {
        bail!("Usage: willcal edit-block <id> [--title <title>] [--category <name>]");
    };
    let id = parse_id(id)?;
    let title = flag(args, "--title");
    let category = flag(args, "--category");
    if title.is_none() && category.is_none() {
        bail!("Nothing to change: pass --title or --category");
    }

    // Resolve everything before writing so a bad argument changes nothing.
    let category_id = category.map(|name| category_id_by_name(db, name)).transpose()?;
    if let Some(title) = title {
        db.update_block_title(id, title)?;
    }
    if let Some(category_id) = category_id {
        db.update_block_category(id, category_id)?;
    }
    println!("Updated block {id}");
    Ok(())
}

fn cli_move_block(args: &[String], db: &mut Database) -> Result<()> {
    if args.len() < 3 {
        bail!("Usage: willcal move-block <id> <start> <end>");
    }
    let id = parse_id(&args[0])?;
    let start = parse_time_arg(&args[1])?;
    let end = parse_time_arg(&args[2])?;
    db.update_block_time(id, &start, &end)?;
    println!("Moved block {id}");
    Ok(())
}

fn cli_delete_block(args: &[String], db: &mut Database) -> Result<()> {
    let Some(id) = args.first() else {
        bail!("Usage: willcal delete-block <id>");
    };
    let id = parse_id(id)?;
    let Some(block) = db.get_block_by_id(id)? else {
        bail!("Time block {id} not found");
    };
    db.delete_block(id)?;
    println!("Deleted block {id}: {}", block.title);
    Ok(())
}

fn category_id_by_name(db: &Database, name: &str) -> Result<i64> {
    db.get_category_by_name(name)?
        .and_then(|c| c.id)
        .ok_or_else(|| anyhow::anyhow!("Category '{name}' not found"))
}

// ── Queries ──────────────────────────────────────────────────

fn cli_totals(args: &[String], db: &mut Database) -> Result<()> {
    let day = parse_day_arg(args.first())?;
    let totals = db.get_daily_totals(day)?;

    println!("WillCal: {day}");
    println!("{}", "─".repeat(40));
    for total in &totals {
        println!("  {:<24} {}", total.name, format_hours(total.hours));
    }
    let sum: f64 = totals.iter().map(|t| t.hours).sum();
    println!("{}", "─".repeat(40));
    println!("  {:<24} {}", "Total", format_hours(sum));
    Ok(())
}

fn cli_next(args: &[String], db: &mut Database) -> Result<()> {
    let within = match flag(args, "--within") {
        Some(minutes) => minutes
            .parse::<i64>()
            .ok()
            .filter(|m| *m > 0)
            .ok_or_else(|| anyhow::anyhow!("--within expects a positive number of minutes"))?,
        None => 60,
    };

    let now = Utc::now();
    match db.get_next_upcoming_block(&now, &(now + Duration::minutes(within)))? {
        Some(block) => {
            let minutes = (block.start - now).num_minutes();
            println!(
                "{} at {} UTC (in {minutes} min)",
                block.title,
                block.start.format("%H:%M")
            );
        }
        None => println!("Nothing starts in the next {within} minutes"),
    }
    Ok(())
}

#[cfg(test)]
mod tests;
