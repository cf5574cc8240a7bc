mod db;
mod models;
mod run;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "willcal=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let (db_path, args) = run::split_db_flag(std::env::args().collect())?;
    if args.len() < 2 {
        run::print_usage();
        return Ok(());
    }
    let db_path = match db_path {
        Some(path) => path,
        None => get_db_path()?,
    };
    run::as_cli(&args, &db_path)
}

fn get_db_path() -> Result<std::path::PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "willcal", "WillCal")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    Ok(data_dir.join("willcal.db"))
}
