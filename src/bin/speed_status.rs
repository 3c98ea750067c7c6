//! speed_status - print the latest status record per attribute as JSON.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use speedtrap_kernel::sink::{SqliteStatusStore, StatusStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "Dump the vehicle status store")]
struct Args {
    /// Path to the status database.
    #[arg(long, env = "SPEEDTRAP_DB_PATH", default_value = "vehicle_status.db")]
    db_path: PathBuf,

    /// Only print this attribute (e.g. a colour).
    #[arg(long)]
    key: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let store = SqliteStatusStore::open(&args.db_path)?;
    let records = match args.key.as_deref() {
        Some(key) => store.get(key)?.into_iter().collect::<Vec<_>>(),
        None => store.list()?,
    };
    if records.is_empty() {
        log::warn!("no status records in {}", args.db_path.display());
    }
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
