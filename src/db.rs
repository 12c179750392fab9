use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

pub const DB_FILE: &str = "index.sqlite";

/// Open (creating if needed) the snapshot database inside `dir`.
pub async fn connect(dir: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(dir)?;
    let db_path = dir.join(DB_FILE);

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
