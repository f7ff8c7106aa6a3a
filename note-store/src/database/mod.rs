//! SQLite persistence
//!
//! Pool setup, the schema, the query executor every statement flows
//! through, typed models and the note and tag repositories.

pub mod executor;
pub mod models;
pub mod repository;
pub mod schema;
pub mod tags;

pub use executor::{Executor, Param, RowSet};
pub use models::*;
pub use repository::NoteRepository;
pub use schema::ensure_schema;
pub use tags::{TagRef, TagRepository};

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Build options for a file-backed database.
fn connect_options(db_path: &Path) -> std::result::Result<SqliteConnectOptions, sqlx::Error> {
    SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display())).map(
        |opts| {
            opts.create_if_missing(true)
                .busy_timeout(Duration::from_secs(5))
                .journal_mode(SqliteJournalMode::Wal)
                .foreign_keys(true)
        },
    )
}

/// Single-writer pool: exactly one long-lived connection.
///
/// The connection is never recycled, which also keeps an in-memory
/// database alive for the lifetime of the pool.
fn single_writer_pool() -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
}

/// Open the database file and bring its schema up to date.
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    tracing::info!("Opening note database at: {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = single_writer_pool()
        .connect_with(connect_options(db_path)?)
        .await?;

    ensure_schema(&Executor::new(pool.clone())).await?;

    tracing::info!("Note database ready");
    Ok(pool)
}

/// Open a private in-memory database with the schema applied.
pub async fn create_memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = single_writer_pool().connect_with(options).await?;

    ensure_schema(&Executor::new(pool.clone())).await?;
    Ok(pool)
}
