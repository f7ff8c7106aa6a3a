//! Database schema
//!
//! Creates the notes, tags and note_tags tables and adds any column that an
//! older database is missing. Forward-only: columns are never dropped or
//! renamed. Safe to run on every startup.

use super::executor::Executor;
use crate::error::{AppError, Result};
use sqlx::FromRow;

const CREATE_NOTES: &str = r#"
    CREATE TABLE IF NOT EXISTS notes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT,
        content TEXT,
        title_iv TEXT,
        content_iv TEXT,
        isInBin INTEGER DEFAULT 0,
        reminder INTEGER,
        notificationId TEXT,
        isLocked INTEGER DEFAULT 0
    )
"#;

const CREATE_TAGS: &str = r#"
    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE,
        color TEXT DEFAULT '#444444'
    )
"#;

const CREATE_NOTE_TAGS: &str = r#"
    CREATE TABLE IF NOT EXISTS note_tags (
        note_id INTEGER,
        tag_id INTEGER,
        PRIMARY KEY (note_id, tag_id),
        FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE,
        FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
    )
"#;

/// Columns added after the first release: (table, column, definition)
const ADDITIVE_COLUMNS: &[(&str, &str, &str)] = &[
    ("notes", "isLocked", "INTEGER DEFAULT 0"),
    ("notes", "notificationId", "TEXT"),
    ("tags", "color", "TEXT DEFAULT '#444444'"),
];

#[derive(FromRow)]
struct ColumnInfo {
    name: String,
}

/// Create or upgrade the schema. Any failure is fatal for the store.
pub async fn ensure_schema(exec: &Executor) -> Result<()> {
    tracing::info!("Ensuring note store schema");

    for (table, sql) in [
        ("notes", CREATE_NOTES),
        ("tags", CREATE_TAGS),
        ("note_tags", CREATE_NOTE_TAGS),
    ] {
        exec.execute(sql, &[])
            .await
            .map_err(|e| AppError::Schema(format!("Failed to create {} table: {}", table, e)))?;
    }

    for (table, column, definition) in ADDITIVE_COLUMNS {
        add_column_if_missing(exec, table, column, definition).await?;
    }

    tracing::info!("Schema ready");
    Ok(())
}

async fn column_names(exec: &Executor, table: &str) -> Result<Vec<String>> {
    let columns: Vec<ColumnInfo> = exec
        .fetch(&format!("PRAGMA table_info({})", table), &[])
        .await
        .map_err(|e| AppError::Schema(format!("Failed to inspect {} table: {}", table, e)))?;

    Ok(columns.into_iter().map(|c| c.name).collect())
}

async fn add_column_if_missing(
    exec: &Executor,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<()> {
    if column_names(exec, table).await?.iter().any(|name| name == column) {
        return Ok(());
    }

    tracing::info!("Adding column {}.{}", table, column);
    exec.execute(
        &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition),
        &[],
    )
    .await
    .map_err(|e| AppError::Schema(format!("Failed to add {}.{}: {}", table, column, e)))?;

    Ok(())
}
