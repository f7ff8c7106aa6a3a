//! Query executor
//!
//! The single choke point for SQL. Every call runs exactly one statement
//! inside its own transaction, so each call is one atomic unit. Callers
//! sequence multi-statement work themselves.

use crate::error::Result;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::query::Query;
use sqlx::{FromRow, SqlitePool};

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Int(i64),
    Text(String),
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Int(value as i64)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Param::Null)
    }
}

/// Rows returned by one statement, decoded on demand into typed records
#[derive(Default)]
pub struct RowSet {
    rows: Vec<SqliteRow>,
}

impl std::fmt::Debug for RowSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowSet").field("rows", &self.rows.len()).finish()
    }
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Decode every row as `T`
    pub fn decode<T>(&self) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow>,
    {
        self.rows
            .iter()
            .map(|row| T::from_row(row).map_err(Into::into))
            .collect()
    }

    /// Decode the first row as `T`, if there is one
    pub fn first<T>(&self) -> Result<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow>,
    {
        self.rows
            .first()
            .map(|row| T::from_row(row))
            .transpose()
            .map_err(Into::into)
    }
}

/// Async request/response wrapper around the engine
#[derive(Clone)]
pub struct Executor {
    pool: SqlitePool,
}

impl Executor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run one statement in its own transaction and return its rows.
    pub async fn execute(&self, sql: &str, params: &[Param]) -> Result<RowSet> {
        let mut tx = self.pool.begin().await?;

        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Statement failed: {} ({})", e, first_line(sql));
                e
            })?;

        tx.commit().await?;
        Ok(RowSet { rows })
    }

    /// `execute` followed by decoding every row as `T`
    pub async fn fetch<T>(&self, sql: &str, params: &[Param]) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow>,
    {
        self.execute(sql, params).await?.decode()
    }

    /// `execute` followed by decoding the first row as `T`
    pub async fn fetch_optional<T>(&self, sql: &str, params: &[Param]) -> Result<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow>,
    {
        self.execute(sql, params).await?.first()
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [Param],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Param::Null => query.bind(None::<i64>),
            Param::Int(value) => query.bind(*value),
            Param::Text(value) => query.bind(value.as_str()),
        };
    }
    query
}

fn first_line(sql: &str) -> &str {
    sql.trim().lines().next().unwrap_or_default()
}

/// `?, ?, ?` for an IN clause of `count` values
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
