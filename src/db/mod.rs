//! Database adapters: one connector per engine behind a closed dispatch
//! enum, selected by inspecting the connection-string form.
//!
//! Connectors expose pooled connections, multi-row batch inserts, and
//! streaming query cursors. A cursor is served by a spawned task that owns
//! the pooled connection and forwards decoded rows over a bounded channel,
//! so the consumer side never materializes a result set.

pub mod mysql;
pub mod postgres;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::value::{Row, Value};

use self::mysql::MySqlConnector;
use self::postgres::PgConnector;

/// Bounded max-open connections per pool.
pub(crate) const POOL_MAX_CONNECTIONS: u32 = 25;
/// Connections the pool keeps warm.
pub(crate) const POOL_MIN_CONNECTIONS: u32 = 5;
/// Decoded rows buffered between a cursor task and its consumer.
pub(crate) const CURSOR_BUFFER_ROWS: usize = 1024;

/// A database connector, one variant per supported engine.
pub enum Connector {
    Postgres(PgConnector),
    MySql(MySqlConnector),
}

impl Connector {
    /// Select the engine from the DSN form, open a bounded pool, and verify
    /// liveness immediately. An unrecognized DSN form is a configuration
    /// error; an unreachable database fails fast here.
    pub async fn connect(dsn: &str) -> Result<Self> {
        match dialect_of(dsn)? {
            Dialect::Postgres => Ok(Self::Postgres(PgConnector::connect(dsn).await?)),
            Dialect::MySql => Ok(Self::MySql(MySqlConnector::connect(dsn).await?)),
        }
    }

    /// Insert `rows` into `table` as a single multi-row statement.
    /// All-or-nothing per batch; an empty batch is a no-op.
    pub async fn batch_insert(&self, table: &str, columns: &[String], rows: &[Row]) -> Result<()> {
        match self {
            Self::Postgres(c) => c.batch_insert(table, columns, rows).await,
            Self::MySql(c) => c.batch_insert(table, columns, rows).await,
        }
    }

    /// Execute a read-only query and return a forward-only row cursor.
    /// Column names are available even for zero-row results.
    pub async fn stream_query(
        &self,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<QueryStream> {
        match self {
            Self::Postgres(c) => c.stream_query(query, cancel).await,
            Self::MySql(c) => c.stream_query(query, cancel).await,
        }
    }

    /// Release the connection pool.
    pub async fn close(&self) {
        match self {
            Self::Postgres(c) => c.close().await,
            Self::MySql(c) => c.close().await,
        }
    }
}

/// Database engine selected by the DSN form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Postgres,
    MySql,
}

/// Inspect the DSN form: a `postgres://`/`postgresql://` scheme selects
/// PostgreSQL; a `mysql://` scheme or the embedded `@tcp(` marker of the
/// driver form selects MySQL. Anything else is a configuration error.
pub(crate) fn dialect_of(dsn: &str) -> Result<Dialect> {
    if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
        return Ok(Dialect::Postgres);
    }
    if dsn.starts_with("mysql://") || dsn.contains("@tcp(") {
        return Ok(Dialect::MySql);
    }
    Err(EngineError::config(
        "unsupported database type in DSN (expected postgres:// or mysql://)",
    ))
}

/// A lazy, forward-only stream of decoded result rows.
pub struct QueryStream {
    columns: Vec<String>,
    rows: mpsc::Receiver<Result<Row>>,
}

impl QueryStream {
    pub(crate) fn new(columns: Vec<String>, rows: mpsc::Receiver<Result<Row>>) -> Self {
        Self { columns, rows }
    }

    /// Column names from the executed statement's result metadata.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The next row, `Ok(None)` at the natural end of the result set, or
    /// the error that stopped the cursor.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        match self.rows.recv().await {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Concrete bind type for a column, witnessed from the batch itself so NULLs
/// can be bound with a type the server will accept alongside the column's
/// non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindKind {
    Text,
    Int,
    Float,
    Bool,
    Bytes,
}

impl BindKind {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Text(_) => Some(Self::Text),
            Value::Int(_) => Some(Self::Int),
            Value::Float(_) => Some(Self::Float),
            Value::Bool(_) => Some(Self::Bool),
            Value::Bytes(_) => Some(Self::Bytes),
        }
    }
}

/// Per-column bind kinds for one batch: the first non-null value decides;
/// an all-null column binds as text.
pub(crate) fn column_witnesses(rows: &[Row], width: usize) -> Vec<BindKind> {
    (0..width)
        .map(|i| {
            rows.iter()
                .find_map(|row| row.get(i).and_then(BindKind::of))
                .unwrap_or(BindKind::Text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_form_selects_the_dialect() {
        assert_eq!(
            dialect_of("postgres://u:p@h:5432/db").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            dialect_of("postgresql://u:p@h/db").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(dialect_of("mysql://u:p@h:3306/db").unwrap(), Dialect::MySql);
        assert_eq!(dialect_of("u:p@tcp(h:3306)/db").unwrap(), Dialect::MySql);

        let err = dialect_of("sqlite:///tmp/db.sqlite").unwrap_err();
        assert!(err.to_string().contains("unsupported database type"));
    }

    #[test]
    fn witnesses_use_first_non_null() {
        let rows = vec![
            vec![Value::Null, Value::Text("a".into()), Value::Null],
            vec![Value::Int(1), Value::Text("b".into()), Value::Null],
        ];
        assert_eq!(
            column_witnesses(&rows, 3),
            vec![BindKind::Int, BindKind::Text, BindKind::Text]
        );
    }
}
