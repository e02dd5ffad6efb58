//! MySQL connector.
//!
//! Accepts `mysql://` URLs as well as the driver-style
//! `user:pass@tcp(host:port)/db` and simplified `user:pass@host:port/db`
//! forms, which are normalized into the URL the pool understands. Batch
//! inserts use the dialect-neutral `?` placeholder.

use futures::TryStreamExt;
use sqlx::mysql::{MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, MySql, Row as _, Statement, TypeInfo};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::value::{Row, Value};

use super::{
    column_witnesses, BindKind, QueryStream, CURSOR_BUFFER_ROWS, POOL_MAX_CONNECTIONS,
    POOL_MIN_CONNECTIONS,
};

pub struct MySqlConnector {
    pool: MySqlPool,
}

impl MySqlConnector {
    /// Normalize the DSN, open a bounded pool, and ping it.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let url = normalize_dsn(dsn);
        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .min_connections(POOL_MIN_CONNECTIONS)
            .connect(&url)
            .await
            .map_err(|e| EngineError::database_with("failed to open mysql connection", e))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| EngineError::database_with("failed to ping mysql", e))?;

        Ok(Self { pool })
    }

    /// One multi-row INSERT per batch.
    pub async fn batch_insert(&self, table: &str, columns: &[String], rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let sql = build_insert_sql(table, columns, rows.len());
        let witnesses = column_witnesses(rows, columns.len());

        let mut query = sqlx::query(&sql);
        for row in rows {
            for (i, value) in row.iter().enumerate() {
                query = bind_value(query, value, witnesses[i]);
            }
        }

        query
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::database_with(format!("batch insert into {table} failed"), e))?;
        Ok(())
    }

    /// Spawn a cursor task forwarding decoded rows over a bounded channel.
    /// MySQL streams the result set off the wire as it is read, so no
    /// transaction setup is needed.
    pub async fn stream_query(
        &self,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<QueryStream> {
        let (col_tx, col_rx) = oneshot::channel();
        let (row_tx, row_rx) = mpsc::channel(CURSOR_BUFFER_ROWS);

        let pool = self.pool.clone();
        let sql = query.to_string();
        tokio::spawn(async move {
            let mut col_tx = Some(col_tx);
            if let Err(e) = run_cursor(&pool, &sql, &cancel, &mut col_tx, &row_tx).await {
                match col_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(e));
                    }
                    None => {
                        let _ = row_tx.send(Err(e)).await;
                    }
                }
            }
        });

        let columns = col_rx
            .await
            .map_err(|_| EngineError::database("cursor task exited before reporting columns"))??;
        Ok(QueryStream::new(columns, row_rx))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn run_cursor(
    pool: &MySqlPool,
    sql: &str,
    cancel: &CancellationToken,
    col_tx: &mut Option<oneshot::Sender<Result<Vec<String>>>>,
    row_tx: &mpsc::Sender<Result<Row>>,
) -> Result<()> {
    let mut conn = pool.acquire().await?;

    let stmt = (&mut *conn).prepare(sql).await?;
    let columns: Vec<String> = stmt
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let plan: Vec<Decode> = stmt.columns().iter().map(|c| Decode::plan(c.type_info().name())).collect();

    if col_tx
        .take()
        .expect("columns reported once")
        .send(Ok(columns))
        .is_err()
    {
        return Ok(());
    }

    let mut rows = stmt.query().fetch(&mut *conn);
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            next = rows.try_next() => next?,
        };
        let Some(row) = next else { break };

        let decoded = decode_row(&row, &plan)?;
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            sent = row_tx.send(Ok(decoded)) => {
                if sent.is_err() {
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}

/// Rewrite accepted DSN forms into the `mysql://` URL the pool parses.
pub(crate) fn normalize_dsn(dsn: &str) -> String {
    if dsn.starts_with("mysql://") {
        return dsn.to_string();
    }

    // Driver form: user:pass@tcp(host:port)/db[?params]
    if let Some(at) = dsn.find("@tcp(") {
        let creds = &dsn[..at];
        let rest = &dsn[at + "@tcp(".len()..];
        if let Some(close) = rest.find(')') {
            let addr = &rest[..close];
            let tail = rest[close + 1..].trim_start_matches('/');
            return format!("mysql://{creds}@{addr}/{tail}");
        }
    }

    // Simplified form: user:pass@host:port/db
    if dsn.contains('@') && dsn.contains('/') && !dsn.contains('(') {
        return format!("mysql://{dsn}");
    }

    dsn.to_string()
}

fn build_insert_sql(table: &str, columns: &[String], row_count: usize) -> String {
    let col_list = columns.join(", ");
    let group = format!(
        "({})",
        std::iter::repeat_n("?", columns.len())
            .collect::<Vec<_>>()
            .join(", ")
    );
    let groups: Vec<&str> = std::iter::repeat_n(group.as_str(), row_count).collect();

    format!(
        "INSERT INTO {table} ({col_list}) VALUES {}",
        groups.join(", ")
    )
}

type MySqlQuery<'q> = Query<'q, MySql, MySqlArguments>;

fn bind_value<'q>(query: MySqlQuery<'q>, value: &Value, witness: BindKind) -> MySqlQuery<'q> {
    match value {
        Value::Null => match witness {
            BindKind::Text => query.bind(None::<String>),
            BindKind::Int => query.bind(None::<i64>),
            BindKind::Float => query.bind(None::<f64>),
            BindKind::Bool => query.bind(None::<bool>),
            BindKind::Bytes => query.bind(None::<Vec<u8>>),
        },
        Value::Text(s) => query.bind(s.clone()),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Bool(b) => query.bind(*b),
        Value::Bytes(b) => query.bind(b.clone()),
    }
}

/// Per-column decode plan resolved once from statement metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Decode {
    Bool,
    Int,
    UInt,
    Float32,
    Float64,
    Decimal,
    Text,
    Bytes,
    Date,
    Time,
    DateTime,
    Timestamp,
    Json,
    Fallback(String),
}

impl Decode {
    fn plan(type_name: &str) -> Self {
        match type_name {
            "BOOLEAN" => Self::Bool,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Self::Int,
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => Self::UInt,
            "FLOAT" => Self::Float32,
            "DOUBLE" => Self::Float64,
            "DECIMAL" => Self::Decimal,
            "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" => {
                Self::Text
            }
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => Self::Bytes,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "DATETIME" => Self::DateTime,
            "TIMESTAMP" => Self::Timestamp,
            "JSON" => Self::Json,
            other => Self::Fallback(other.to_string()),
        }
    }
}

fn decode_row(row: &MySqlRow, plan: &[Decode]) -> Result<Row> {
    let mut out = Row::with_capacity(plan.len());
    for (i, decode) in plan.iter().enumerate() {
        out.push(decode_cell(row, i, decode)?);
    }
    Ok(out)
}

fn decode_cell(row: &MySqlRow, i: usize, decode: &Decode) -> Result<Value> {
    let value = match decode {
        Decode::Bool => row.try_get::<Option<bool>, _>(i)?.map(Value::Bool),
        Decode::Int => row.try_get::<Option<i64>, _>(i)?.map(Value::Int),
        Decode::UInt => row.try_get::<Option<u64>, _>(i)?.map(|v| {
            // Values past i64::MAX cannot be represented as Int.
            i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Text(v.to_string()))
        }),
        Decode::Float32 => row
            .try_get::<Option<f32>, _>(i)?
            .map(|v| Value::Float(v.into())),
        Decode::Float64 => row.try_get::<Option<f64>, _>(i)?.map(Value::Float),
        Decode::Decimal => row
            .try_get::<Option<rust_decimal::Decimal>, _>(i)?
            .map(|v| Value::Text(v.to_string())),
        Decode::Text => row.try_get::<Option<String>, _>(i)?.map(Value::Text),
        Decode::Bytes => row.try_get::<Option<Vec<u8>>, _>(i)?.map(Value::Bytes),
        Decode::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(i)?
            .map(|v| Value::Text(v.to_string())),
        Decode::Time => row
            .try_get::<Option<chrono::NaiveTime>, _>(i)?
            .map(|v| Value::Text(v.to_string())),
        Decode::DateTime => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(i)?
            .map(|v| Value::Text(v.to_string())),
        Decode::Timestamp => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)?
            .map(|v| Value::Text(v.to_rfc3339())),
        Decode::Json => row
            .try_get::<Option<serde_json::Value>, _>(i)?
            .map(|v| Value::Text(v.to_string())),
        Decode::Fallback(name) => match row.try_get_unchecked::<Option<String>, _>(i) {
            Ok(v) => v.map(Value::Text),
            Err(e) => {
                return Err(EngineError::database_with(
                    format!("unsupported mysql column type {name}"),
                    e,
                ));
            }
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_forms_normalize_to_urls() {
        assert_eq!(
            normalize_dsn("mysql://u:p@h:3306/db"),
            "mysql://u:p@h:3306/db"
        );
        assert_eq!(
            normalize_dsn("u:p@tcp(h:3306)/db"),
            "mysql://u:p@h:3306/db"
        );
        assert_eq!(
            normalize_dsn("u:p@tcp(h:3306)/db?charset=utf8"),
            "mysql://u:p@h:3306/db?charset=utf8"
        );
        assert_eq!(normalize_dsn("u:p@h:3306/db"), "mysql://u:p@h:3306/db");
    }

    #[test]
    fn insert_sql_repeats_placeholder_groups() {
        let cols = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            build_insert_sql("t", &cols, 3),
            "INSERT INTO t (a, b) VALUES (?, ?), (?, ?), (?, ?)"
        );
    }
}
