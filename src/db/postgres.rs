//! PostgreSQL connector.
//!
//! Batch inserts use one multi-row `INSERT` with `$n` positional
//! placeholders. Streaming queries run inside a read-only transaction with
//! `cursor_tuple_fraction = 1.0` so the planner favors incremental delivery
//! over materializing the result set before the first row arrives.

use futures::TryStreamExt;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Executor, Postgres, Row as _, Statement, TypeInfo};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::value::{Row, Value};

use super::{
    column_witnesses, BindKind, QueryStream, CURSOR_BUFFER_ROWS, POOL_MAX_CONNECTIONS,
    POOL_MIN_CONNECTIONS,
};

pub struct PgConnector {
    pool: PgPool,
}

impl PgConnector {
    /// Open a bounded pool against `dsn` and ping it.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .min_connections(POOL_MIN_CONNECTIONS)
            .connect(dsn)
            .await
            .map_err(|e| EngineError::database_with("failed to open postgres connection", e))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| EngineError::database_with("failed to ping postgres", e))?;

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

    /// Spawn a cursor task that owns a pooled connection and forwards
    /// decoded rows over a bounded channel.
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
                // Route the failure to whichever side is still listening.
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
    pool: &PgPool,
    sql: &str,
    cancel: &CancellationToken,
    col_tx: &mut Option<oneshot::Sender<Result<Vec<String>>>>,
    row_tx: &mpsc::Sender<Result<Row>>,
) -> Result<()> {
    let mut conn = pool.acquire().await?;
    let mut tx = conn.begin().await?;
    sqlx::query("SET TRANSACTION READ ONLY")
        .execute(&mut *tx)
        .await?;
    sqlx::query("SET LOCAL cursor_tuple_fraction = 1.0")
        .execute(&mut *tx)
        .await?;

    // Preparing first makes column metadata available even when the query
    // yields no rows.
    let stmt = (&mut *tx).prepare(sql).await?;
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

    let mut rows = stmt.query().fetch(&mut *tx);
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
    drop(rows);

    tx.commit().await?;
    Ok(())
}

fn build_insert_sql(table: &str, columns: &[String], row_count: usize) -> String {
    let col_list = columns.join(", ");
    let width = columns.len();

    let mut groups = Vec::with_capacity(row_count);
    for r in 0..row_count {
        let placeholders: Vec<String> = (0..width).map(|c| format!("${}", r * width + c + 1)).collect();
        groups.push(format!("({})", placeholders.join(", ")));
    }

    format!(
        "INSERT INTO {table} ({col_list}) VALUES {}",
        groups.join(", ")
    )
}

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

fn bind_value<'q>(query: PgQuery<'q>, value: &Value, witness: BindKind) -> PgQuery<'q> {
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

/// Per-column decode plan, resolved once from statement metadata rather than
/// per cell.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Decode {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
    /// Unknown type: attempt a lossy string decode, else fail naming it.
    Fallback(String),
}

impl Decode {
    fn plan(type_name: &str) -> Self {
        match type_name {
            "BOOL" => Self::Bool,
            "INT2" => Self::Int2,
            "INT4" => Self::Int4,
            "INT8" => Self::Int8,
            "FLOAT4" => Self::Float4,
            "FLOAT8" => Self::Float8,
            "NUMERIC" => Self::Numeric,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => Self::Text,
            "BYTEA" => Self::Bytes,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "TIMESTAMP" => Self::Timestamp,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "UUID" => Self::Uuid,
            "JSON" | "JSONB" => Self::Json,
            other => Self::Fallback(other.to_string()),
        }
    }
}

fn decode_row(row: &PgRow, plan: &[Decode]) -> Result<Row> {
    let mut out = Row::with_capacity(plan.len());
    for (i, decode) in plan.iter().enumerate() {
        out.push(decode_cell(row, i, decode)?);
    }
    Ok(out)
}

fn decode_cell(row: &PgRow, i: usize, decode: &Decode) -> Result<Value> {
    let value = match decode {
        Decode::Bool => row.try_get::<Option<bool>, _>(i)?.map(Value::Bool),
        Decode::Int2 => row
            .try_get::<Option<i16>, _>(i)?
            .map(|v| Value::Int(v.into())),
        Decode::Int4 => row
            .try_get::<Option<i32>, _>(i)?
            .map(|v| Value::Int(v.into())),
        Decode::Int8 => row.try_get::<Option<i64>, _>(i)?.map(Value::Int),
        Decode::Float4 => row
            .try_get::<Option<f32>, _>(i)?
            .map(|v| Value::Float(v.into())),
        Decode::Float8 => row.try_get::<Option<f64>, _>(i)?.map(Value::Float),
        Decode::Numeric => row
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
        Decode::Timestamp => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(i)?
            .map(|v| Value::Text(v.to_string())),
        Decode::TimestampTz => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)?
            .map(|v| Value::Text(v.to_rfc3339())),
        Decode::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(i)?
            .map(|v| Value::Text(v.to_string())),
        Decode::Json => row
            .try_get::<Option<serde_json::Value>, _>(i)?
            .map(|v| Value::Text(v.to_string())),
        Decode::Fallback(name) => match row.try_get_unchecked::<Option<String>, _>(i) {
            Ok(v) => v.map(Value::Text),
            Err(e) => {
                return Err(EngineError::database_with(
                    format!("unsupported postgres column type {name}"),
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
    fn insert_sql_numbers_placeholders_across_rows() {
        let cols = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let sql = build_insert_sql("people", &cols, 2);
        assert_eq!(
            sql,
            "INSERT INTO people (a, b, c) VALUES ($1, $2, $3), ($4, $5, $6)"
        );
    }

    #[test]
    fn unknown_types_get_a_fallback_plan() {
        assert_eq!(Decode::plan("INT8"), Decode::Int8);
        assert_eq!(Decode::plan("JSONB"), Decode::Json);
        assert_eq!(
            Decode::plan("INTERVAL"),
            Decode::Fallback("INTERVAL".to_string())
        );
    }
}
