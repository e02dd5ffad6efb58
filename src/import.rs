//! Import orchestration: file → rows → batches → database.
//!
//! The file reader runs on a blocking thread and feeds the worker pool
//! through a bounded channel; workers perform the batch inserts. A read or
//! submit failure cancels the pool; the pool's first captured error wins
//! over a produce-side cancellation.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Connector;
use crate::error::{EngineError, Result};
use crate::format::FormatReader;
use crate::pool::{RowSender, WorkerPool};
use crate::progress::{self, RowCounter};

/// Run one import described by `config`. Returns the number of rows
/// delivered to the database.
pub async fn run_import(config: &Config, cancel: &CancellationToken) -> Result<u64> {
    log::info!("starting import: {} -> {}", config.input_file, config.table);

    let connector = Arc::new(Connector::connect(&config.dsn).await?);
    let result = import_file(config, cancel, Arc::clone(&connector)).await;
    connector.close().await;
    result
}

async fn import_file(
    config: &Config,
    cancel: &CancellationToken,
    connector: Arc<Connector>,
) -> Result<u64> {
    let format = config.input_format()?;

    // Opening can read sizeable chunks (the XLSX sheet in particular), so
    // it happens off the async runtime along with the read loop below.
    let path = config.input_file.clone();
    let reader = tokio::task::spawn_blocking(move || FormatReader::open(format, &path))
        .await
        .map_err(|e| EngineError::source_read(format!("reader task failed to start: {e}")))??;
    let columns = reader.columns().to_vec();
    log::info!("detected {} columns: {columns:?}", columns.len());

    let counter = Arc::new(RowCounter::new());
    let reporter_cancel = cancel.child_token();
    let reporter =
        progress::spawn_reporter(Arc::clone(&counter), reporter_cancel.clone(), "processed");
    let started = Instant::now();

    let table = config.table.clone();
    let insert_columns = columns.clone();
    let (pool, sender) = WorkerPool::start(
        cancel.child_token(),
        config.workers,
        config.batch_size,
        Arc::clone(&counter),
        move |batch| {
            let connector = Arc::clone(&connector);
            let table = table.clone();
            let columns = insert_columns.clone();
            async move { connector.batch_insert(&table, &columns, &batch).await }
        },
    );

    let producer = tokio::task::spawn_blocking(move || produce_rows(reader, sender));
    let produced = match producer.await {
        Ok(res) => res,
        Err(e) => Err(EngineError::source_read(format!("reader task failed: {e}"))),
    };

    let drained = match &produced {
        Ok(()) => pool.close().await,
        Err(_) => {
            pool.cancel();
            pool.close().await
        }
    };

    reporter_cancel.cancel();
    let _ = reporter.await;

    first_terminal_error(produced, drained)?;

    let total = counter.get();
    let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
    log::info!(
        "import completed: {total} rows in {elapsed:.2} seconds ({:.0} rows/sec)",
        total as f64 / elapsed
    );
    Ok(total)
}

/// Read rows until end-of-stream, submitting each to the pool. The sender
/// drops on return, which signals end-of-input to the accumulator.
fn produce_rows(mut reader: FormatReader, sender: RowSender) -> Result<()> {
    loop {
        match reader.next_row() {
            Ok(Some(row)) => {
                if let Err(e) = sender.blocking_submit(row) {
                    reader.close();
                    return Err(e);
                }
            }
            Ok(None) => {
                reader.close();
                return Ok(());
            }
            Err(e) => {
                reader.close();
                return Err(e);
            }
        }
    }
}

/// The run's terminal error. A produce-side `Cancelled` usually means the
/// pool shut down underneath the producer, so the drain error is the real
/// cause; any other produce-side error preceded the drain result.
fn first_terminal_error(produced: Result<()>, drained: Result<()>) -> Result<()> {
    match (produced, drained) {
        (Ok(()), drained) => drained,
        (Err(p), Ok(())) => Err(p),
        (Err(p), Err(d)) => {
            if p.is_cancelled() && !d.is_cancelled() {
                Err(d)
            } else {
                Err(p)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_error_beats_produce_side_cancellation() {
        let err = first_terminal_error(
            Err(EngineError::Cancelled),
            Err(EngineError::database("insert failed")),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Database { .. }));
    }

    #[test]
    fn read_error_beats_drain_cancellation() {
        let err = first_terminal_error(
            Err(EngineError::source_read("bad record")),
            Err(EngineError::Cancelled),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::SourceRead { .. }));
    }
}
