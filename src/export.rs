//! Export orchestration: database cursor → format writer.
//!
//! Single-threaded by construction: one writable file is the sole sink, so
//! fanning rows out to workers would only reorder writes without adding
//! throughput. The cursor task streams rows over a bounded channel and the
//! loop here drains it, checking the cancellation token at every step.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Connector;
use crate::error::{EngineError, Result};
use crate::format::FormatWriter;
use crate::progress::{self, RowCounter};

/// Run one export described by `config`. Returns the number of rows
/// written to the output file.
pub async fn run_export(config: &Config, cancel: &CancellationToken) -> Result<u64> {
    log::info!("starting export: {} -> {}", config.query, config.output_file);

    let connector = Connector::connect(&config.dsn).await?;
    let result = export_rows(config, cancel, &connector).await;
    connector.close().await;
    result
}

async fn export_rows(
    config: &Config,
    cancel: &CancellationToken,
    connector: &Connector,
) -> Result<u64> {
    let format = config.output_format()?;

    let mut stream = connector
        .stream_query(&config.query, cancel.child_token())
        .await?;
    let columns = stream.columns().to_vec();
    log::info!("exporting {} columns: {columns:?}", columns.len());

    let mut writer = FormatWriter::open(format, &config.output_file, &columns)?;

    let counter = Arc::new(RowCounter::new());
    let reporter_cancel = cancel.child_token();
    let reporter =
        progress::spawn_reporter(Arc::clone(&counter), reporter_cancel.clone(), "exported");
    let started = Instant::now();

    let drained = drain_cursor(cancel, &mut stream, &mut writer, &counter).await;

    reporter_cancel.cancel();
    let _ = reporter.await;

    // On failure the writer is dropped as-is; the run is already terminal
    // and partial output is the caller's to discard.
    drained?;
    writer.flush()?;
    writer.close()?;

    let total = counter.get();
    let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
    log::info!(
        "export completed: {total} rows in {elapsed:.2} seconds ({:.0} rows/sec)",
        total as f64 / elapsed
    );
    Ok(total)
}

async fn drain_cursor(
    cancel: &CancellationToken,
    stream: &mut crate::db::QueryStream,
    writer: &mut FormatWriter,
    counter: &RowCounter,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            next = stream.next_row() => match next? {
                Some(row) => {
                    writer.write_row(&row)?;
                    counter.add(1);
                }
                None => {
                    // A cancelled cursor task closes its channel, which is
                    // indistinguishable from natural exhaustion here.
                    if cancel.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    return Ok(());
                }
            }
        }
    }
}
