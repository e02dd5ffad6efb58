//! The worker pool / batching engine.
//!
//! A single producer submits rows one at a time over a bounded channel; an
//! accumulator stage groups them into fixed-size batches; a bounded set of
//! workers pulls batches and applies the caller-supplied processing
//! operation. Backpressure comes from the channel bounds (rows: 2× workers,
//! batches: 1× workers), so memory stays constant regardless of input size.
//!
//! The first processing error is captured (at most one is retained) and
//! cancels the run token; every stage observes the token and unwinds
//! without draining further work. No retries happen at this layer: a batch
//! failure is terminal for the run.

use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::progress::RowCounter;
use crate::value::Row;

/// A batch of rows handed to one worker as a unit.
pub type Batch = Vec<Row>;

/// Producer-side handle. Dropping the last `RowSender` signals end-of-input,
/// after which the pool flushes the final partial batch and drains.
pub struct RowSender {
    tx: mpsc::Sender<Row>,
    cancel: CancellationToken,
}

impl RowSender {
    /// Submit one row, blocking (async) while downstream buffers are full.
    /// Returns [`EngineError::Cancelled`] once the run token fires or the
    /// pool has shut down.
    pub async fn submit(&self, row: Row) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            sent = self.tx.send(row) => sent.map_err(|_| EngineError::Cancelled),
        }
    }

    /// Blocking variant of [`RowSender::submit`] for producers running on a
    /// blocking thread.
    pub fn blocking_submit(&self, row: Row) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        // A closed channel means the pool unwound underneath us, which only
        // happens on cancellation.
        self.tx.blocking_send(row).map_err(|_| EngineError::Cancelled)
    }
}

/// Bounded pool of batch workers fed by an accumulator stage.
pub struct WorkerPool {
    cancel: CancellationToken,
    accumulator: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    first_error: Arc<StdMutex<Option<EngineError>>>,
}

impl WorkerPool {
    /// Start the accumulator and `workers` worker tasks. Each completed
    /// batch adds its row count to `counter`; the first `process` error
    /// cancels `cancel` and is surfaced by [`WorkerPool::close`].
    pub fn start<F, Fut>(
        cancel: CancellationToken,
        workers: usize,
        batch_size: usize,
        counter: Arc<RowCounter>,
        process: F,
    ) -> (Self, RowSender)
    where
        F: Fn(Batch) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send,
    {
        let workers = workers.max(1);
        let (row_tx, row_rx) = mpsc::channel::<Row>(workers * 2);
        let (batch_tx, batch_rx) = mpsc::channel::<Batch>(workers);
        let batch_rx = Arc::new(Mutex::new(batch_rx));
        let first_error = Arc::new(StdMutex::new(None));

        let accumulator = tokio::spawn(accumulate(
            cancel.clone(),
            batch_size,
            row_rx,
            batch_tx,
        ));

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let cancel = cancel.clone();
            let batch_rx = batch_rx.clone();
            let counter = counter.clone();
            let first_error = first_error.clone();
            let process = process.clone();
            handles.push(tokio::spawn(async move {
                run_worker(id, cancel, batch_rx, counter, first_error, process).await;
            }));
        }

        let sender = RowSender {
            tx: row_tx,
            cancel: cancel.clone(),
        };
        let pool = Self {
            cancel,
            accumulator,
            workers: handles,
            first_error,
        };
        (pool, sender)
    }

    /// Trigger fail-fast cancellation of every stage.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the accumulator and all workers to finish, then surface the
    /// first captured error, or [`EngineError::Cancelled`] when the token
    /// fired with no preceding error. Call after the last [`RowSender`] was
    /// dropped.
    pub async fn close(self) -> Result<()> {
        let _ = self.accumulator.await;
        for handle in self.workers {
            let _ = handle.await;
        }

        let captured = self
            .first_error
            .lock()
            .expect("first-error slot poisoned")
            .take();
        match captured {
            Some(err) => Err(err),
            None if self.cancel.is_cancelled() => Err(EngineError::Cancelled),
            None => Ok(()),
        }
    }
}

async fn accumulate(
    cancel: CancellationToken,
    batch_size: usize,
    mut row_rx: mpsc::Receiver<Row>,
    batch_tx: mpsc::Sender<Batch>,
) {
    let mut batch: Batch = Vec::with_capacity(batch_size);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            row = row_rx.recv() => match row {
                Some(row) => {
                    batch.push(row);
                    if batch.len() >= batch_size {
                        let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            sent = batch_tx.send(full) => {
                                if sent.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
                None => {
                    // End of input: flush the final partial batch. Dropping
                    // batch_tx on return closes the batch channel.
                    if !batch.is_empty() {
                        let last = std::mem::take(&mut batch);
                        tokio::select! {
                            _ = cancel.cancelled() => {},
                            _ = batch_tx.send(last) => {},
                        }
                    }
                    return;
                }
            }
        }
    }
}

async fn run_worker<F, Fut>(
    id: usize,
    cancel: CancellationToken,
    batch_rx: Arc<Mutex<mpsc::Receiver<Batch>>>,
    counter: Arc<RowCounter>,
    first_error: Arc<StdMutex<Option<EngineError>>>,
    process: F,
) where
    F: Fn(Batch) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    loop {
        // The receiver is shared; holding the lock only while waiting keeps
        // batch processing itself fully concurrent.
        let batch = {
            let mut rx = batch_rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => return,
                batch = rx.recv() => match batch {
                    Some(batch) => batch,
                    None => return,
                },
            }
        };

        let rows = batch.len() as u64;
        match process(batch).await {
            Ok(()) => counter.add(rows),
            Err(err) => {
                log::error!("worker {id}: {err}");
                let mut slot = first_error.lock().expect("first-error slot poisoned");
                if slot.is_none() {
                    *slot = Some(err);
                }
                drop(slot);
                cancel.cancel();
                return;
            }
        }
    }
}
