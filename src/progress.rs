//! Shared progress counting and periodic reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How often the reporter samples the counter.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Monotonic row count shared by all workers of one run. Owned by the
/// orchestrator and handed out by `Arc`; its lifecycle is bounded to the run.
#[derive(Debug, Default)]
pub struct RowCounter {
    count: AtomicU64,
}

impl RowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `n` more completed rows.
    #[inline]
    pub fn add(&self, n: u64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Current count. May lag true completion by in-flight batches.
    #[inline]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

/// Spawn a task that logs `verb` progress every [`REPORT_INTERVAL`] until
/// `cancel` fires. The rate is cumulative rows over elapsed wall time.
pub fn spawn_reporter(
    counter: Arc<RowCounter>,
    cancel: CancellationToken,
    verb: &'static str,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        // interval() would tick immediately; start one period out instead.
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + REPORT_INTERVAL, REPORT_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    let count = counter.get();
                    let elapsed = started.elapsed().as_secs_f64();
                    let rate = if elapsed > 0.0 { count as f64 / elapsed } else { 0.0 };
                    log::info!("{verb} {count} rows ({rate:.0} rows/sec)");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let counter = RowCounter::new();
        counter.add(3);
        counter.add(4);
        assert_eq!(counter.get(), 7);
    }
}
