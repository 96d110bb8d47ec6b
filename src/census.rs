//! Live Task Census
//!
//! Counts background tasks that are still alive so callers can check for leaks.
//! A task enters the census when it is spawned and leaves it when its future is
//! dropped, whether it returned normally or was aborted.

use crate::error::ApiError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const SETTLE_POLL: Duration = Duration::from_millis(10);

/// Shared counter of live tasks. Clones observe the same count.
#[derive(Debug, Clone, Default)]
pub struct TaskCensus {
    live: Arc<AtomicUsize>,
}

impl TaskCensus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks currently alive.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Register one task; it stays counted until the guard is dropped.
    pub fn enter(&self) -> TaskGuard {
        self.live.fetch_add(1, Ordering::AcqRel);
        TaskGuard {
            live: Arc::clone(&self.live),
        }
    }

    /// Wait until the live count drops to `expected` or `timeout` elapses.
    pub async fn settle(&self, expected: usize, timeout: Duration) -> Result<(), ApiError> {
        let start = Instant::now();
        loop {
            let live = self.live();
            if live <= expected {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(ApiError::Runtime(format!(
                    "{} task(s) still alive after {:?}, expected {}",
                    live, timeout, expected
                )));
            }
            sleep(SETTLE_POLL).await;
        }
    }
}

/// Membership token for one live task.
#[derive(Debug)]
pub struct TaskGuard {
    live: Arc<AtomicUsize>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}
