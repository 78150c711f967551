//! Batch scheduler
//!
//! Groups pending server checks into waves so that a large fleet does not
//! open every connection in the same instant.

use crate::config::BatchConfig;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch_size: usize,
    max_wait: Duration,
}

impl BatchScheduler {
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_wait: Duration::from_millis(config.max_wait_ms),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Collect the next batch from `rx`
    ///
    /// Waits for a first item, then gathers more until the batch is full,
    /// `max_wait` has passed, or the channel is closed. Returns `None` once
    /// the channel is closed and drained.
    pub async fn next_batch<T>(&self, rx: &mut mpsc::Receiver<T>) -> Option<Vec<T>> {
        let first = rx.recv().await?;
        let mut batch = Vec::with_capacity(self.batch_size);
        batch.push(first);

        let deadline = tokio::time::sleep(self.max_wait);
        tokio::pin!(deadline);

        while batch.len() < self.batch_size {
            tokio::select! {
                biased;
                item = rx.recv() => match item {
                    Some(item) => batch.push(item),
                    None => break,
                },
                _ = &mut deadline => break,
            }
        }
        Some(batch)
    }
}
