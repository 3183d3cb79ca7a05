use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use stockimport_common::Element;

use super::ElementSink;

/// Keeps every batch in memory, in arrival order.
///
/// Failures can be injected for `initialize` or for the n-th batch (0-based),
/// and each save can be slowed down to exercise pipelining.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<Element>>>,
    initialize_calls: AtomicUsize,
    save_calls: AtomicUsize,
    fail_initialize: bool,
    fail_on_batch: Option<usize>,
    delay: Option<Duration>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn fail_on_batch(mut self, index: usize) -> Self {
        self.fail_on_batch = Some(index);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Stored batches, in the order they were saved
    pub fn batches(&self) -> Vec<Vec<Element>> {
        self.lock().clone()
    }

    /// All stored elements, flattened
    pub fn elements(&self) -> Vec<Element> {
        self.lock().iter().flatten().cloned().collect()
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    /// Saves attempted, including the failing one
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<Element>>> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ElementSink for MemorySink {
    async fn initialize(&self) -> Result<()> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize {
            bail!("destination unavailable");
        }
        self.lock().clear();
        Ok(())
    }

    async fn save_collection(&self, elements: Vec<Element>) -> Result<()> {
        let index = self.save_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_on_batch == Some(index) {
            bail!("injected failure saving batch {}", index);
        }

        self.lock().push(elements);
        Ok(())
    }
}
