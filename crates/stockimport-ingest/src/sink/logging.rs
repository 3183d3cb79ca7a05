use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use stockimport_common::Element;
use tracing::info;

use super::ElementSink;

/// Dry-run sink: counts what it is given and logs per-batch totals
#[derive(Debug, Default)]
pub struct LoggingSink {
    batches: AtomicU64,
    elements: AtomicU64,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn elements(&self) -> u64 {
        self.elements.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ElementSink for LoggingSink {
    async fn initialize(&self) -> Result<()> {
        self.batches.store(0, Ordering::Relaxed);
        self.elements.store(0, Ordering::Relaxed);
        info!("Dry run: elements are parsed and counted, not stored");
        Ok(())
    }

    async fn save_collection(&self, elements: Vec<Element>) -> Result<()> {
        let batch = self.batches.fetch_add(1, Ordering::Relaxed);
        let total = self.elements.fetch_add(elements.len() as u64, Ordering::Relaxed)
            + elements.len() as u64;

        info!(batch, count = elements.len(), total, "Batch received");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_counts_batches_and_elements() {
        let sink = LoggingSink::new();
        sink.initialize().await.unwrap();

        let date = NaiveDate::from_ymd_opt(2019, 8, 1).unwrap();
        sink.save_collection(vec![Element::new("1", "2", date, 3); 4])
            .await
            .unwrap();
        sink.save_collection(Vec::new()).await.unwrap();

        assert_eq!(sink.batches(), 2);
        assert_eq!(sink.elements(), 4);
    }
}
