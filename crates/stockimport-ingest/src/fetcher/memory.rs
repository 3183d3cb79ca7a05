use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::RangeFetcher;

/// A call observed by [`InMemoryFetcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchCall {
    Size(String),
    Range { resource: String, from: u64, length: u64 },
}

/// Serves resources held in memory and records every call.
///
/// Used by tests and for embedding the importer over data that is already
/// loaded. Failures can be injected for the size query or for every range
/// starting at or past an offset.
#[derive(Debug, Default)]
pub struct InMemoryFetcher {
    resources: HashMap<String, Vec<u8>>,
    fail_size: bool,
    fail_from_offset: Option<u64>,
    delay: Option<Duration>,
    calls: Mutex<Vec<FetchCall>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, resource: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.resources.insert(resource.into(), data.into());
        self
    }

    pub fn fail_size(mut self) -> Self {
        self.fail_size = true;
        self
    }

    /// Fail every range whose offset is `>= offset`
    pub fn fail_from_offset(mut self, offset: u64) -> Self {
        self.fail_from_offset = Some(offset);
        self
    }

    /// Sleep before answering each range
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.lock_calls().clone()
    }

    /// Number of range requests served or refused so far
    pub fn range_calls(&self) -> usize {
        self.lock_calls()
            .iter()
            .filter(|c| matches!(c, FetchCall::Range { .. }))
            .count()
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<FetchCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resource(&self, resource: &str) -> Result<&[u8]> {
        self.resources
            .get(resource)
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow!("resource '{}' not found", resource))
    }
}

#[async_trait]
impl RangeFetcher for InMemoryFetcher {
    async fn size(&self, resource: &str) -> Result<u64> {
        self.lock_calls().push(FetchCall::Size(resource.to_string()));

        if self.fail_size {
            bail!("size query for '{}' failed", resource);
        }
        Ok(self.resource(resource)?.len() as u64)
    }

    async fn fetch_range(&self, resource: &str, from: u64, length: u64) -> Result<Vec<u8>> {
        self.lock_calls().push(FetchCall::Range {
            resource: resource.to_string(),
            from,
            length,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_from_offset.is_some_and(|offset| from >= offset) {
            bail!("injected failure at offset {}", from);
        }

        let data = self.resource(resource)?;
        let start = usize::try_from(from)?;
        let end = usize::try_from(from + length)?;
        data.get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| anyhow!("range {}..{} out of bounds for '{}'", start, end, resource))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_ranges_and_records_calls() {
        let fetcher = InMemoryFetcher::new().with_resource("stock.csv", "abcdef");

        assert_eq!(fetcher.size("stock.csv").await.unwrap(), 6);
        assert_eq!(fetcher.fetch_range("stock.csv", 2, 3).await.unwrap(), b"cde");
        assert!(fetcher.fetch_range("stock.csv", 5, 3).await.is_err());
        assert!(fetcher.size("missing.csv").await.is_err());

        assert_eq!(fetcher.range_calls(), 2);
        assert_eq!(fetcher.calls()[0], FetchCall::Size("stock.csv".to_string()));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let fetcher = InMemoryFetcher::new()
            .with_resource("stock.csv", "abcdef")
            .fail_from_offset(3);

        assert!(fetcher.fetch_range("stock.csv", 0, 3).await.is_ok());
        assert!(fetcher.fetch_range("stock.csv", 3, 3).await.is_err());

        let fetcher = InMemoryFetcher::new().with_resource("stock.csv", "abc").fail_size();
        assert!(fetcher.size("stock.csv").await.is_err());
    }
}
