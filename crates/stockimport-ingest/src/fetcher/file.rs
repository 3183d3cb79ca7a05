use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, instrument};

use super::RangeFetcher;

/// Reads ranges of a local file; accepts plain paths and `file://` URIs
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileFetcher;

impl LocalFileFetcher {
    pub fn new() -> Self {
        Self
    }
}

fn to_path(resource: &str) -> PathBuf {
    PathBuf::from(resource.strip_prefix("file://").unwrap_or(resource))
}

#[async_trait]
impl RangeFetcher for LocalFileFetcher {
    #[instrument(skip(self))]
    async fn size(&self, resource: &str) -> Result<u64> {
        let metadata = tokio::fs::metadata(to_path(resource))
            .await
            .with_context(|| format!("Failed to stat {}", resource))?;
        Ok(metadata.len())
    }

    #[instrument(skip(self))]
    async fn fetch_range(&self, resource: &str, from: u64, length: u64) -> Result<Vec<u8>> {
        let mut file = tokio::fs::File::open(to_path(resource))
            .await
            .with_context(|| format!("Failed to open {}", resource))?;

        file.seek(SeekFrom::Start(from))
            .await
            .with_context(|| format!("Failed to seek to {} in {}", from, resource))?;

        let capacity = usize::try_from(length).context("Range too large for this platform")?;
        let mut buffer = vec![0u8; capacity];
        file.read_exact(&mut buffer)
            .await
            .with_context(|| format!("Failed to read {} bytes at {} from {}", length, from, resource))?;

        debug!(bytes = buffer.len(), "Read range from file");

        Ok(buffer)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_file_uri_prefix_stripped() {
        assert_eq!(to_path("file:///data/stock.csv"), PathBuf::from("/data/stock.csv"));
        assert_eq!(to_path("stock.csv"), PathBuf::from("stock.csv"));
    }

    #[tokio::test]
    async fn test_reads_requested_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stock.csv");
        tokio::fs::write(&path, b"0123456789").await.unwrap();
        let resource = path.to_string_lossy().to_string();

        let fetcher = LocalFileFetcher::new();
        assert_eq!(fetcher.size(&resource).await.unwrap(), 10);
        assert_eq!(fetcher.fetch_range(&resource, 3, 4).await.unwrap(), b"3456");
        assert!(fetcher.fetch_range(&resource, 8, 4).await.is_err());
    }
}
