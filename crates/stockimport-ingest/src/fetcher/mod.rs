//! Byte-range access to the resource being imported
//!
//! The pipeline only needs two things from a source: the total length and the
//! bytes of a half-open range. [`RangeFetcher`] is that seam; this module ships
//! implementations for S3, HTTP(S) and local files plus an in-memory one for
//! tests.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ImporterConfig;

pub mod file;
pub mod http;
pub mod memory;
pub mod s3;

pub use file::LocalFileFetcher;
pub use http::HttpRangeFetcher;
pub use memory::{FetchCall, InMemoryFetcher};
pub use s3::S3RangeFetcher;

/// Random access to the bytes of a remote resource
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Total length of `resource` in bytes
    async fn size(&self, resource: &str) -> Result<u64>;

    /// Bytes `[from, from + length)` of `resource`.
    ///
    /// Callers keep the range inside `[0, size)`; implementations may return
    /// fewer bytes only if the resource changed underneath them.
    async fn fetch_range(&self, resource: &str, from: u64, length: u64) -> Result<Vec<u8>>;
}

/// Which fetcher serves a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SourceKind {
    /// Pick by URI scheme
    #[default]
    Auto,
    S3,
    Http,
    File,
}

impl SourceKind {
    /// Resolve `Auto` from the scheme of `uri`; other kinds are returned as is
    pub fn resolve(self, uri: &str) -> SourceKind {
        match self {
            SourceKind::Auto => {
                let lower = uri.to_ascii_lowercase();
                if lower.starts_with("s3://") {
                    SourceKind::S3
                } else if lower.starts_with("http://") || lower.starts_with("https://") {
                    SourceKind::Http
                } else {
                    SourceKind::File
                }
            },
            other => other,
        }
    }
}

/// Build the fetcher for `uri`
pub async fn open(
    kind: SourceKind,
    uri: &str,
    config: &ImporterConfig,
) -> Result<Arc<dyn RangeFetcher>> {
    let fetcher: Arc<dyn RangeFetcher> = match kind.resolve(uri) {
        SourceKind::S3 => Arc::new(S3RangeFetcher::new(&config.storage).await?),
        SourceKind::Http => Arc::new(HttpRangeFetcher::new(config.import.fetch_timeout())?),
        SourceKind::File | SourceKind::Auto => Arc::new(LocalFileFetcher::new()),
    };
    Ok(fetcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_detects_scheme() {
        assert_eq!(SourceKind::Auto.resolve("s3://stock/file.csv"), SourceKind::S3);
        assert_eq!(SourceKind::Auto.resolve("HTTPS://host/file.csv"), SourceKind::Http);
        assert_eq!(SourceKind::Auto.resolve("http://host/file.csv"), SourceKind::Http);
        assert_eq!(SourceKind::Auto.resolve("/data/stock.csv"), SourceKind::File);
        assert_eq!(SourceKind::Auto.resolve("file:///data/stock.csv"), SourceKind::File);
    }

    #[test]
    fn test_explicit_kind_wins() {
        assert_eq!(SourceKind::S3.resolve("stock.csv"), SourceKind::S3);
        assert_eq!(SourceKind::File.resolve("s3://bucket/key"), SourceKind::File);
    }
}
