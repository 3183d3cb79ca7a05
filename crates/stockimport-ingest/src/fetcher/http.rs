use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument};

use super::s3::range_header;
use super::RangeFetcher;

/// Reads ranges of a resource served over HTTP(S)
///
/// The server must honour `Range` requests; blob stores and most static file
/// servers do.
#[derive(Clone)]
pub struct HttpRangeFetcher {
    client: Client,
}

impl HttpRangeFetcher {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!(
            "stockimport/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Size from a one-byte ranged GET, for servers that reject `HEAD` or
    /// omit `Content-Length` on it
    async fn size_from_ranged_get(&self, resource: &str) -> Result<u64> {
        let response = self
            .client
            .get(resource)
            .header(header::RANGE, range_header(0, 1))
            .send()
            .await
            .with_context(|| format!("Failed to read size of {}", resource))?;

        let status = response.status();
        match status {
            StatusCode::PARTIAL_CONTENT | StatusCode::RANGE_NOT_SATISFIABLE => response
                .headers()
                .get(header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range_total)
                .ok_or_else(|| anyhow!("{} returned {} without a usable Content-Range", resource, status)),
            StatusCode::OK => content_length(response.headers())
                .ok_or_else(|| anyhow!("{} does not support ranges and reports no length", resource)),
            _ => bail!("Failed to get size of {}: HTTP {}", resource, status),
        }
    }
}

fn content_length(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Total length from a `Content-Range` value (`bytes 0-0/1234`, `bytes */1234`)
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (unit, rest) = value.trim().split_once(' ')?;
    if !unit.eq_ignore_ascii_case("bytes") {
        return None;
    }
    let (_, total) = rest.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[async_trait]
impl RangeFetcher for HttpRangeFetcher {
    #[instrument(skip(self))]
    async fn size(&self, resource: &str) -> Result<u64> {
        let response = self
            .client
            .head(resource)
            .send()
            .await
            .with_context(|| format!("Failed to request metadata of {}", resource))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            bail!("{} not found", resource);
        }

        // reqwest reports the length of the (empty) HEAD body, not the header
        if status.is_success() {
            if let Some(length) = content_length(response.headers()) {
                return Ok(length);
            }
        }

        debug!(%status, "HEAD gave no length, probing with a ranged GET");
        self.size_from_ranged_get(resource).await
    }

    #[instrument(skip(self))]
    async fn fetch_range(&self, resource: &str, from: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(resource)
            .header(header::RANGE, range_header(from, length))
            .send()
            .await
            .with_context(|| format!("Failed to request range of {}", resource))?;

        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
            bail!("Failed to fetch range of {}: HTTP {}", resource, status);
        }

        let data = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body of {}", resource))?
            .to_vec();

        // a 200 carries the whole resource; only usable if that is the range asked for
        if status == StatusCode::OK && (from != 0 || data.len() as u64 != length) {
            bail!(
                "{} ignored the Range header ({} bytes returned for {}+{})",
                resource,
                data.len(),
                from,
                length
            );
        }

        debug!(bytes = data.len(), %status, "Downloaded range");

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-0/1234"), Some(1234));
        assert_eq!(parse_content_range_total("bytes */0"), Some(0));
        assert_eq!(parse_content_range_total("Bytes 10-19/20"), Some(20));
        assert_eq!(parse_content_range_total("bytes 0-0/*"), None);
        assert_eq!(parse_content_range_total("items 0-0/5"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn test_content_length_header() {
        let mut headers = header::HeaderMap::new();
        assert_eq!(content_length(&headers), None);
        headers.insert(header::CONTENT_LENGTH, header::HeaderValue::from_static("512"));
        assert_eq!(content_length(&headers), Some(512));
    }
}
