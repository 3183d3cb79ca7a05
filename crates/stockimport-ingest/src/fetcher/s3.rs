use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    Client,
};
use tracing::{debug, info, instrument};

use super::RangeFetcher;
use crate::config::StorageConfig;

/// Reads ranges of S3 objects with `HeadObject` and ranged `GetObject`
#[derive(Clone)]
pub struct S3RangeFetcher {
    client: Client,
    default_bucket: Option<String>,
}

impl S3RangeFetcher {
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        debug!(
            endpoint = ?config.endpoint,
            region = %config.region,
            path_style = config.path_style,
            "Initializing S3 range fetcher"
        );

        let mut builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "stockimport");
                aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials)
                    .region(Region::new(config.region.clone()))
            },
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        builder = builder.force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(bucket = ?config.bucket, "S3 range fetcher initialized");

        Ok(Self {
            client,
            default_bucket: config.bucket.clone(),
        })
    }

    /// Split `s3://bucket/key`, or pair a bare key with the default bucket
    fn locate<'a>(&'a self, resource: &'a str) -> Result<(&'a str, &'a str)> {
        match parse_s3_uri(resource) {
            Some(location) => Ok(location),
            None if resource.starts_with("s3://") => {
                Err(anyhow!("Invalid S3 URI '{}', expected s3://bucket/key", resource))
            },
            None => {
                let bucket = self.default_bucket.as_deref().ok_or_else(|| {
                    anyhow!("No bucket in '{}' and S3_BUCKET is not set", resource)
                })?;
                Ok((bucket, resource.trim_start_matches('/')))
            },
        }
    }
}

fn parse_s3_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("s3://")?;
    let (bucket, key) = rest.split_once('/')?;
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some((bucket, key))
}

/// HTTP `Range` header value for `[from, from + length)`; `length` must be > 0
pub(crate) fn range_header(from: u64, length: u64) -> String {
    format!("bytes={}-{}", from, from + length - 1)
}

#[async_trait]
impl RangeFetcher for S3RangeFetcher {
    #[instrument(skip(self))]
    async fn size(&self, resource: &str) -> Result<u64> {
        let (bucket, key) = self.locate(resource)?;

        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to get metadata from S3: s3://{}/{}", bucket, key))?;

        let length = response
            .content_length()
            .ok_or_else(|| anyhow!("S3 did not report a length for s3://{}/{}", bucket, key))?;

        u64::try_from(length).with_context(|| format!("Invalid content length {}", length))
    }

    #[instrument(skip(self))]
    async fn fetch_range(&self, resource: &str, from: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }

        let (bucket, key) = self.locate(resource)?;

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(range_header(from, length))
            .send()
            .await
            .with_context(|| format!("Failed to download range from S3: s3://{}/{}", bucket, key))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!(bytes = data.len(), "Downloaded range from s3://{}/{}", bucket, key);

        Ok(data)
    }
}
