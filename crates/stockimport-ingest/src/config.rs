//! Importer configuration
//!
//! Values come from the environment (and a `.env` file, if present) with the
//! defaults below. The CLI overlays its flags afterwards, so [`ImporterConfig::from_env`]
//! does not validate; call [`ImporterConfig::validate`] once the final values
//! are in place.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use stockimport_common::{ImportError, Result};

// ============================================================================
// Import Configuration Constants
// ============================================================================

/// Default byte range size (1 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 1024 * 1024;

/// Default number of batch saves allowed to run behind the fetch loop.
pub const DEFAULT_MAX_IN_FLIGHT_BATCHES: usize = 1;

/// Default per-request fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/stockimport";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default rows per INSERT statement.
pub const DEFAULT_INSERT_CHUNK_SIZE: usize = 1000;

/// Postgres binds at most 65535 parameters per statement, four per row.
pub const MAX_INSERT_CHUNK_SIZE: usize = 65535 / 4;

/// Default S3 region.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Importer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImporterConfig {
    pub import: ImportSettings,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
}

/// What to import and how to chunk it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Resource to import: `s3://bucket/key`, `http(s)://...` or a file path
    pub file_uri: String,
    pub block_size: u64,
    /// Saves allowed to overlap the next fetch; 0 awaits every save inline
    pub max_in_flight_batches: usize,
    /// 0 disables the timeout
    pub fetch_timeout_secs: u64,
}

impl ImportSettings {
    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_secs > 0).then(|| Duration::from_secs(self.fetch_timeout_secs))
    }
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            file_uri: String::new(),
            block_size: DEFAULT_BLOCK_SIZE,
            max_in_flight_batches: DEFAULT_MAX_IN_FLIGHT_BATCHES,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub insert_chunk_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            insert_chunk_size: DEFAULT_INSERT_CHUNK_SIZE,
        }
    }
}

/// S3-compatible object storage
///
/// Without explicit keys the AWS default credential chain is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    /// Bucket for resource ids given as bare keys
    pub bucket: Option<String>,
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_S3_REGION.to_string(),
            bucket: None,
            access_key: None,
            secret_key: None,
            path_style: false,
        }
    }
}

impl StorageConfig {
    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_S3_REGION.to_string(),
            bucket: Some(bucket.into()),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
        }
    }
}

impl ImporterConfig {
    /// Read configuration from `.env` and the environment
    ///
    /// - `IMPORT_FILE_URI`, `IMPORT_BLOCK_SIZE`, `IMPORT_MAX_IN_FLIGHT`, `IMPORT_FETCH_TIMEOUT`
    /// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`, `DATABASE_MIN_CONNECTIONS`,
    ///   `DATABASE_CONNECT_TIMEOUT`, `DATABASE_IDLE_TIMEOUT`, `DATABASE_INSERT_CHUNK_SIZE`
    /// - `S3_ENDPOINT`, `S3_REGION`, `S3_BUCKET`, `S3_ACCESS_KEY` / `AWS_ACCESS_KEY_ID`,
    ///   `S3_SECRET_KEY` / `AWS_SECRET_ACCESS_KEY`, `S3_PATH_STYLE`
    ///
    /// A variable that is set but does not parse is an error rather than a
    /// silent fallback to the default.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            import: ImportSettings {
                file_uri: std::env::var("IMPORT_FILE_URI").unwrap_or_default(),
                block_size: env_or("IMPORT_BLOCK_SIZE", DEFAULT_BLOCK_SIZE)?,
                max_in_flight_batches: env_or(
                    "IMPORT_MAX_IN_FLIGHT",
                    DEFAULT_MAX_IN_FLIGHT_BATCHES,
                )?,
                fetch_timeout_secs: env_or("IMPORT_FETCH_TIMEOUT", DEFAULT_FETCH_TIMEOUT_SECS)?,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                )?,
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                )?,
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                )?,
                idle_timeout_secs: env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                )?,
                insert_chunk_size: env_or("DATABASE_INSERT_CHUNK_SIZE", DEFAULT_INSERT_CHUNK_SIZE)?,
            },
            storage: StorageConfig {
                endpoint: std::env::var("S3_ENDPOINT").ok(),
                region: std::env::var("S3_REGION").unwrap_or_else(|_| DEFAULT_S3_REGION.to_string()),
                bucket: std::env::var("S3_BUCKET").ok(),
                access_key: std::env::var("S3_ACCESS_KEY")
                    .or_else(|_| std::env::var("AWS_ACCESS_KEY_ID"))
                    .ok(),
                secret_key: std::env::var("S3_SECRET_KEY")
                    .or_else(|_| std::env::var("AWS_SECRET_ACCESS_KEY"))
                    .ok(),
                path_style: env_or("S3_PATH_STYLE", false)?,
            },
        })
    }

    /// Read from the environment and validate
    pub fn load() -> Result<Self> {
        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.import.file_uri.trim().is_empty() {
            return Err(config_error("file URI cannot be empty"));
        }

        if self.import.block_size == 0 {
            return Err(config_error("block size must be greater than 0"));
        }

        if self.database.url.is_empty() {
            return Err(config_error("database URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(config_error("database max_connections must be greater than 0"));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(config_error(format!(
                "database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.database.insert_chunk_size == 0
            || self.database.insert_chunk_size > MAX_INSERT_CHUNK_SIZE
        {
            return Err(config_error(format!(
                "insert chunk size must be between 1 and {}, got {}",
                MAX_INSERT_CHUNK_SIZE, self.database.insert_chunk_size
            )));
        }

        if self.storage.access_key.is_some() != self.storage.secret_key.is_some() {
            return Err(config_error(
                "S3 access key and secret key must be set together",
            ));
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> ImportError {
    ImportError::Config(message.into())
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| config_error(format!("invalid {}='{}': {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "IMPORT_FILE_URI",
        "IMPORT_BLOCK_SIZE",
        "IMPORT_MAX_IN_FLIGHT",
        "IMPORT_FETCH_TIMEOUT",
        "DATABASE_URL",
        "DATABASE_INSERT_CHUNK_SIZE",
        "S3_BUCKET",
        "S3_ACCESS_KEY",
        "S3_SECRET_KEY",
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    fn valid_config() -> ImporterConfig {
        let mut config = ImporterConfig::default();
        config.import.file_uri = "stock.csv".to_string();
        config
    }

    #[test]
    #[serial]
    fn test_from_env_reads_import_settings() {
        clear_env();
        std::env::set_var("IMPORT_FILE_URI", "s3://stock/2019-08.csv");
        std::env::set_var("IMPORT_BLOCK_SIZE", "4096");
        std::env::set_var("IMPORT_MAX_IN_FLIGHT", "0");

        let config = ImporterConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.import.file_uri, "s3://stock/2019-08.csv");
        assert_eq!(config.import.block_size, 4096);
        assert_eq!(config.import.max_in_flight_batches, 0);
        assert_eq!(config.database.insert_chunk_size, DEFAULT_INSERT_CHUNK_SIZE);
    }

    #[test]
    #[serial]
    fn test_invalid_number_is_an_error() {
        clear_env();
        std::env::set_var("IMPORT_BLOCK_SIZE", "lots");

        let err = ImporterConfig::from_env().unwrap_err();
        clear_env();

        assert!(matches!(err, ImportError::Config(ref m) if m.contains("IMPORT_BLOCK_SIZE")));
    }

    #[test]
    #[serial]
    fn test_aws_credentials_fallback() {
        clear_env();
        std::env::set_var("AWS_ACCESS_KEY_ID", "key");
        std::env::set_var("AWS_SECRET_ACCESS_KEY", "secret");

        let config = ImporterConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.storage.access_key.as_deref(), Some("key"));
        assert_eq!(config.storage.secret_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_default_config_needs_uri() {
        assert!(ImporterConfig::default().validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let mut config = valid_config();
        config.import.block_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pool_bounds_checked() {
        let mut config = valid_config();
        config.database.min_connections = 10;
        config.database.max_connections = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_insert_chunk_size_bounded_by_bind_limit() {
        let mut config = valid_config();
        config.database.insert_chunk_size = MAX_INSERT_CHUNK_SIZE + 1;
        assert!(config.validate().is_err());
        config.database.insert_chunk_size = MAX_INSERT_CHUNK_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_half_configured_credentials_rejected() {
        let mut config = valid_config();
        config.storage.access_key = Some("key".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fetch_timeout_zero_disables() {
        let mut settings = ImportSettings::default();
        assert_eq!(settings.fetch_timeout(), Some(Duration::from_secs(300)));
        settings.fetch_timeout_secs = 0;
        assert_eq!(settings.fetch_timeout(), None);
    }

    #[test]
    fn test_minio_preset() {
        let storage = StorageConfig::for_minio("http://localhost:9000", "stock");
        assert!(storage.path_style);
        assert_eq!(storage.bucket.as_deref(), Some("stock"));
    }
}
