//! Stockimport Common Library
//!
//! Shared types, logging and error handling for the stockimport workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`ImportError`] and the [`Result`] alias used by every
//!   import operation
//! - **Types**: the [`Element`] entity produced from one stock record
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use stockimport_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("logging ready");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{ImportError, Result};
pub use types::Element;
