//! Stockimport Ingest Library
//!
//! Imports `;`-delimited stock files of the form
//!
//! ```text
//! PointOfSale;Product;Date;Stock
//! 121017;17240503103734;2019-08-01;2
//! ```
//!
//! from remote storage without loading them whole. The resource is read in
//! fixed-size byte ranges, records cut by a range boundary are stitched back
//! together, and each range's records are written to the destination as one
//! batch.
//!
//! # Supported Sources
//!
//! - **S3**: `s3://bucket/key` or bare keys in a configured bucket
//! - **HTTP(S)**: any server honouring `Range` requests
//! - **Local files**: plain paths or `file://` URIs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stockimport_ingest::fetcher::LocalFileFetcher;
//! use stockimport_ingest::pipeline::{ImportPipeline, PipelineOptions};
//! use stockimport_ingest::sink::LoggingSink;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = ImportPipeline::new(
//!         Arc::new(LocalFileFetcher::new()),
//!         Arc::new(LoggingSink::new()),
//!         PipelineOptions::new(64 * 1024),
//!     );
//!     let summary = pipeline.run("./data/stock.csv").await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod fetcher;
pub mod parser;
pub mod pipeline;
pub mod plan;
pub mod reassembler;
pub mod sink;

pub use config::ImporterConfig;
pub use fetcher::{RangeFetcher, SourceKind};
pub use pipeline::{run_import, ImportPipeline, ImportSummary, PipelineOptions};
pub use plan::{ByteRange, ChunkPlan};
pub use sink::{ElementSink, SinkKind};
