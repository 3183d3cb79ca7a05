//! Destinations for parsed batches
//!
//! [`ElementSink`] is what the pipeline writes to. `initialize` runs exactly
//! once, before anything is fetched, and must leave the destination created
//! or emptied. `save_collection` receives each chunk's batch by value,
//! possibly empty. Batches are dispatched in chunk order but may complete out
//! of order when more than one save is in flight.

use anyhow::Result;
use async_trait::async_trait;
use stockimport_common::Element;

pub mod logging;
pub mod memory;
pub mod postgres;

pub use logging::LoggingSink;
pub use memory::MemorySink;
pub use postgres::PostgresElementSink;

/// Batch writer for [`Element`]s
#[async_trait]
pub trait ElementSink: Send + Sync {
    /// Prepare the destination for a fresh import
    async fn initialize(&self) -> Result<()>;

    /// Persist one batch
    async fn save_collection(&self, elements: Vec<Element>) -> Result<()>;
}

/// Sink selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SinkKind {
    #[default]
    Postgres,
    /// Parse and count only
    Log,
}
