//! Error types for stock imports

use thiserror::Error;

/// Result type alias for import operations
pub type Result<T> = std::result::Result<T, ImportError>;

/// Every way an import run can fail.
///
/// Collaborators (fetchers, sinks) report failures as `anyhow::Error`; the
/// pipeline wraps them here with the resource and chunk they belong to. No
/// variant is retried or swallowed by the pipeline.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Sink initialization failed: {source}")]
    Initialization {
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to fetch {} of {resource}: {source}", chunk_label(.chunk))]
    Fetch {
        resource: String,
        /// `None` when the total size query failed
        chunk: Option<u64>,
        #[source]
        source: anyhow::Error,
    },

    #[error("Malformed record at line {line_number} of {resource} (chunk {chunk}): {reason} [{line}]")]
    Format {
        resource: String,
        chunk: u64,
        /// 1-based line number in the resource, header included
        line_number: u64,
        line: String,
        reason: String,
    },

    #[error("Sink failed to save batch of chunk {chunk} of {resource}: {source}")]
    Sink {
        resource: String,
        chunk: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Import of {resource} cancelled before chunk {chunk}")]
    Cancelled { resource: String, chunk: u64 },
}

impl ImportError {
    /// Short stable name of the error kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            ImportError::Initialization { .. } => "initialization",
            ImportError::Fetch { .. } => "fetch",
            ImportError::Format { .. } => "format",
            ImportError::Sink { .. } => "sink",
            ImportError::Config(_) => "config",
            ImportError::Cancelled { .. } => "cancelled",
        }
    }
}

fn chunk_label(chunk: &Option<u64>) -> String {
    match chunk {
        Some(index) => format!("chunk {}", index),
        None => "total size".to_string(),
    }
}
