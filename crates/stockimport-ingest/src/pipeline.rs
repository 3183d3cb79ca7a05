//! Chunked import pipeline
//!
//! Drives one import run end to end:
//!
//! 1. initialize the sink (before anything is fetched)
//! 2. fetch the resource size and compute the [`ChunkPlan`]
//! 3. for every range, in order: fetch, reassemble against the carry, strip
//!    the header once, parse, and hand the chunk's batch to the sink
//! 4. on the last range, keep the trailing unterminated line only if it has
//!    all four fields
//! 5. wait for every dispatched save
//!
//! The chunk loop is sequential. Saves run as spawned tasks so the next fetch
//! can overlap them, bounded by [`PipelineOptions::max_in_flight_batches`].
//! The first error stops the run; saves already dispatched are still awaited.

use anyhow::anyhow;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stockimport_common::{Element, ImportError, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ImportSettings, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_IN_FLIGHT_BATCHES};
use crate::fetcher::RangeFetcher;
use crate::parser::{is_complete_record, parse_line_bytes};
use crate::plan::{ByteRange, ChunkPlan};
use crate::reassembler::CarryBuffer;
use crate::sink::ElementSink;

/// Tuning for one pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Bytes per range request
    pub block_size: u64,
    /// Saves allowed to run behind the fetch loop; 0 awaits each save inline
    pub max_in_flight_batches: usize,
    /// Per-request limit for size and range fetches
    pub fetch_timeout: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_in_flight_batches: DEFAULT_MAX_IN_FLIGHT_BATCHES,
            fetch_timeout: None,
        }
    }
}

impl PipelineOptions {
    pub fn new(block_size: u64) -> Self {
        Self {
            block_size,
            ..Self::default()
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight_batches: usize) -> Self {
        self.max_in_flight_batches = max_in_flight_batches;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }
}

impl From<&ImportSettings> for PipelineOptions {
    fn from(settings: &ImportSettings) -> Self {
        Self {
            block_size: settings.block_size,
            max_in_flight_batches: settings.max_in_flight_batches,
            fetch_timeout: settings.fetch_timeout(),
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub resource: String,
    pub total_bytes: u64,
    pub num_blocks: u64,
    pub batches_dispatched: u64,
    pub elements_saved: u64,
    /// The resource ended with an incomplete line that was dropped
    pub discarded_trailing_fragment: bool,
    pub duration: Duration,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Imported {} elements from {} ({} bytes, {} blocks, {} batches) in {:.2}s",
            self.elements_saved,
            self.resource,
            self.total_bytes,
            self.num_blocks,
            self.batches_dispatched,
            self.duration.as_secs_f64()
        )?;
        if self.discarded_trailing_fragment {
            write!(f, "; incomplete trailing line discarded")?;
        }
        Ok(())
    }
}

/// Imports one resource from a [`RangeFetcher`] into an [`ElementSink`]
pub struct ImportPipeline {
    fetcher: Arc<dyn RangeFetcher>,
    sink: Arc<dyn ElementSink>,
    options: PipelineOptions,
}

impl ImportPipeline {
    pub fn new(
        fetcher: Arc<dyn RangeFetcher>,
        sink: Arc<dyn ElementSink>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            fetcher,
            sink,
            options,
        }
    }

    /// Import `resource` to completion
    pub async fn run(&self, resource: &str) -> Result<ImportSummary> {
        self.run_with_cancellation(resource, CancellationToken::new())
            .await
    }

    /// Import `resource`, stopping early once `cancel` fires.
    ///
    /// A cancelled run dispatches nothing further, waits for the saves already
    /// dispatched and fails with [`ImportError::Cancelled`].
    pub async fn run_with_cancellation(
        &self,
        resource: &str,
        cancel: CancellationToken,
    ) -> Result<ImportSummary> {
        info!(
            resource,
            block_size = self.options.block_size,
            max_in_flight = self.options.max_in_flight_batches,
            "Starting import"
        );

        let result = self.execute(resource, &cancel).await;

        match &result {
            Ok(summary) => info!(
                resource,
                elements = summary.elements_saved,
                batches = summary.batches_dispatched,
                duration_ms = summary.duration.as_millis() as u64,
                "Import completed"
            ),
            Err(e) => error!(resource, kind = e.kind(), error = %e, "Import failed"),
        }

        result
    }

    async fn execute(&self, resource: &str, cancel: &CancellationToken) -> Result<ImportSummary> {
        let started = Instant::now();

        if self.options.block_size == 0 {
            return Err(ImportError::Config(
                "block size must be greater than 0".to_string(),
            ));
        }

        self.sink
            .initialize()
            .await
            .map_err(|source| ImportError::Initialization { source })?;
        debug!("Sink initialized");

        let total_bytes = self
            .race(resource, 0, cancel, self.fetcher.size(resource))
            .await?
            .map_err(|source| ImportError::Fetch {
                resource: resource.to_string(),
                chunk: None,
                source,
            })?;

        let plan = ChunkPlan::new(total_bytes, self.options.block_size)?;
        info!(
            resource,
            total_bytes,
            num_blocks = plan.num_blocks(),
            block_size = plan.block_size(),
            "Chunk plan computed"
        );

        let mut saves = InFlightSaves::new(resource, self.options.max_in_flight_batches);
        let mut summary = ImportSummary {
            resource: resource.to_string(),
            total_bytes,
            num_blocks: plan.num_blocks(),
            batches_dispatched: 0,
            elements_saved: 0,
            discarded_trailing_fragment: false,
            duration: Duration::ZERO,
        };

        if let Err(e) = self
            .process_chunks(resource, &plan, cancel, &mut saves, &mut summary)
            .await
        {
            saves.abandon().await;
            return Err(e);
        }

        summary.elements_saved = saves.finish().await?;
        summary.duration = started.elapsed();

        Ok(summary)
    }

    async fn process_chunks(
        &self,
        resource: &str,
        plan: &ChunkPlan,
        cancel: &CancellationToken,
        saves: &mut InFlightSaves<'_>,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        let mut carry = CarryBuffer::new();
        let mut header_pending = true;
        // 1-based line number of the next completed line; the header is line 1
        let mut next_line_number: u64 = 1;

        for range in plan.ranges() {
            if cancel.is_cancelled() {
                return Err(cancelled(resource, range.index));
            }

            let bytes = self.fetch_chunk(resource, range, cancel).await?;

            let mut lines = carry.feed(&bytes);
            let mut first_line_number = next_line_number;
            next_line_number += lines.len() as u64;

            if header_pending && !lines.is_empty() {
                lines.remove(0);
                first_line_number += 1;
                header_pending = false;
                if range.index == 0 {
                    debug!("Header line stripped");
                } else {
                    warn!(
                        chunk = range.index,
                        "Header line longer than the first block, stripped from a later chunk"
                    );
                }
            }

            if plan.is_last(range.index) {
                let mut tail = carry.take();
                if tail.last() == Some(&b'\r') {
                    tail.pop();
                }
                if header_pending {
                    if !tail.is_empty() {
                        warn!(
                            bytes = tail.len(),
                            "Resource holds only an unterminated header line"
                        );
                    }
                } else if is_complete_record(&tail) {
                    lines.push(tail);
                } else if !tail.is_empty() {
                    warn!(
                        bytes = tail.len(),
                        line_number = next_line_number,
                        "Discarding incomplete trailing line"
                    );
                    summary.discarded_trailing_fragment = true;
                }
            }

            let batch = parse_batch(resource, range.index, first_line_number, &lines)?;

            debug!(
                chunk = range.index,
                offset = range.offset,
                length = range.length,
                elements = batch.len(),
                carry = carry.as_bytes().len(),
                "Chunk processed"
            );

            saves.dispatch(&self.sink, range.index, batch).await?;
            summary.batches_dispatched += 1;
        }

        Ok(())
    }

    async fn fetch_chunk(
        &self,
        resource: &str,
        range: ByteRange,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let fetch_error = |source: anyhow::Error| ImportError::Fetch {
            resource: resource.to_string(),
            chunk: Some(range.index),
            source,
        };

        let bytes = self
            .race(
                resource,
                range.index,
                cancel,
                self.fetcher
                    .fetch_range(resource, range.offset, range.length),
            )
            .await?
            .map_err(fetch_error)?;

        if bytes.len() as u64 != range.length {
            return Err(fetch_error(anyhow!(
                "short read at offset {}: expected {} bytes, got {}",
                range.offset,
                range.length,
                bytes.len()
            )));
        }

        Ok(bytes)
    }

    /// Run a fetch under the optional timeout, giving up when `cancel` fires
    async fn race<T>(
        &self,
        resource: &str,
        chunk: u64,
        cancel: &CancellationToken,
        fetch: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<anyhow::Result<T>> {
        let limited = async {
            match self.options.fetch_timeout {
                Some(limit) => tokio::time::timeout(limit, fetch)
                    .await
                    .unwrap_or_else(|_| Err(anyhow!("timed out after {:?}", limit))),
                None => fetch.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled(resource, chunk)),
            result = limited => Ok(result),
        }
    }
}

/// Run one import with default pipelining
pub async fn run_import(
    fetcher: Arc<dyn RangeFetcher>,
    sink: Arc<dyn ElementSink>,
    resource: &str,
    block_size: u64,
) -> Result<ImportSummary> {
    ImportPipeline::new(fetcher, sink, PipelineOptions::new(block_size))
        .run(resource)
        .await
}

fn cancelled(resource: &str, chunk: u64) -> ImportError {
    ImportError::Cancelled {
        resource: resource.to_string(),
        chunk,
    }
}

fn parse_batch(
    resource: &str,
    chunk: u64,
    first_line_number: u64,
    lines: &[Vec<u8>],
) -> Result<Vec<Element>> {
    lines
        .iter()
        .zip(first_line_number..)
        .map(|(raw, line_number)| {
            parse_line_bytes(raw).map_err(|e| e.at(resource, chunk, line_number))
        })
        .collect()
}

/// Saves dispatched to the sink and not yet observed
struct InFlightSaves<'a> {
    resource: &'a str,
    limit: usize,
    pending: VecDeque<(u64, JoinHandle<anyhow::Result<usize>>)>,
    saved: u64,
}

impl<'a> InFlightSaves<'a> {
    fn new(resource: &'a str, limit: usize) -> Self {
        Self {
            resource,
            limit,
            pending: VecDeque::new(),
            saved: 0,
        }
    }

    /// Hand `batch` to the sink, first waiting for the oldest save while the
    /// limit is reached
    async fn dispatch(
        &mut self,
        sink: &Arc<dyn ElementSink>,
        chunk: u64,
        batch: Vec<Element>,
    ) -> Result<()> {
        let count = batch.len();

        if self.limit == 0 {
            sink.save_collection(batch)
                .await
                .map_err(|source| self.sink_error(chunk, source))?;
            self.saved += count as u64;
            return Ok(());
        }

        while self.pending.len() >= self.limit {
            self.join_oldest().await?;
        }

        let sink = Arc::clone(sink);
        let handle = tokio::spawn(async move { sink.save_collection(batch).await.map(|()| count) });
        self.pending.push_back((chunk, handle));

        Ok(())
    }

    async fn join_oldest(&mut self) -> Result<()> {
        let Some((chunk, handle)) = self.pending.pop_front() else {
            return Ok(());
        };

        let count = match handle.await {
            Ok(Ok(count)) => count,
            Ok(Err(source)) => return Err(self.sink_error(chunk, source)),
            Err(join_error) => return Err(self.sink_error(chunk, anyhow::Error::new(join_error))),
        };

        self.saved += count as u64;
        Ok(())
    }

    /// Wait for every outstanding save; the first failure wins
    async fn finish(mut self) -> Result<u64> {
        let mut first_error = None;

        while !self.pending.is_empty() {
            if let Err(e) = self.join_oldest().await {
                match first_error {
                    None => first_error = Some(e),
                    Some(_) => warn!(error = %e, "Additional batch save failed"),
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(self.saved),
        }
    }

    /// Wait for outstanding saves after the run already failed
    async fn abandon(mut self) {
        while !self.pending.is_empty() {
            if let Err(e) = self.join_oldest().await {
                warn!(error = %e, "Batch save failed while aborting import");
            }
        }
    }

    fn sink_error(&self, chunk: u64, source: anyhow::Error) -> ImportError {
        ImportError::Sink {
            resource: self.resource.to_string(),
            chunk,
            source,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fetcher::InMemoryFetcher;
    use crate::sink::MemorySink;

    const CSV: &str = "PointOfSale;Product;Date;Stock\n\
                       121017;17240503103734;2019-08-01;2\n\
                       121017;17240503103734;2019-08-02;3\n";

    fn pipeline(data: &str, block_size: u64) -> (ImportPipeline, Arc<MemorySink>) {
        let fetcher = Arc::new(InMemoryFetcher::new().with_resource("stock.csv", data));
        let sink = Arc::new(MemorySink::new());
        let pipeline = ImportPipeline::new(fetcher, sink.clone(), PipelineOptions::new(block_size));
        (pipeline, sink)
    }

    #[tokio::test]
    async fn test_single_block() {
        let (pipeline, sink) = pipeline(CSV, 10_000);
        let summary = pipeline.run("stock.csv").await.unwrap();

        assert_eq!(summary.num_blocks, 1);
        assert_eq!(summary.batches_dispatched, 1);
        assert_eq!(summary.elements_saved, 2);
        assert_eq!(sink.elements()[1].stock, 3);
    }

    #[tokio::test]
    async fn test_run_import_with_default_pipelining() {
        let fetcher = Arc::new(InMemoryFetcher::new().with_resource("stock.csv", CSV));
        let sink = Arc::new(MemorySink::new());

        let summary = run_import(fetcher, sink.clone(), "stock.csv", 16).await.unwrap();

        assert_eq!(summary.elements_saved, 2);
        assert_eq!(summary.batches_dispatched, summary.num_blocks);
        assert_eq!(sink.initialize_calls(), 1);
        assert_eq!(sink.elements().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_block_size_is_config_error() {
        let (pipeline, sink) = pipeline(CSV, 0);
        let err = pipeline.run("stock.csv").await.unwrap_err();

        assert!(matches!(err, ImportError::Config(_)));
        assert_eq!(sink.initialize_calls(), 0);
    }

    #[tokio::test]
    async fn test_line_numbers_count_the_header() {
        let data = "h1;h2;h3;h4\na;b;2019-08-01;1\na;b;2019-08-01;x\n";
        let (pipeline, _sink) = pipeline(data, 7);
        let err = pipeline.run("stock.csv").await.unwrap_err();

        match err {
            ImportError::Format {
                line_number, line, ..
            } => {
                assert_eq!(line_number, 3);
                assert_eq!(line, "a;b;2019-08-01;x");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_summary_display() {
        let summary = ImportSummary {
            resource: "stock.csv".to_string(),
            total_bytes: 100,
            num_blocks: 2,
            batches_dispatched: 2,
            elements_saved: 3,
            discarded_trailing_fragment: true,
            duration: Duration::from_millis(1500),
        };
        let text = summary.to_string();
        assert!(text.starts_with("Imported 3 elements from stock.csv"));
        assert!(text.contains("1.50s"));
        assert!(text.ends_with("incomplete trailing line discarded"));
    }

    #[test]
    fn test_options_from_settings() {
        let settings = ImportSettings {
            file_uri: "stock.csv".to_string(),
            block_size: 512,
            max_in_flight_batches: 4,
            fetch_timeout_secs: 0,
        };
        let options = PipelineOptions::from(&settings);
        assert_eq!(options.block_size, 512);
        assert_eq!(options.max_in_flight_batches, 4);
        assert_eq!(options.fetch_timeout, None);
    }
}
