//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use stockimport_common::Result;
use stockimport_ingest::fetcher::InMemoryFetcher;
use stockimport_ingest::pipeline::{ImportPipeline, ImportSummary, PipelineOptions};
use stockimport_ingest::sink::MemorySink;

pub const RESOURCE: &str = "stock.csv";

pub const HEADER: &str = "PointOfSale;Product;Date;Stock";

/// Record `i` of the generated fixtures
pub fn row(i: usize) -> String {
    format!(
        "{};{};2019-{:02}-{:02};{}",
        121_000 + i % 37,
        17_240_503_103_734u64 + i as u64,
        i % 12 + 1,
        i % 28 + 1,
        (i as i64 % 50) - 10
    )
}

/// Header plus `rows` records, every line terminated with `\n`
pub fn stock_csv(rows: usize) -> String {
    let mut csv = String::with_capacity((rows + 1) * 40);
    csv.push_str(HEADER);
    csv.push('\n');
    for i in 0..rows {
        csv.push_str(&row(i));
        csv.push('\n');
    }
    csv
}

/// Same records with `\r\n` terminators
pub fn stock_csv_crlf(rows: usize) -> String {
    stock_csv(rows).replace('\n', "\r\n")
}

pub struct Harness {
    pub fetcher: Arc<InMemoryFetcher>,
    pub sink: Arc<MemorySink>,
    pub pipeline: ImportPipeline,
}

impl Harness {
    pub fn new(fetcher: InMemoryFetcher, sink: MemorySink, options: PipelineOptions) -> Self {
        let fetcher = Arc::new(fetcher);
        let sink = Arc::new(sink);
        let pipeline = ImportPipeline::new(fetcher.clone(), sink.clone(), options);
        Self {
            fetcher,
            sink,
            pipeline,
        }
    }

    /// Pipeline over `data` with default options and the given block size
    pub fn over(data: impl Into<Vec<u8>>, block_size: u64) -> Self {
        Self::new(
            InMemoryFetcher::new().with_resource(RESOURCE, data),
            MemorySink::new(),
            PipelineOptions::new(block_size),
        )
    }

    pub async fn run(&self) -> Result<ImportSummary> {
        self.pipeline.run(RESOURCE).await
    }
}
