//! Stockimport - chunked stock file importer

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use stockimport_common::logging::{init_logging, LogConfig};
use stockimport_ingest::config::ImporterConfig;
use stockimport_ingest::fetcher::{self, RangeFetcher, SourceKind};
use stockimport_ingest::pipeline::{ImportPipeline, PipelineOptions};
use stockimport_ingest::plan::ChunkPlan;
use stockimport_ingest::sink::{ElementSink, LoggingSink, PostgresElementSink, SinkKind};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "stockimport")]
#[command(author, version, about = "Chunked stock file importer")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a stock file into the destination store
    Run(RunArgs),

    /// Print the chunk plan for a file without importing it
    Plan {
        /// Resource to plan (s3://bucket/key, http(s)://..., or a path)
        #[arg(long, env = "IMPORT_FILE_URI")]
        file_uri: String,

        /// Bytes per range request
        #[arg(long, env = "IMPORT_BLOCK_SIZE")]
        block_size: u64,

        /// How to read the resource
        #[arg(long, value_enum, default_value_t = SourceKind::Auto)]
        source: SourceKind,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Resource to import; overrides IMPORT_FILE_URI
    #[arg(long)]
    file_uri: Option<String>,

    /// Bytes per range request; overrides IMPORT_BLOCK_SIZE
    #[arg(long)]
    block_size: Option<u64>,

    /// How to read the resource
    #[arg(long, value_enum, default_value_t = SourceKind::Auto)]
    source: SourceKind,

    /// Where parsed elements go; `log` is a dry run
    #[arg(long, value_enum, default_value_t = SinkKind::Postgres)]
    sink: SinkKind,

    /// Batch saves allowed to overlap the next fetch (0 = save inline)
    #[arg(long)]
    max_in_flight: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    // environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("stockimport")
        .filter_directives("sqlx=warn,aws_smithy_runtime=warn,hyper=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let mut config = ImporterConfig::from_env()?;

    match cli.command {
        Command::Run(args) => run(&mut config, args).await,
        Command::Plan {
            file_uri,
            block_size,
            source,
        } => {
            config.import.file_uri = file_uri;
            config.import.block_size = block_size;
            plan(&config, source).await
        },
    }
}

async fn run(config: &mut ImporterConfig, args: RunArgs) -> Result<()> {
    if let Some(file_uri) = args.file_uri {
        config.import.file_uri = file_uri;
    }
    if let Some(block_size) = args.block_size {
        config.import.block_size = block_size;
    }
    if let Some(max_in_flight) = args.max_in_flight {
        config.import.max_in_flight_batches = max_in_flight;
    }
    config.validate()?;

    let uri = config.import.file_uri.clone();
    let source = args.source.resolve(&uri);
    info!(resource = %uri, ?source, sink = ?args.sink, "Preparing import");

    let range_fetcher = fetcher::open(source, &uri, config).await?;
    let sink: Arc<dyn ElementSink> = match args.sink {
        SinkKind::Postgres => Arc::new(PostgresElementSink::connect(&config.database).await?),
        SinkKind::Log => Arc::new(LoggingSink::new()),
    };

    let pipeline = ImportPipeline::new(range_fetcher, sink, PipelineOptions::from(&config.import));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let summary = pipeline.run_with_cancellation(&uri, cancel).await?;
    info!("{}", summary);

    Ok(())
}

async fn plan(config: &ImporterConfig, source: SourceKind) -> Result<()> {
    config.validate()?;

    let uri = &config.import.file_uri;
    let range_fetcher = fetcher::open(source, uri, config).await?;
    let total_size = range_fetcher.size(uri).await?;
    let plan = ChunkPlan::new(total_size, config.import.block_size)?;

    println!("Resource:   {}", uri);
    println!("Total size: {} bytes", plan.total_size());
    println!("Block size: {} bytes", plan.block_size());
    println!("Blocks:     {}", plan.num_blocks());
    if let Some(first) = plan.range(0) {
        println!("First:      [{}, {})", first.offset, first.end());
    }
    if let Some(last) = plan.num_blocks().checked_sub(1).and_then(|i| plan.range(i)) {
        println!("Last:       [{}, {})", last.offset, last.end());
    }

    Ok(())
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C, stopping import after in-flight batches"),
        _ = terminate => warn!("Received SIGTERM, stopping import after in-flight batches"),
    }

    cancel.cancel();
}
