//! Weblog Ingest - access log ingestion tool

use anyhow::{Context, Result};
use clap::{Args, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};
use weblog_common::logging::{init_logging, LogConfig, LogLevel};
use weblog_ingest::config::IngestConfig;
use weblog_ingest::pipeline::{IngestReport, Pipeline};
use weblog_ingest::sink::{JsonLinesSink, RecordSink};

#[derive(Parser, Debug)]
#[command(name = "weblog-ingest")]
#[command(author, version, about = "Web server access log ingestion tool")]
struct Cli {
    /// Log source to ingest
    #[command(subcommand)]
    source: Source,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Source {
    /// Ingest local log files
    File {
        /// Log files to read
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        opts: IngestOpts,
    },

    /// Ingest logs served over HTTP
    Url {
        /// URLs to fetch
        #[arg(required = true)]
        urls: Vec<String>,

        #[command(flatten)]
        opts: IngestOpts,
    },
}

#[derive(Args, Debug)]
struct IngestOpts {
    /// Mirror matched raw lines to a log file
    #[arg(long)]
    save: bool,

    /// Records per bulk insert
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Directory for generated mirror files
    #[arg(long)]
    mirror_dir: Option<PathBuf>,

    /// Exact mirror file, overrides --mirror-dir
    #[arg(long)]
    mirror_path: Option<PathBuf>,

    /// JSON lines output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

impl IngestOpts {
    fn apply(&self, mut config: IngestConfig) -> IngestConfig {
        if self.save {
            config = config.with_save(true);
        }
        if let Some(chunk_size) = self.chunk_size {
            config = config.with_chunk_size(chunk_size);
        }
        if let Some(ref dir) = self.mirror_dir {
            config = config.with_mirror_dir(dir);
        }
        if let Some(ref path) = self.mirror_path {
            config = config.with_mirror_path(path);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("weblog-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let (sources, opts) = match cli.source {
        Source::File { paths, opts } => (
            paths.into_iter().map(SourceRef::File).collect::<Vec<_>>(),
            opts,
        ),
        Source::Url { urls, opts } => (urls.into_iter().map(SourceRef::Url).collect(), opts),
    };

    let config = opts.apply(IngestConfig::from_env()?);
    config.validate()?;
    let sink = build_sink(&opts).await?;

    let failures = if config.save && sources.len() > 1 {
        // one mirror file per invocation; keep its lines whole
        run_sequential(&config, sink, sources).await
    } else {
        run_concurrent(&config, sink, sources).await?
    };

    if failures > 0 {
        anyhow::bail!("{failures} source(s) failed to ingest");
    }

    info!("Ingestion complete");
    Ok(())
}

#[derive(Debug, Clone)]
enum SourceRef {
    File(PathBuf),
    Url(String),
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

async fn ingest_one(
    config: &IngestConfig,
    sink: Arc<dyn RecordSink>,
    source: &SourceRef,
) -> weblog_ingest::Result<IngestReport> {
    let pipeline = Pipeline::from_config(config, sink)?;
    match source {
        SourceRef::File(path) => pipeline.ingest_file(path).await,
        SourceRef::Url(url) => pipeline.ingest_url(url).await,
    }
}

fn log_result(source: &SourceRef, result: &weblog_ingest::Result<IngestReport>) -> bool {
    match result {
        Ok(report) => {
            info!(
                source = %source,
                records_persisted = report.batches.records_persisted,
                records_discarded = report.batches.records_discarded,
                "Source ingested"
            );
            true
        },
        Err(e) => {
            error!(source = %source, error = %e, "Source failed");
            false
        },
    }
}

async fn run_sequential(
    config: &IngestConfig,
    sink: Arc<dyn RecordSink>,
    sources: Vec<SourceRef>,
) -> usize {
    let mut failures = 0;
    for source in &sources {
        let result = ingest_one(config, sink.clone(), source).await;
        if !log_result(source, &result) {
            failures += 1;
        }
    }
    failures
}

async fn run_concurrent(
    config: &IngestConfig,
    sink: Arc<dyn RecordSink>,
    sources: Vec<SourceRef>,
) -> Result<usize> {
    let mut tasks = JoinSet::new();
    for source in sources {
        let config = config.clone();
        let sink = sink.clone();
        tasks.spawn(async move {
            let result = ingest_one(&config, sink, &source).await;
            log_result(&source, &result)
        });
    }

    let mut failures = 0;
    while let Some(joined) = tasks.join_next().await {
        if !joined.context("Ingestion task panicked")? {
            failures += 1;
        }
    }
    Ok(failures)
}

async fn build_sink(opts: &IngestOpts) -> Result<Arc<dyn RecordSink>> {
    if let Some(sink) = database_sink(opts.database_url.as_deref()).await? {
        return Ok(sink);
    }

    match opts.output {
        Some(ref path) => {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("Failed to open output file {}", path.display()))?;
            info!(output = %path.display(), "Writing records as JSON lines");
            Ok(Arc::new(JsonLinesSink::new(tokio::io::BufWriter::new(file))))
        },
        None => Ok(Arc::new(JsonLinesSink::new(tokio::io::stdout()))),
    }
}

#[cfg(feature = "database")]
async fn database_sink(url: Option<&str>) -> Result<Option<Arc<dyn RecordSink>>> {
    use weblog_ingest::config::DbConfig;
    use weblog_ingest::postgres::{create_pool, run_migrations, PgRecordSink};

    let Some(url) = url else {
        return Ok(None);
    };

    let db_config = match DbConfig::from_env() {
        Ok(config) => DbConfig {
            url: url.to_string(),
            ..config
        },
        Err(_) => DbConfig::new(url),
    };

    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;
    info!("Writing records to PostgreSQL");

    Ok(Some(Arc::new(PgRecordSink::new(pool))))
}

#[cfg(not(feature = "database"))]
async fn database_sink(url: Option<&str>) -> Result<Option<Arc<dyn RecordSink>>> {
    if url.is_some() {
        tracing::warn!("Database URL ignored: built without the `database` feature");
    }
    Ok(None)
}
