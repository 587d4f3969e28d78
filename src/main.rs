use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use channel_analytics::analytics::KeywordVocabulary;
use channel_analytics::api;
use channel_analytics::config::AppConfig;
use channel_analytics::db::Database;
use channel_analytics::detection::{CommandDetector, DetectionRunner};
use channel_analytics::fetcher::{ChannelFetcher, HttpChannelClient};
use channel_analytics::images::ImageExtractor;
use channel_analytics::loader::Loader;
use channel_analytics::logging::{init_logging, LogFormat, OperationTimer};
use channel_analytics::metrics::PipelineMetrics;
use channel_analytics::pipeline::Pipeline;
use channel_analytics::reports::ReportService;
use channel_analytics::transform;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file layered over the defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch recent messages from the configured channels
    Fetch {
        /// Channel references (defaults to the configured list)
        #[arg(short, long)]
        channel: Vec<String>,

        /// Messages per channel
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Copy downloaded media into the image tree
    ExtractImages,
    /// Run object detection over the image tree
    Detect,
    /// Load raw JSON batches into the warehouse
    Load {
        /// Batch directory (defaults to the configured raw directory)
        #[arg(long)]
        raw_dir: Option<PathBuf>,
    },
    /// Load the detections file into the warehouse
    LoadDetections {
        /// Detections file (defaults to the configured output path)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Rebuild the staged, dimension and fact tables
    Transform,
    /// Run every stage in order
    Pipeline,
    /// Serve the analytics API
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load_from(cli.config.as_deref())?;

    // Initialize logging; the guard flushes the file log on exit
    let _log_guard = init_logging(
        Some(&config.get_log_level()),
        config.log_file().as_deref(),
        LogFormat::from_name(&config.logging.format),
    )?;

    info!("Starting channel-analytics");

    match cli.command {
        Commands::Fetch { channel, limit } => {
            if let Some(limit) = limit {
                config.ingestion.message_limit = limit;
            }
            let channels = if channel.is_empty() {
                config.ingestion.channels.clone()
            } else {
                channel
            };
            fetch(&config, &channels).await?;
        }
        Commands::ExtractImages => extract_images(&config)?,
        Commands::Detect => detect(&config).await?,
        Commands::Load { raw_dir } => {
            let raw_dir = raw_dir.unwrap_or_else(|| PathBuf::from(&config.ingestion.raw_dir));
            let loader = Loader::new(open_database(&config)?);
            loader
                .load_directory(&raw_dir, &mut PipelineMetrics::new())
                .with_context(|| format!("Failed to load batches from {}", raw_dir.display()))?;
        }
        Commands::LoadDetections { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(&config.detection.output_path));
            let loader = Loader::new(open_database(&config)?);
            loader
                .load_detections(&path, &mut PipelineMetrics::new())
                .with_context(|| format!("Failed to load detections from {}", path.display()))?;
        }
        Commands::Transform => {
            let db = open_database(&config)?;
            transform::refresh(&db).context("Warehouse transform failed")?;
        }
        Commands::Pipeline => run_pipeline(&config).await?,
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }
            serve(&config).await?;
        }
    }

    Ok(())
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let path = config.database_path();
    Database::with_options(&path, config.database.max_connections, config.connection_timeout())
        .with_context(|| format!("Failed to open warehouse at {}", path.display()))
}

async fn fetch(config: &AppConfig, channels: &[String]) -> Result<()> {
    let timer = OperationTimer::new("fetch");
    let client = HttpChannelClient::new(&config.ingestion.client).context("Failed to build channel client")?;
    let fetcher = ChannelFetcher::new(
        Box::new(client),
        PathBuf::from(&config.ingestion.raw_dir),
        PathBuf::from(&config.ingestion.media_dir),
        config.ingestion.message_limit,
    );

    let summary = fetcher.fetch_all(channels, &mut PipelineMetrics::new()).await;
    timer.finish();

    info!(
        channels = summary.batches.len(),
        messages = summary.total_messages(),
        "Fetch complete"
    );
    for failed in &summary.failed {
        warn!(channel = %failed, "Channel was skipped");
    }
    Ok(())
}

fn extract_images(config: &AppConfig) -> Result<()> {
    let extractor = ImageExtractor::new(
        PathBuf::from(&config.ingestion.raw_dir),
        PathBuf::from(&config.ingestion.image_dir),
    );
    extractor.extract().context("Image extraction failed")?;
    Ok(())
}

async fn detect(config: &AppConfig) -> Result<()> {
    let runner = DetectionRunner::new(
        Box::new(CommandDetector::new(&config.detection)),
        PathBuf::from(&config.ingestion.image_dir),
        PathBuf::from(&config.detection.output_path),
        &config.detection.extensions,
    );
    runner
        .run(&mut PipelineMetrics::new())
        .await
        .context("Object detection failed")?;
    Ok(())
}

async fn run_pipeline(config: &AppConfig) -> Result<()> {
    let db = open_database(config)?;
    let client = HttpChannelClient::new(&config.ingestion.client).context("Failed to build channel client")?;
    let pipeline = Pipeline::new(
        config,
        db,
        Box::new(client),
        Box::new(CommandDetector::new(&config.detection)),
    );

    let report = pipeline.run().await;
    for stage in &report.stages {
        info!(
            stage = %stage.stage,
            success = stage.success,
            duration_ms = stage.duration.as_millis() as u64,
            detail = %stage.detail,
            "Stage summary"
        );
    }

    if let Some(failed) = report.failed_stage() {
        anyhow::bail!(
            "Pipeline stopped at {} after {} completed stages: {}",
            failed.stage,
            report.completed(),
            failed.detail
        );
    }
    info!(
        messages_loaded = report.metrics.messages_loaded_total,
        images_scanned = report.metrics.images_scanned_total,
        objects_detected = report.metrics.objects_detected_total,
        "Pipeline completed successfully"
    );
    Ok(())
}

async fn serve(config: &AppConfig) -> Result<()> {
    let db = open_database(config)?;
    let reports = ReportService::new(db, KeywordVocabulary::new(&config.analytics.keywords))?;
    api::serve(&config.bind_address(), reports).await?;
    Ok(())
}
