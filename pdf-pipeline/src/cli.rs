/// # pdf-pipeline CLI
///
/// Command parsing and wiring only. The job pipeline and the service loop live
/// in `pdf-pipeline-core`; this module builds the concrete HTTP clients from the
/// loaded config and hands them over.
///
/// - `serve` runs the long-lived queue worker until its runtime ceiling.
/// - `convert` runs the exporter on one local PDF, for trying the engine by hand.
use crate::engine::HttpDocumentEngine;
use crate::gateway::Gateway;
use crate::load_config::{load_config, CliConfig};
use crate::queue::{HttpQueueClient, HttpTopicClient};
use crate::storage::HttpObjectStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_pipeline_core::config::Config;
use pdf_pipeline_core::contract::{SystemClock, TopicPublisher};
use pdf_pipeline_core::download::HttpDownloader;
use pdf_pipeline_core::export::{ExportDirs, Exporter};
use pdf_pipeline_core::job::validate_article_id;
use pdf_pipeline_core::notify::HttpWebhookNotifier;
use pdf_pipeline_core::processor::JobProcessor;
use pdf_pipeline_core::service::ServiceLoop;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[clap(
    name = "pdf-pipeline",
    version,
    about = "Queue worker converting PDFs into markdown, JSON and images"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Consume the job queue until the configured maximum runtime
    Serve {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Convert a single local PDF into the configured temp directories
    Convert {
        /// PDF file to convert
        pdf: PathBuf,
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        #[clap(long, default_value = "test_article")]
        article_id: String,
        /// Overrides `temp.image_dir`
        #[clap(long)]
        image_dir: Option<PathBuf>,
        /// Overrides `temp.markdown_dir`
        #[clap(long)]
        markdown_dir: Option<PathBuf>,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Serve { config } => {
            let config = load_config(config)?;
            serve(config).await
        }
        Commands::Convert {
            pdf,
            config,
            article_id,
            image_dir,
            markdown_dir,
        } => {
            let config = load_config(config)?;
            let dirs = ExportDirs {
                image_dir: image_dir.unwrap_or_else(|| config.worker.temp.image_dir.clone()),
                markdown_dir: markdown_dir.unwrap_or_else(|| config.worker.temp.markdown_dir.clone()),
            };
            convert(&config.worker, dirs, &pdf, &article_id).await
        }
    }
}

async fn serve(config: CliConfig) -> Result<()> {
    let worker = &config.worker;
    bootstrap_dirs(worker).await?;

    let http = Client::new();
    let gateway = |endpoint: &str| Gateway::new(http.clone(), endpoint, config.access_token.clone());

    let downloader = HttpDownloader::new(Duration::from_secs(worker.service.download_timeout_seconds))
        .map_err(|e| anyhow::anyhow!("Failed to build download client: {e}"))?;
    let exporter = Exporter::new(
        Arc::new(engine(worker)?),
        ExportDirs {
            image_dir: worker.temp.image_dir.clone(),
            markdown_dir: worker.temp.markdown_dir.clone(),
        },
    );
    let store = HttpObjectStore::new(gateway(&worker.storage.endpoint), &worker.storage.bucket_name);

    let mut processor = JobProcessor::new(Arc::new(downloader), exporter, Arc::new(store), &worker.temp.pdf_dir)
        .with_cleanup(worker.service.cleanup_local);
    if let Some(topic) = &worker.topic {
        let publisher: Arc<dyn TopicPublisher> =
            Arc::new(HttpTopicClient::new(gateway(&worker.queue.endpoint), &topic.topic_name));
        processor = processor.with_topic(publisher, &topic.tag);
    }
    if let Some(url) = &worker.notice.hook_url {
        processor = processor.with_webhook(Arc::new(HttpWebhookNotifier::new(http.clone(), url)));
    }

    let queue = HttpQueueClient::new(gateway(&worker.queue.endpoint), &worker.queue.queue_name);
    let service = ServiceLoop::new(Arc::new(queue), Arc::new(processor), Arc::new(SystemClock), &worker.service);

    tracing::info!(command = "serve", "Starting service loop");
    let summary = service.run().await;
    tracing::info!(command = "serve", ?summary, "Service loop finished");
    Ok(())
}

async fn convert(worker: &Config, dirs: ExportDirs, pdf: &Path, article_id: &str) -> Result<()> {
    validate_article_id(article_id)?;
    let exporter = Exporter::new(Arc::new(engine(worker)?), dirs);
    tracing::info!(command = "convert", pdf = %pdf.display(), article_id, "Converting local PDF");
    let export = exporter
        .export(pdf, article_id)
        .await
        .with_context(|| format!("Converting {} failed", pdf.display()))?;
    tracing::info!(
        command = "convert",
        method = %export.path.final_method(),
        markdown = %export.artifacts.markdown_path.display(),
        images = %export.artifacts.image_directory.display(),
        "Conversion complete"
    );
    Ok(())
}

fn engine(worker: &Config) -> Result<HttpDocumentEngine> {
    HttpDocumentEngine::new(
        &worker.engine.endpoint,
        Duration::from_secs(worker.engine.timeout_seconds),
    )
    .context("Failed to build engine client")
}

/// Create the local working directories if they do not exist yet.
pub async fn bootstrap_dirs(worker: &Config) -> Result<()> {
    for dir in worker.temp.all() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    Ok(())
}
