//! Job processor: orchestrates download → convert → upload → notify for one message.
//!
//! Every step is a hard boundary. The first failure is logged with the job's
//! identity and error kind and returned; the caller must then leave the message
//! unacknowledged. Success means every remote write and the topic publish have
//! already happened.
//!
//! # Navigation
//! - Entrypoint: [`JobProcessor::process`]
//! - Output: [`JobReport`]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::DEFAULT_TAG;
use crate::contract::{Downloader, JobHandler, ObjectStore, TopicPublisher, WebhookNotifier};
use crate::convert::ConversionPath;
use crate::error::JobError;
use crate::export::Exporter;
use crate::job::{Job, ReceivedMessage};
use crate::notify::{publish_completion, send_webhook_notice};
use crate::upload::upload_artifacts;

/// What a successful job did.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub article_id: String,
    pub conversion: ConversionPath,
    /// Remote keys in upload order.
    pub uploaded_keys: Vec<String>,
    pub published: bool,
    pub webhook_sent: bool,
}

pub struct JobProcessor {
    downloader: Arc<dyn Downloader>,
    exporter: Exporter,
    store: Arc<dyn ObjectStore>,
    topic: Option<Arc<dyn TopicPublisher>>,
    webhook: Option<Arc<dyn WebhookNotifier>>,
    pdf_dir: PathBuf,
    default_tag: String,
    cleanup_local: bool,
}

impl JobProcessor {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        exporter: Exporter,
        store: Arc<dyn ObjectStore>,
        pdf_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloader,
            exporter,
            store,
            topic: None,
            webhook: None,
            pdf_dir: pdf_dir.into(),
            default_tag: DEFAULT_TAG.to_string(),
            cleanup_local: false,
        }
    }

    /// Publish completions to `topic`, using `default_tag` for untagged jobs.
    pub fn with_topic(mut self, topic: Arc<dyn TopicPublisher>, default_tag: impl Into<String>) -> Self {
        self.topic = Some(topic);
        self.default_tag = default_tag.into();
        self
    }

    pub fn with_webhook(mut self, webhook: Arc<dyn WebhookNotifier>) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn with_cleanup(mut self, cleanup_local: bool) -> Self {
        self.cleanup_local = cleanup_local;
        self
    }

    /// Local path the source PDF of `article_id` is downloaded to.
    pub fn pdf_path(&self, article_id: &str) -> PathBuf {
        self.pdf_dir.join(format!("{article_id}.pdf"))
    }

    /// Process one queue message end to end.
    pub async fn process(&self, message: &ReceivedMessage) -> Result<JobReport, JobError> {
        let job = Job::from_message(message).map_err(|e| {
            error!(
                receipt_handle = %message.receipt_handle,
                error_kind = e.kind(),
                error = %e,
                "Rejected queue message"
            );
            e
        })?;

        info!(
            article_id = %job.article_id,
            tag = job.tag.as_deref().unwrap_or(""),
            redelivery_count = job.redelivery_count,
            "Processing article"
        );

        match self.run(&job).await {
            Ok(report) => {
                info!(
                    article_id = %job.article_id,
                    objects = report.uploaded_keys.len(),
                    published = report.published,
                    "Article processed"
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    article_id = %job.article_id,
                    error_kind = e.kind(),
                    error = %e,
                    "Article processing failed"
                );
                Err(e)
            }
        }
    }

    async fn run(&self, job: &Job) -> Result<JobReport, JobError> {
        let pdf_path = self.pdf_path(&job.article_id);
        let bytes = self.download(job, &pdf_path).await?;
        info!(article_id = %job.article_id, stage = "download", bytes, "Stage complete");

        let export = self.exporter.export(&pdf_path, &job.article_id).await?;
        info!(
            article_id = %job.article_id,
            stage = "convert",
            method = %export.path.final_method(),
            fell_back = matches!(export.path, ConversionPath::OcrAfterText(_)),
            "Stage complete"
        );

        let upload = upload_artifacts(self.store.as_ref(), &export.artifacts, job).await?;
        info!(article_id = %job.article_id, stage = "upload", objects = upload.keys.len(), "Stage complete");

        let published = publish_completion(self.topic.as_deref(), job, &self.default_tag).await?;
        info!(article_id = %job.article_id, stage = "publish", published, "Stage complete");

        let webhook_sent = send_webhook_notice(self.webhook.as_deref(), job).await;
        info!(article_id = %job.article_id, stage = "notify", webhook_sent, "Stage complete");

        if self.cleanup_local {
            export.artifacts.remove_local().await;
            remove_quietly(&pdf_path).await;
        }

        Ok(JobReport {
            article_id: job.article_id.clone(),
            conversion: export.path,
            uploaded_keys: upload.keys,
            published,
            webhook_sent,
        })
    }

    async fn download(&self, job: &Job, dest: &Path) -> Result<u64, JobError> {
        self.downloader
            .download(&job.source_url, dest)
            .await
            .map_err(|source| JobError::Download {
                url: job.source_url.clone(),
                source,
            })
    }
}

#[async_trait]
impl JobHandler for JobProcessor {
    async fn handle(&self, message: &ReceivedMessage) -> Result<JobReport, JobError> {
        self.process(message).await
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!(error = ?e, path = %path.display(), "Could not remove downloaded PDF");
    }
}
