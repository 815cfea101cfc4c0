//! Completion fan-out.
//!
//! Two channels with different weight: the topic publish is part of the job
//! contract and its failure fails the job; the webhook is advisory and its
//! failure is only logged.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::contract::{TopicPublisher, TransportError, WebhookNotifier};
use crate::error::JobError;
use crate::job::Job;

/// Structured message announced on the completion topic.
///
/// Field names match the inbound queue message so subscribers can see exactly
/// what was requested and where the results landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub article_id: String,
    pub tag: String,
    pub pdf_url: String,
    pub markdown_file: String,
    pub images_path: String,
    pub json_path: String,
}

impl CompletionMessage {
    /// Echo `job`, substituting `default_tag` when the job carried none.
    pub fn from_job(job: &Job, default_tag: &str) -> Self {
        Self {
            article_id: job.article_id.clone(),
            tag: job.tag.clone().unwrap_or_else(|| default_tag.to_string()),
            pdf_url: job.source_url.clone(),
            markdown_file: job.markdown_destination.clone(),
            images_path: job.images_destination_prefix.clone(),
            json_path: job.json_destination_prefix.clone(),
        }
    }
}

/// Publish the completion message. No topic configured means nothing to do.
pub async fn publish_completion(
    topic: Option<&dyn TopicPublisher>,
    job: &Job,
    default_tag: &str,
) -> Result<bool, JobError> {
    let Some(topic) = topic else {
        info!(article_id = %job.article_id, "No completion topic configured, skipping publish");
        return Ok(false);
    };
    let message = CompletionMessage::from_job(job, default_tag);
    topic.publish(&message).await.map_err(JobError::Publish)?;
    info!(article_id = %job.article_id, tag = %message.tag, "Published completion message");
    Ok(true)
}

/// Human-readable summary of a finished job.
pub fn webhook_text(job: &Job) -> String {
    format!(
        "PDF conversion finished\narticle_id: {}\ntag: {}\npdf_url: {}\nmarkdown: {}",
        job.article_id,
        job.tag.as_deref().unwrap_or("-"),
        job.source_url,
        job.markdown_destination,
    )
}

/// Post the webhook notice if one is configured. Never fails the caller.
pub async fn send_webhook_notice(webhook: Option<&dyn WebhookNotifier>, job: &Job) -> bool {
    let Some(webhook) = webhook else {
        return false;
    };
    match webhook.post_text(&webhook_text(job)).await {
        Ok(()) => {
            info!(article_id = %job.article_id, "Webhook notice sent");
            true
        }
        Err(e) => {
            warn!(article_id = %job.article_id, error = %e, "Webhook notice failed");
            false
        }
    }
}

/// Chat-style webhook taking `{"msgtype":"text","text":{"content":...}}`.
pub struct HttpWebhookNotifier {
    client: Client,
    url: String,
}

impl HttpWebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn payload(content: &str) -> serde_json::Value {
        json!({
            "msgtype": "text",
            "text": { "content": content },
        })
    }
}

#[async_trait]
impl WebhookNotifier for HttpWebhookNotifier {
    async fn post_text(&self, content: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Self::payload(content))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("webhook returned {status}").into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockTopicPublisher, MockWebhookNotifier};

    fn job(tag: Option<&str>) -> Job {
        Job {
            article_id: "a1".into(),
            tag: tag.map(str::to_owned),
            source_url: "http://x/a1.pdf".into(),
            markdown_destination: "md/a1.md".into(),
            images_destination_prefix: "img/a1".into(),
            json_destination_prefix: "json/a1".into(),
            redelivery_count: 0,
        }
    }

    #[test]
    fn completion_message_defaults_missing_tag() {
        let msg = CompletionMessage::from_job(&job(None), "pdf_processed");
        assert_eq!(msg.tag, "pdf_processed");
        let msg = CompletionMessage::from_job(&job(Some("news")), "pdf_processed");
        assert_eq!(msg.tag, "news");
        assert_eq!(msg.markdown_file, "md/a1.md");
    }

    #[test]
    fn webhook_payload_is_text_type_with_article_id() {
        let payload = HttpWebhookNotifier::payload(&webhook_text(&job(Some("news"))));
        assert_eq!(payload["msgtype"], "text");
        assert!(payload["text"]["content"].as_str().unwrap().contains("a1"));
    }

    #[tokio::test]
    async fn no_topic_is_not_an_error() {
        assert!(!publish_completion(None, &job(None), "t").await.unwrap());
    }

    #[tokio::test]
    async fn topic_failure_is_fatal() {
        let mut topic = MockTopicPublisher::new();
        topic
            .expect_publish()
            .times(1)
            .returning(|_| Err("topic down".into()));
        let err = publish_completion(Some(&topic), &job(None), "t").await.unwrap_err();
        assert!(matches!(err, JobError::Publish(_)));
    }

    #[tokio::test]
    async fn webhook_failure_is_swallowed() {
        let mut hook = MockWebhookNotifier::new();
        hook.expect_post_text()
            .times(1)
            .returning(|_| Err("hook down".into()));
        assert!(!send_webhook_notice(Some(&hook), &job(None)).await);
        assert!(!send_webhook_notice(None, &job(None)).await);
    }
}
