//! Queue and topic clients for the JSON message gateway.
//!
//! - `GET  {endpoint}/queues/{queue}/messages?waitseconds=N` long-polls one
//!   message. `200` carries it; `204` or `404` means the wait expired empty.
//! - `DELETE {endpoint}/queues/{queue}/messages?ReceiptHandle=...` acknowledges.
//! - `POST {endpoint}/topics/{topic}/messages` publishes `{message_body, message_tag}`.

use std::time::Duration;

use async_trait::async_trait;
use pdf_pipeline_core::contract::{MessageQueue, TopicPublisher, TransportError};
use pdf_pipeline_core::notify::CompletionMessage;
use pdf_pipeline_core::ReceivedMessage;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::gateway::{ensure_success, Gateway};

/// Extra time the HTTP request gets beyond the long-poll wait itself.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// A message as the gateway returns it.
#[derive(Debug, Deserialize)]
pub struct QueueMessagePayload {
    pub receipt_handle: String,
    pub message_body: String,
    /// Deliveries so far, including this one.
    #[serde(default = "first_delivery")]
    pub dequeue_count: u32,
}

fn first_delivery() -> u32 {
    1
}

impl From<QueueMessagePayload> for ReceivedMessage {
    fn from(payload: QueueMessagePayload) -> Self {
        ReceivedMessage {
            receipt_handle: payload.receipt_handle,
            body: payload.message_body,
            redelivery_count: payload.dequeue_count.saturating_sub(1),
        }
    }
}

pub struct HttpQueueClient {
    gateway: Gateway,
    queue_name: String,
}

impl HttpQueueClient {
    pub fn new(gateway: Gateway, queue_name: impl Into<String>) -> Self {
        Self {
            gateway,
            queue_name: queue_name.into(),
        }
    }

    fn messages_path(&self) -> String {
        format!("queues/{}/messages", self.queue_name)
    }
}

#[async_trait]
impl MessageQueue for HttpQueueClient {
    async fn receive(&self, wait: Duration) -> Result<Option<ReceivedMessage>, TransportError> {
        let response = self
            .gateway
            .request(Method::GET, &self.messages_path())
            .query(&[("waitseconds", wait.as_secs())])
            .timeout(wait + POLL_GRACE)
            .send()
            .await?;

        if matches!(response.status(), StatusCode::NO_CONTENT | StatusCode::NOT_FOUND) {
            debug!(queue = %self.queue_name, "No message within wait");
            return Ok(None);
        }
        let response = ensure_success(response, "queue receive").await?;
        let payload: QueueMessagePayload = response.json().await?;
        info!(
            queue = %self.queue_name,
            receipt_handle = %payload.receipt_handle,
            dequeue_count = payload.dequeue_count,
            "Received queue message"
        );
        Ok(Some(payload.into()))
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), TransportError> {
        let response = self
            .gateway
            .request(Method::DELETE, &self.messages_path())
            .query(&[("ReceiptHandle", receipt_handle)])
            .send()
            .await?;
        ensure_success(response, "queue delete").await?;
        debug!(queue = %self.queue_name, receipt_handle, "Deleted queue message");
        Ok(())
    }
}

/// Body of a topic publish request.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TopicPublishRequest {
    pub message_body: String,
    pub message_tag: String,
}

impl TopicPublishRequest {
    pub fn from_completion(message: &CompletionMessage) -> Result<Self, serde_json::Error> {
        Ok(Self {
            message_body: serde_json::to_string(message)?,
            message_tag: message.tag.clone(),
        })
    }
}

pub struct HttpTopicClient {
    gateway: Gateway,
    topic_name: String,
}

impl HttpTopicClient {
    pub fn new(gateway: Gateway, topic_name: impl Into<String>) -> Self {
        Self {
            gateway,
            topic_name: topic_name.into(),
        }
    }
}

#[async_trait]
impl TopicPublisher for HttpTopicClient {
    async fn publish(&self, message: &CompletionMessage) -> Result<(), TransportError> {
        let request = TopicPublishRequest::from_completion(message)?;
        let response = self
            .gateway
            .request(Method::POST, &format!("topics/{}/messages", self.topic_name))
            .json(&request)
            .send()
            .await?;
        ensure_success(response, "topic publish").await?;
        Ok(())
    }
}
