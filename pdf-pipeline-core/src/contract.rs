//! # contract: trait seams for every external collaborator
//!
//! The worker consumes a queue, a topic, an object store, an HTTP source for PDFs,
//! a layout-analysis engine and an optional webhook. None of them is implemented
//! in this crate; each one is a trait here so the pipeline can be driven by real
//! clients in production and by `mockall` mocks in tests.
//!
//! ## Mocking & Testing
//! - Traits are annotated for `mockall`; the generated `Mock*` types are exported
//!   when the `test-export-mocks` feature is on (the default).
//! - [`ManualClock`] is a hand-driven [`Clock`] for timing-sensitive tests.
//!
//! ## Errors
//! Transport failures are boxed trait objects ([`TransportError`]); the pipeline
//! wraps them into [`crate::error::JobError`] with the step that failed.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::convert::ParseMethod;
use crate::error::{EngineError, JobError};
use crate::export::ParsedDocument;
use crate::job::ReceivedMessage;
use crate::notify::CompletionMessage;
use crate::processor::JobReport;

/// Error type for transport seams (queue, topic, store, download, webhook).
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Work queue the service loop drains.
///
/// `receive` returns `Ok(None)` when nothing arrived within `wait`; that is the
/// normal idle condition, not an error.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Long-poll for one message, waiting at most `wait`.
    async fn receive(&self, wait: Duration) -> Result<Option<ReceivedMessage>, TransportError>;

    /// Acknowledge a message so the transport never redelivers it.
    async fn delete(&self, receipt_handle: &str) -> Result<(), TransportError>;
}

/// Pub/sub topic that downstream consumers subscribe to.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    async fn publish(&self, message: &CompletionMessage) -> Result<(), TransportError>;
}

/// Remote object storage. Writing an existing key overwrites it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object_from_file(&self, key: &str, local_path: &Path)
        -> Result<(), TransportError>;
}

/// Fetches the source PDF of a job.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` into `dest`, returning the number of bytes written.
    /// Any non-2xx response is an error.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransportError>;
}

/// The PDF layout-analysis / OCR engine.
///
/// `parse` writes any extracted images into `image_dir` and returns the textual
/// artifacts; the exporter decides where those end up on disk.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    /// Decide whether the document needs OCR or plain text extraction.
    async fn classify(&self, pdf: &[u8]) -> Result<ParseMethod, EngineError>;

    async fn parse(
        &self,
        pdf: &[u8],
        method: ParseMethod,
        image_dir: &Path,
    ) -> Result<ParsedDocument, EngineError>;
}

/// Human-facing alert channel (e.g. a chat webhook). Advisory only.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    async fn post_text(&self, content: &str) -> Result<(), TransportError>;
}

/// Whatever the service loop hands a non-poison message to.
/// [`crate::processor::JobProcessor`] is the production implementation.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, message: &ReceivedMessage) -> Result<JobReport, JobError>;
}

/// Source of monotonic time for the service loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
