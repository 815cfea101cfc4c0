//! HTTP client for the layout-analysis engine.
//!
//! `POST {endpoint}/classify` with the raw PDF answers `{"method": "ocr" | "txt"}`.
//! `POST {endpoint}/parse?method=...` answers the textual artifacts plus the
//! extracted images as base64, which are written into the job's image directory.
//! Any failure is reported as an [`EngineError`] whose message is the engine's
//! own error text when it sent one, so font-decoding failures stay recognisable.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use pdf_pipeline_core::contract::DocumentEngine;
use pdf_pipeline_core::convert::ParseMethod;
use pdf_pipeline_core::export::ParsedDocument;
use pdf_pipeline_core::EngineError;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    method: ParseMethod,
}

#[derive(Debug, Deserialize)]
pub struct EngineImage {
    pub name: String,
    /// Base64 (standard alphabet) file contents.
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct ParseResponse {
    pub markdown: String,
    pub middle_json: Value,
    pub content_list: Value,
    #[serde(default)]
    pub images: Vec<EngineImage>,
}

pub struct HttpDocumentEngine {
    client: Client,
    endpoint: String,
}

impl HttpDocumentEngine {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn post_pdf(&self, path: &str, pdf: &[u8]) -> Result<Response, EngineError> {
        let response = self
            .client
            .post(format!("{}/{path}", self.endpoint))
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(pdf.to_vec())
            .send()
            .await
            .map_err(|e| EngineError::new(format!("engine request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, path, "Engine returned an error status");
        Err(engine_error_from_body(status.as_u16(), &body))
    }
}

/// Prefer the engine's own `error`/`message`/`detail` text; fall back to the raw body.
pub fn engine_error_from_body(status: u16, body: &str) -> EngineError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["error", "message", "detail"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_owned))
        })
        .unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        EngineError::new(format!("engine returned status {status}"))
    } else {
        EngineError::new(message)
    }
}

/// Decode and write every image into `image_dir`, keeping only the file-name part of each name.
pub async fn write_images(images: &[EngineImage], image_dir: &Path) -> Result<usize, EngineError> {
    let mut written = 0;
    for image in images {
        let Some(name) = Path::new(&image.name).file_name() else {
            debug!(name = %image.name, "Skipping image with no file name");
            continue;
        };
        let bytes = STANDARD
            .decode(image.data.as_bytes())
            .map_err(|e| EngineError::new(format!("image '{}' is not valid base64: {e}", image.name)))?;
        let dest = image_dir.join(name);
        tokio::fs::write(&dest, bytes)
            .await
            .map_err(|e| EngineError::new(format!("failed to write image {}: {e}", dest.display())))?;
        written += 1;
    }
    Ok(written)
}

#[async_trait]
impl DocumentEngine for HttpDocumentEngine {
    async fn classify(&self, pdf: &[u8]) -> Result<ParseMethod, EngineError> {
        let response = self.post_pdf("classify", pdf).await?;
        let body: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| EngineError::new(format!("unreadable classify response: {e}")))?;
        Ok(body.method)
    }

    async fn parse(
        &self,
        pdf: &[u8],
        method: ParseMethod,
        image_dir: &Path,
    ) -> Result<ParsedDocument, EngineError> {
        let response = self
            .post_pdf(&format!("parse?method={}", method.as_str()), pdf)
            .await?;
        let body: ParseResponse = response
            .json()
            .await
            .map_err(|e| EngineError::new(format!("unreadable parse response: {e}")))?;

        let images = write_images(&body.images, image_dir).await?;
        info!(%method, images, "Engine parse complete");
        Ok(ParsedDocument {
            markdown: body.markdown,
            middle_json: body.middle_json,
            content_list: body.content_list,
        })
    }
}
