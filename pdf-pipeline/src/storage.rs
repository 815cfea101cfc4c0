use std::path::Path;

use async_trait::async_trait;
use pdf_pipeline_core::contract::{ObjectStore, TransportError};
use reqwest::Method;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::gateway::{ensure_success, Gateway};

/// Object store speaking plain `PUT {endpoint}/{bucket}/{key}`.
pub struct HttpObjectStore {
    gateway: Gateway,
    bucket_name: String,
}

impl HttpObjectStore {
    pub fn new(gateway: Gateway, bucket_name: impl Into<String>) -> Self {
        Self {
            gateway,
            bucket_name: bucket_name.into(),
        }
    }

    pub fn object_path(&self, key: &str) -> String {
        format!("{}/{}", self.bucket_name, key.trim_start_matches('/'))
    }
}

/// Hex SHA-256 of `body`, sent as `x-amz-content-sha256`.
pub fn content_sha256(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("{:x}", hasher.finalize())
}

pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("md") => "text/markdown; charset=utf-8",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object_from_file(&self, key: &str, local_path: &Path) -> Result<(), TransportError> {
        let body = tokio::fs::read(local_path).await?;
        let size = body.len();
        let response = self
            .gateway
            .request(Method::PUT, &self.object_path(key))
            .header("x-amz-content-sha256", content_sha256(&body))
            .header(reqwest::header::CONTENT_TYPE, content_type(local_path))
            .body(body)
            .send()
            .await?;
        ensure_success(response, "object put").await?;
        info!(bucket = %self.bucket_name, key, size, "Stored object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Gateway;
    use reqwest::Client;

    #[test]
    fn object_path_is_bucket_then_key() {
        let store = HttpObjectStore::new(Gateway::new(Client::new(), "http://oss", None), "docs");
        assert_eq!(store.object_path("/md/a1.md"), "docs/md/a1.md");
    }

    #[test]
    fn sha256_of_empty_body() {
        assert_eq!(
            content_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type(Path::new("a1_middle.json")), "application/json");
        assert_eq!(content_type(Path::new("p1.JPG")), "image/jpeg");
        assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
    }
}
