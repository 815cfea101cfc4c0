use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::contract::{Downloader, TransportError};

/// Downloads source PDFs over HTTP(S).
///
/// The body is written to a uniquely named `.part` file next to `dest` and
/// renamed into place, so a failed download never leaves a truncated PDF behind.
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransportError> {
        info!(url = %url, dest = %dest.display(), "Downloading source PDF");
        let response = self.client.get(url).send().await.map_err(|e| {
            error!(error = ?e, url = %url, "Failed to fetch source PDF");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, url = %url, "Source PDF request returned an error status");
            return Err(format!("GET {url} returned {status}").into());
        }

        let body = response.bytes().await?;
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await?;

        let partial = partial_path(dest);
        if let Err(e) = write_then_rename(&partial, dest, &body).await {
            error!(error = ?e, dest = %dest.display(), "Failed to move downloaded PDF into place");
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        debug!(url = %url, bytes = body.len(), "Source PDF written");
        Ok(body.len() as u64)
    }
}

/// Sibling of `dest` the body is staged in before the rename.
pub fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.{}.part", Uuid::new_v4().simple()))
}

async fn write_then_rename(partial: &Path, dest: &Path, body: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(partial, body).await?;
    tokio::fs::rename(partial, dest).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_path_is_a_unique_sibling() {
        let dest = Path::new("/tmp/pdf/a1.pdf");
        let first = partial_path(dest);
        let second = partial_path(dest);
        assert_eq!(first.parent(), dest.parent());
        assert_ne!(first, second);
        let name = first.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".a1.pdf.") && name.ends_with(".part"), "{name}");
    }

    #[tokio::test]
    async fn staged_body_replaces_the_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("a1.pdf");
        std::fs::write(&dest, b"old").unwrap();
        let partial = partial_path(&dest);

        write_then_rename(&partial, &dest, b"%PDF-1.7").await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.7");
        assert!(!partial.exists());
    }
}
