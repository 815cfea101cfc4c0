//! # upload: push a finished artifact set to object storage
//!
//! Order is fixed: markdown, middle JSON, content-list JSON, then images. The
//! first failure aborts the sequence. Re-running after a partial upload is safe
//! because every write targets the same key and overwrites it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::contract::{ObjectStore, TransportError};
use crate::error::JobError;
use crate::export::ArtifactSet;
use crate::job::Job;

/// File extensions treated as exported images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Keys written for one job, in upload order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub keys: Vec<String>,
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by name. A missing directory yields none.
pub async fn list_images(dir: &Path) -> Result<Vec<PathBuf>, JobError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "No image directory, nothing to upload");
            return Ok(Vec::new());
        }
        Err(e) => return Err(JobError::io(dir, e)),
    };

    let mut images = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| JobError::io(dir, e))? {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file && is_image_file(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Upload every artifact of `artifacts` to the destinations named by `job`.
pub async fn upload_artifacts(
    store: &dyn ObjectStore,
    artifacts: &ArtifactSet,
    job: &Job,
) -> Result<UploadReport, JobError> {
    let mut report = UploadReport::default();

    let fixed = [
        (job.markdown_destination.clone(), &artifacts.markdown_path),
        (job.middle_json_key(), &artifacts.middle_json_path),
        (job.content_list_json_key(), &artifacts.content_list_json_path),
    ];
    for (key, path) in fixed {
        put(store, &key, path).await?;
        report.keys.push(key);
    }

    for image in list_images(&artifacts.image_directory).await? {
        let Some(name) = image.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let key = job.image_key(name);
        put(store, &key, &image).await?;
        report.keys.push(key);
    }

    info!(
        article_id = %job.article_id,
        objects = report.keys.len(),
        "Uploaded artifact set"
    );
    Ok(report)
}

async fn put(store: &dyn ObjectStore, key: &str, path: &Path) -> Result<(), JobError> {
    debug!(key, path = %path.display(), "Uploading object");
    store.put_object_from_file(key, path).await.map_err(|source| {
        error!(key, error = ?source, "Object upload failed");
        JobError::Upload {
            key: key.to_string(),
            source,
        }
    })
}

/// Object store backed by a local directory; keys become relative paths.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object_from_file(
        &self,
        key: &str,
        local_path: &Path,
    ) -> Result<(), TransportError> {
        let target = self.path_for(key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &target).await?;
        debug!(key, target = %target.display(), "Stored object on local filesystem");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extension_filter() {
        assert!(is_image_file(Path::new("a/p1.PNG")));
        assert!(is_image_file(Path::new("p2.jpeg")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("noext")));
    }

    #[tokio::test]
    async fn missing_image_directory_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let images = list_images(&tmp.path().join("absent")).await.unwrap();
        assert!(images.is_empty());
    }
}
