//! Artifact exporter: classify a PDF, convert it with fallback, and dump the
//! markdown / middle JSON / content-list JSON next to the extracted images.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::contract::DocumentEngine;
use crate::convert::{convert_with_fallback, ConversionPath};
use crate::error::{EngineError, JobError};

/// Result object returned by the engine for one parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub markdown: String,
    pub middle_json: Value,
    pub content_list: Value,
}

impl ParsedDocument {
    pub async fn dump_markdown(&self, path: &Path) -> Result<(), JobError> {
        write_file(path, self.markdown.as_bytes()).await
    }

    pub async fn dump_middle_json(&self, path: &Path) -> Result<(), JobError> {
        write_json(path, &self.middle_json).await
    }

    pub async fn dump_content_list(&self, path: &Path) -> Result<(), JobError> {
        write_json(path, &self.content_list).await
    }
}

/// Local files produced for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub markdown_path: PathBuf,
    pub middle_json_path: PathBuf,
    pub content_list_json_path: PathBuf,
    /// May not exist when the document had no images.
    pub image_directory: PathBuf,
}

impl ArtifactSet {
    /// Paths the exporter writes for `article_id`.
    pub fn for_article(markdown_dir: &Path, image_root: &Path, article_id: &str) -> Self {
        Self {
            markdown_path: markdown_dir.join(format!("{article_id}.md")),
            middle_json_path: markdown_dir.join(format!("{article_id}_middle.json")),
            content_list_json_path: markdown_dir.join(format!("{article_id}_content_list.json")),
            image_directory: image_root.join(article_id),
        }
    }

    /// Best-effort removal of every local artifact. Failures are only logged.
    pub async fn remove_local(&self) {
        for file in [
            &self.markdown_path,
            &self.middle_json_path,
            &self.content_list_json_path,
        ] {
            if let Err(e) = tokio::fs::remove_file(file).await {
                debug!(error = ?e, path = %file.display(), "Could not remove local artifact");
            }
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.image_directory).await {
            debug!(error = ?e, path = %self.image_directory.display(), "Could not remove image directory");
        }
    }
}

/// Where the exporter writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDirs {
    /// Parent of the per-article image directories.
    pub image_dir: PathBuf,
    /// Shared directory for markdown and JSON outputs.
    pub markdown_dir: PathBuf,
}

/// Exported artifacts and the conversion route that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub artifacts: ArtifactSet,
    pub path: ConversionPath,
}

pub struct Exporter {
    engine: Arc<dyn DocumentEngine>,
    dirs: ExportDirs,
}

impl Exporter {
    pub fn new(engine: Arc<dyn DocumentEngine>, dirs: ExportDirs) -> Self {
        Self { engine, dirs }
    }

    pub fn dirs(&self) -> &ExportDirs {
        &self.dirs
    }

    /// Convert the PDF at `pdf_path` and write the artifact set for `article_id`.
    pub async fn export(&self, pdf_path: &Path, article_id: &str) -> Result<Export, JobError> {
        let pdf = tokio::fs::read(pdf_path).await.map_err(|e| {
            error!(error = ?e, path = %pdf_path.display(), "Failed to read downloaded PDF");
            JobError::io(pdf_path, e)
        })?;

        let artifacts = ArtifactSet::for_article(&self.dirs.markdown_dir, &self.dirs.image_dir, article_id);
        tokio::fs::create_dir_all(&self.dirs.markdown_dir)
            .await
            .map_err(|e| JobError::io(self.dirs.markdown_dir.as_path(), e))?;
        // leftovers from an earlier failed delivery must not be uploaded with this one
        reset_dir(&artifacts.image_directory)
            .await
            .map_err(|e| JobError::io(artifacts.image_directory.as_path(), e))?;

        let classified = self.engine.classify(&pdf).await.map_err(|e| {
            error!(article_id, error = %e, "Document classification failed");
            JobError::Classify(e)
        })?;
        info!(article_id, method = %classified, bytes = pdf.len(), "Classified document");

        let engine = &self.engine;
        let pdf_ref = pdf.as_slice();
        let image_dir = artifacts.image_directory.as_path();
        let converted = convert_with_fallback(classified, |method| async move {
            // each attempt starts from an empty image directory
            reset_dir(image_dir).await.map_err(|e| {
                EngineError::new(format!("failed to reset image directory {}: {e}", image_dir.display()))
            })?;
            engine.parse(pdf_ref, method, image_dir).await
        })
        .await
        .map_err(|e| {
            error!(article_id, error = %e, text_error = ?e.text, "Conversion failed");
            JobError::from(e)
        })?;

        let document = converted.value;
        document.dump_markdown(&artifacts.markdown_path).await?;
        document.dump_middle_json(&artifacts.middle_json_path).await?;
        document.dump_content_list(&artifacts.content_list_json_path).await?;

        info!(
            article_id,
            method = %converted.path.final_method(),
            markdown = %artifacts.markdown_path.display(),
            "Exported artifacts"
        );
        Ok(Export {
            artifacts,
            path: converted.path,
        })
    }
}

/// Remove `dir` and everything in it, then recreate it empty.
pub async fn reset_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(dir).await
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), JobError> {
    tokio::fs::write(path, bytes).await.map_err(|e| {
        error!(error = ?e, path = %path.display(), "Failed to write artifact");
        JobError::io(path, e)
    })
}

async fn write_json(path: &Path, value: &Value) -> Result<(), JobError> {
    let text = serde_json::to_vec_pretty(value)
        .map_err(|e| JobError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    write_file(path, &text).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reset_dir_empties_an_existing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a1");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("stale.png"), b"old").unwrap();

        reset_dir(&dir).await.unwrap();

        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn reset_dir_creates_a_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("images").join("a1");
        reset_dir(&dir).await.unwrap();
        assert!(dir.is_dir());
    }
}
