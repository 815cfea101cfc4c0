//! Error types for the job pipeline.
//!
//! [`JobError`] is what a failed job returns to the service loop. The loop never
//! inspects the variant to decide whether to acknowledge; any `Err` leaves the
//! message on the queue. Variants exist for logs and for tests.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::contract::TransportError;

/// Signatures the layout engine emits when an embedded font or CMap cannot be decoded.
static FONT_DECODING_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(decode|decoding|load|parse|read)\w*\s+(embedded\s+)?font|font\w*\s+(decode|decoding|program)|embedded\s+font|\bcmap\b|ft_load_glyph|type3\s+font|tounicode",
    )
    .unwrap()
});

/// Failure reported by the document engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// True when the message carries a known font/embedded-resource decoding signature.
    pub fn is_font_decoding(&self) -> bool {
        FONT_DECODING_SIGNATURE.is_match(&self.message)
    }
}

/// Conversion failed on the OCR path, after or instead of the text path.
///
/// `source()` is always the OCR error. The text-stage error is kept for diagnostics.
#[derive(Debug, Error)]
#[error("OCR conversion failed: {ocr}")]
pub struct ConversionError {
    #[source]
    pub ocr: EngineError,
    pub text: Option<EngineError>,
}

/// All ways a single job can fail.
#[derive(Debug, Error)]
pub enum JobError {
    /// The queue message body is not a JSON object.
    #[error("message body is not valid JSON: {0}")]
    InvalidBody(#[source] serde_json::Error),

    /// A required field is absent, null, or not a string.
    #[error("message is missing required field '{0}'")]
    MissingField(&'static str),

    /// A field is present but its value cannot be used.
    #[error("field '{field}' is invalid: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    #[error("failed to download '{url}': {source}")]
    Download {
        url: String,
        #[source]
        source: TransportError,
    },

    /// Classification failed before any parse mode was chosen.
    #[error("document classification failed: {0}")]
    Classify(#[source] EngineError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("failed to upload '{key}': {source}")]
    Upload {
        key: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to publish completion message: {0}")]
    Publish(#[source] TransportError),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl JobError {
    /// Short stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::InvalidBody(_) => "invalid_body",
            JobError::MissingField(_) => "missing_field",
            JobError::InvalidField { .. } => "invalid_field",
            JobError::Download { .. } => "download",
            JobError::Classify(_) => "classify",
            JobError::Conversion(_) => "conversion",
            JobError::Upload { .. } => "upload",
            JobError::Publish(_) => "publish",
            JobError::Io { .. } => "io",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        JobError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn recognises_font_decoding_signatures() {
        for msg in [
            "Failed to decode font 'F12'",
            "cannot load embedded font stream",
            "error in CMap table",
            "FT_Load_Glyph returned 0x14",
            "Type3 font has no glyph procs",
            "font program is corrupt",
        ] {
            assert!(EngineError::new(msg).is_font_decoding(), "expected font signature: {msg}");
        }
    }

    #[test]
    fn other_errors_are_not_font_signatures() {
        for msg in ["out of memory", "page 3: invalid xref", "layout model timed out"] {
            assert!(!EngineError::new(msg).is_font_decoding(), "unexpected match: {msg}");
        }
    }

    #[test]
    fn conversion_error_source_is_the_ocr_error() {
        let err = ConversionError {
            ocr: EngineError::new("ocr broke"),
            text: Some(EngineError::new("text broke")),
        };
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("ocr broke"));
        assert!(err.to_string().contains("ocr broke"));
    }

    #[test]
    fn missing_field_display_names_the_field() {
        let e = JobError::MissingField("pdf_url");
        assert!(e.to_string().contains("pdf_url"));
        assert_eq!(e.kind(), "missing_field");
    }
}
