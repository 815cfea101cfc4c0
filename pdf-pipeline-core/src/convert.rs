//! Conversion-mode selection with a single text → OCR fallback.
//!
//! ```text
//! Analyzing ──ocr──▶ ParsingOcr ───────────────▶ Exported
//!     │                  ▲
//!     └──text──▶ ParsingText ──err (once)──┘
//!                    │
//!                    └──ok──▶ Exported
//! ```
//!
//! There is no edge from OCR back to text. When the OCR attempt fails the OCR
//! error is what surfaces; the text error only rides along for diagnostics.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConversionError, EngineError};

/// How the engine should read a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMethod {
    #[serde(rename = "txt")]
    Text,
    Ocr,
}

impl ParseMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMethod::Text => "txt",
            ParseMethod::Ocr => "ocr",
        }
    }
}

impl fmt::Display for ParseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the text attempt was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The engine reported a malformed embedded font or CMap.
    FontDecoding(EngineError),
    /// Any other text-mode failure.
    Other(EngineError),
}

impl FallbackReason {
    fn classify(err: EngineError) -> Self {
        if err.is_font_decoding() {
            FallbackReason::FontDecoding(err)
        } else {
            FallbackReason::Other(err)
        }
    }

    pub fn error(&self) -> &EngineError {
        match self {
            FallbackReason::FontDecoding(e) | FallbackReason::Other(e) => e,
        }
    }
}

/// The route a successful conversion took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionPath {
    Text,
    Ocr,
    OcrAfterText(FallbackReason),
}

impl ConversionPath {
    /// The method that produced the exported artifacts.
    pub fn final_method(&self) -> ParseMethod {
        match self {
            ConversionPath::Text => ParseMethod::Text,
            ConversionPath::Ocr | ConversionPath::OcrAfterText(_) => ParseMethod::Ocr,
        }
    }
}

/// Output of a successful conversion plus the route it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Converted<T> {
    pub value: T,
    pub path: ConversionPath,
}

/// Run one conversion attempt for `classified`, falling back once to OCR if text fails.
///
/// `attempt` is called with the method to try; it is called at most twice.
pub async fn convert_with_fallback<T, F, Fut>(
    classified: ParseMethod,
    mut attempt: F,
) -> Result<Converted<T>, ConversionError>
where
    F: FnMut(ParseMethod) -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let text_error = match classified {
        ParseMethod::Ocr => None,
        ParseMethod::Text => match attempt(ParseMethod::Text).await {
            Ok(value) => {
                return Ok(Converted {
                    value,
                    path: ConversionPath::Text,
                })
            }
            Err(e) => {
                let reason = FallbackReason::classify(e);
                match &reason {
                    FallbackReason::FontDecoding(e) => {
                        warn!(error = %e, "Text parsing hit a font decoding error, retrying with OCR")
                    }
                    FallbackReason::Other(e) => {
                        warn!(error = %e, "Text parsing failed, retrying with OCR")
                    }
                }
                Some(reason)
            }
        },
    };

    match attempt(ParseMethod::Ocr).await {
        Ok(value) => {
            let path = match text_error {
                None => ConversionPath::Ocr,
                Some(reason) => {
                    info!("OCR fallback succeeded");
                    ConversionPath::OcrAfterText(reason)
                }
            };
            Ok(Converted { value, path })
        }
        Err(ocr) => Err(ConversionError {
            ocr,
            text: text_error.map(|r| r.error().clone()),
        }),
    }
}
