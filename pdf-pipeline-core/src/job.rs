//! Job model: decoding and validating a queue message before any I/O happens.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::JobError;

/// A message as handed over by the queue transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Opaque handle used to acknowledge (delete) the message.
    pub receipt_handle: String,
    /// Raw JSON body.
    pub body: String,
    /// How many times the transport already redelivered this message.
    pub redelivery_count: u32,
}

/// One fully specified conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub article_id: String,
    pub tag: Option<String>,
    pub source_url: String,
    pub markdown_destination: String,
    pub images_destination_prefix: String,
    pub json_destination_prefix: String,
    pub redelivery_count: u32,
}

impl Job {
    /// Parse and validate a queue message. Fails fast on the first missing field.
    pub fn from_message(message: &ReceivedMessage) -> Result<Self, JobError> {
        // anything but a JSON object is a malformed body
        let body: Map<String, Value> =
            serde_json::from_str(&message.body).map_err(JobError::InvalidBody)?;
        let fields = &body;

        let article_id = required(fields, "article_id")?;
        validate_article_id(&article_id)?;
        let source_url = required(fields, "pdf_url")?;
        let markdown_destination = match string_field(fields, "markdown_file") {
            Some(v) => v,
            // older producers used `markdown_path`
            None => string_field(fields, "markdown_path").ok_or(JobError::MissingField("markdown_file"))?,
        };
        let images_destination_prefix = required(fields, "images_path")?;
        let json_destination_prefix = required(fields, "json_path")?;

        let tag = match fields.get("tag") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                warn!(article_id = %article_id, tag = %other, "Ignoring non-string tag");
                None
            }
        };

        let job = Job {
            article_id,
            tag,
            source_url,
            markdown_destination,
            images_destination_prefix,
            json_destination_prefix,
            redelivery_count: message.redelivery_count,
        };
        debug!(?job, "Decoded job from queue message");
        Ok(job)
    }

    /// Remote key of the middle JSON artifact.
    pub fn middle_json_key(&self) -> String {
        join_key(
            &self.json_destination_prefix,
            &format!("{}_middle.json", self.article_id),
        )
    }

    /// Remote key of the content-list JSON artifact.
    pub fn content_list_json_key(&self) -> String {
        join_key(
            &self.json_destination_prefix,
            &format!("{}_content_list.json", self.article_id),
        )
    }

    /// Remote key of an exported image.
    pub fn image_key(&self, file_name: &str) -> String {
        join_key(&self.images_destination_prefix, file_name)
    }
}

/// An article id names local files and directories, so it must be a single path component.
pub fn validate_article_id(article_id: &str) -> Result<(), JobError> {
    let reason = if article_id.is_empty() {
        "must not be empty"
    } else if article_id == "." || article_id == ".." {
        "must not be a relative path component"
    } else if article_id.contains(['/', '\\']) {
        "must not contain a path separator"
    } else {
        return Ok(());
    };
    Err(JobError::InvalidField {
        field: "article_id",
        reason,
    })
}

/// Join a remote prefix and a name with exactly one `/` between them.
pub fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields.get(name).and_then(Value::as_str).map(str::to_owned)
}

fn required(fields: &Map<String, Value>, name: &'static str) -> Result<String, JobError> {
    string_field(fields, name).ok_or(JobError::MissingField(name))
}
