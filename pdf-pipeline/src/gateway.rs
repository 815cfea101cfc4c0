//! Shared HTTP plumbing for the queue, topic and object-store gateways.

use pdf_pipeline_core::contract::TransportError;
use reqwest::{Client, Method, RequestBuilder, Response};

/// One HTTP endpoint plus the optional bearer token sent with every request.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
    endpoint: String,
    access_token: Option<String>,
}

impl Gateway {
    pub fn new(client: Client, endpoint: &str, access_token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    /// `{endpoint}/{path}`, with exactly one slash between the two.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Turn a non-2xx response into a transport error carrying the status and body.
pub async fn ensure_success(response: Response, what: &str) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = %status, body = %body, "{what} failed");
    Err(format!("{what} returned {status}: {body}").into())
}
