//! Transport seam between the poller and the HTTP layer.
//!
//! The poller only needs one thing from the network: execute a request and
//! hand back the status code together with the decoded success or failure
//! body. Anything that can do that (the bundled [`HttpTransport`], a test
//! double, a client with its own auth) implements [`Transport`].

pub mod http;

pub use http::HttpTransport;

use crate::operation::OperationRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Network-layer failures. These are never classified or retried.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Error payload returned by the control plane on non-2xx responses.
///
/// The remote side is not consistent about field names, so both `error` and
/// `message` are accepted, and `code` is accepted as an alias of `error_code`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, alias = "code", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FailureBody {
    pub fn with_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.error_code = Some(code);
        self
    }

    /// Remote message, preferring `error` over `message`.
    pub fn text(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }
}

/// One response as seen by the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Decoded body of a 2xx response; `None` when the body was empty.
    pub body: Option<Value>,
    /// Decoded body of a non-2xx response.
    pub failure: Option<FailureBody>,
}

impl RawResponse {
    pub fn success(status: u16, body: Option<Value>) -> Self {
        Self {
            status,
            body,
            failure: None,
        }
    }

    pub fn failure(status: u16, failure: FailureBody) -> Self {
        Self {
            status,
            body: None,
            failure: Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes a single request against the control plane.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &OperationRequest) -> Result<RawResponse, TransportError>;
}

/// Decode a failure body leniently: JSON when possible, otherwise the raw
/// text becomes the error message.
pub(crate) fn decode_failure(bytes: &[u8]) -> FailureBody {
    if let Ok(body) = serde_json::from_slice::<FailureBody>(bytes) {
        return body;
    }
    let text = String::from_utf8_lossy(bytes).trim().to_string();
    if text.is_empty() {
        FailureBody::default()
    } else {
        FailureBody::with_error(text)
    }
}

/// Decode a success body; whitespace-only bodies count as empty.
pub(crate) fn decode_success(bytes: &[u8]) -> Result<Option<Value>, TransportError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(bytes)?))
}
