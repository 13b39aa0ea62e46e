//! Remote operations the poller can invoke.
//!
//! An [`Operation`] is one idempotent-to-invoke call: usually the GET that
//! observes state, sometimes the POST/PUT/DELETE that triggered the change.

use crate::transport::{RawResponse, Transport, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verb, target path and optional body. Immutable for a poll session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub verb: Verb,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl OperationRequest {
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Verb::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Verb::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Verb::Put, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Verb::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

impl fmt::Display for OperationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb, self.path)
    }
}

/// A single remote invocation returning the raw, unclassified response.
#[async_trait]
pub trait Operation: Send + Sync {
    async fn invoke(&self) -> Result<RawResponse, TransportError>;

    /// Short label used in logs and timeout errors.
    fn describe(&self) -> String;
}

/// An [`OperationRequest`] bound to an explicit transport.
#[derive(Clone)]
pub struct TransportOperation {
    transport: Arc<dyn Transport>,
    request: OperationRequest,
}

impl TransportOperation {
    pub fn new(transport: Arc<dyn Transport>, request: OperationRequest) -> Self {
        Self { transport, request }
    }

    pub fn request(&self) -> &OperationRequest {
        &self.request
    }
}

#[async_trait]
impl Operation for TransportOperation {
    async fn invoke(&self) -> Result<RawResponse, TransportError> {
        self.transport.execute(&self.request).await
    }

    fn describe(&self) -> String {
        self.request.to_string()
    }
}
