//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use control_plane_converge::operation::Operation;
use control_plane_converge::transport::{FailureBody, RawResponse, TransportError};
use control_plane_converge::classify::BACKEND_TIMEOUT_MARKER;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;

pub enum Step {
    Respond(RawResponse),
    TransportFailure(String),
}

/// Operation that replays a fixed script; the last step repeats forever.
pub struct ScriptedOperation {
    label: String,
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<RawResponse>>,
    calls: AtomicU32,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedOperation {
    pub fn new(label: &str, steps: Vec<Step>) -> Self {
        Self {
            label: label.to_string(),
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn responses(label: &str, responses: Vec<RawResponse>) -> Self {
        Self::new(label, responses.into_iter().map(Step::Respond).collect())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Gaps between consecutive calls.
    pub fn gaps(&self) -> Vec<std::time::Duration> {
        let times = self.call_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl Operation for ScriptedOperation {
    async fn invoke(&self) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());

        let next = self.steps.lock().unwrap().pop_front();
        match next {
            Some(Step::Respond(resp)) => {
                *self.last.lock().unwrap() = Some(resp.clone());
                Ok(resp)
            }
            Some(Step::TransportFailure(msg)) => Err(TransportError::Other(msg)),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| TransportError::Other("script exhausted".to_string())),
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

pub fn ok(body: Value) -> RawResponse {
    RawResponse::success(200, Some(body))
}

pub fn backend_timeout() -> RawResponse {
    RawResponse::failure(400, FailureBody::with_error(BACKEND_TIMEOUT_MARKER))
}

pub fn not_found() -> RawResponse {
    RawResponse::failure(404, FailureBody::default())
}
