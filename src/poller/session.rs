use crate::Error;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Per-session facts returned by the `*_with_stats` entry points.
#[derive(Debug, Clone, PartialEq)]
pub struct PollStats {
    /// Recipe name or operation label.
    pub resource: String,
    pub session_id: String,
    /// Remote calls made, including a trigger call when there was one.
    pub attempts: u32,
    pub transient_failures: u32,
    pub pending_observations: u32,
    /// Total time spent in retry sleeps.
    pub slept: Duration,
    pub elapsed: Duration,
}

/// Ephemeral state of one poll call. Never shared, never persisted.
#[derive(Debug)]
pub(crate) struct PollSession {
    id: String,
    resource: String,
    started: Instant,
    attempts: u32,
    transient_failures: u32,
    pending_observations: u32,
    slept: Duration,
    last: Option<String>,
}

impl PollSession {
    pub(crate) fn new(resource: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            resource: resource.into(),
            started: Instant::now(),
            attempts: 0,
            transient_failures: 0,
            pending_observations: 0,
            slept: Duration::ZERO,
            last: None,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn resource(&self) -> &str {
        &self.resource
    }

    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub(crate) fn record_transient(&mut self, reason: &str) {
        self.transient_failures += 1;
        self.last = Some(reason.to_string());
    }

    pub(crate) fn record_pending(&mut self) {
        self.pending_observations += 1;
        self.last = Some("pending".to_string());
    }

    pub(crate) fn record_sleep(&mut self, delay: Duration) {
        self.slept += delay;
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Log a terminal error for this session and hand it back.
    pub(crate) fn fail(&self, err: Error) -> Error {
        info!(
            session = self.id.as_str(),
            resource = self.resource.as_str(),
            attempts = self.attempts,
            duration_ms = self.elapsed().as_millis(),
            error = %err,
            "poll session failed"
        );
        err
    }

    pub(crate) fn timeout(&self) -> Error {
        self.fail(Error::TimeoutExceeded {
            resource: self.resource.clone(),
            attempts: self.attempts,
            elapsed: self.elapsed(),
            last: self.last.clone().unwrap_or_else(|| "none".to_string()),
        })
    }

    pub(crate) fn stats(&self) -> PollStats {
        PollStats {
            resource: self.resource.clone(),
            session_id: self.id.clone(),
            attempts: self.attempts,
            transient_failures: self.transient_failures,
            pending_observations: self.pending_observations,
            slept: self.slept,
            elapsed: self.elapsed(),
        }
    }
}
