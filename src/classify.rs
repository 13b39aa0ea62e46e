//! Response classification.
//!
//! Maps a raw `(status, failure body)` pair to a [`Classification`]. The default
//! rule table reflects how the control plane actually behaves:
//!
//! | status | condition | classification |
//! |--------|-----------|----------------|
//! | 200/202/204 | any | `Success` (body may be empty) |
//! | 400, 503 | message equals a transient marker | `TransientFailure` |
//! | 400 | registered business error code | `FatalFailure` (remote message) |
//! | 404 | any | `FatalFailure("not found")`, or `Absent` if enabled |
//! | other | any | `FatalFailure` |
//!
//! Resources with different conventions override the table through the
//! [`RuleClassifier`] builder or supply their own [`Classifier`].

use crate::transport::RawResponse;
use serde_json::Value;

/// Message the backend returns when it times out talking to an internal dependency.
pub const BACKEND_TIMEOUT_MARKER: &str = "Timeout talking to backend";

/// Business code returned when a disk resize request is rejected.
pub const RESIZE_REJECTED_CODE: i64 = 40002;

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// The call succeeded; the body (possibly empty) is handed to the predicate.
    Success(Option<Value>),
    /// 404 on a resource where absence is a valid observation.
    Absent,
    /// Retryable remote condition.
    TransientFailure(String),
    /// Stop immediately.
    FatalFailure {
        status: u16,
        code: Option<i64>,
        message: String,
    },
}

impl Classification {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Classification::FatalFailure { .. })
    }
}

pub trait Classifier: Send + Sync {
    fn classify(&self, response: &RawResponse) -> Classification;
}

impl<F> Classifier for F
where
    F: Fn(&RawResponse) -> Classification + Send + Sync,
{
    fn classify(&self, response: &RawResponse) -> Classification {
        self(response)
    }
}

/// Table-driven classifier; see the module docs for the default rules.
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    success_statuses: Vec<u16>,
    transient_statuses: Vec<u16>,
    transient_markers: Vec<String>,
    business_codes: Vec<i64>,
    absent_on_not_found: bool,
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self {
            success_statuses: vec![200, 202, 204],
            transient_statuses: vec![400, 503],
            transient_markers: vec![BACKEND_TIMEOUT_MARKER.to_string()],
            business_codes: Vec::new(),
            absent_on_not_found: false,
        }
    }
}

impl RuleClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_success_status(mut self, status: u16) -> Self {
        if !self.success_statuses.contains(&status) {
            self.success_statuses.push(status);
        }
        self
    }

    pub fn with_transient_status(mut self, status: u16) -> Self {
        if !self.transient_statuses.contains(&status) {
            self.transient_statuses.push(status);
        }
        self
    }

    pub fn with_transient_marker(mut self, marker: impl Into<String>) -> Self {
        self.transient_markers.push(marker.into());
        self
    }

    /// Register a numeric business error code that is definitive on a 400.
    pub fn with_business_code(mut self, code: i64) -> Self {
        if !self.business_codes.contains(&code) {
            self.business_codes.push(code);
        }
        self
    }

    /// Treat 404 as [`Classification::Absent`] instead of a fatal failure.
    pub fn absent_on_not_found(mut self, enable: bool) -> Self {
        self.absent_on_not_found = enable;
        self
    }

    pub fn treats_absence_as_state(&self) -> bool {
        self.absent_on_not_found
    }

    fn is_transient_marker(&self, text: &str) -> bool {
        let text = text.trim();
        self.transient_markers.iter().any(|m| m == text)
    }
}

impl Classifier for RuleClassifier {
    fn classify(&self, response: &RawResponse) -> Classification {
        let status = response.status;
        if self.success_statuses.contains(&status) {
            return Classification::Success(response.body.clone());
        }

        let failure = response.failure.as_ref();
        let text = failure.and_then(|f| f.text());
        let code = failure.and_then(|f| f.error_code);

        // A registered business code is definitive, whatever the message says.
        if status == 400 {
            if let Some(c) = code.filter(|c| self.business_codes.contains(c)) {
                return Classification::FatalFailure {
                    status,
                    code: Some(c),
                    message: text.unwrap_or("business error").to_string(),
                };
            }
        }

        if self.transient_statuses.contains(&status) {
            if let Some(t) = text.filter(|t| self.is_transient_marker(t)) {
                return Classification::TransientFailure(t.to_string());
            }
        }

        if status == 404 {
            if self.absent_on_not_found {
                return Classification::Absent;
            }
            return Classification::FatalFailure {
                status,
                code,
                message: "not found".to_string(),
            };
        }

        Classification::FatalFailure {
            status,
            code,
            message: text
                .map(str::to_string)
                .unwrap_or_else(|| format!("unexpected status {}", status)),
        }
    }
}
