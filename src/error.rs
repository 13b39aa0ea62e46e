use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Structured error context for configuration problems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "budget.max_attempts")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., the rejected value)
    pub details: Option<String>,
    /// Source of the error (e.g., "budget_config", "recipe_registry")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors surfaced by a poll session.
///
/// Every variant other than [`Error::Configuration`] means the desired remote
/// state was *not* confirmed. Transient remote conditions are never returned
/// directly; once the budget runs out they surface as [`Error::TimeoutExceeded`]
/// carrying the last reason observed.
#[derive(Debug, Error)]
pub enum Error {
    /// Connectivity or (de)serialization failure. Never retried by the poller.
    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    /// The control plane answered with a non-retryable status or body.
    #[error("Remote error: HTTP {status}{}: {message}", format_code(.code))]
    FatalRemote {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// The call succeeded but the tracked entity reports a terminal failure.
    #[error("Business failure: {message}")]
    BusinessFailure { message: String },

    /// The budget ran out while the resource was still pending or the backend
    /// kept reporting transient failures.
    #[error("Timed out waiting for {resource} after {attempts} attempts ({elapsed:?}); last outcome: {last}")]
    TimeoutExceeded {
        resource: String,
        attempts: u32,
        elapsed: Duration,
        last: String,
    },

    /// The session's cancellation token fired.
    #[error("Poll session cancelled")]
    Cancelled,

    /// The externally supplied deadline passed.
    #[error("External deadline exceeded")]
    DeadlineExceeded,

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },
}

fn format_code(code: &Option<i64>) -> String {
    match code {
        Some(c) => format!(" (code {})", c),
        None => String::new(),
    }
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub(crate) fn fatal(status: u16, code: Option<i64>, message: impl Into<String>) -> Self {
        Error::FatalRemote {
            status,
            code,
            message: message.into(),
        }
    }

    /// Whether a caller may reasonably start another poll session later.
    ///
    /// True only for budget/deadline exhaustion; fatal, business and transport
    /// failures will not change by waiting longer.
    pub fn is_retryable_later(&self) -> bool {
        matches!(self, Error::TimeoutExceeded { .. } | Error::DeadlineExceeded)
    }

    /// Remote-supplied message for fatal and business failures.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Error::FatalRemote { message, .. } | Error::BusinessFailure { message } => {
                Some(message.as_str())
            }
            _ => None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }
}
