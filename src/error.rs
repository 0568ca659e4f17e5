//! Error types for Pulse Check.

use std::fmt;
use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Why a shared context was cancelled.
///
/// The cause is what a cancelled pipeline returns, so callers can tell a
/// timeout from a shutdown from a deliberate abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelCause {
    /// The process received a termination signal.
    Shutdown { signal: String },
    /// A deadline attached to the context elapsed.
    DeadlineExceeded { after: Duration },
    /// Someone aborted the work on purpose.
    Aborted { reason: String },
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown { signal } => write!(f, "cancelled from exit signal {signal}"),
            Self::DeadlineExceeded { after } => write!(f, "deadline exceeded after {after:?}"),
            Self::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}

/// Errors produced while running a task or a batch of tasks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("Cancelled: {0}")]
    Cancelled(CancelCause),

    #[error("Provider {name} failed: {reason}")]
    Provider { name: String, reason: String },

    #[error("Filter {name} aborted the chain: {reason}")]
    Filter { name: String, reason: String },

    #[error("Handler {name} failed: {reason}")]
    Handler { name: String, reason: String },

    #[error("Task {name} panicked: {reason}")]
    Panicked { name: String, reason: String },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl TaskError {
    pub fn provider(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Provider {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn filter(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Filter {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn handler(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Handler {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// The cancellation cause, if this error is a cancellation.
    pub fn cancel_cause(&self) -> Option<&CancelCause> {
        match self {
            Self::Cancelled(cause) => Some(cause),
            _ => None,
        }
    }
}

/// A single failed unit inside an [`AggregateError`].
#[derive(Debug, Clone, PartialEq)]
pub struct UnitFailure {
    /// Position of the unit in the submitted batch.
    pub index: usize,
    /// Name of the failed executable.
    pub name: String,
    /// The error the unit returned, unchanged.
    pub error: TaskError,
}

/// Every failure of a batch, one entry per failed unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateError {
    failures: Vec<UnitFailure>,
}

impl AggregateError {
    pub fn new(mut failures: Vec<UnitFailure>) -> Self {
        failures.sort_by_key(|f| f.index);
        Self { failures }
    }

    pub fn failures(&self) -> &[UnitFailure] {
        &self.failures
    }

    /// Iterate over the underlying causes in batch order.
    pub fn errors(&self) -> impl Iterator<Item = &TaskError> {
        self.failures.iter().map(|f| &f.error)
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} task(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; #{} {}: {}", failure.index, failure.name, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Upstream platform (HTTP API) errors.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Unexpected status {status} from {url}: {body}")]
    BadStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Platform rejected the request: code {code}, message {message}")]
    Rejected { code: i64, message: String },

    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outbound email errors.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP send failed: {0}")]
    SendFailed(String),

    #[error("No recipients configured")]
    NoRecipients,
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind port {port}: {reason}")]
    Bind { port: u16, reason: String },

    #[error("Server stopped unexpectedly: {0}")]
    Serve(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
