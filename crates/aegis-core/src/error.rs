//! The error taxonomy the control plane reasons about.
//!
//! Callers classify their own raised errors into an [`ErrorKind`]; the
//! runtime inspects kinds, never concrete error types. The table of
//! retryable/breaker-observed defaults follows the taxonomy contract.

use thiserror::Error;

/// Convenience alias for the boxed error type caller operations return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Closed set of error kinds understood by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// Per-attempt deadline elapsed.
    Timeout,
    /// Transport-level failure.
    Network,
    /// The remote explicitly reported it is down.
    RemoteUnavailable,
    /// The remote reported an internal error.
    RemoteError,
    /// The remote asked the caller to back off.
    RateLimited,
    /// Credentials or authorization failure.
    AuthFailed,
    /// Caller-side contract violation.
    Validation,
    /// The resource does not exist.
    NotFound,
    /// Admission refused by the circuit breaker.
    CircuitOpen,
    /// Cooperative cancellation.
    Cancelled,
}

impl ErrorKind {
    /// Every kind, in declaration order. Used for per-kind counters.
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::Timeout,
        ErrorKind::Network,
        ErrorKind::RemoteUnavailable,
        ErrorKind::RemoteError,
        ErrorKind::RateLimited,
        ErrorKind::AuthFailed,
        ErrorKind::Validation,
        ErrorKind::NotFound,
        ErrorKind::CircuitOpen,
        ErrorKind::Cancelled,
    ];

    /// Whether this kind is retried when the caller has not overridden the
    /// retryable set.
    pub fn retryable_by_default(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::Network
                | ErrorKind::RemoteUnavailable
                | ErrorKind::RemoteError
                | ErrorKind::RateLimited
        )
    }

    /// Whether a failure of this kind counts against the breaker.
    pub fn breaker_observed(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::Network
                | ErrorKind::RemoteUnavailable
                | ErrorKind::RemoteError
                | ErrorKind::RateLimited
                | ErrorKind::AuthFailed
        )
    }

    /// Stable label for metrics and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::RemoteUnavailable => "remote-unavailable",
            ErrorKind::RemoteError => "remote-error",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::AuthFailed => "auth-failed",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::CircuitOpen => "circuit-open",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    pub(crate) fn index(&self) -> usize {
        ErrorKind::ALL
            .iter()
            .position(|k| k == self)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified call failure: a kind plus an opaque message.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct CallError {
    /// The classified kind.
    pub kind: ErrorKind,
    /// Human-readable detail from the failing layer.
    pub message: String,
}

impl CallError {
    /// Creates a call error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a timeout failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Shorthand for a transport failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Shorthand for a remote-unavailable failure.
    pub fn remote_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteUnavailable, message)
    }
}

/// The terminal error a protected call returns when both the primary
/// operation and every fallback have been exhausted.
#[derive(Debug, Clone, Error)]
#[error("{kind} after {attempts} attempt(s): {message}")]
pub struct FinalError {
    /// Kind of the last observed error.
    pub kind: ErrorKind,
    /// Message of the last observed error.
    pub message: String,
    /// Number of operation invocations that were made.
    pub attempts: u32,
}

impl FinalError {
    /// Creates a final error.
    pub fn new(kind: ErrorKind, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts,
        }
    }

    /// True when the call was refused by the breaker without reaching the
    /// target.
    pub fn is_circuit_open(&self) -> bool {
        self.kind == ErrorKind::CircuitOpen
    }

    /// True when the call was cooperatively cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

/// Configuration mistakes rejected at registration or build time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A timeout was configured as zero.
    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    /// The failure threshold must open the breaker on some failure.
    #[error("failure threshold must be at least 1")]
    ZeroFailureThreshold,

    /// The half-open probe budget must permit at least one probe.
    #[error("half-open probe budget must be at least 1")]
    ZeroProbeBudget,

    /// `max_attempts` counts the first attempt, so it must be at least 1.
    #[error("max attempts must be at least 1")]
    ZeroMaxAttempts,

    /// Exponential backoff growth below 1.0 would shrink delays.
    #[error("backoff growth must be at least 1.0, got {0}")]
    BackoffGrowthTooSmall(f64),

    /// An operation referenced a target that was never registered.
    #[error("unknown target: {0}")]
    UnknownTarget(String),
}
