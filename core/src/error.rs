//! Error taxonomy for Livy session management.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for Livy operations.
pub type Result<T> = std::result::Result<T, LivyError>;

/// Message fragments that mark a failure as transient.
///
/// Matched case-insensitively against the rendered error message.
pub const TRANSIENT_MARKERS: &[&str] = &[
    "pending",
    "temporary",
    "temporarily_unavailable",
    "retry",
    "timeout",
    "unavailable",
    "transient",
    "throttl",
    "rate limit",
    "connection reset",
    "service busy",
];

/// Every failure mode of the session subsystem.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LivyError {
    // ═══════════════════════════════════════════════════════════
    // Identity
    // ═══════════════════════════════════════════════════════════

    /// Identity acquisition failed (no local login, bad secret, ...).
    #[error("Authentication failed: {0}")]
    Authentication(String),

    // ═══════════════════════════════════════════════════════════
    // Sessions
    // ═══════════════════════════════════════════════════════════

    /// The session never reached the idle state, or connecting was exhausted.
    #[error("Failed to connect: {0}")]
    ConnectFailed(String),

    /// No usable response was obtained from the control plane.
    #[error("Invalid response from livy server: {0}")]
    InvalidResponse(String),

    /// The create-session response did not carry an identifier.
    #[error("Cannot get session id from livy response: {0}")]
    MissingSessionId(String),

    /// A response body ended before a complete document was read.
    #[error("Unexpected end of input: {0}")]
    EndOfInput(String),

    // ═══════════════════════════════════════════════════════════
    // Statements
    // ═══════════════════════════════════════════════════════════

    /// The remote engine reported a failed statement.
    #[error("Error while executing query: {0}")]
    Database(String),

    /// A higher-level operation failed because of a remote failure.
    #[error("{0}")]
    Runtime(String),

    // ═══════════════════════════════════════════════════════════
    // Configuration
    // ═══════════════════════════════════════════════════════════

    /// Profile / connection configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A shortcut or session definition failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    // ═══════════════════════════════════════════════════════════
    // Transport
    // ═══════════════════════════════════════════════════════════

    /// The remote side answered with a non-success status.
    #[error("HTTP error (status {status}): {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The request could not be sent or the response could not be read.
    #[error("Request failed: {0}")]
    Request(String),

    // ═══════════════════════════════════════════════════════════
    // Shortcuts
    // ═══════════════════════════════════════════════════════════

    /// A shortcut could not be created after all attempts.
    #[error("Failed to create shortcut {shortcut} after {attempts} attempts: {message}")]
    ShortcutProvisioning {
        /// Display form of the shortcut
        shortcut: String,
        /// Attempts made
        attempts: usize,
        /// Last error message
        message: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Control
    // ═══════════════════════════════════════════════════════════

    /// A poll loop was cancelled by its caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// A poll loop ran past its deadline.
    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Invariant violation inside this crate.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Fieldless mirror of [`LivyError`] variants.
///
/// Used wherever callers name a set of error types, e.g. the retryable set
/// of the query retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// [`LivyError::Authentication`]
    Authentication,
    /// [`LivyError::ConnectFailed`]
    ConnectFailed,
    /// [`LivyError::InvalidResponse`]
    InvalidResponse,
    /// [`LivyError::MissingSessionId`]
    MissingSessionId,
    /// [`LivyError::EndOfInput`]
    EndOfInput,
    /// [`LivyError::Database`]
    Database,
    /// [`LivyError::Runtime`]
    Runtime,
    /// [`LivyError::Configuration`]
    Configuration,
    /// [`LivyError::Validation`]
    Validation,
    /// [`LivyError::Http`]
    Http,
    /// [`LivyError::Request`]
    Request,
    /// [`LivyError::ShortcutProvisioning`]
    ShortcutProvisioning,
    /// [`LivyError::Cancelled`]
    Cancelled,
    /// [`LivyError::DeadlineExceeded`]
    DeadlineExceeded,
    /// [`LivyError::Internal`]
    Internal,
}

/// Caller-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Could not reach or keep a usable session.
    Connection,
    /// The remote engine rejected a statement.
    Database,
    /// The supplied configuration is wrong.
    Configuration,
}

impl LivyError {
    /// The fieldless kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::ConnectFailed(_) => ErrorKind::ConnectFailed,
            Self::InvalidResponse(_) => ErrorKind::InvalidResponse,
            Self::MissingSessionId(_) => ErrorKind::MissingSessionId,
            Self::EndOfInput(_) => ErrorKind::EndOfInput,
            Self::Database(_) => ErrorKind::Database,
            Self::Runtime(_) => ErrorKind::Runtime,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Http { .. } => ErrorKind::Http,
            Self::Request(_) => ErrorKind::Request,
            Self::ShortcutProvisioning { .. } => ErrorKind::ShortcutProvisioning,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The caller-facing category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Database(_) | Self::Runtime(_) => ErrorCategory::Database,
            Self::Configuration(_) | Self::Validation(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::Connection,
        }
    }

    /// Whether the rendered message carries one of the [`TRANSIENT_MARKERS`].
    #[must_use]
    pub fn is_transient(&self) -> bool {
        let message = self.to_string().to_lowercase();
        TRANSIENT_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
    }

    /// Map a JSON decoding failure.
    ///
    /// Truncated documents become [`LivyError::EndOfInput`], everything else
    /// is an [`LivyError::InvalidResponse`].
    #[must_use]
    pub fn from_json(err: &serde_json::Error) -> Self {
        if err.is_eof() {
            Self::EndOfInput(err.to_string())
        } else {
            Self::InvalidResponse(err.to_string())
        }
    }
}
