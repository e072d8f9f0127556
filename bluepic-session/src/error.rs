//! Session error types.

use std::fmt;
use thiserror::Error;

use crate::Response;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Classification of transport-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The exchange did not complete within its timeout.
    TimedOut,
    /// No connection to the host could be established.
    CannotConnectToHost,
    /// An established connection dropped mid-exchange.
    NetworkConnectionLost,
    /// Any other transport failure. Never retried automatically.
    Other,
}

impl TransportErrorKind {
    /// Kinds that the default retry policy resends.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TimedOut | Self::CannotConnectToHost | Self::NetworkConnectionLost
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TimedOut => "timed out",
            Self::CannotConnectToHost => "cannot connect to host",
            Self::NetworkConnectionLost => "network connection lost",
            Self::Other => "transport error",
        };
        f.write_str(name)
    }
}

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The physical exchange failed below the HTTP layer.
    #[error("Transport error ({kind}): {message}")]
    Transport {
        /// Failure classification.
        kind: TransportErrorKind,
        /// Transport-specific detail.
        message: String,
    },

    /// The server answered with a status code of 400 or above.
    #[error("Server responded with error: {status}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// The full response as received.
        response: Box<Response>,
    },

    /// The target URL could not be parsed or extended with query parameters.
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    /// The authorization provider could not obtain a credential.
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Create a transport error of the given kind.
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Transport kind, if this is a transport error.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Check if this error is a retryable transport failure.
    pub fn is_retryable_kind(&self) -> bool {
        self.transport_kind().is_some_and(|kind| kind.is_retryable())
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        self.transport_kind() == Some(TransportErrorKind::TimedOut)
    }

    /// Get the HTTP status code if this is a server error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get the response attached to a server error.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Server { response, .. } => Some(response),
            _ => None,
        }
    }
}
