//! Bridge error types.

use thiserror::Error;

use crate::context::ContextError;
use crate::rpc::JsonRpcError;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while crossing the bridge.
#[derive(Debug, Error)]
pub enum Error {
    /// Config data could not be encoded for the wire.
    #[error("Failed to encode config data: {0}")]
    Encode(#[source] serde_json::Error),

    /// A wire envelope did not hold a well-formed config mapping.
    #[error("Failed to decode config data: {0}")]
    Decode(#[source] serde_json::Error),

    /// The machine collaborator failed to (de)serialize a machine.
    #[error("Machine serialization failed: {0}")]
    Machine(String),

    /// The native implementation rejected the request.
    #[error("{0}")]
    Business(String),

    /// The plugin session ended or the call was cancelled.
    #[error(transparent)]
    Session(#[from] SessionCause),

    /// The remote side failed without a business or session meaning.
    #[error("Remote call failed: {0}")]
    Remote(#[from] JsonRpcError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings error.
    #[error("Settings error: {0}")]
    Settings(String),
}

impl Error {
    /// Build a business error, the way a native implementation reports failure.
    pub fn business(message: impl Into<String>) -> Self {
        Self::Business(message.into())
    }

    /// Build a machine (de)serialization error.
    pub fn machine(message: impl std::fmt::Display) -> Self {
        Self::Machine(message.to_string())
    }

    /// Whether the failure is session-scoped (plugin gone or call cancelled).
    ///
    /// Retrying on the same session is pointless for these.
    pub fn is_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }

    /// Whether the session itself ended, as opposed to the call being cancelled.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, Self::Session(SessionCause::Ended(_)))
    }

    /// Whether the native implementation reported this failure.
    pub fn is_business(&self) -> bool {
        matches!(self, Self::Business(_))
    }
}

/// Why a call failed for session-scoped reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionCause {
    /// The plugin session is done; every in-flight and future call fails.
    #[error("Plugin session ended: {0}")]
    Ended(ContextError),

    /// The caller's own context finished before the call did.
    #[error("Call cancelled: {0}")]
    CallCancelled(ContextError),
}

impl SessionCause {
    /// The context error that triggered this cause.
    pub fn context_error(&self) -> &ContextError {
        match self {
            Self::Ended(cause) | Self::CallCancelled(cause) => cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_error_display_is_verbatim() {
        let err = Error::business("memory must be positive");
        assert_eq!(err.to_string(), "memory must be positive");
        assert!(err.is_business());
        assert!(!err.is_session());
    }

    #[test]
    fn test_session_classification() {
        let ended = Error::from(SessionCause::Ended(ContextError::cancelled("plugin exited")));
        assert!(ended.is_session());
        assert!(ended.is_session_ended());

        let cancelled = Error::from(SessionCause::CallCancelled(ContextError::DeadlineExceeded));
        assert!(cancelled.is_session());
        assert!(!cancelled.is_session_ended());
        assert_eq!(cancelled.to_string(), "Call cancelled: context deadline exceeded");
    }

    #[test]
    fn test_session_cause_context_error() {
        let cause = SessionCause::CallCancelled(ContextError::DeadlineExceeded);
        assert_eq!(cause.context_error(), &ContextError::DeadlineExceeded);
    }
}
