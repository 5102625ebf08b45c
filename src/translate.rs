//! Attribution of remote-call failures.
//!
//! A failed remote call is ambiguous: the plugin may be gone, the caller may
//! have given up, or the plugin may have rejected the request. Only the
//! calling side sees both the session context and the call context, so the
//! classification happens here.

use std::convert::Infallible;

use crate::context::Context;
use crate::error::{Error, Result, SessionCause};
use crate::rpc::JsonRpcError;

/// Tagged result of a cross-process call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    /// The call succeeded.
    Success(T),
    /// The native implementation reported a failure; the message is verbatim.
    BusinessError(String),
    /// The peer was reachable but failed for another reason (bad params,
    /// unknown method, internal or local transport failure).
    RemoteError(JsonRpcError),
    /// The session ended or the call was cancelled.
    SessionError(SessionCause),
}

impl<T> CallOutcome<T> {
    /// Classify a remote result against the session and call contexts.
    pub fn from_remote(
        result: std::result::Result<T, JsonRpcError>,
        session: &Context,
        call: Option<&Context>,
    ) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::from_error(err, session, call),
        }
    }

    /// Classify a failed remote call.
    ///
    /// A done session overrides everything, since a crashed plugin explains
    /// any failure. Otherwise a done call context means the caller cancelled.
    /// Only when both are still active does the remote error stand.
    pub fn from_error(err: JsonRpcError, session: &Context, call: Option<&Context>) -> Self {
        if let Some(cause) = session_cause(session, call) {
            tracing::debug!(code = err.code, %cause, "remote call failed for session reasons");
            return Self::SessionError(cause);
        }
        if err.is_business() {
            Self::BusinessError(err.message)
        } else {
            Self::RemoteError(err)
        }
    }

    /// Convert into the crate's result type.
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Success(value) => Ok(value),
            Self::BusinessError(message) => Err(Error::Business(message)),
            Self::RemoteError(err) => Err(Error::Remote(err)),
            Self::SessionError(cause) => Err(Error::Session(cause)),
        }
    }
}

/// Translate a failed remote call into a bridge error.
///
/// Same classification as [`CallOutcome::from_error`].
pub fn translate(err: JsonRpcError, session: &Context, call: Option<&Context>) -> Error {
    match CallOutcome::<Infallible>::from_error(err, session, call).into_result() {
        Ok(never) => match never {},
        Err(err) => err,
    }
}

fn session_cause(session: &Context, call: Option<&Context>) -> Option<SessionCause> {
    if let Some(cause) = session.err() {
        return Some(SessionCause::Ended(cause));
    }
    call.and_then(Context::err).map(SessionCause::CallCancelled)
}
