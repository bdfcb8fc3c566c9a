//! Error taxonomy for the match coordinator.

use thiserror::Error;
use validator::ValidationError;

/// Errors acknowledged to a single client connection as an `error` message.
///
/// Every variant is scoped to the offending sender: none of them fail or
/// pause the session for the other participant. The `Display` rendering is
/// what goes over the wire, so variant names double as protocol error codes.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Inbound frame failed to parse or validate; session state is untouched.
    #[error("MalformedMessage: {0}")]
    MalformedMessage(String),
    /// A third distinct identity attempted to join a two-player session.
    #[error("SessionFull")]
    SessionFull,
    /// Join attempted after the session already finished.
    #[error("SessionClosed")]
    SessionClosed,
    /// A lobby role is already claimed by a different wallet.
    #[error("RoleTaken")]
    RoleTaken,
}

impl SessionError {
    /// Wrap a decode failure, keeping only its message.
    pub fn malformed(err: impl std::fmt::Display) -> Self {
        SessionError::MalformedMessage(err.to_string())
    }
}

impl From<ValidationError> for SessionError {
    fn from(err: ValidationError) -> Self {
        let detail = err
            .message
            .as_ref()
            .map(|message| message.to_string())
            .unwrap_or_else(|| err.code.to_string());
        SessionError::MalformedMessage(detail)
    }
}
