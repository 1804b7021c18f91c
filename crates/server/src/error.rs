use thiserror::Error;

use flowstate_wire::ResponseCode;

/// Failures from a single auth connection's handshake. Every variant maps
/// to a response code the handler writes back before closing, except
/// `Internal`'s underlying I/O failures, which close without a reply.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("timed out waiting for a login token")]
    LoginTimeout,
    #[error("token failed verification: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("token's idp/app_id is not registered")]
    InvalidServer,
    #[error("uid already has a live session")]
    LoginConflict,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// The response code to reply with before closing, if any. `None`
    /// means close without a reply (transport-level failure, never a
    /// protocol outcome).
    pub fn response_code(&self) -> Option<ResponseCode> {
        match self {
            AuthError::LoginTimeout => Some(ResponseCode::LoginTimeout),
            AuthError::InvalidToken(_) => Some(ResponseCode::InvalidToken),
            AuthError::InvalidServer => Some(ResponseCode::InvalidServer),
            AuthError::LoginConflict => Some(ResponseCode::LoginConflict),
            AuthError::Internal(_) => Some(ResponseCode::InternalError),
        }
    }
}
