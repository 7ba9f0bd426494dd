//! Error taxonomy surfaced to callers of the session and the sync engine.

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum Error {
    /// Request rejected, timed out, or answered with a non-2xx status.
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed caller input (too few options, duplicates, empty ballot).
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Referenced poll, meeting or resident is not known locally.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server explicitly refused a consistency-favoring operation.
    #[error("Rejected by server: {0}")]
    Remote(String),

    #[error("This action requires administrator mode")]
    PermissionDenied,

    #[error("No active meeting")]
    NoActiveMeeting,

    #[error("Participant is not identified")]
    NotIdentified,
}

impl Error {
    /// Short machine-readable name, used by the co-process protocol.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Network(_) => "network",
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Remote(_) => "remote",
            Error::PermissionDenied => "permission_denied",
            Error::NoActiveMeeting => "no_active_meeting",
            Error::NotIdentified => "not_identified",
        }
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Status {
                message: Some(message),
                ..
            } => Error::Remote(message),
            other => Error::Network(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
