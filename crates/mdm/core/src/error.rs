//! Protocol error types.

use crate::ResolutionError;

/// Caller-facing class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or empty request, unusable input.
    BadRequest,
    /// Identity verification failed.
    Forbidden,
    /// Unknown protocol message or resource.
    NotFound,
    /// Terminal, non-retryable decline.
    Gone,
    /// Storage or other server-side failure.
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Gone => 410,
            Self::Internal => 500,
        }
    }
}

/// Check-in handling failures.
#[derive(Debug, thiserror::Error)]
pub enum CheckinError {
    #[error("empty check-in body")]
    EmptyBody,

    #[error("malformed check-in message")]
    Malformed(#[source] plist::Error),

    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("declining management of user: {0}")]
    Declined(String),

    #[error("can only {action} a device channel, got {id}")]
    NotDeviceChannel { action: &'static str, id: String },

    #[error("{0:#}")]
    Storage(#[from] color_eyre::eyre::Report),
}

impl CheckinError {
    /// Caller-facing class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyBody
            | Self::Malformed(_)
            | Self::Resolution(_)
            | Self::NotDeviceChannel { .. } => ErrorKind::BadRequest,
            Self::UnsupportedMessageType(_) => ErrorKind::NotFound,
            Self::Declined(_) => ErrorKind::Gone,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(CheckinError::EmptyBody.kind(), ErrorKind::BadRequest);
        assert_eq!(
            CheckinError::UnsupportedMessageType("Foo".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(CheckinError::Declined("d:u".into()).kind(), ErrorKind::Gone);
        assert_eq!(
            CheckinError::from(ResolutionError::NoIdentity).kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(
            CheckinError::from(color_eyre::eyre::eyre!("db down")).kind(),
            ErrorKind::Internal
        );
        assert_eq!(ErrorKind::Gone.status_code(), 410);
    }
}
