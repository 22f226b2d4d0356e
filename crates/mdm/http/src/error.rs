//! Maps protocol and infrastructure errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mdm_core::{CheckinError, ErrorKind};
use mdm_crypto::{BundleError, IdentityError};
use mdm_push::PushError;

/// An error returned from a handler.
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<CheckinError> for ApiError {
    fn from(e: CheckinError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        let kind = match e {
            IdentityError::Unavailable(_) => ErrorKind::Internal,
            _ => ErrorKind::Forbidden,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<BundleError> for ApiError {
    fn from(e: BundleError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<PushError> for ApiError {
    fn from(e: PushError) -> Self {
        Self::new(ErrorKind::Internal, e.to_string())
    }
}

impl From<color_eyre::eyre::Report> for ApiError {
    fn from(e: color_eyre::eyre::Report) -> Self {
        Self::new(ErrorKind::Internal, format!("{e:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.kind == ErrorKind::Internal {
            tracing::error!(error = %self.message, "internal server error");
        } else {
            tracing::warn!(status = %status, error = %self.message, "request failed");
        }

        // internal details stay in the log
        let body = match self.kind {
            ErrorKind::Internal => status.canonical_reason().unwrap_or_default().to_string(),
            _ => self.message,
        };

        (status, body).into_response()
    }
}
