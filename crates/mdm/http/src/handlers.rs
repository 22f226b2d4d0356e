//! MDM HTTP handlers.

use axum::Extension;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use mdm_core::{Request, parse_checkin, parse_connect_report};
use mdm_service::{Checkin, ConnectReports, dispatch_checkin, dispatch_connect};

use crate::{ApiError, SignerCertificate};

/// Content type of check-in responses.
const PLIST_CONTENT_TYPE: &str = "application/xml";

fn request(signer: Option<Extension<SignerCertificate>>) -> Request {
    match signer {
        Some(Extension(SignerCertificate(cert))) => Request::new().with_certificate(cert),
        None => Request::new(),
    }
}

/// Handle MDM check-in requests.
pub async fn checkin_handler<S>(
    State(service): State<S>,
    signer: Option<Extension<SignerCertificate>>,
    body: Bytes,
) -> Result<Response, ApiError>
where
    S: Checkin,
{
    let msg = parse_checkin(&body)?;
    let response = dispatch_checkin(&service, request(signer), &msg).await?;

    Ok(match response {
        Some(body) => ([(header::CONTENT_TYPE, PLIST_CONTENT_TYPE)], body).into_response(),
        None => ().into_response(),
    })
}

/// Handle command reports. No command is ever returned.
pub async fn connect_handler<S>(
    State(service): State<S>,
    signer: Option<Extension<SignerCertificate>>,
    body: Bytes,
) -> Result<(), ApiError>
where
    S: ConnectReports,
{
    let report = parse_connect_report(&body)?;
    dispatch_connect(&service, request(signer), &report).await?;
    Ok(())
}
