//! HTTP middleware.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use mdm_crypto::IdentityVerifier;

use crate::ApiError;

/// Header carrying the detached signature over the request body.
pub const SIGNATURE_HEADER: &str = "Mdm-Signature";

/// Largest device message accepted.
pub const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

/// Verified signer certificate (DER), set by [`verify_identity`].
#[derive(Debug, Clone)]
pub struct SignerCertificate(pub Vec<u8>);

/// Logging middleware.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    tracing::debug!(method = %method, uri = %uri, "incoming request");

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        "request completed"
    );

    response
}

/// Rejects device requests whose signature does not verify, and hands the
/// signer certificate to the handler.
pub async fn verify_identity<V>(
    State(verifier): State<Arc<V>>,
    request: Request,
    next: Next,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    match verified(verifier.as_ref(), request).await {
        Ok(request) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

async fn verified<V: IdentityVerifier>(verifier: &V, request: Request) -> Result<Request, ApiError> {
    let signature = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("missing Mdm-Signature header"))?;

    let (mut parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_MESSAGE_SIZE)
        .await
        .map_err(|e| ApiError::bad_request(format!("failed to read body: {e}")))?;
    if body.is_empty() {
        return Err(ApiError::bad_request("empty body"));
    }

    let signer = verifier.verify(&signature, &body).await?;
    tracing::debug!(signer = %mdm_crypto::cert_fingerprint(&signer), "verified device identity");

    parts.extensions.insert(SignerCertificate(signer));
    Ok(Request::from_parts(parts, Body::from(body)))
}
