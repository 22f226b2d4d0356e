//! REST API handlers.

use std::collections::BTreeMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use mdm_core::PushResponse;
use mdm_push::PushProvider;
use mdm_storage::PushCertStore;
use serde::{Deserialize, Serialize};

use crate::ApiError;

/// Push certificate response.
#[derive(Debug, Serialize, Deserialize)]
pub struct PushCertResponse {
    pub topic: String,
}

/// Per-enrollment push outcome.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PushOutcome {
    Sent(PushResponse),
    Failed { error: String },
}

/// Store a push certificate and private key uploaded as PEM.
pub async fn store_push_cert<S>(
    State(store): State<S>,
    body: Bytes,
) -> Result<Json<PushCertResponse>, ApiError>
where
    S: PushCertStore,
{
    let bundle = mdm_crypto::parse_push_cert_bundle(&body)?;

    let credential = store
        .store_push_cert(&bundle.topic, &bundle.certificate, &bundle.private_key)
        .await?;

    tracing::info!(
        topic = %credential.topic,
        issued_at = credential.issued_at,
        "stored push certificate"
    );

    Ok(Json(PushCertResponse {
        topic: credential.topic,
    }))
}

/// Push notifications to a comma-separated list of enrollment IDs.
pub async fn push_handler<P>(
    State(pusher): State<P>,
    Path(ids): Path<String>,
) -> Result<Json<BTreeMap<String, PushOutcome>>, ApiError>
where
    P: PushProvider,
{
    let ids = split_ids(&ids);
    if ids.is_empty() {
        return Err(ApiError::bad_request("no enrollment IDs"));
    }

    let results = pusher.push_ids(&ids).await?;

    Ok(Json(
        results
            .into_iter()
            .map(|(id, result)| {
                let outcome = match result {
                    Ok(response) => PushOutcome::Sent(response),
                    Err(e) => PushOutcome::Failed {
                        error: e.to_string(),
                    },
                };
                (id, outcome)
            })
            .collect(),
    ))
}

fn split_ids(ids: &str) -> Vec<String> {
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}
