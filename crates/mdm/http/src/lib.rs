//! MDM HTTP Layer
//!
//! Axum routers for device check-ins and the push API.

mod api;
mod error;
mod handlers;
mod middleware;

pub use api::*;
pub use error::*;
pub use handlers::*;
pub use middleware::*;

use std::sync::Arc;

use axum::Router;
use mdm_crypto::IdentityVerifier;
use mdm_push::PushProvider;
use mdm_service::{Checkin, ConnectReports};
use mdm_storage::PushCertStore;

/// Create the device-facing router. Every route requires a verified signature.
pub fn mdm_router<S, V>(service: S, verifier: Arc<V>) -> Router
where
    S: Checkin + ConnectReports + Clone + 'static,
    V: IdentityVerifier + 'static,
{
    use axum::routing::put;

    Router::new()
        .route("/mdm/checkin", put(handlers::checkin_handler::<S>))
        .route("/mdm/connect", put(handlers::connect_handler::<S>))
        .route_layer(axum::middleware::from_fn_with_state(
            verifier,
            middleware::verify_identity::<V>,
        ))
        .with_state(service)
}

/// Create the API router.
pub fn api_router<St, P>(store: St, pusher: P) -> Router
where
    St: PushCertStore + Clone + 'static,
    P: PushProvider + Clone + 'static,
{
    use axum::routing::{get, post};

    let certs = Router::new()
        .route(
            "/api/pushcert",
            post(api::store_push_cert::<St>).put(api::store_push_cert::<St>),
        )
        .with_state(store);

    let push = Router::new()
        .route(
            "/api/push/{ids}",
            get(api::push_handler::<P>).post(api::push_handler::<P>),
        )
        .with_state(pusher);

    certs.merge(push)
}

/// Combine routers and add request tracing.
pub fn app(mdm: Router, api: Router) -> Router {
    mdm.merge(api)
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
