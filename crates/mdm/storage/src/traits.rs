//! Storage traits.

use std::collections::HashMap;

use mdm_core::{Authenticate, EnrollId, PushCredential, PushTarget, TokenUpdate, UserAuthenticate};

use crate::EnrollmentRecord;

/// Check-in storage operations.
#[trait_variant::make(Send)]
pub trait CheckinStore: Send + Sync {
    /// Store the device's Authenticate message and identity.
    async fn store_authenticate(
        &self,
        id: &EnrollId,
        msg: &Authenticate,
        identity_fingerprint: Option<&str>,
    ) -> color_eyre::eyre::Result<()>;

    /// Store a TokenUpdate and enable the enrollment.
    ///
    /// Returns whether the enrollment did not exist before.
    async fn store_token_update(
        &self,
        id: &EnrollId,
        msg: &TokenUpdate,
    ) -> color_eyre::eyre::Result<bool>;

    /// Store a UserAuthenticate message on the user record.
    async fn store_user_authenticate(
        &self,
        id: &EnrollId,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<()>;

    /// Disable an enrollment. A missing enrollment is not an error.
    async fn disable_enrollment(&self, id: &EnrollId) -> color_eyre::eyre::Result<()>;

    /// Clear all pending commands for an enrollment.
    async fn clear_queue(&self, id: &EnrollId) -> color_eyre::eyre::Result<()>;

    /// Record that the enrollment was just seen.
    async fn update_last_seen(&self, id: &EnrollId) -> color_eyre::eyre::Result<()>;

    /// Look up an enrollment by ID.
    async fn get_enrollment(&self, id: &str) -> color_eyre::eyre::Result<Option<EnrollmentRecord>>;
}

/// Push addressing lookups.
#[trait_variant::make(Send)]
pub trait PushStore: Send + Sync {
    /// Push targets for the given enrollment IDs, keyed by ID.
    ///
    /// Only enabled enrollments are returned. A checked-out (disabled)
    /// enrollment keeps its token and push magic in storage but is left out
    /// here exactly like an unknown ID, so callers never push to it.
    async fn get_push_targets(
        &self,
        ids: &[String],
    ) -> color_eyre::eyre::Result<HashMap<String, PushTarget>>;
}

/// Push certificate storage.
#[trait_variant::make(Send)]
pub trait PushCertStore: Send + Sync {
    /// Store a push certificate, replacing any previous one for the topic.
    ///
    /// The returned credential's `issued_at` is strictly greater than any
    /// previously stored for the topic.
    async fn store_push_cert(
        &self,
        topic: &str,
        cert_pem: &str,
        key_pem: &str,
    ) -> color_eyre::eyre::Result<PushCredential>;

    /// Current credential for a topic.
    async fn get_push_credential(
        &self,
        topic: &str,
    ) -> color_eyre::eyre::Result<Option<PushCredential>>;

    /// Rotation marker of the current credential, without loading it.
    async fn push_cert_issued_at(&self, topic: &str) -> color_eyre::eyre::Result<Option<i64>>;
}

/// Combined storage trait.
pub trait AllStorage: CheckinStore + PushStore + PushCertStore {}

impl<T> AllStorage for T where T: CheckinStore + PushStore + PushCertStore {}

/// Next rotation marker: wall-clock millis, bumped past the previous one.
pub(crate) fn next_issued_at(previous: Option<i64>) -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    match previous {
        Some(previous) if previous >= now => previous + 1,
        _ => now,
    }
}
