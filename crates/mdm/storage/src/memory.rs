//! In-memory storage implementation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::{DeviceRow, EnrollmentRecord, UserRow};
use crate::traits::*;
use mdm_core::{Authenticate, EnrollId, PushCredential, PushTarget, TokenUpdate, UserAuthenticate};

#[derive(Debug, Default)]
struct MemoryState {
    enrollments: HashMap<String, EnrollmentRecord>,
    devices: HashMap<String, DeviceRow>,
    users: HashMap<String, UserRow>,
    push_certs: HashMap<String, PushCredential>,
    queues: HashMap<String, Vec<Vec<u8>>>,
}

/// In-memory storage using HashMaps behind a single lock.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw command for an enrollment.
    pub async fn enqueue_command(&self, id: &str, command: &[u8]) {
        let mut state = self.state.write().await;
        state
            .queues
            .entry(id.to_string())
            .or_default()
            .push(command.to_vec());
    }

    /// Number of queued commands for an enrollment.
    pub async fn queued_commands(&self, id: &str) -> usize {
        let state = self.state.read().await;
        state.queues.get(id).map_or(0, Vec::len)
    }

    /// Stored device record.
    pub async fn device(&self, id: &str) -> Option<DeviceRow> {
        self.state.read().await.devices.get(id).cloned()
    }

    /// Stored user record.
    pub async fn user(&self, id: &str) -> Option<UserRow> {
        self.state.read().await.users.get(id).cloned()
    }
}

fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

fn empty_user(id: &EnrollId) -> UserRow {
    UserRow {
        id: id.id.clone(),
        device_id: id.device_id().to_string(),
        user_short_name: None,
        user_long_name: None,
        user_authenticate: None,
        user_authenticate_at: None,
        user_authenticate_digest: None,
        user_authenticate_digest_at: None,
        token_update: None,
        token_update_at: None,
    }
}

fn empty_device(id: &str) -> DeviceRow {
    DeviceRow {
        id: id.to_string(),
        identity_cert_fingerprint: None,
        serial_number: None,
        authenticate: None,
        authenticate_at: None,
        token_update: None,
        token_update_at: None,
        unlock_token: None,
        unlock_token_at: None,
    }
}

impl CheckinStore for MemoryStorage {
    async fn store_authenticate(
        &self,
        id: &EnrollId,
        msg: &Authenticate,
        identity_fingerprint: Option<&str>,
    ) -> color_eyre::eyre::Result<()> {
        let mut state = self.state.write().await;
        let device = state
            .devices
            .entry(id.id.clone())
            .or_insert_with(|| empty_device(&id.id));

        device.identity_cert_fingerprint = identity_fingerprint.map(str::to_string);
        device.serial_number = msg.serial_number.clone();
        device.authenticate = Some(msg.raw.clone());
        device.authenticate_at = Some(now());

        Ok(())
    }

    async fn store_token_update(
        &self,
        id: &EnrollId,
        msg: &TokenUpdate,
    ) -> color_eyre::eyre::Result<bool> {
        let now = now();
        let mut state = self.state.write().await;

        if id.is_user_channel() {
            if msg.unlock_token.is_some() {
                tracing::warn!(enrollment_id = %id, "unlock token on user channel not stored");
            }

            let user = state
                .users
                .entry(id.id.clone())
                .or_insert_with(|| empty_user(id));
            if let Some(name) = &msg.enrollment.user_short_name {
                user.user_short_name = Some(name.clone());
            }
            if let Some(name) = &msg.enrollment.user_long_name {
                user.user_long_name = Some(name.clone());
            }
            user.token_update = Some(msg.raw.clone());
            user.token_update_at = Some(now);
        } else {
            let device = state
                .devices
                .entry(id.id.clone())
                .or_insert_with(|| empty_device(&id.id));
            device.token_update = Some(msg.raw.clone());
            device.token_update_at = Some(now);
            if let Some(unlock_token) = &msg.unlock_token {
                device.unlock_token = Some(unlock_token.clone().into());
                device.unlock_token_at = Some(now);
            }
        }

        let previous_tally = state
            .enrollments
            .get(&id.id)
            .map(|e| e.token_update_tally);

        state.enrollments.insert(
            id.id.clone(),
            EnrollmentRecord {
                id: id.id.clone(),
                device_id: id.device_id().to_string(),
                user_id: id.parent_id.as_ref().map(|_| id.id.clone()),
                enroll_type: id.enroll_type,
                topic: msg.topic.clone(),
                push_magic: msg.push_magic.clone(),
                token: msg.token_hex(),
                enabled: true,
                last_seen_at: now,
                token_update_tally: previous_tally.unwrap_or(0) + 1,
            },
        );

        Ok(previous_tally.is_none())
    }

    async fn store_user_authenticate(
        &self,
        id: &EnrollId,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<()> {
        let now = now();
        let mut state = self.state.write().await;
        let user = state
            .users
            .entry(id.id.clone())
            .or_insert_with(|| empty_user(id));

        if let Some(name) = &msg.enrollment.user_short_name {
            user.user_short_name = Some(name.clone());
        }
        if let Some(name) = &msg.enrollment.user_long_name {
            user.user_long_name = Some(name.clone());
        }

        if msg.is_initial() {
            user.user_authenticate = Some(msg.raw.clone());
            user.user_authenticate_at = Some(now);
        } else {
            user.user_authenticate_digest = Some(msg.raw.clone());
            user.user_authenticate_digest_at = Some(now);
        }

        Ok(())
    }

    async fn disable_enrollment(&self, id: &EnrollId) -> color_eyre::eyre::Result<()> {
        let mut state = self.state.write().await;
        if let Some(enrollment) = state.enrollments.get_mut(&id.id) {
            enrollment.enabled = false;
        }
        Ok(())
    }

    async fn clear_queue(&self, id: &EnrollId) -> color_eyre::eyre::Result<()> {
        let mut state = self.state.write().await;
        state.queues.remove(&id.id);
        Ok(())
    }

    async fn update_last_seen(&self, id: &EnrollId) -> color_eyre::eyre::Result<()> {
        let mut state = self.state.write().await;
        if let Some(enrollment) = state.enrollments.get_mut(&id.id) {
            enrollment.last_seen_at = now();
        }
        Ok(())
    }

    async fn get_enrollment(&self, id: &str) -> color_eyre::eyre::Result<Option<EnrollmentRecord>> {
        let state = self.state.read().await;
        Ok(state.enrollments.get(id).cloned())
    }
}

impl PushStore for MemoryStorage {
    async fn get_push_targets(
        &self,
        ids: &[String],
    ) -> color_eyre::eyre::Result<HashMap<String, PushTarget>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.enrollments.get(id))
            // checked-out enrollments are never pushed
            .filter(|e| e.enabled)
            .map(|e| (e.id.clone(), e.push_target()))
            .collect())
    }
}

impl PushCertStore for MemoryStorage {
    async fn store_push_cert(
        &self,
        topic: &str,
        cert_pem: &str,
        key_pem: &str,
    ) -> color_eyre::eyre::Result<PushCredential> {
        let mut state = self.state.write().await;
        let previous = state.push_certs.get(topic).map(|c| c.issued_at);

        let credential = PushCredential {
            topic: topic.to_string(),
            certificate: cert_pem.to_string(),
            private_key: key_pem.to_string(),
            issued_at: next_issued_at(previous),
        };
        state
            .push_certs
            .insert(topic.to_string(), credential.clone());

        Ok(credential)
    }

    async fn get_push_credential(
        &self,
        topic: &str,
    ) -> color_eyre::eyre::Result<Option<PushCredential>> {
        Ok(self.state.read().await.push_certs.get(topic).cloned())
    }

    async fn push_cert_issued_at(&self, topic: &str) -> color_eyre::eyre::Result<Option<i64>> {
        Ok(self
            .state
            .read()
            .await
            .push_certs
            .get(topic)
            .map(|c| c.issued_at))
    }
}
