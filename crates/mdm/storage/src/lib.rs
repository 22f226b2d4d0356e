//! MDM Storage Layer
//!
//! Storage for MDM enrollments, devices, users, and push certificates, with
//! a Diesel/SQLite backend and an in-memory backend.

mod memory;
mod models;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStorage;
pub use models::*;
pub use sqlite::SqliteStorage;
pub use traits::*;

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Behaviour shared by every backend, run against each of them.
#[cfg(test)]
mod tests {
    use mdm_core::{
        Authenticate, EnrollId, EnrollType, Enrollment, TokenUpdate, UserAuthenticate,
    };

    use crate::AllStorage;

    pub fn device_id(udid: &str) -> EnrollId {
        EnrollId {
            enroll_type: EnrollType::Device,
            id: udid.to_string(),
            parent_id: None,
        }
    }

    pub fn user_id(udid: &str, user: &str) -> EnrollId {
        EnrollId {
            enroll_type: EnrollType::User,
            id: format!("{udid}:{user}"),
            parent_id: Some(udid.to_string()),
        }
    }

    pub fn authenticate(udid: &str) -> Authenticate {
        Authenticate {
            enrollment: Enrollment {
                udid: Some(udid.to_string()),
                ..Default::default()
            },
            topic: "com.apple.mgmt.test".into(),
            build_version: None,
            os_version: None,
            product_name: None,
            serial_number: Some("C02TEST".into()),
            device_name: None,
            model: None,
            model_name: None,
            imei: None,
            meid: None,
            raw: b"<authenticate/>".to_vec(),
        }
    }

    pub fn token_update(id: &EnrollId) -> TokenUpdate {
        TokenUpdate {
            enrollment: Enrollment {
                udid: Some(id.device_id().to_string()),
                user_short_name: id.parent_id.as_ref().map(|_| "jappleseed".to_string()),
                ..Default::default()
            },
            topic: "com.apple.mgmt.test".into(),
            token: vec![0xde, 0xad, 0xbe, 0xef].into(),
            push_magic: "magic".into(),
            unlock_token: Some(vec![1, 2, 3].into()),
            awaiting_configuration: false,
            not_on_console: false,
            raw: b"<token-update/>".to_vec(),
        }
    }

    pub fn user_authenticate(udid: &str, user: &str, digest: Option<&str>) -> UserAuthenticate {
        UserAuthenticate {
            enrollment: Enrollment {
                udid: Some(udid.to_string()),
                user_id: Some(user.to_string()),
                ..Default::default()
            },
            digest_response: digest.map(str::to_string),
            auth_token: None,
            raw: b"<user-authenticate/>".to_vec(),
        }
    }

    pub async fn token_update_lifecycle<S: AllStorage>(storage: &S) {
        let id = device_id("UDID-1");
        let msg = token_update(&id);

        assert!(storage.store_token_update(&id, &msg).await.unwrap());
        let record = storage.get_enrollment(&id.id).await.unwrap().unwrap();
        assert!(record.enabled);
        assert_eq!(record.enroll_type, EnrollType::Device);
        assert_eq!(record.device_id, "UDID-1");
        assert_eq!(record.user_id, None);
        assert_eq!(record.token, "deadbeef");
        assert_eq!(record.push_magic, "magic");
        assert_eq!(record.token_update_tally, 1);

        // an identical update changes nothing but the tally
        assert!(!storage.store_token_update(&id, &msg).await.unwrap());
        let record = storage.get_enrollment(&id.id).await.unwrap().unwrap();
        assert!(record.enabled);
        assert_eq!(record.token, "deadbeef");
        assert_eq!(record.push_magic, "magic");
        assert_eq!(record.token_update_tally, 2);

        storage.disable_enrollment(&id).await.unwrap();
        let record = storage.get_enrollment(&id.id).await.unwrap().unwrap();
        assert!(!record.enabled);

        storage.update_last_seen(&id).await.unwrap();
        let seen = storage.get_enrollment(&id.id).await.unwrap().unwrap();
        assert!(seen.last_seen_at >= record.last_seen_at);

        // re-enabled by the next token update
        assert!(!storage.store_token_update(&id, &msg).await.unwrap());
        assert!(storage.get_enrollment(&id.id).await.unwrap().unwrap().enabled);
    }

    pub async fn user_channel_token_update<S: AllStorage>(storage: &S) {
        let id = user_id("UDID-1", "USER-1");

        assert!(storage.store_token_update(&id, &token_update(&id)).await.unwrap());
        let record = storage.get_enrollment("UDID-1:USER-1").await.unwrap().unwrap();
        assert_eq!(record.enroll_type, EnrollType::User);
        assert_eq!(record.device_id, "UDID-1");
        assert_eq!(record.user_id.as_deref(), Some("UDID-1:USER-1"));

        // the device channel is a separate enrollment
        assert!(storage.get_enrollment("UDID-1").await.unwrap().is_none());
    }

    pub async fn disable_missing_enrollment<S: AllStorage>(storage: &S) {
        let id = device_id("NOPE");
        storage.disable_enrollment(&id).await.unwrap();
        storage.update_last_seen(&id).await.unwrap();
        assert!(storage.get_enrollment("NOPE").await.unwrap().is_none());
    }

    pub async fn push_cert_rotation<S: AllStorage>(storage: &S) {
        let topic = "com.apple.mgmt.test";
        assert!(storage.get_push_credential(topic).await.unwrap().is_none());
        assert!(storage.push_cert_issued_at(topic).await.unwrap().is_none());

        let first = storage.store_push_cert(topic, "CERT1", "KEY1").await.unwrap();
        let second = storage.store_push_cert(topic, "CERT2", "KEY2").await.unwrap();
        assert!(second.issued_at > first.issued_at);

        let current = storage.get_push_credential(topic).await.unwrap().unwrap();
        assert_eq!(current, second);
        assert_eq!(
            storage.push_cert_issued_at(topic).await.unwrap(),
            Some(second.issued_at)
        );
    }

    pub async fn push_targets_skip_disabled<S: AllStorage>(storage: &S) {
        let a = device_id("A");
        let b = device_id("B");
        storage.store_token_update(&a, &token_update(&a)).await.unwrap();
        storage.store_token_update(&b, &token_update(&b)).await.unwrap();
        storage.disable_enrollment(&b).await.unwrap();

        let ids = ["A".to_string(), "B".to_string(), "MISSING".to_string()];
        let targets = storage.get_push_targets(&ids).await.unwrap();
        assert_eq!(targets.len(), 1);

        let target = &targets["A"];
        assert_eq!(target.id, "A");
        assert_eq!(target.token, "deadbeef");
        assert_eq!(target.push_magic, "magic");
        assert_eq!(target.topic, "com.apple.mgmt.test");

        // the checked-out enrollment keeps its push info
        let disabled = storage.get_enrollment("B").await.unwrap().unwrap();
        assert!(!disabled.enabled);
        assert_eq!(disabled.token, "deadbeef");
    }
}
