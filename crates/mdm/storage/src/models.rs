//! Database models.

use diesel::prelude::*;
use mdm_core::{EnrollType, PushCredential, PushTarget};

use crate::schema::{commands, devices, enrollments, push_certs, users};

/// Stored enrollment, as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRecord {
    pub id: String,
    pub device_id: String,
    pub user_id: Option<String>,
    pub enroll_type: EnrollType,
    pub topic: String,
    pub push_magic: String,
    /// Push token, hex encoded.
    pub token: String,
    pub enabled: bool,
    pub last_seen_at: chrono::NaiveDateTime,
    pub token_update_tally: i32,
}

impl EnrollmentRecord {
    /// Push addressing for this enrollment.
    pub fn push_target(&self) -> PushTarget {
        PushTarget {
            id: self.id.clone(),
            topic: self.topic.clone(),
            push_magic: self.push_magic.clone(),
            token: self.token.clone(),
        }
    }
}

/// Enrollment record.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = enrollments)]
pub struct EnrollmentRow {
    pub id: String,
    pub device_id: String,
    pub user_id: Option<String>,
    pub enroll_type: i32,
    pub topic: String,
    pub push_magic: String,
    pub token_hex: String,
    pub enabled: bool,
    pub token_update_tally: i32,
    pub last_seen_at: chrono::NaiveDateTime,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl TryFrom<EnrollmentRow> for EnrollmentRecord {
    type Error = color_eyre::eyre::Report;

    fn try_from(row: EnrollmentRow) -> Result<Self, Self::Error> {
        let enroll_type = EnrollType::from_code(row.enroll_type).ok_or_else(|| {
            color_eyre::eyre::eyre!(
                "enrollment {} has unknown type code {}",
                row.id,
                row.enroll_type
            )
        })?;

        Ok(Self {
            id: row.id,
            device_id: row.device_id,
            user_id: row.user_id,
            enroll_type,
            topic: row.topic,
            push_magic: row.push_magic,
            token: row.token_hex,
            enabled: row.enabled,
            last_seen_at: row.last_seen_at,
            token_update_tally: row.token_update_tally,
        })
    }
}

/// New enrollment for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = enrollments)]
pub struct NewEnrollment<'a> {
    pub id: &'a str,
    pub device_id: &'a str,
    pub user_id: Option<&'a str>,
    pub enroll_type: i32,
    pub topic: &'a str,
    pub push_magic: &'a str,
    pub token_hex: &'a str,
    pub enabled: bool,
    pub token_update_tally: i32,
    pub last_seen_at: chrono::NaiveDateTime,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

/// Device record.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = devices)]
pub struct DeviceRow {
    pub id: String,
    pub identity_cert_fingerprint: Option<String>,
    pub serial_number: Option<String>,
    pub authenticate: Option<Vec<u8>>,
    pub authenticate_at: Option<chrono::NaiveDateTime>,
    pub token_update: Option<Vec<u8>>,
    pub token_update_at: Option<chrono::NaiveDateTime>,
    pub unlock_token: Option<Vec<u8>>,
    pub unlock_token_at: Option<chrono::NaiveDateTime>,
}

/// Device authenticate for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = devices)]
pub struct NewDeviceAuthenticate<'a> {
    pub id: &'a str,
    pub identity_cert_fingerprint: Option<&'a str>,
    pub serial_number: Option<&'a str>,
    pub authenticate: &'a [u8],
    pub authenticate_at: chrono::NaiveDateTime,
}

/// Device token update for insertion. `None` fields are left untouched on conflict.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = devices)]
pub struct NewDeviceTokenUpdate<'a> {
    pub id: &'a str,
    pub token_update: &'a [u8],
    pub token_update_at: chrono::NaiveDateTime,
    pub unlock_token: Option<&'a [u8]>,
    pub unlock_token_at: Option<chrono::NaiveDateTime>,
}

/// User record.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
pub struct UserRow {
    pub id: String,
    pub device_id: String,
    pub user_short_name: Option<String>,
    pub user_long_name: Option<String>,
    pub user_authenticate: Option<Vec<u8>>,
    pub user_authenticate_at: Option<chrono::NaiveDateTime>,
    pub user_authenticate_digest: Option<Vec<u8>>,
    pub user_authenticate_digest_at: Option<chrono::NaiveDateTime>,
    pub token_update: Option<Vec<u8>>,
    pub token_update_at: Option<chrono::NaiveDateTime>,
}

/// User fields for upsert. `None` fields are left untouched on conflict.
#[derive(Debug, Clone, Default, Insertable, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserChanges<'a> {
    pub id: &'a str,
    pub device_id: &'a str,
    pub user_short_name: Option<&'a str>,
    pub user_long_name: Option<&'a str>,
    pub user_authenticate: Option<&'a [u8]>,
    pub user_authenticate_at: Option<chrono::NaiveDateTime>,
    pub user_authenticate_digest: Option<&'a [u8]>,
    pub user_authenticate_digest_at: Option<chrono::NaiveDateTime>,
    pub token_update: Option<&'a [u8]>,
    pub token_update_at: Option<chrono::NaiveDateTime>,
}

/// Push certificate record.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = push_certs, primary_key(topic))]
pub struct PushCertRow {
    pub topic: String,
    pub cert_pem: String,
    pub key_pem: String,
    pub issued_at: i64,
}

impl From<PushCertRow> for PushCredential {
    fn from(row: PushCertRow) -> Self {
        Self {
            topic: row.topic,
            certificate: row.cert_pem,
            private_key: row.key_pem,
            issued_at: row.issued_at,
        }
    }
}

/// New queued command for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = commands)]
pub struct NewCommand<'a> {
    pub enrollment_id: &'a str,
    pub uuid: &'a str,
    pub command: &'a [u8],
    pub created_at: chrono::NaiveDateTime,
}
