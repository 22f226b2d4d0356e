//! SQLite storage implementation.

use std::collections::HashMap;

use color_eyre::eyre::WrapErr as _;
use diesel::connection::SimpleConnection as _;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sqlite::SqliteConnection;

use crate::models::*;
use crate::schema::*;
use crate::traits::*;
use mdm_core::{Authenticate, EnrollId, PushCredential, PushTarget, TokenUpdate, UserAuthenticate};

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// SQLite-based storage.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database URL.
    pub fn new(database_url: &str) -> color_eyre::eyre::Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(10)
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)
            .wrap_err("failed to create connection pool")?;

        Ok(Self { pool })
    }

    /// Run migrations.
    pub fn run_migrations(&self) -> color_eyre::eyre::Result<()> {
        use diesel_migrations::MigrationHarness as _;

        let mut conn = self
            .pool
            .get()
            .wrap_err("failed to get connection for migrations")?;

        conn.run_pending_migrations(crate::MIGRATIONS)
            .map_err(|e| color_eyre::eyre::eyre!("migration failed: {}", e))?;

        Ok(())
    }

    /// Queue a raw command for an enrollment. Returns the command UUID.
    pub async fn enqueue_command(
        &self,
        id: &str,
        command: &[u8],
    ) -> color_eyre::eyre::Result<String> {
        let id = id.to_string();
        let command = command.to_vec();

        self.with_conn(move |conn| {
            let uuid = uuid::Uuid::new_v4().to_string();
            diesel::insert_into(commands::table)
                .values(&NewCommand {
                    enrollment_id: &id,
                    uuid: &uuid,
                    command: &command,
                    created_at: now(),
                })
                .execute(conn)
                .wrap_err("failed to enqueue command")?;
            Ok(uuid)
        })
        .await
    }

    /// Number of queued commands for an enrollment.
    pub async fn queued_commands(&self, id: &str) -> color_eyre::eyre::Result<i64> {
        let id = id.to_string();

        self.with_conn(move |conn| {
            commands::table
                .filter(commands::enrollment_id.eq(&id))
                .count()
                .get_result(conn)
                .wrap_err("failed to count queued commands")
        })
        .await
    }

    /// Run blocking database work on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> color_eyre::eyre::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> color_eyre::eyre::Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().wrap_err("failed to get database connection")?;
            f(&mut conn)
        })
        .await
        .wrap_err("database task failed")?
    }
}

fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

impl CheckinStore for SqliteStorage {
    async fn store_authenticate(
        &self,
        id: &EnrollId,
        msg: &Authenticate,
        identity_fingerprint: Option<&str>,
    ) -> color_eyre::eyre::Result<()> {
        let device_id = id.id.clone();
        let raw = msg.raw.clone();
        let serial_number = msg.serial_number.clone();
        let fingerprint = identity_fingerprint.map(str::to_string);

        self.with_conn(move |conn| {
            let device = NewDeviceAuthenticate {
                id: &device_id,
                identity_cert_fingerprint: fingerprint.as_deref(),
                serial_number: serial_number.as_deref(),
                authenticate: &raw,
                authenticate_at: now(),
            };

            diesel::insert_into(devices::table)
                .values(&device)
                .on_conflict(devices::id)
                .do_update()
                .set((
                    devices::identity_cert_fingerprint.eq(device.identity_cert_fingerprint),
                    devices::serial_number.eq(device.serial_number),
                    devices::authenticate.eq(Some(device.authenticate)),
                    devices::authenticate_at.eq(Some(device.authenticate_at)),
                ))
                .execute(conn)
                .wrap_err("failed to store authenticate")?;

            Ok(())
        })
        .await
    }

    async fn store_token_update(
        &self,
        id: &EnrollId,
        msg: &TokenUpdate,
    ) -> color_eyre::eyre::Result<bool> {
        let id = id.clone();
        let raw = msg.raw.clone();
        let topic = msg.topic.clone();
        let push_magic = msg.push_magic.clone();
        let token_hex = msg.token_hex();
        let unlock_token: Option<Vec<u8>> = msg.unlock_token.clone().map(Into::into);
        let short_name = msg.enrollment.user_short_name.clone();
        let long_name = msg.enrollment.user_long_name.clone();

        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let now = now();

                match &id.parent_id {
                    Some(device_id) => {
                        if unlock_token.is_some() {
                            tracing::warn!(enrollment_id = %id, "unlock token on user channel not stored");
                        }

                        let user = UserChanges {
                            id: &id.id,
                            device_id,
                            user_short_name: short_name.as_deref(),
                            user_long_name: long_name.as_deref(),
                            token_update: Some(&raw),
                            token_update_at: Some(now),
                            ..Default::default()
                        };

                        diesel::insert_into(users::table)
                            .values(&user)
                            .on_conflict(users::id)
                            .do_update()
                            .set(&user)
                            .execute(conn)
                            .wrap_err("failed to store user token update")?;
                    }
                    None => {
                        let device = NewDeviceTokenUpdate {
                            id: &id.id,
                            token_update: &raw,
                            token_update_at: now,
                            unlock_token: unlock_token.as_deref(),
                            unlock_token_at: unlock_token.as_ref().map(|_| now),
                        };

                        diesel::insert_into(devices::table)
                            .values(&device)
                            .on_conflict(devices::id)
                            .do_update()
                            .set(&device)
                            .execute(conn)
                            .wrap_err("failed to store device token update")?;
                    }
                }

                let existing: i64 = enrollments::table
                    .filter(enrollments::id.eq(&id.id))
                    .count()
                    .get_result(conn)
                    .wrap_err("failed to look up enrollment")?;

                let enrollment = NewEnrollment {
                    id: &id.id,
                    device_id: id.device_id(),
                    user_id: id.parent_id.as_ref().map(|_| id.id.as_str()),
                    enroll_type: id.enroll_type.code(),
                    topic: &topic,
                    push_magic: &push_magic,
                    token_hex: &token_hex,
                    enabled: true,
                    token_update_tally: 1,
                    last_seen_at: now,
                    created_at: now,
                    updated_at: now,
                };

                diesel::insert_into(enrollments::table)
                    .values(&enrollment)
                    .on_conflict(enrollments::id)
                    .do_update()
                    .set((
                        enrollments::device_id.eq(enrollment.device_id),
                        enrollments::user_id.eq(enrollment.user_id),
                        enrollments::enroll_type.eq(enrollment.enroll_type),
                        enrollments::topic.eq(enrollment.topic),
                        enrollments::push_magic.eq(enrollment.push_magic),
                        enrollments::token_hex.eq(enrollment.token_hex),
                        enrollments::enabled.eq(true),
                        enrollments::token_update_tally.eq(enrollments::token_update_tally + 1),
                        enrollments::last_seen_at.eq(now),
                        enrollments::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .wrap_err("failed to store enrollment")?;

                Ok(existing == 0)
            })
        })
        .await
    }

    async fn store_user_authenticate(
        &self,
        id: &EnrollId,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<()> {
        let user_id = id.id.clone();
        let device_id = id.device_id().to_string();
        let raw = msg.raw.clone();
        let initial = msg.is_initial();
        let short_name = msg.enrollment.user_short_name.clone();
        let long_name = msg.enrollment.user_long_name.clone();

        self.with_conn(move |conn| {
            let now = now();
            let mut user = UserChanges {
                id: &user_id,
                device_id: &device_id,
                user_short_name: short_name.as_deref(),
                user_long_name: long_name.as_deref(),
                ..Default::default()
            };

            // the first of the two messages has no digest response
            if initial {
                user.user_authenticate = Some(&raw);
                user.user_authenticate_at = Some(now);
            } else {
                user.user_authenticate_digest = Some(&raw);
                user.user_authenticate_digest_at = Some(now);
            }

            diesel::insert_into(users::table)
                .values(&user)
                .on_conflict(users::id)
                .do_update()
                .set(&user)
                .execute(conn)
                .wrap_err("failed to store user authenticate")?;

            Ok(())
        })
        .await
    }

    async fn disable_enrollment(&self, id: &EnrollId) -> color_eyre::eyre::Result<()> {
        let id = id.id.clone();

        self.with_conn(move |conn| {
            diesel::update(enrollments::table.filter(enrollments::id.eq(&id)))
                .set((
                    enrollments::enabled.eq(false),
                    enrollments::updated_at.eq(now()),
                ))
                .execute(conn)
                .wrap_err("failed to disable enrollment")?;

            Ok(())
        })
        .await
    }

    async fn clear_queue(&self, id: &EnrollId) -> color_eyre::eyre::Result<()> {
        let id = id.id.clone();

        self.with_conn(move |conn| {
            let cleared = diesel::delete(commands::table.filter(commands::enrollment_id.eq(&id)))
                .execute(conn)
                .wrap_err("failed to clear command queue")?;

            if cleared > 0 {
                tracing::debug!(enrollment_id = %id, cleared, "cleared command queue");
            }

            Ok(())
        })
        .await
    }

    async fn update_last_seen(&self, id: &EnrollId) -> color_eyre::eyre::Result<()> {
        let id = id.id.clone();

        self.with_conn(move |conn| {
            diesel::update(enrollments::table.filter(enrollments::id.eq(&id)))
                .set(enrollments::last_seen_at.eq(now()))
                .execute(conn)
                .wrap_err("failed to update last seen")?;

            Ok(())
        })
        .await
    }

    async fn get_enrollment(&self, id: &str) -> color_eyre::eyre::Result<Option<EnrollmentRecord>> {
        let id = id.to_string();

        self.with_conn(move |conn| {
            let row: Option<EnrollmentRow> = enrollments::table
                .filter(enrollments::id.eq(&id))
                .select(EnrollmentRow::as_select())
                .first(conn)
                .optional()
                .wrap_err("failed to get enrollment")?;

            row.map(EnrollmentRecord::try_from).transpose()
        })
        .await
    }
}

impl PushStore for SqliteStorage {
    async fn get_push_targets(
        &self,
        ids: &[String],
    ) -> color_eyre::eyre::Result<HashMap<String, PushTarget>> {
        let ids = ids.to_vec();

        self.with_conn(move |conn| {
            let rows: Vec<(String, String, String, String)> = enrollments::table
                .filter(enrollments::id.eq_any(&ids))
                // checked-out enrollments are never pushed
                .filter(enrollments::enabled.eq(true))
                .select((
                    enrollments::id,
                    enrollments::topic,
                    enrollments::push_magic,
                    enrollments::token_hex,
                ))
                .load(conn)
                .wrap_err("failed to get push targets")?;

            Ok(rows
                .into_iter()
                .map(|(id, topic, push_magic, token)| {
                    let target = PushTarget {
                        id: id.clone(),
                        topic,
                        push_magic,
                        token,
                    };
                    (id, target)
                })
                .collect())
        })
        .await
    }
}

impl PushCertStore for SqliteStorage {
    async fn store_push_cert(
        &self,
        topic: &str,
        cert_pem: &str,
        key_pem: &str,
    ) -> color_eyre::eyre::Result<PushCredential> {
        let topic = topic.to_string();
        let cert_pem = cert_pem.to_string();
        let key_pem = key_pem.to_string();

        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let previous: Option<i64> = push_certs::table
                    .filter(push_certs::topic.eq(&topic))
                    .select(push_certs::issued_at)
                    .first(conn)
                    .optional()
                    .wrap_err("failed to read push cert")?;

                let row = PushCertRow {
                    topic,
                    cert_pem,
                    key_pem,
                    issued_at: next_issued_at(previous),
                };

                diesel::insert_into(push_certs::table)
                    .values(&row)
                    .on_conflict(push_certs::topic)
                    .do_update()
                    .set((
                        push_certs::cert_pem.eq(&row.cert_pem),
                        push_certs::key_pem.eq(&row.key_pem),
                        push_certs::issued_at.eq(row.issued_at),
                    ))
                    .execute(conn)
                    .wrap_err("failed to store push cert")?;

                Ok(PushCredential::from(row))
            })
        })
        .await
    }

    async fn get_push_credential(
        &self,
        topic: &str,
    ) -> color_eyre::eyre::Result<Option<PushCredential>> {
        let topic = topic.to_string();

        self.with_conn(move |conn| {
            let row: Option<PushCertRow> = push_certs::table
                .filter(push_certs::topic.eq(&topic))
                .select(PushCertRow::as_select())
                .first(conn)
                .optional()
                .wrap_err("failed to get push cert")?;

            Ok(row.map(PushCredential::from))
        })
        .await
    }

    async fn push_cert_issued_at(&self, topic: &str) -> color_eyre::eyre::Result<Option<i64>> {
        let topic = topic.to_string();

        self.with_conn(move |conn| {
            push_certs::table
                .filter(push_certs::topic.eq(&topic))
                .select(push_certs::issued_at)
                .first(conn)
                .optional()
                .wrap_err("failed to get push cert issued at")
        })
        .await
    }
}
