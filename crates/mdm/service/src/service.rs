//! Core check-in service implementation.

use color_eyre::eyre::WrapErr as _;
use mdm_core::{
    Authenticate, CheckOut, CheckinError, ConnectReport, DeclarativeManagement, DigestChallenge,
    GetBootstrapToken, Request, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};
use mdm_crypto::cert_fingerprint;
use mdm_storage::CheckinStore;

use crate::{Checkin, CheckinConfig, ConnectReports};

/// Core MDM service implementation.
#[derive(Clone)]
pub struct MdmService<S> {
    store: S,
    config: CheckinConfig,
}

impl<S> MdmService<S> {
    /// Create a service with the default check-in policy.
    pub fn new(store: S) -> Self {
        Self::with_config(store, CheckinConfig::default())
    }

    pub fn with_config(store: S, config: CheckinConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: CheckinStore> Checkin for MdmService<S> {
    async fn authenticate(&self, req: &Request, msg: &Authenticate) -> Result<(), CheckinError> {
        let id = req.require_device_channel("authenticate")?;

        tracing::info!(
            enrollment_id = %id,
            serial_number = ?msg.serial_number,
            "processing authenticate"
        );

        let fingerprint = req.certificate.as_deref().map(cert_fingerprint);

        // the enrollment stays disabled until the next TokenUpdate
        let (stored, cleared, disabled) = tokio::join!(
            self.store
                .store_authenticate(id, msg, fingerprint.as_deref()),
            self.store.clear_queue(id),
            self.store.disable_enrollment(id),
        );
        stored.wrap_err("failed to store authenticate")?;
        cleared.wrap_err("failed to clear command queue")?;
        disabled.wrap_err("failed to disable enrollment")?;

        Ok(())
    }

    async fn token_update(&self, req: &Request, msg: &TokenUpdate) -> Result<(), CheckinError> {
        let id = req.require_enroll_id()?;

        tracing::debug!(enrollment_id = %id, topic = %msg.topic, "processing token update");

        let created = self
            .store
            .store_token_update(id, msg)
            .await
            .wrap_err("failed to store token update")?;

        if created {
            tracing::info!(enrollment_id = %id, enroll_type = %id.enroll_type, "new enrollment");
        }

        Ok(())
    }

    async fn checkout(&self, req: &Request, _msg: &CheckOut) -> Result<(), CheckinError> {
        let id = req.require_device_channel("check out")?;

        self.store
            .disable_enrollment(id)
            .await
            .wrap_err("failed to disable enrollment")?;

        tracing::info!(enrollment_id = %id, "removed enrollment");

        Ok(())
    }

    async fn user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> Result<Option<Vec<u8>>, CheckinError> {
        let id = req.require_enroll_id()?;

        if self.config.persists_user_authenticate() {
            self.store
                .store_user_authenticate(id, msg)
                .await
                .wrap_err("failed to store user authenticate")?;
        }

        if !msg.is_initial() {
            tracing::info!(enrollment_id = %id, "sending empty response to second user authenticate");
            return Ok(None);
        }

        if !self.config.empty_digest_challenge {
            return Err(CheckinError::Declined(id.id.clone()));
        }

        tracing::info!(enrollment_id = %id, "sending empty digest challenge");

        let mut body = Vec::new();
        plist::to_writer_xml(&mut body, &DigestChallenge::default())
            .wrap_err("failed to encode digest challenge")?;

        Ok(Some(body))
    }

    async fn set_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> Result<(), CheckinError> {
        let id = req.require_enroll_id()?;
        tracing::info!(
            enrollment_id = %id,
            has_token = msg.bootstrap_token.is_some(),
            "ignoring set bootstrap token"
        );
        Ok(())
    }

    async fn get_bootstrap_token(
        &self,
        req: &Request,
        _msg: &GetBootstrapToken,
    ) -> Result<(), CheckinError> {
        let id = req.require_enroll_id()?;
        tracing::info!(enrollment_id = %id, "ignoring get bootstrap token");
        Ok(())
    }

    async fn declarative_management(
        &self,
        req: &Request,
        msg: &DeclarativeManagement,
    ) -> Result<(), CheckinError> {
        let id = req.require_enroll_id()?;
        tracing::info!(
            enrollment_id = %id,
            endpoint = ?msg.endpoint,
            "ignoring declarative management"
        );
        Ok(())
    }
}

impl<S: CheckinStore> ConnectReports for MdmService<S> {
    async fn connect_report(
        &self,
        req: &Request,
        report: &ConnectReport,
    ) -> Result<(), CheckinError> {
        let id = req.require_enroll_id()?;

        tracing::info!(
            enrollment_id = %id,
            status = ?report.status,
            command_uuid = ?report.command_uuid,
            "command report"
        );
        for item in &report.error_chain {
            tracing::warn!(
                enrollment_id = %id,
                code = item.error_code,
                domain = %item.error_domain,
                description = ?item.us_english_description,
                "command error"
            );
        }

        self.store
            .update_last_seen(id)
            .await
            .wrap_err("failed to update last seen")?;

        Ok(())
    }
}
