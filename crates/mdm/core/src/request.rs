//! MDM request context.

use crate::{CheckinError, EnrollId};

/// MDM request context.
///
/// Carries enrollment identification and certificate info through the service layer.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Resolved enrollment ID.
    pub enroll_id: Option<EnrollId>,

    /// Verified identity certificate of the signer (DER-encoded).
    pub certificate: Option<Vec<u8>>,
}

impl Request {
    /// Create a new empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the enrollment ID.
    pub fn with_enroll_id(mut self, id: EnrollId) -> Self {
        if let Some(previous) = &self.enroll_id {
            tracing::debug!(previous = %previous, "overwriting enrollment id");
        }
        self.enroll_id = Some(id);
        self
    }

    /// Set the certificate.
    pub fn with_certificate(mut self, cert: Vec<u8>) -> Self {
        self.certificate = Some(cert);
        self
    }

    /// Get the enrollment ID, failing if it was never resolved.
    pub fn require_enroll_id(&self) -> Result<&EnrollId, CheckinError> {
        self.enroll_id
            .as_ref()
            .ok_or(CheckinError::Resolution(crate::ResolutionError::NoIdentity))
    }

    /// Get the enrollment ID, failing unless it is a device channel.
    pub fn require_device_channel(&self, action: &'static str) -> Result<&EnrollId, CheckinError> {
        let id = self.require_enroll_id()?;
        if id.is_user_channel() {
            return Err(CheckinError::NotDeviceChannel {
                action,
                id: id.id.clone(),
            });
        }
        Ok(id)
    }
}
