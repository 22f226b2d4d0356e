//! Service traits.

use mdm_core::{
    Authenticate, CheckOut, CheckinError, ConnectReport, DeclarativeManagement, GetBootstrapToken,
    Request, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};

/// Check-in service trait.
///
/// Every method expects `req` to carry the resolved enrollment ID.
#[trait_variant::make(Send)]
pub trait Checkin: Send + Sync {
    /// Handle Authenticate message.
    async fn authenticate(&self, req: &Request, msg: &Authenticate) -> Result<(), CheckinError>;

    /// Handle TokenUpdate message.
    async fn token_update(&self, req: &Request, msg: &TokenUpdate) -> Result<(), CheckinError>;

    /// Handle CheckOut message.
    async fn checkout(&self, req: &Request, msg: &CheckOut) -> Result<(), CheckinError>;

    /// Handle UserAuthenticate message, optionally answering with a challenge.
    async fn user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> Result<Option<Vec<u8>>, CheckinError>;

    /// Handle SetBootstrapToken message.
    async fn set_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> Result<(), CheckinError>;

    /// Handle GetBootstrapToken message.
    async fn get_bootstrap_token(
        &self,
        req: &Request,
        msg: &GetBootstrapToken,
    ) -> Result<(), CheckinError>;

    /// Handle DeclarativeManagement message.
    async fn declarative_management(
        &self,
        req: &Request,
        msg: &DeclarativeManagement,
    ) -> Result<(), CheckinError>;
}

/// Command report service trait.
#[trait_variant::make(Send)]
pub trait ConnectReports: Send + Sync {
    /// Handle a command report sent to the connect endpoint.
    async fn connect_report(&self, req: &Request, report: &ConnectReport)
    -> Result<(), CheckinError>;
}
