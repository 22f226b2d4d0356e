//! Routing of parsed protocol messages to the service.

use mdm_core::{CheckinError, CheckinMessage, ConnectReport, Request};

use crate::{Checkin, ConnectReports};

/// Resolve the sender of a check-in message and hand it to the matching
/// service method. Returns the response body, if any.
pub async fn dispatch_checkin<S: Checkin>(
    service: &S,
    req: Request,
    msg: &CheckinMessage,
) -> Result<Option<Vec<u8>>, CheckinError> {
    let id = msg.enrollment().resolve()?;
    tracing::debug!(
        enrollment_id = %id,
        message_type = %msg.message_type(),
        "check-in"
    );
    let req = req.with_enroll_id(id);

    match msg {
        CheckinMessage::Authenticate(m) => service.authenticate(&req, m).await.map(|()| None),
        CheckinMessage::TokenUpdate(m) => service.token_update(&req, m).await.map(|()| None),
        CheckinMessage::CheckOut(m) => service.checkout(&req, m).await.map(|()| None),
        CheckinMessage::UserAuthenticate(m) => service.user_authenticate(&req, m).await,
        CheckinMessage::SetBootstrapToken(m) => {
            service.set_bootstrap_token(&req, m).await.map(|()| None)
        }
        CheckinMessage::GetBootstrapToken(m) => {
            service.get_bootstrap_token(&req, m).await.map(|()| None)
        }
        CheckinMessage::DeclarativeManagement(m) => {
            service.declarative_management(&req, m).await.map(|()| None)
        }
    }
}

/// Resolve the sender of a command report and hand it to the service.
pub async fn dispatch_connect<S: ConnectReports>(
    service: &S,
    req: Request,
    report: &ConnectReport,
) -> Result<(), CheckinError> {
    let id = report.enrollment.resolve()?;
    let req = req.with_enroll_id(id);
    service.connect_report(&req, report).await
}
