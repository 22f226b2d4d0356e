//! MDM Service Layer
//!
//! Check-in protocol handling and its storage side effects.

mod config;
mod dispatch;
mod service;
mod traits;

pub use config::CheckinConfig;
pub use dispatch::{dispatch_checkin, dispatch_connect};
pub use service::MdmService;
pub use traits::*;
