//! MDM Core Types
//!
//! Core types and protocol definitions for Apple MDM check-in and push.

mod checkin;
mod connect;
mod enrollment;
mod error;
mod push;
mod request;

pub use checkin::*;
pub use connect::*;
pub use enrollment::*;
pub use error::*;
pub use push::*;
pub use request::*;
