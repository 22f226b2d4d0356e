//! MDM Push Notifications
//!
//! Wake-up pushes over persistent HTTP/2 connections, one per push topic.

mod connection;
mod dispatch;
mod error;
mod payload;
mod registry;
mod traits;
mod transport;

pub use connection::*;
pub use dispatch::*;
pub use error::*;
pub use payload::*;
pub use registry::*;
pub use traits::*;
pub use transport::*;
