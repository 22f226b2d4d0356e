//! MDM Crypto Utilities
//!
//! Certificate parsing, identity verification, and the push gateway TLS identity.

mod cert;
mod signature;
mod tls;

pub use cert::*;
pub use signature::*;
pub use tls::*;
