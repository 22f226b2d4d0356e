//! Push provider trait.

use crate::{PushError, PushResults};

/// Wakes enrollments by ID.
#[trait_variant::make(Send)]
pub trait PushProvider: Send + Sync {
    /// Push every known enrollment in `ids`, keyed by enrollment ID.
    /// Unknown IDs are left out of the result.
    async fn push_ids(&self, ids: &[String]) -> Result<PushResults, PushError>;
}
