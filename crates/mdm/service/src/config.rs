//! Check-in policy.

/// How UserAuthenticate messages are answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct CheckinConfig {
    /// Answer the first UserAuthenticate with an empty DigestChallenge
    /// instead of declining the user.
    pub empty_digest_challenge: bool,

    /// Persist UserAuthenticate messages even when the user is declined.
    pub store_user_authenticate: bool,
}

impl CheckinConfig {
    /// Whether UserAuthenticate messages are written to storage.
    pub fn persists_user_authenticate(&self) -> bool {
        self.empty_digest_challenge || self.store_user_authenticate
    }
}
