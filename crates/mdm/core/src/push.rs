//! Push notification types.

/// Minimal projection of an enrollment needed to address a push.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PushTarget {
    /// Enrollment ID.
    pub id: String,
    /// Push topic (from the push certificate).
    pub topic: String,
    /// Push magic string the device expects in the payload.
    pub push_magic: String,
    /// Push token, hex encoded.
    pub token: String,
}

/// Push certificate and key for a topic.
#[derive(Clone, PartialEq, Eq)]
pub struct PushCredential {
    pub topic: String,
    /// PEM certificate.
    pub certificate: String,
    /// PEM private key.
    pub private_key: String,
    /// Rotation marker: milliseconds since epoch when stored, strictly
    /// increasing per topic.
    pub issued_at: i64,
}

impl std::fmt::Debug for PushCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushCredential")
            .field("topic", &self.topic)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

/// Gateway response to a single push.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PushResponse {
    /// HTTP status returned by the gateway.
    pub status: u16,
    /// Gateway-assigned notification ID (`apns-id`).
    #[serde(rename = "push_notification_id")]
    pub notification_id: Option<String>,
}

/// Lowercase hex encoding.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
