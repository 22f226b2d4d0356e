//! MDM check-in message types.

use crate::{CheckinError, Enrollment};

/// Check-in message types accepted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Authenticate,
    TokenUpdate,
    CheckOut,
    UserAuthenticate,
    SetBootstrapToken,
    GetBootstrapToken,
    DeclarativeManagement,
}

impl MessageType {
    /// Wire name of this message type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authenticate => "Authenticate",
            Self::TokenUpdate => "TokenUpdate",
            Self::CheckOut => "CheckOut",
            Self::UserAuthenticate => "UserAuthenticate",
            Self::SetBootstrapToken => "SetBootstrapToken",
            Self::GetBootstrapToken => "GetBootstrapToken",
            Self::DeclarativeManagement => "DeclarativeManagement",
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = CheckinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Authenticate" => Self::Authenticate,
            "TokenUpdate" => Self::TokenUpdate,
            "CheckOut" => Self::CheckOut,
            "UserAuthenticate" => Self::UserAuthenticate,
            "SetBootstrapToken" => Self::SetBootstrapToken,
            "GetBootstrapToken" => Self::GetBootstrapToken,
            "DeclarativeManagement" => Self::DeclarativeManagement,
            other => return Err(CheckinError::UnsupportedMessageType(other.to_string())),
        })
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check-in messages from devices.
#[derive(Debug, Clone)]
pub enum CheckinMessage {
    /// Initial device authentication.
    Authenticate(Authenticate),
    /// Push token update (enrollment complete).
    TokenUpdate(TokenUpdate),
    /// Device unenrollment.
    CheckOut(CheckOut),
    /// User authentication challenge.
    UserAuthenticate(UserAuthenticate),
    /// Set bootstrap token.
    SetBootstrapToken(SetBootstrapToken),
    /// Get bootstrap token.
    GetBootstrapToken(GetBootstrapToken),
    /// Declarative Management.
    DeclarativeManagement(DeclarativeManagement),
}

impl CheckinMessage {
    /// Declared type of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Authenticate(_) => MessageType::Authenticate,
            Self::TokenUpdate(_) => MessageType::TokenUpdate,
            Self::CheckOut(_) => MessageType::CheckOut,
            Self::UserAuthenticate(_) => MessageType::UserAuthenticate,
            Self::SetBootstrapToken(_) => MessageType::SetBootstrapToken,
            Self::GetBootstrapToken(_) => MessageType::GetBootstrapToken,
            Self::DeclarativeManagement(_) => MessageType::DeclarativeManagement,
        }
    }

    /// Enrollment identification carried by this message.
    pub fn enrollment(&self) -> &Enrollment {
        match self {
            Self::Authenticate(m) => &m.enrollment,
            Self::TokenUpdate(m) => &m.enrollment,
            Self::CheckOut(m) => &m.enrollment,
            Self::UserAuthenticate(m) => &m.enrollment,
            Self::SetBootstrapToken(m) => &m.enrollment,
            Self::GetBootstrapToken(m) => &m.enrollment,
            Self::DeclarativeManagement(m) => &m.enrollment,
        }
    }
}

/// Authenticate message - initial device identity.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Authenticate {
    /// Enrollment identification, filled in by [`parse_checkin`].
    #[serde(skip)]
    pub enrollment: Enrollment,

    /// Device topic for push notifications.
    pub topic: String,

    #[serde(default)]
    pub build_version: Option<String>,

    #[serde(default, rename = "OSVersion")]
    pub os_version: Option<String>,

    #[serde(default)]
    pub product_name: Option<String>,

    #[serde(default)]
    pub serial_number: Option<String>,

    #[serde(default)]
    pub device_name: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub model_name: Option<String>,

    #[serde(default, rename = "IMEI")]
    pub imei: Option<String>,

    #[serde(default, rename = "MEID")]
    pub meid: Option<String>,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// TokenUpdate message - push token registration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TokenUpdate {
    /// Enrollment identification, filled in by [`parse_checkin`].
    #[serde(skip)]
    pub enrollment: Enrollment,

    /// Device topic for push notifications.
    pub topic: String,

    /// Push token.
    pub token: plist::Data,

    /// Push magic string.
    pub push_magic: String,

    /// Unlock token (device channel only).
    #[serde(default)]
    pub unlock_token: Option<plist::Data>,

    /// Awaiting configuration (DEP).
    #[serde(default)]
    pub awaiting_configuration: bool,

    #[serde(default)]
    pub not_on_console: bool,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

impl TokenUpdate {
    /// Push token as a lowercase hex string.
    pub fn token_hex(&self) -> String {
        crate::hex_encode(self.token.as_ref())
    }
}

/// CheckOut message - device unenrollment.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckOut {
    /// Enrollment identification, filled in by [`parse_checkin`].
    #[serde(skip)]
    pub enrollment: Enrollment,

    /// Device topic.
    #[serde(default)]
    pub topic: Option<String>,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// UserAuthenticate message - user identity challenge.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserAuthenticate {
    /// Enrollment identification, filled in by [`parse_checkin`].
    #[serde(skip)]
    pub enrollment: Enrollment,

    /// Present only on the second of the two UserAuthenticate messages.
    #[serde(default)]
    pub digest_response: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

impl UserAuthenticate {
    /// Whether this is the first message of the digest exchange.
    pub fn is_initial(&self) -> bool {
        self.digest_response.as_deref().is_none_or(str::is_empty)
    }
}

/// SetBootstrapToken message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetBootstrapToken {
    /// Enrollment identification, filled in by [`parse_checkin`].
    #[serde(skip)]
    pub enrollment: Enrollment,

    /// Missing or empty means the token should be removed.
    #[serde(default)]
    pub bootstrap_token: Option<plist::Data>,

    #[serde(default)]
    pub awaiting_configuration: bool,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// GetBootstrapToken message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetBootstrapToken {
    /// Enrollment identification, filled in by [`parse_checkin`].
    #[serde(skip)]
    pub enrollment: Enrollment,

    #[serde(default)]
    pub awaiting_configuration: bool,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// DeclarativeManagement message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeclarativeManagement {
    /// Enrollment identification, filled in by [`parse_checkin`].
    #[serde(skip)]
    pub enrollment: Enrollment,

    /// DDM endpoint being accessed.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// DDM data payload.
    #[serde(default)]
    pub data: Option<plist::Data>,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// Response to the first UserAuthenticate message when challenging the user.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DigestChallenge {
    pub digest_challenge: String,
}

#[derive(serde::Deserialize)]
struct Envelope {
    #[serde(rename = "MessageType")]
    message_type: String,
}

fn decode<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T, CheckinError> {
    plist::from_bytes(data).map_err(CheckinError::Malformed)
}

/// Parse a check-in message from plist bytes.
///
/// The `MessageType` key is read first so that an unknown type is reported as
/// [`CheckinError::UnsupportedMessageType`] rather than as a malformed body.
pub fn parse_checkin(data: &[u8]) -> Result<CheckinMessage, CheckinError> {
    if data.is_empty() {
        return Err(CheckinError::EmptyBody);
    }

    let envelope: Envelope = decode(data)?;
    let message_type = envelope.message_type.parse::<MessageType>()?;
    let enrollment: Enrollment = decode(data)?;
    let raw = data.to_vec();

    let msg = match message_type {
        MessageType::Authenticate => CheckinMessage::Authenticate(Authenticate {
            enrollment,
            raw,
            ..decode(data)?
        }),
        MessageType::TokenUpdate => CheckinMessage::TokenUpdate(TokenUpdate {
            enrollment,
            raw,
            ..decode(data)?
        }),
        MessageType::CheckOut => CheckinMessage::CheckOut(CheckOut {
            enrollment,
            raw,
            ..decode(data)?
        }),
        MessageType::UserAuthenticate => CheckinMessage::UserAuthenticate(UserAuthenticate {
            enrollment,
            raw,
            ..decode(data)?
        }),
        MessageType::SetBootstrapToken => CheckinMessage::SetBootstrapToken(SetBootstrapToken {
            enrollment,
            raw,
            ..decode(data)?
        }),
        MessageType::GetBootstrapToken => CheckinMessage::GetBootstrapToken(GetBootstrapToken {
            enrollment,
            raw,
            ..decode(data)?
        }),
        MessageType::DeclarativeManagement => {
            CheckinMessage::DeclarativeManagement(DeclarativeManagement {
                enrollment,
                raw,
                ..decode(data)?
            })
        }
    };

    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plist(body: &str) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
{body}
</dict>
</plist>"#
        )
        .into_bytes()
    }

    #[test]
    fn test_parse_authenticate() {
        let body = plist(
            "<key>MessageType</key><string>Authenticate</string>
             <key>UDID</key><string>ABC123</string>
             <key>Topic</key><string>com.apple.mgmt.External.1234</string>
             <key>SerialNumber</key><string>C02XYZ</string>",
        );
        let CheckinMessage::Authenticate(msg) = parse_checkin(&body).unwrap() else {
            panic!("expected Authenticate");
        };
        assert_eq!(msg.enrollment.udid.as_deref(), Some("ABC123"));
        assert_eq!(msg.topic, "com.apple.mgmt.External.1234");
        assert_eq!(msg.serial_number.as_deref(), Some("C02XYZ"));
        assert_eq!(msg.raw, body);
    }

    #[test]
    fn test_parse_authenticate_device_details() {
        let body = plist(
            "<key>MessageType</key><string>Authenticate</string>
             <key>UDID</key><string>ABC123</string>
             <key>Topic</key><string>com.apple.mgmt.External.1234</string>
             <key>BuildVersion</key><string>21A329</string>
             <key>OSVersion</key><string>17.0</string>
             <key>ProductName</key><string>iPhone15,2</string>
             <key>SerialNumber</key><string>C02XYZ</string>
             <key>DeviceName</key><string>Test iPhone</string>
             <key>Model</key><string>MQ0G3</string>
             <key>ModelName</key><string>iPhone</string>
             <key>IMEI</key><string>35 000000 000000 0</string>
             <key>MEID</key><string>35000000000000</string>",
        );
        let msg = parse_checkin(&body).unwrap();
        assert_eq!(msg.enrollment().resolve().unwrap().id, "ABC123");

        let CheckinMessage::Authenticate(msg) = msg else {
            panic!("expected Authenticate");
        };
        assert_eq!(msg.build_version.as_deref(), Some("21A329"));
        assert_eq!(msg.os_version.as_deref(), Some("17.0"));
        assert_eq!(msg.product_name.as_deref(), Some("iPhone15,2"));
        assert_eq!(msg.serial_number.as_deref(), Some("C02XYZ"));
        assert_eq!(msg.device_name.as_deref(), Some("Test iPhone"));
        assert_eq!(msg.model.as_deref(), Some("MQ0G3"));
        assert_eq!(msg.model_name.as_deref(), Some("iPhone"));
        assert_eq!(msg.imei.as_deref(), Some("35 000000 000000 0"));
        assert_eq!(msg.meid.as_deref(), Some("35000000000000"));
    }

    #[test]
    fn test_parse_token_update_with_unlock_token() {
        let body = plist(
            "<key>MessageType</key><string>TokenUpdate</string>
             <key>UDID</key><string>ABC123</string>
             <key>Topic</key><string>com.apple.mgmt.External.1234</string>
             <key>Token</key><data>3q2+7w==</data>
             <key>PushMagic</key><string>magic-1</string>
             <key>UnlockToken</key><data>AQID</data>
             <key>AwaitingConfiguration</key><true/>
             <key>NotOnConsole</key><false/>",
        );
        let CheckinMessage::TokenUpdate(msg) = parse_checkin(&body).unwrap() else {
            panic!("expected TokenUpdate");
        };
        assert_eq!(msg.enrollment.udid.as_deref(), Some("ABC123"));
        let unlock_token: &[u8] = msg.unlock_token.as_ref().unwrap().as_ref();
        assert_eq!(unlock_token, [1, 2, 3]);
        assert!(msg.awaiting_configuration);
        assert!(!msg.not_on_console);
    }

    #[test]
    fn test_parse_checkout_with_topic() {
        let body = plist(
            "<key>MessageType</key><string>CheckOut</string>
             <key>UDID</key><string>ABC123</string>
             <key>Topic</key><string>com.apple.mgmt.External.1234</string>",
        );
        let CheckinMessage::CheckOut(msg) = parse_checkin(&body).unwrap() else {
            panic!("expected CheckOut");
        };
        assert_eq!(msg.enrollment.udid.as_deref(), Some("ABC123"));
        assert_eq!(msg.topic.as_deref(), Some("com.apple.mgmt.External.1234"));
    }

    #[test]
    fn test_parse_user_authenticate_digest_response() {
        let body = plist(
            "<key>MessageType</key><string>UserAuthenticate</string>
             <key>UDID</key><string>ABC123</string>
             <key>UserID</key><string>user-1</string>
             <key>UserShortName</key><string>appleseed</string>
             <key>DigestResponse</key><string>digest</string>
             <key>AuthToken</key><string>token-1</string>",
        );
        let CheckinMessage::UserAuthenticate(msg) = parse_checkin(&body).unwrap() else {
            panic!("expected UserAuthenticate");
        };
        assert!(!msg.is_initial());
        assert_eq!(msg.auth_token.as_deref(), Some("token-1"));
        assert_eq!(msg.enrollment.user_id.as_deref(), Some("user-1"));
        assert_eq!(msg.enrollment.user_short_name.as_deref(), Some("appleseed"));
    }

    #[test]
    fn test_parse_bootstrap_and_declarative_messages() {
        let body = plist(
            "<key>MessageType</key><string>SetBootstrapToken</string>
             <key>UDID</key><string>ABC123</string>
             <key>BootstrapToken</key><data>AQID</data>
             <key>AwaitingConfiguration</key><true/>",
        );
        let CheckinMessage::SetBootstrapToken(msg) = parse_checkin(&body).unwrap() else {
            panic!("expected SetBootstrapToken");
        };
        assert!(msg.bootstrap_token.is_some());
        assert!(msg.awaiting_configuration);

        let body = plist(
            "<key>MessageType</key><string>DeclarativeManagement</string>
             <key>EnrollmentID</key><string>E-1</string>
             <key>Endpoint</key><string>tokens</string>
             <key>Data</key><data>e30=</data>",
        );
        let msg = parse_checkin(&body).unwrap();
        assert_eq!(msg.enrollment().resolve().unwrap().id, "E-1");

        let CheckinMessage::DeclarativeManagement(msg) = msg else {
            panic!("expected DeclarativeManagement");
        };
        assert_eq!(msg.endpoint.as_deref(), Some("tokens"));
        let data: &[u8] = msg.data.as_ref().unwrap().as_ref();
        assert_eq!(data, b"{}");
    }

    #[test]
    fn test_parse_token_update() {
        let body = plist(
            "<key>MessageType</key><string>TokenUpdate</string>
             <key>UDID</key><string>ABC123</string>
             <key>UserID</key><string>user-1</string>
             <key>Topic</key><string>com.apple.mgmt.External.1234</string>
             <key>Token</key><data>3q2+7w==</data>
             <key>PushMagic</key><string>magic-1</string>",
        );
        let msg = parse_checkin(&body).unwrap();
        assert_eq!(msg.message_type(), MessageType::TokenUpdate);
        assert_eq!(msg.enrollment().user_id.as_deref(), Some("user-1"));

        let CheckinMessage::TokenUpdate(msg) = msg else {
            panic!("expected TokenUpdate");
        };
        assert_eq!(msg.token_hex(), "deadbeef");
        assert_eq!(msg.push_magic, "magic-1");
        assert!(msg.unlock_token.is_none());
    }

    #[test]
    fn test_parse_user_authenticate_initial() {
        let body = plist(
            "<key>MessageType</key><string>UserAuthenticate</string>
             <key>UDID</key><string>ABC123</string>
             <key>UserID</key><string>user-1</string>",
        );
        let CheckinMessage::UserAuthenticate(msg) = parse_checkin(&body).unwrap() else {
            panic!("expected UserAuthenticate");
        };
        assert!(msg.is_initial());
    }

    #[test]
    fn test_unknown_message_type() {
        let body = plist(
            "<key>MessageType</key><string>GetToken</string>
             <key>UDID</key><string>ABC123</string>",
        );
        match parse_checkin(&body) {
            Err(CheckinError::UnsupportedMessageType(t)) => assert_eq!(t, "GetToken"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_and_malformed_bodies() {
        assert!(matches!(parse_checkin(b""), Err(CheckinError::EmptyBody)));
        assert!(matches!(
            parse_checkin(b"not a plist"),
            Err(CheckinError::Malformed(_))
        ));

        // Known type but missing required Topic.
        let body = plist(
            "<key>MessageType</key><string>Authenticate</string>
             <key>UDID</key><string>ABC123</string>",
        );
        assert!(matches!(parse_checkin(&body), Err(CheckinError::Malformed(_))));
    }
}
