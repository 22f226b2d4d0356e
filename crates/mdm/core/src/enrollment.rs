//! Enrollment types for device and user identification.

/// Static `UserID` reported by Shared iPad user channels.
pub const SHARED_IPAD_USER_ID: &str = "FFFFFFFF-FFFF-FFFF-FFFF-FFFFFFFFFFFF";

/// Type of MDM enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EnrollType {
    /// Standard device enrollment (UDID-based).
    Device,
    /// User channel on a device.
    User,
    /// User Enrollment device (per-enrollment identifiers).
    UserEnrollmentDevice,
    /// User channel on a UserEnrollmentDevice.
    UserEnrollment,
    /// Shared iPad user channel.
    SharedIpad,
}

impl EnrollType {
    /// Every enrollment type, in code order.
    pub const ALL: [EnrollType; 5] = [
        Self::Device,
        Self::User,
        Self::UserEnrollmentDevice,
        Self::UserEnrollment,
        Self::SharedIpad,
    ];

    /// Stable numeric code used in storage.
    pub fn code(self) -> i32 {
        match self {
            Self::Device => 1,
            Self::User => 2,
            Self::UserEnrollmentDevice => 3,
            Self::UserEnrollment => 4,
            Self::SharedIpad => 5,
        }
    }

    /// Decode a stored numeric code.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Whether this type names a user channel.
    pub fn is_user_channel(self) -> bool {
        matches!(self, Self::User | Self::UserEnrollment | Self::SharedIpad)
    }
}

impl std::fmt::Display for EnrollType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device => write!(f, "Device"),
            Self::User => write!(f, "User"),
            Self::UserEnrollmentDevice => write!(f, "UserEnrollmentDevice"),
            Self::UserEnrollment => write!(f, "UserEnrollment"),
            Self::SharedIpad => write!(f, "SharedIPad"),
        }
    }
}

/// Raw enrollment data from check-in messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Enrollment {
    /// Device UDID.
    #[serde(default, rename = "UDID")]
    pub udid: Option<String>,

    /// User ID for user-channel enrollments.
    #[serde(default, rename = "UserID")]
    pub user_id: Option<String>,

    /// User short name (Managed Apple ID on Shared iPad).
    #[serde(default)]
    pub user_short_name: Option<String>,

    /// User long name.
    #[serde(default)]
    pub user_long_name: Option<String>,

    /// Enrollment ID for User Enrollment devices.
    #[serde(default, rename = "EnrollmentID")]
    pub enrollment_id: Option<String>,

    /// Enrollment User ID for User Enrollment.
    #[serde(default, rename = "EnrollmentUserID")]
    pub enrollment_user_id: Option<String>,
}

/// Collapsed form of [`Enrollment`]: a type plus device and user channel IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnrollment {
    pub enroll_type: EnrollType,
    pub device_channel_id: String,
    pub user_channel_id: Option<String>,
    pub is_user_channel: bool,
}

/// Resolved enrollment identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EnrollId {
    /// The enrollment type.
    pub enroll_type: EnrollType,
    /// Primary identifier. `device:user` for user channels.
    pub id: String,
    /// Parent device ID (for user channels).
    pub parent_id: Option<String>,
}

impl EnrollId {
    /// Whether this is a user-channel enrollment.
    pub fn is_user_channel(&self) -> bool {
        self.parent_id.is_some()
    }

    /// The device-channel ID this enrollment belongs to.
    pub fn device_id(&self) -> &str {
        self.parent_id.as_deref().unwrap_or(&self.id)
    }
}

impl std::fmt::Display for EnrollId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Enrollment resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("no device or enrollment identifier in message")]
    NoIdentity,
    #[error("empty enrollment ID")]
    EmptyId,
    #[error("user channel without a user identifier")]
    EmptyUserChannel,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

impl Enrollment {
    /// Narrow the raw fields down to an enrollment type and its channel IDs.
    pub fn resolve_channels(&self) -> Result<ResolvedEnrollment, ResolutionError> {
        if let Some(udid) = present(&self.udid) {
            let Some(user_id) = present(&self.user_id) else {
                return Ok(ResolvedEnrollment {
                    enroll_type: EnrollType::Device,
                    device_channel_id: udid.to_string(),
                    user_channel_id: None,
                    is_user_channel: false,
                });
            };

            // Shared iPad reports a static UserID; the short name identifies the user.
            let (enroll_type, user_channel_id) = if user_id == SHARED_IPAD_USER_ID {
                (EnrollType::SharedIpad, present(&self.user_short_name))
            } else {
                (EnrollType::User, Some(user_id))
            };

            return Ok(ResolvedEnrollment {
                enroll_type,
                device_channel_id: udid.to_string(),
                user_channel_id: user_channel_id.map(str::to_string),
                is_user_channel: true,
            });
        }

        if let Some(enrollment_id) = present(&self.enrollment_id) {
            let user_channel_id = present(&self.enrollment_user_id);
            let enroll_type = if user_channel_id.is_some() {
                EnrollType::UserEnrollment
            } else {
                EnrollType::UserEnrollmentDevice
            };

            return Ok(ResolvedEnrollment {
                enroll_type,
                device_channel_id: enrollment_id.to_string(),
                user_channel_id: user_channel_id.map(str::to_string),
                is_user_channel: user_channel_id.is_some(),
            });
        }

        Err(ResolutionError::NoIdentity)
    }

    /// Resolve this enrollment to an [`EnrollId`].
    pub fn resolve(&self) -> Result<EnrollId, ResolutionError> {
        let resolved = self.resolve_channels()?;

        if resolved.device_channel_id.is_empty() {
            return Err(ResolutionError::EmptyId);
        }

        if !resolved.is_user_channel {
            return Ok(EnrollId {
                enroll_type: resolved.enroll_type,
                id: resolved.device_channel_id,
                parent_id: None,
            });
        }

        let user_channel_id = resolved
            .user_channel_id
            .filter(|u| !u.is_empty())
            .ok_or(ResolutionError::EmptyUserChannel)?;

        Ok(EnrollId {
            enroll_type: resolved.enroll_type,
            id: format!("{}:{}", resolved.device_channel_id, user_channel_id),
            parent_id: Some(resolved.device_channel_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(udid: &str) -> Enrollment {
        Enrollment {
            udid: Some(udid.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_device_enrollment() {
        let id = device("ABC123").resolve().unwrap();
        assert_eq!(id.enroll_type, EnrollType::Device);
        assert_eq!(id.id, "ABC123");
        assert!(id.parent_id.is_none());
        assert!(!id.is_user_channel());

        let resolved = device("ABC123").resolve_channels().unwrap();
        assert!(!resolved.is_user_channel);
    }

    #[test]
    fn test_user_enrollment() {
        let enrollment = Enrollment {
            user_id: Some("user-456".into()),
            ..device("ABC123")
        };
        let id = enrollment.resolve().unwrap();
        assert_eq!(id.enroll_type, EnrollType::User);
        assert_eq!(id.id, "ABC123:user-456");
        assert_eq!(id.parent_id.as_deref(), Some("ABC123"));
        assert_eq!(id.device_id(), "ABC123");
    }

    #[test]
    fn test_shared_ipad_uses_short_name() {
        let enrollment = Enrollment {
            user_id: Some(SHARED_IPAD_USER_ID.into()),
            user_short_name: Some("appleseed@example.com".into()),
            ..device("IPAD1")
        };
        let id = enrollment.resolve().unwrap();
        assert_eq!(id.enroll_type, EnrollType::SharedIpad);
        assert_eq!(id.id, "IPAD1:appleseed@example.com");
        assert_eq!(id.parent_id.as_deref(), Some("IPAD1"));
    }

    #[test]
    fn test_shared_ipad_without_short_name_fails() {
        let enrollment = Enrollment {
            user_id: Some(SHARED_IPAD_USER_ID.into()),
            ..device("IPAD1")
        };
        assert_eq!(
            enrollment.resolve().unwrap_err(),
            ResolutionError::EmptyUserChannel
        );
    }

    #[test]
    fn test_user_enrollment_device() {
        let enrollment = Enrollment {
            enrollment_id: Some("E-1".into()),
            ..Default::default()
        };
        let id = enrollment.resolve().unwrap();
        assert_eq!(id.enroll_type, EnrollType::UserEnrollmentDevice);
        assert_eq!(id.id, "E-1");
        assert!(id.parent_id.is_none());
    }

    #[test]
    fn test_user_enrollment_user_channel() {
        let enrollment = Enrollment {
            enrollment_id: Some("E-1".into()),
            enrollment_user_id: Some("EU-9".into()),
            ..Default::default()
        };
        let id = enrollment.resolve().unwrap();
        assert_eq!(id.enroll_type, EnrollType::UserEnrollment);
        assert_eq!(id.id, "E-1:EU-9");
        assert_eq!(id.parent_id.as_deref(), Some("E-1"));
    }

    #[test]
    fn test_udid_takes_precedence_over_enrollment_id() {
        let enrollment = Enrollment {
            enrollment_id: Some("E-1".into()),
            ..device("ABC123")
        };
        let id = enrollment.resolve().unwrap();
        assert_eq!(id.enroll_type, EnrollType::Device);
        assert_eq!(id.id, "ABC123");
    }

    #[test]
    fn test_no_identity() {
        let enrollment = Enrollment {
            user_id: Some("user-456".into()),
            user_short_name: Some("jane".into()),
            ..Default::default()
        };
        assert_eq!(enrollment.resolve().unwrap_err(), ResolutionError::NoIdentity);
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let enrollment = Enrollment {
            udid: Some(String::new()),
            enrollment_id: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(enrollment.resolve().unwrap_err(), ResolutionError::NoIdentity);

        let enrollment = Enrollment {
            user_id: Some(String::new()),
            ..device("ABC123")
        };
        assert_eq!(enrollment.resolve().unwrap().enroll_type, EnrollType::Device);
    }

    #[test]
    fn test_composite_id_invariant() {
        let cases = [
            ("D1", Some("U1"), None, None),
            ("D2", Some(SHARED_IPAD_USER_ID), Some("short"), None),
            ("", None, None, Some(("E3", "EU3"))),
        ];

        for (udid, user_id, short, enrollment) in cases {
            let e = Enrollment {
                udid: Some(udid.to_string()),
                user_id: user_id.map(String::from),
                user_short_name: short.map(String::from),
                enrollment_id: enrollment.map(|(d, _)| d.to_string()),
                enrollment_user_id: enrollment.map(|(_, u)| u.to_string()),
                ..Default::default()
            };
            let resolved = e.resolve_channels().unwrap();
            let id = e.resolve().unwrap();
            assert!(resolved.is_user_channel);
            let user = resolved.user_channel_id.unwrap();
            assert_eq!(id.id, format!("{}:{}", resolved.device_channel_id, user));
            assert_eq!(id.parent_id.as_deref(), Some(resolved.device_channel_id.as_str()));
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let enrollment = Enrollment {
            user_id: Some("u".into()),
            ..device("d")
        };
        assert_eq!(enrollment.resolve(), enrollment.resolve());
    }

    #[test]
    fn test_type_codes_round_trip() {
        for t in EnrollType::ALL {
            assert_eq!(EnrollType::from_code(t.code()), Some(t));
        }
        assert_eq!(EnrollType::from_code(0), None);
        assert_eq!(EnrollType::from_code(6), None);
    }
}
