//! Reports sent by devices to the connect endpoint.

use crate::{CheckinError, Enrollment};

/// Command results reported by a device when it polls for work.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectReport {
    /// Enrollment identification, filled in by [`parse_connect_report`].
    #[serde(skip)]
    pub enrollment: Enrollment,

    /// Command UUID being reported, absent when idle.
    #[serde(default, rename = "CommandUUID")]
    pub command_uuid: Option<String>,

    /// Status of command execution.
    pub status: CommandStatus,

    /// Error chain (if failed).
    #[serde(default)]
    pub error_chain: Vec<ErrorChainItem>,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// Command execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CommandStatus {
    /// Command executed successfully.
    Acknowledged,
    /// Command failed.
    Error,
    /// Command format error.
    CommandFormatError,
    /// Device is busy, try later.
    NotNow,
    /// Idle (no command was pending).
    Idle,
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acknowledged => write!(f, "Acknowledged"),
            Self::Error => write!(f, "Error"),
            Self::CommandFormatError => write!(f, "CommandFormatError"),
            Self::NotNow => write!(f, "NotNow"),
            Self::Idle => write!(f, "Idle"),
        }
    }
}

/// Error chain item from device.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorChainItem {
    pub error_code: i64,

    pub error_domain: String,

    #[serde(default)]
    pub localized_description: Option<String>,

    #[serde(default, rename = "USEnglishDescription")]
    pub us_english_description: Option<String>,
}

/// Parse a connect report from plist bytes.
pub fn parse_connect_report(data: &[u8]) -> Result<ConnectReport, CheckinError> {
    if data.is_empty() {
        return Err(CheckinError::EmptyBody);
    }

    let enrollment: Enrollment = plist::from_bytes(data).map_err(CheckinError::Malformed)?;
    let report: ConnectReport = plist::from_bytes(data).map_err(CheckinError::Malformed)?;

    Ok(ConnectReport {
        enrollment,
        raw: data.to_vec(),
        ..report
    })
}
