//! Push failures.

/// Failure of a single push. Reported per target and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("payload is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("push connection is closed")]
    ConnectionClosed,

    #[error("no push certificate for topic {0}")]
    NoCredential(String),

    #[error("push request timed out")]
    Timeout,

    #[error("unusable push credential: {0}")]
    Credential(String),

    #[error("push transport error: {0}")]
    Transport(String),

    #[error("push storage error: {0}")]
    Storage(String),
}

impl PushError {
    pub(crate) fn storage(report: color_eyre::eyre::Report) -> Self {
        Self::Storage(format!("{report:#}"))
    }

    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}
