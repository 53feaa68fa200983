use thiserror::Error;

use crate::models::RunStatus;

pub type Result<T> = std::result::Result<T, SupernoteError>;

/// Error taxonomy for the orchestration layer.
///
/// Every variant propagates to the orchestrator/UI boundary; the core never
/// swallows errors and never retries across calls on its own. The HTTP
/// transport performs a bounded retry for transient faults before reporting
/// `ProviderUnavailable`.
#[derive(Error, Debug)]
pub enum SupernoteError {
    /// Network, auth, quota, or protocol failure on a remote call.
    #[error("Provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    /// The remote store rejected a file or never finished indexing it.
    /// The filename stays unindexed; re-ingesting the same name retries.
    #[error("Ingestion of '{filename}' failed: {reason}")]
    IngestionFailed { filename: String, reason: String },

    /// A run reached a terminal state other than completed. The user message
    /// remains in history; no assistant reply was appended.
    #[error("Run ended in terminal status '{status}'")]
    RunFailed { status: RunStatus },

    /// A run never reached a terminal state within the configured bound.
    /// Remote cancellation was attempted before this was raised.
    #[error("Run did not complete within {waited_secs}s")]
    RunTimedOut { waited_secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SupernoteError {
    /// Shorthand for the common remote-call failure case.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            message: message.into(),
        }
    }
}
