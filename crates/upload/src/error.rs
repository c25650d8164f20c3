//! Upload error taxonomy.

use anna_imaging::TransformError;
use anna_platform::TransportError;

use crate::types::FailureKind;

/// Everything that can stop a submission from succeeding.
///
/// None of these escape an [`UploadTask`](crate::UploadTask): each one is
/// either retried or turned into a terminal failure outcome.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("session token rejected: {0}")]
    AuthExpired(String),

    #[error("display name rejected: {0}")]
    NameRejected(String),

    #[error("account suspended: {0}")]
    AccountSuspended(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("upload rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed upload response ({status}): {body}")]
    Malformed { status: u16, body: String },

    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
}

impl UploadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            UploadError::AuthExpired(_) => FailureKind::AuthExpired,
            UploadError::NameRejected(_) => FailureKind::NameRejected,
            UploadError::AccountSuspended(_) => FailureKind::AccountSuspended,
            UploadError::Transport(_) => FailureKind::Transport,
            UploadError::Rejected { .. } => FailureKind::Rejected,
            UploadError::Malformed { .. } => FailureKind::Malformed,
            UploadError::Transform(_) => FailureKind::Transform,
        }
    }

    /// Errors worth another attempt, subject to the retry bound.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::AuthExpired(_) | UploadError::NameRejected(_) | UploadError::Transport(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}
