//! Data types for the upload flow.

use std::fmt;

use anna_imaging::ImageFile;
use anna_platform::types::{DEFAULT_DESCRIPTION, content_type_for};
use anna_platform::{Category, Creator, SubmitRequest};
use serde::{Deserialize, Serialize};

/// Generic display name used when the platform rejects the real one.
pub const DEFAULT_FORCED_NAME: &str = "Uploaded Using AnnaUploader";

/// Display-name policy, read once per batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingPolicy {
    /// Skip the file-derived name and always use `forced_name`.
    #[serde(default)]
    pub use_forced_name: bool,
    #[serde(default = "default_forced_name")]
    pub forced_name: String,
}

fn default_forced_name() -> String {
    DEFAULT_FORCED_NAME.to_string()
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            use_forced_name: false,
            forced_name: default_forced_name(),
        }
    }
}

/// Identifies a submission in events and summaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubmissionLabel {
    pub name: String,
    pub category: Category,
}

impl fmt::Display for SubmissionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.category)
    }
}

/// One asset headed for one category.
#[derive(Debug, Clone)]
pub struct AssetSubmission {
    pub file: ImageFile,
    pub category: Category,
    pub display_name: String,
    pub forced_name: bool,
    pub attempts: u32,
}

impl AssetSubmission {
    /// Creates a submission, deriving the display name from the file name
    /// (everything before the first `.`) unless the policy forces one.
    pub fn new(file: ImageFile, category: Category, naming: &NamingPolicy) -> Self {
        let derived = display_name_for(&file.name);
        let (display_name, forced_name) = if naming.use_forced_name || derived.is_empty() {
            (naming.forced_name.clone(), true)
        } else {
            (derived, false)
        };

        Self {
            file,
            category,
            display_name,
            forced_name,
            attempts: 0,
        }
    }

    pub fn label(&self) -> SubmissionLabel {
        SubmissionLabel {
            name: self.file.name.clone(),
            category: self.category,
        }
    }

    /// Switches to the generic fallback name. Returns false if already forced.
    pub fn force_name(&mut self, forced_name: &str) -> bool {
        if self.forced_name {
            return false;
        }
        self.display_name = forced_name.to_string();
        self.forced_name = true;
        true
    }

    /// Builds the transport request for the current attempt.
    pub fn to_request(&self, creator: Creator) -> SubmitRequest {
        SubmitRequest {
            file_name: self.file.name.clone(),
            content_type: content_type_for(&self.file.name),
            data: self.file.data.clone(),
            display_name: self.display_name.clone(),
            description: DEFAULT_DESCRIPTION.to_string(),
            category: self.category,
            creator,
        }
    }
}

/// Display name derived from a file name.
pub fn display_name_for(file_name: &str) -> String {
    file_name.split('.').next().unwrap_or_default().trim().to_string()
}

/// Category of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    AuthExpired,
    NameRejected,
    AccountSuspended,
    Transport,
    Rejected,
    Malformed,
    Transform,
    Aborted,
}

impl FailureKind {
    /// Fatal failures affect the whole account, not just one asset.
    pub fn is_fatal(self) -> bool {
        matches!(self, FailureKind::AccountSuspended)
    }
}

/// Terminal result of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success { remote_id: String },
    Failure { kind: FailureKind, reason: String },
}

impl UploadOutcome {
    pub fn failure(err: &crate::UploadError) -> Self {
        UploadOutcome::Failure {
            kind: err.kind(),
            reason: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SucceededItem {
    pub name: String,
    pub category: Category,
    pub remote_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub name: String,
    pub category: Category,
    pub kind: FailureKind,
    pub reason: String,
}

/// Final report of a batch, for display by the shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: Vec<SucceededItem>,
    pub failed: Vec<FailedItem>,
}

impl BatchSummary {
    pub fn completed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.completed() == self.total
    }

    /// True if any submission hit an account suspension.
    pub fn account_suspended(&self) -> bool {
        self.failed.iter().any(|f| f.kind.is_fatal())
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed",
            self.succeeded.len(),
            self.failed.len()
        )?;
        for item in &self.failed {
            write!(f, "\n  {} ({}): {}", item.name, item.category, item.reason)?;
        }
        Ok(())
    }
}
