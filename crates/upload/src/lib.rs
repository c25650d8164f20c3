//! Upload engine: turns selected image files into tracked remote assets.
//!
//! This crate implements the **orchestration logic** only. It has no UI and
//! no HTTP code; the caller provides a [`Transport`](anna_platform::Transport)
//! and drives the [`QueueController`] entry points.
//!
//! # Pipeline
//!
//! 1. **Select**: files arrive with a category (or both categories)
//! 2. **Queue**: launched immediately, or parked until a mass batch starts
//! 3. **Transform**: optional normalization and slip variants
//! 4. **Upload**: one retrying [`UploadTask`] per asset and category
//! 5. **Account**: each task completes its batch ticket exactly once

pub mod batch;
pub mod classify;
pub mod context;
pub mod error;
pub mod events;
pub mod queue;
pub mod retry;
pub mod task;
pub mod token;
pub mod types;

// Re-export primary types for convenience.
pub use batch::{Batch, BatchTicket};
pub use classify::{Classification, classify};
pub use context::UploadContext;
pub use error::UploadError;
pub use events::{EventSink, UploadEvent};
pub use queue::{QueueController, QueueMode, SelectOutcome};
pub use retry::{Backoff, RetryPolicy};
pub use task::UploadTask;
pub use token::SessionTokenProvider;
pub use types::{
    AssetSubmission, BatchSummary, FailedItem, FailureKind, NamingPolicy, SubmissionLabel,
    SucceededItem, UploadOutcome,
};
