//! Progress events emitted to the shell.

use anna_platform::Category;
use tokio::sync::mpsc;

use crate::types::BatchSummary;

/// Event emitted while selections are queued and uploaded.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Selection parked in the deferred queue.
    Queued { queued: usize },
    /// Pending deferred selections were dropped by a mode change.
    QueueDiscarded { dropped: usize },
    /// A batch was launched.
    BatchStarted { batch_id: u64, total: usize },
    /// A task is about to retry.
    Retrying {
        name: String,
        category: Category,
        attempt: u32,
        reason: String,
    },
    /// An asset was published. Downstream scanners key off `remote_id`.
    Succeeded {
        name: String,
        category: Category,
        remote_id: String,
    },
    Failed {
        name: String,
        category: Category,
        reason: String,
    },
    /// The account is suspended. Raised as soon as it is detected,
    /// independent of the batch summary.
    AccountSuspended { message: String },
    Progress {
        batch_id: u64,
        completed: usize,
        total: usize,
    },
    BatchFinished {
        batch_id: u64,
        summary: BatchSummary,
    },
}

/// Cloneable sending half of the event stream.
///
/// Unbounded so that a slow or absent reader never stalls an upload.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<UploadEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UploadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A sink whose events go nowhere.
    pub fn disconnected() -> Self {
        Self::channel().0
    }

    pub fn emit(&self, event: UploadEvent) {
        // A dropped receiver just means nobody is listening.
        let _ = self.tx.send(event);
    }
}
