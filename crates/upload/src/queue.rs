//! Queue controller: turns file selections into batches of upload tasks.
//!
//! In [`QueueMode::Immediate`] every selection is transformed and launched
//! as its own batch. In [`QueueMode::Deferred`] selections pile up until
//! [`QueueController::start_deferred_batch`] drains them into one batch.
//! Switching modes always throws away whatever is pending.

use std::sync::{Arc, Mutex};

use anna_imaging::{ImageFile, TransformError, TransformPipeline, TransformSpec};
use anna_platform::{Category, Creator, Transport};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::batch::Batch;
use crate::context::UploadContext;
use crate::error::UploadError;
use crate::events::{EventSink, UploadEvent};
use crate::retry::RetryPolicy;
use crate::task::UploadTask;
use crate::types::{
    AssetSubmission, BatchSummary, FailureKind, NamingPolicy, SubmissionLabel, UploadOutcome,
};

/// How selections are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueMode {
    #[default]
    Immediate,
    /// "Mass" mode: accumulate, then upload everything at once.
    Deferred,
}

/// Result of [`QueueController::select_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Nothing was selected.
    Ignored,
    /// Parked in the deferred queue; `queued` is the new queue size.
    Queued { queued: usize },
    /// Uploaded right away.
    Completed(BatchSummary),
}

/// One user selection: files plus the categories each file goes to.
#[derive(Debug, Clone)]
struct Selection {
    files: Vec<ImageFile>,
    categories: Vec<Category>,
}

impl Selection {
    fn submissions(&self) -> usize {
        self.files.len() * self.categories.len()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    mode: QueueMode,
    pending: Vec<Selection>,
}

impl QueueState {
    fn queued(&self) -> usize {
        self.pending.iter().map(Selection::submissions).sum()
    }
}

/// Work produced by the transform stage, ready to become tickets.
#[derive(Default)]
struct Prepared {
    submissions: Vec<AssetSubmission>,
    failed: Vec<(SubmissionLabel, UploadOutcome)>,
}

/// Entry point used by the shell.
pub struct QueueController {
    ctx: Arc<UploadContext>,
    pipeline: TransformPipeline,
    state: Mutex<QueueState>,
    current: Mutex<Option<Arc<Batch>>>,
    events_rx: Option<mpsc::UnboundedReceiver<UploadEvent>>,
}

impl QueueController {
    /// Creates a controller in immediate mode.
    ///
    /// Naming, retry and transform settings are fixed for the controller's
    /// lifetime; build a new controller to pick up changed settings.
    pub fn new(
        transport: Arc<dyn Transport>,
        creator: Creator,
        naming: NamingPolicy,
        retry: RetryPolicy,
        transform: TransformSpec,
    ) -> Self {
        let (events, events_rx) = EventSink::channel();
        let ctx = UploadContext::new(transport, creator, naming, retry, events);
        Self {
            ctx: Arc::new(ctx),
            pipeline: TransformPipeline::new(transform),
            state: Mutex::new(QueueState::default()),
            current: Mutex::new(None),
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub fn context(&self) -> &UploadContext {
        &self.ctx
    }

    pub fn mode(&self) -> QueueMode {
        self.lock_state().mode
    }

    /// Number of submissions waiting in the deferred queue.
    pub fn queued(&self) -> usize {
        self.lock_state().queued()
    }

    /// Switches mode, discarding any pending deferred selections.
    ///
    /// Returns the number of submissions dropped.
    pub fn set_mode(&self, mode: QueueMode) -> usize {
        let dropped = {
            let mut state = self.lock_state();
            let dropped = state.queued();
            state.pending.clear();
            state.mode = mode;
            dropped
        };

        info!(?mode, dropped, "queue mode changed");
        if dropped > 0 {
            self.ctx.events.emit(UploadEvent::QueueDiscarded { dropped });
        }
        dropped
    }

    /// Flips between immediate and deferred mode. Returns the new mode.
    pub fn toggle_mode(&self) -> QueueMode {
        let next = match self.mode() {
            QueueMode::Immediate => QueueMode::Deferred,
            QueueMode::Deferred => QueueMode::Immediate,
        };
        self.set_mode(next);
        next
    }

    /// Handles a user selection of files for `category`, or for every
    /// category when `both` is set.
    ///
    /// In immediate mode this runs the whole batch and returns its summary.
    pub async fn select_files(
        &self,
        files: Vec<ImageFile>,
        category: Category,
        both: bool,
    ) -> SelectOutcome {
        if files.is_empty() {
            warn!("empty selection ignored");
            return SelectOutcome::Ignored;
        }

        let categories = if both {
            Category::ALL.to_vec()
        } else {
            vec![category]
        };
        let selection = Selection { files, categories };

        let queued = {
            let mut state = self.lock_state();
            match state.mode {
                QueueMode::Deferred => {
                    state.pending.push(selection);
                    Ok(state.queued())
                }
                QueueMode::Immediate => Err(selection),
            }
        };

        match queued {
            Ok(queued) => {
                info!(queued, "selection queued");
                self.ctx.events.emit(UploadEvent::Queued { queued });
                SelectOutcome::Queued { queued }
            }
            Err(selection) => SelectOutcome::Completed(self.launch(vec![selection]).await),
        }
    }

    /// Drains the deferred queue into one batch and returns to immediate mode.
    pub async fn start_deferred_batch(&self) -> BatchSummary {
        let pending = {
            let mut state = self.lock_state();
            state.mode = QueueMode::Immediate;
            std::mem::take(&mut state.pending)
        };

        if pending.is_empty() {
            info!("deferred queue is empty, nothing to upload");
            return BatchSummary::default();
        }

        self.launch(pending).await
    }

    /// `"N queued"` in deferred mode, otherwise `"X of Y processed"` for the
    /// most recent batch.
    pub fn current_status(&self) -> String {
        {
            let state = self.lock_state();
            if state.mode == QueueMode::Deferred {
                return format!("{} queued", state.queued());
            }
        }

        match self.current_batch() {
            Some(batch) => batch.status_line(),
            None => "0 of 0 processed".to_string(),
        }
    }

    /// The batch launched most recently, if any.
    pub fn current_batch(&self) -> Option<Arc<Batch>> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Transforms, launches and awaits one batch.
    async fn launch(&self, selections: Vec<Selection>) -> BatchSummary {
        let prepared = self.prepare(selections).await;

        let labels = prepared
            .submissions
            .iter()
            .map(AssetSubmission::label)
            .chain(prepared.failed.iter().map(|(label, _)| label.clone()))
            .collect();
        let (batch, mut tickets) = Batch::open(labels, self.ctx.events.clone());
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&batch));

        info!(batch = batch.id(), total = batch.total(), "batch started");
        self.ctx.events.emit(UploadEvent::BatchStarted {
            batch_id: batch.id(),
            total: batch.total(),
        });

        // Tickets are in label order: submissions first, then transform failures.
        let failed_tickets = tickets.split_off(prepared.submissions.len());
        for (ticket, (_, outcome)) in failed_tickets.into_iter().zip(prepared.failed) {
            ticket.complete(outcome);
        }

        let mut set = JoinSet::new();
        for (submission, ticket) in prepared.submissions.into_iter().zip(tickets) {
            let ctx = Arc::clone(&self.ctx);
            set.spawn(async move {
                UploadTask::new(submission).run_tracked(&ctx, ticket).await;
            });
        }

        while let Some(joined) = set.join_next().await {
            // The task's ticket records the abort when it is dropped.
            if let Err(e) = joined {
                error!(batch = batch.id(), error = %e, "upload task panicked");
            }
        }

        let summary = batch.summary();
        info!(
            batch = batch.id(),
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "batch finished"
        );
        self.ctx.events.emit(UploadEvent::BatchFinished {
            batch_id: batch.id(),
            summary: summary.clone(),
        });
        summary
    }

    /// Runs the transform pipeline and expands each output into one
    /// submission per category.
    async fn prepare(&self, selections: Vec<Selection>) -> Prepared {
        let mut prepared = Prepared::default();

        // Every transform is started before any is awaited. Results are
        // consumed in selection order.
        let pending: Vec<_> = selections
            .into_iter()
            .flat_map(|selection| {
                let categories = selection.categories;
                selection
                    .files
                    .into_iter()
                    .map(move |file| {
                        (file.name.clone(), categories.clone(), self.transform(file))
                    })
            })
            .collect();

        for (name, categories, job) in pending {
            match job.finish(&name).await {
                Ok(outputs) => {
                    for output in &outputs {
                        for &category in &categories {
                            prepared.submissions.push(AssetSubmission::new(
                                output.clone(),
                                category,
                                &self.ctx.naming,
                            ));
                        }
                    }
                }
                Err(outcome) => {
                    for &category in &categories {
                        prepared.failed.push((
                            SubmissionLabel {
                                name: name.clone(),
                                category,
                            },
                            outcome.clone(),
                        ));
                    }
                }
            }
        }

        debug!(
            submissions = prepared.submissions.len(),
            failed = prepared.failed.len(),
            "selection prepared"
        );
        prepared
    }

    fn transform(&self, file: ImageFile) -> TransformJob {
        if self.pipeline.spec().is_passthrough() {
            return TransformJob::Ready(file);
        }

        let pipeline = self.pipeline;
        TransformJob::Running(tokio::task::spawn_blocking(move || pipeline.run(file)))
    }
}

/// A file's transform, either skipped or running on the blocking pool.
enum TransformJob {
    Ready(ImageFile),
    Running(JoinHandle<Result<Vec<ImageFile>, TransformError>>),
}

impl TransformJob {
    async fn finish(self, name: &str) -> Result<Vec<ImageFile>, UploadOutcome> {
        let handle = match self {
            TransformJob::Ready(file) => return Ok(vec![file]),
            TransformJob::Running(handle) => handle,
        };

        match handle.await {
            Ok(Ok(outputs)) if outputs.is_empty() => {
                warn!(file = %name, "transform produced no output");
                Err(UploadOutcome::Failure {
                    kind: FailureKind::Transform,
                    reason: "transform produced no output".into(),
                })
            }
            Ok(Ok(outputs)) => Ok(outputs),
            Ok(Err(e)) => Err(transform_failure(name, e)),
            Err(e) => {
                error!(file = %name, error = %e, "transform task panicked");
                Err(UploadOutcome::Failure {
                    kind: FailureKind::Aborted,
                    reason: format!("transform aborted: {e}"),
                })
            }
        }
    }
}

fn transform_failure(name: &str, e: TransformError) -> UploadOutcome {
    let err = UploadError::from(e);
    warn!(file = %name, error = %err, "transform failed");
    UploadOutcome::failure(&err)
}
