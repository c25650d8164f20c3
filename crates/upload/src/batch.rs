//! Batch progress accounting.
//!
//! A batch is created with one [`BatchTicket`] per submission. Completing a
//! ticket consumes it, so each submission can bump `completed` only once no
//! matter how many attempts it took. A ticket dropped without completing
//! (a panicked task) is recorded as an aborted failure.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::{debug, warn};

use crate::events::{EventSink, UploadEvent};
use crate::types::{
    BatchSummary, FailedItem, FailureKind, SubmissionLabel, SucceededItem, UploadOutcome,
};

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Counters and outcomes of one group of submissions launched together.
#[derive(Debug)]
pub struct Batch {
    id: u64,
    total: usize,
    completed: AtomicUsize,
    records: Mutex<Vec<(SubmissionLabel, UploadOutcome)>>,
    events: EventSink,
}

impl Batch {
    /// Opens a batch with one ticket per label.
    pub fn open(labels: Vec<SubmissionLabel>, events: EventSink) -> (Arc<Self>, Vec<BatchTicket>) {
        let batch = Arc::new(Self {
            id: NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed),
            total: labels.len(),
            completed: AtomicUsize::new(0),
            records: Mutex::new(Vec::with_capacity(labels.len())),
            events,
        });

        let tickets = labels
            .into_iter()
            .map(|label| BatchTicket {
                batch: Some(Arc::clone(&batch)),
                label,
            })
            .collect();

        (batch, tickets)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.completed() >= self.total
    }

    /// `"<completed> of <total> processed"`.
    pub fn status_line(&self) -> String {
        format!("{} of {} processed", self.completed(), self.total)
    }

    /// Successes and named failures recorded so far.
    pub fn summary(&self) -> BatchSummary {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut summary = BatchSummary {
            total: self.total,
            ..Default::default()
        };

        for (label, outcome) in records.iter() {
            match outcome {
                UploadOutcome::Success { remote_id } => summary.succeeded.push(SucceededItem {
                    name: label.name.clone(),
                    category: label.category,
                    remote_id: remote_id.clone(),
                }),
                UploadOutcome::Failure { kind, reason } => summary.failed.push(FailedItem {
                    name: label.name.clone(),
                    category: label.category,
                    kind: *kind,
                    reason: reason.clone(),
                }),
            }
        }
        summary
    }

    fn record(&self, label: SubmissionLabel, outcome: UploadOutcome) {
        let event = match &outcome {
            UploadOutcome::Success { remote_id } => UploadEvent::Succeeded {
                name: label.name.clone(),
                category: label.category,
                remote_id: remote_id.clone(),
            },
            UploadOutcome::Failure { reason, .. } => UploadEvent::Failed {
                name: label.name.clone(),
                category: label.category,
                reason: reason.clone(),
            },
        };

        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((label, outcome));
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(completed <= self.total);
        debug!(batch = self.id, completed, total = self.total, "submission completed");

        self.events.emit(event);
        self.events.emit(UploadEvent::Progress {
            batch_id: self.id,
            completed,
            total: self.total,
        });
    }
}

/// Single-use right to count one submission as completed.
#[derive(Debug)]
pub struct BatchTicket {
    batch: Option<Arc<Batch>>,
    label: SubmissionLabel,
}

impl BatchTicket {
    pub fn label(&self) -> &SubmissionLabel {
        &self.label
    }

    /// Records the terminal outcome and consumes the ticket.
    pub fn complete(mut self, outcome: UploadOutcome) {
        if let Some(batch) = self.batch.take() {
            batch.record(self.label.clone(), outcome);
        }
    }
}

impl Drop for BatchTicket {
    fn drop(&mut self) {
        if let Some(batch) = self.batch.take() {
            warn!(submission = %self.label, "ticket dropped before completion");
            batch.record(
                self.label.clone(),
                UploadOutcome::Failure {
                    kind: FailureKind::Aborted,
                    reason: "upload task aborted".into(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anna_platform::Category;

    fn labels(n: usize) -> Vec<SubmissionLabel> {
        (0..n)
            .map(|i| SubmissionLabel {
                name: format!("f{i}.png"),
                category: Category::Decal,
            })
            .collect()
    }

    #[test]
    fn tickets_complete_exactly_once() {
        let (batch, tickets) = Batch::open(labels(3), EventSink::disconnected());
        assert_eq!(batch.total(), 3);
        assert_eq!(batch.status_line(), "0 of 3 processed");

        for (i, ticket) in tickets.into_iter().enumerate() {
            ticket.complete(UploadOutcome::Success {
                remote_id: i.to_string(),
            });
        }

        assert!(batch.is_finished());
        assert_eq!(batch.completed(), 3);
        assert_eq!(batch.status_line(), "3 of 3 processed");
        let summary = batch.summary();
        assert_eq!(summary.succeeded.len(), 3);
        assert!(summary.failed.is_empty());
    }

    #[test]
    fn dropped_ticket_counts_as_aborted() {
        let (batch, mut tickets) = Batch::open(labels(2), EventSink::disconnected());
        tickets.pop();
        tickets
            .pop()
            .unwrap()
            .complete(UploadOutcome::Success {
                remote_id: "1".into(),
            });

        assert!(batch.is_finished());
        let summary = batch.summary();
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].kind, FailureKind::Aborted);
        assert_eq!(summary.failed[0].name, "f1.png");
    }

    #[test]
    fn completion_emits_outcome_and_progress() {
        let (sink, mut rx) = EventSink::channel();
        let (batch, tickets) = Batch::open(labels(1), sink);
        for t in tickets {
            t.complete(UploadOutcome::Failure {
                kind: FailureKind::Rejected,
                reason: "nope".into(),
            });
        }

        match rx.try_recv().unwrap() {
            UploadEvent::Failed { name, reason, .. } => {
                assert_eq!(name, "f0.png");
                assert_eq!(reason, "nope");
            }
            other => panic!("unexpected event {other:?}"),
        }
        match rx.try_recv().unwrap() {
            UploadEvent::Progress {
                batch_id,
                completed,
                total,
            } => {
                assert_eq!(batch_id, batch.id());
                assert_eq!((completed, total), (1, 1));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn empty_batch_is_finished() {
        let (batch, tickets) = Batch::open(Vec::new(), EventSink::disconnected());
        assert!(tickets.is_empty());
        assert!(batch.is_finished());
        assert_eq!(batch.summary(), BatchSummary::default());
    }

    #[test]
    fn batch_ids_are_unique() {
        let (a, _) = Batch::open(Vec::new(), EventSink::disconnected());
        let (b, _) = Batch::open(Vec::new(), EventSink::disconnected());
        assert_ne!(a.id(), b.id());
    }
}
