//! Per-asset upload state machine.
//!
//! ```text
//! Init -> TokenReady -> Submitted -> Success
//!   ^                       |
//!   +---- Retrying <--------+-----> TerminalFailure
//! ```
//!
//! The loop is bounded by the retry policy: every pass through `Retrying`
//! bumps the submission's attempt counter, and a task that has used up its
//! retries always ends in `TerminalFailure`.

use anna_platform::{SessionToken, SubmitResponse};
use tracing::{debug, error, info, warn};

use crate::batch::BatchTicket;
use crate::classify::{Classification, classify};
use crate::context::UploadContext;
use crate::error::UploadError;
use crate::events::UploadEvent;
use crate::types::{AssetSubmission, UploadOutcome};

enum TaskState {
    Init,
    TokenReady(SessionToken),
    Submitted(SubmitResponse),
    Retrying(UploadError),
    Success(String),
    TerminalFailure(UploadError),
}

/// Drives one [`AssetSubmission`] to a terminal outcome.
pub struct UploadTask {
    submission: AssetSubmission,
}

impl UploadTask {
    pub fn new(submission: AssetSubmission) -> Self {
        Self { submission }
    }

    pub fn submission(&self) -> &AssetSubmission {
        &self.submission
    }

    /// Runs the task and records its outcome on `ticket`.
    pub async fn run_tracked(self, ctx: &UploadContext, ticket: BatchTicket) -> UploadOutcome {
        let outcome = self.run(ctx).await;
        ticket.complete(outcome.clone());
        outcome
    }

    /// Runs until success or terminal failure. Never panics on platform errors.
    pub async fn run(mut self, ctx: &UploadContext) -> UploadOutcome {
        let label = self.submission.label();
        let mut state = TaskState::Init;

        loop {
            state = match state {
                TaskState::Init => match ctx.tokens.acquire().await {
                    Ok(token) => TaskState::TokenReady(token),
                    Err(e) => TaskState::Retrying(UploadError::Transport(e)),
                },

                TaskState::TokenReady(token) => {
                    let request = self.submission.to_request(ctx.creator);
                    debug!(
                        submission = %label,
                        display_name = %request.display_name,
                        attempt = self.submission.attempts,
                        "submitting"
                    );
                    match ctx.transport.submit(&token, &request).await {
                        Ok(response) => TaskState::Submitted(response),
                        Err(e) => TaskState::Retrying(UploadError::Transport(e)),
                    }
                }

                TaskState::Submitted(response) => self.on_response(ctx, response).await,

                TaskState::Retrying(cause) => {
                    if !ctx.retry.allows_retry(self.submission.attempts) {
                        TaskState::TerminalFailure(cause)
                    } else {
                        self.submission.attempts += 1;
                        let attempt = self.submission.attempts;
                        warn!(submission = %label, attempt, error = %cause, "retrying upload");
                        ctx.events.emit(UploadEvent::Retrying {
                            name: label.name.clone(),
                            category: label.category,
                            attempt,
                            reason: cause.to_string(),
                        });

                        // A renamed resubmission does not need to wait out a backoff.
                        if !matches!(cause, UploadError::NameRejected(_)) {
                            let delay = ctx.retry.delay_for_attempt(attempt);
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                        }
                        TaskState::Init
                    }
                }

                TaskState::Success(remote_id) => {
                    info!(submission = %label, remote_id = %remote_id, "uploaded");
                    return UploadOutcome::Success { remote_id };
                }

                TaskState::TerminalFailure(err) => {
                    if err.is_fatal() {
                        error!(submission = %label, error = %err, "account suspended");
                        ctx.events.emit(UploadEvent::AccountSuspended {
                            message: err.to_string(),
                        });
                    } else {
                        error!(
                            submission = %label,
                            attempts = self.submission.attempts,
                            error = %err,
                            "upload failed"
                        );
                    }
                    return UploadOutcome::failure(&err);
                }
            };
        }
    }

    async fn on_response(&mut self, ctx: &UploadContext, response: SubmitResponse) -> TaskState {
        match classify(response) {
            Classification::Accepted { remote_id } => TaskState::Success(remote_id),
            Classification::AuthExpired { message } => {
                ctx.tokens.invalidate().await;
                TaskState::Retrying(UploadError::AuthExpired(message))
            }
            Classification::NameRejected { message } => {
                if self.submission.force_name(&ctx.naming.forced_name) {
                    TaskState::Retrying(UploadError::NameRejected(message))
                } else {
                    TaskState::TerminalFailure(UploadError::NameRejected(message))
                }
            }
            Classification::AccountSuspended { message } => {
                TaskState::TerminalFailure(UploadError::AccountSuspended(message))
            }
            Classification::Rejected { status, message } => {
                TaskState::TerminalFailure(UploadError::Rejected { status, message })
            }
            Classification::Malformed { status, body } => {
                TaskState::TerminalFailure(UploadError::Malformed { status, body })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::batch::Batch;
    use crate::events::EventSink;
    use crate::retry::{Backoff, RetryPolicy};
    use crate::types::{FailureKind, NamingPolicy};
    use anna_imaging::ImageFile;
    use anna_platform::{
        Category, Creator, SubmitRequest, Transport, TransportError, TransportFuture,
    };

    /// Scripted transport: pops one response per submit, records what was sent.
    pub(crate) struct MockTransport {
        responses: Mutex<VecDeque<Result<SubmitResponse, TransportError>>>,
        default: Option<SubmitResponse>,
        pub(crate) token_fetches: Mutex<u32>,
        pub(crate) sent: Mutex<Vec<(String, SubmitRequest)>>,
    }

    impl MockTransport {
        pub(crate) fn scripted(
            responses: Vec<Result<SubmitResponse, TransportError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                default: None,
                token_fetches: Mutex::new(0),
                sent: Mutex::new(Vec::new()),
            })
        }

        /// Accepts every submission with a sequential id.
        pub(crate) fn accepting() -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(VecDeque::new()),
                default: Some(SubmitResponse::Accepted {
                    remote_id: String::new(),
                }),
                token_fetches: Mutex::new(0),
                sent: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn fetches(&self) -> u32 {
            *self.token_fetches.lock().unwrap()
        }

        pub(crate) fn sent(&self) -> Vec<(String, SubmitRequest)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        fn fetch_token(&self) -> TransportFuture<'_, SessionToken> {
            Box::pin(async move {
                let mut n = self.token_fetches.lock().unwrap();
                *n += 1;
                Ok(SessionToken::new(format!("tok-{n}")))
            })
        }

        fn submit<'a>(
            &'a self,
            token: &'a SessionToken,
            request: &'a SubmitRequest,
        ) -> TransportFuture<'a, SubmitResponse> {
            Box::pin(async move {
                let count = {
                    let mut sent = self.sent.lock().unwrap();
                    sent.push((token.as_str().to_string(), request.clone()));
                    sent.len()
                };
                let scripted = self.responses.lock().unwrap().pop_front();
                match (scripted, &self.default) {
                    (Some(r), _) => r,
                    (None, Some(SubmitResponse::Accepted { .. })) => Ok(SubmitResponse::Accepted {
                        remote_id: format!("asset-{count}"),
                    }),
                    (None, Some(other)) => Ok(other.clone()),
                    (None, None) => Err(TransportError::Other("script exhausted".into())),
                }
            })
        }
    }

    pub(crate) fn rejected(status: u16, message: &str) -> Result<SubmitResponse, TransportError> {
        Ok(SubmitResponse::Rejected {
            status,
            reason_code: None,
            message: message.into(),
        })
    }

    pub(crate) fn accepted(id: &str) -> Result<SubmitResponse, TransportError> {
        Ok(SubmitResponse::Accepted {
            remote_id: id.into(),
        })
    }

    fn context(transport: Arc<MockTransport>, retry: RetryPolicy) -> (UploadContext, EventSinkRx) {
        let (events, rx) = EventSink::channel();
        let ctx = UploadContext::new(
            transport,
            Creator::user(1),
            NamingPolicy {
                use_forced_name: false,
                forced_name: "Fallback".into(),
            },
            retry,
            events,
        );
        (ctx, rx)
    }

    type EventSinkRx = tokio::sync::mpsc::UnboundedReceiver<UploadEvent>;

    fn task(name: &str) -> UploadTask {
        UploadTask::new(AssetSubmission::new(
            ImageFile::new(name, b"img".to_vec()),
            Category::Decal,
            &NamingPolicy::default(),
        ))
    }

    fn drain(rx: &mut EventSinkRx) -> Vec<UploadEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let transport = MockTransport::scripted(vec![accepted("100")]);
        let (ctx, _rx) = context(transport.clone(), RetryPolicy::immediate(3));

        let outcome = task("cat.png").run(&ctx).await;
        assert_eq!(
            outcome,
            UploadOutcome::Success {
                remote_id: "100".into()
            }
        );
        assert_eq!(transport.fetches(), 1);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "tok-1");
        assert_eq!(sent[0].1.display_name, "cat");
    }

    #[tokio::test]
    async fn auth_expired_refreshes_token_once_then_succeeds() {
        let transport = MockTransport::scripted(vec![
            rejected(403, "XSRF token invalid"),
            accepted("200"),
        ]);
        let (ctx, mut rx) = context(transport.clone(), RetryPolicy::immediate(3));

        let outcome = task("cat.png").run(&ctx).await;
        assert!(outcome.is_success());
        // Initial acquire plus exactly one re-acquire.
        assert_eq!(transport.fetches(), 2);
        assert_eq!(ctx.tokens.acquisitions(), 2);

        let sent = transport.sent();
        assert_eq!(sent[0].0, "tok-1");
        assert_eq!(sent[1].0, "tok-2");

        let retries = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, UploadEvent::Retrying { .. }))
            .count();
        assert_eq!(retries, 1);
    }

    #[tokio::test]
    async fn auth_expired_until_bound_is_terminal() {
        let transport = MockTransport::scripted(vec![
            rejected(403, ""),
            rejected(403, ""),
            rejected(403, ""),
            rejected(403, ""),
            accepted("never"),
        ]);
        let (ctx, _rx) = context(transport.clone(), RetryPolicy::immediate(3));

        let outcome = task("cat.png").run(&ctx).await;
        match outcome {
            UploadOutcome::Failure { kind, .. } => assert_eq!(kind, FailureKind::AuthExpired),
            other => panic!("expected failure, got {other:?}"),
        }
        // One initial attempt plus three retries.
        assert_eq!(transport.sent().len(), 4);
    }

    #[tokio::test]
    async fn zero_retry_bound_fails_on_first_retryable_error() {
        let transport = MockTransport::scripted(vec![rejected(403, ""), accepted("x")]);
        let (ctx, _rx) = context(transport.clone(), RetryPolicy::immediate(0));

        let outcome = task("cat.png").run(&ctx).await;
        assert!(!outcome.is_success());
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn name_rejection_falls_back_once() {
        let transport = MockTransport::scripted(vec![
            rejected(400, "Asset name and description is fully moderated."),
            accepted("300"),
        ]);
        let (ctx, _rx) = context(transport.clone(), RetryPolicy::immediate(3));

        let outcome = task("rude.png").run(&ctx).await;
        assert!(outcome.is_success());

        let sent = transport.sent();
        assert_eq!(sent[0].1.display_name, "rude");
        assert_eq!(sent[1].1.display_name, "Fallback");
        // Token was still good; no refetch.
        assert_eq!(transport.fetches(), 1);
    }

    #[tokio::test]
    async fn second_name_rejection_is_terminal() {
        let transport = MockTransport::scripted(vec![
            rejected(400, "Asset name length is invalid."),
            rejected(400, "Asset name length is invalid."),
            accepted("never"),
        ]);
        let (ctx, _rx) = context(transport.clone(), RetryPolicy::immediate(5));

        let outcome = task("a-very-long-name.png").run(&ctx).await;
        match outcome {
            UploadOutcome::Failure { kind, .. } => assert_eq!(kind, FailureKind::NameRejected),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn suspension_is_immediate_and_announced() {
        let transport = MockTransport::scripted(vec![
            rejected(403, "User is banned"),
            accepted("never"),
        ]);
        let (ctx, mut rx) = context(transport.clone(), RetryPolicy::immediate(3));

        let outcome = task("cat.png").run(&ctx).await;
        match outcome {
            UploadOutcome::Failure { kind, .. } => {
                assert_eq!(kind, FailureKind::AccountSuspended)
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(transport.sent().len(), 1);
        assert!(
            drain(&mut rx)
                .iter()
                .any(|e| matches!(e, UploadEvent::AccountSuspended { .. }))
        );
    }

    #[tokio::test]
    async fn other_rejection_is_terminal_without_retry() {
        let transport =
            MockTransport::scripted(vec![rejected(500, "Internal Server Error"), accepted("x")]);
        let (ctx, _rx) = context(transport.clone(), RetryPolicy::immediate(3));

        let outcome = task("cat.png").run(&ctx).await;
        assert_eq!(
            outcome,
            UploadOutcome::Failure {
                kind: FailureKind::Rejected,
                reason: "upload rejected (500): Internal Server Error".into()
            }
        );
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn transport_errors_retry_then_succeed() {
        let transport = MockTransport::scripted(vec![
            Err(TransportError::Other("connection reset".into())),
            accepted("400"),
        ]);
        let (ctx, _rx) = context(transport.clone(), RetryPolicy::immediate(3));

        assert!(task("cat.png").run(&ctx).await.is_success());
        // Token stays cached across a transport error.
        assert_eq!(transport.fetches(), 1);
    }

    #[tokio::test]
    async fn malformed_response_is_terminal() {
        let transport = MockTransport::scripted(vec![Ok(SubmitResponse::Malformed {
            status: 200,
            body: "{}".into(),
        })]);
        let (ctx, _rx) = context(transport.clone(), RetryPolicy::immediate(3));

        match task("cat.png").run(&ctx).await {
            UploadOutcome::Failure { kind, .. } => assert_eq!(kind, FailureKind::Malformed),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delay_is_applied_between_retries() {
        let transport = MockTransport::scripted(vec![rejected(403, ""), accepted("500")]);
        let retry = RetryPolicy {
            max_retries: 3,
            backoff: Backoff::Fixed { delay_ms: 2000 },
        };
        let (ctx, _rx) = context(transport.clone(), retry);

        let start = tokio::time::Instant::now();
        assert!(task("cat.png").run(&ctx).await.is_success());
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn run_tracked_completes_ticket_once_despite_retries() {
        let transport = MockTransport::scripted(vec![
            rejected(403, ""),
            rejected(403, ""),
            accepted("600"),
        ]);
        let (ctx, _rx) = context(transport.clone(), RetryPolicy::immediate(3));
        let t = task("cat.png");
        let (batch, mut tickets) = Batch::open(vec![t.submission().label()], EventSink::disconnected());

        t.run_tracked(&ctx, tickets.remove(0)).await;
        assert_eq!(batch.completed(), 1);
        assert_eq!(batch.summary().succeeded.len(), 1);
    }
}
