//! Shared state handed to every upload task.

use std::sync::Arc;

use anna_platform::{Creator, Transport};

use crate::events::EventSink;
use crate::retry::RetryPolicy;
use crate::token::SessionTokenProvider;
use crate::types::NamingPolicy;

/// Everything an [`UploadTask`](crate::UploadTask) reads or shares.
///
/// All fields are `Send + Sync`, so tasks may run on any tokio runtime
/// flavour.
pub struct UploadContext {
    pub transport: Arc<dyn Transport>,
    pub tokens: SessionTokenProvider,
    pub retry: RetryPolicy,
    pub creator: Creator,
    pub naming: NamingPolicy,
    pub events: EventSink,
}

impl UploadContext {
    pub fn new(
        transport: Arc<dyn Transport>,
        creator: Creator,
        naming: NamingPolicy,
        retry: RetryPolicy,
        events: EventSink,
    ) -> Self {
        Self {
            tokens: SessionTokenProvider::new(Arc::clone(&transport)),
            transport,
            retry,
            creator,
            naming,
            events,
        }
    }
}
