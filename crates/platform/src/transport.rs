//! The transport capability consumed by the upload engine.
//!
//! The engine never talks HTTP itself: the binary hands it a [`Transport`]
//! (normally [`HttpTransport`](crate::HttpTransport)) and tests hand it a mock.

use std::future::Future;
use std::pin::Pin;

use crate::response::SubmitResponse;
use crate::types::{SessionToken, SubmitRequest};

/// Boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Errors below the level of a classified platform response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no CSRF token in priming response (status {status})")]
    MissingToken { status: u16 },

    #[error("invalid session cookie")]
    InvalidCookie,

    #[error("transport error: {0}")]
    Other(String),
}

/// Abstract channel to the upload API.
pub trait Transport: Send + Sync {
    /// Performs the priming round-trip that yields a fresh session token.
    fn fetch_token(&self) -> TransportFuture<'_, SessionToken>;

    /// Sends one asset with the given token and returns the parsed response.
    fn submit<'a>(
        &'a self,
        token: &'a SessionToken,
        request: &'a SubmitRequest,
    ) -> TransportFuture<'a, SubmitResponse>;
}
