//! Shared session token cache.
//!
//! Lazy and memoized. Concurrent tasks may race to invalidate and
//! re-acquire; that costs at most an extra priming round-trip because a
//! fresh token is always valid, so no serialization is attempted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anna_platform::{SessionToken, Transport, TransportError};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Acquires and caches the CSRF token shared by all upload tasks.
pub struct SessionTokenProvider {
    transport: Arc<dyn Transport>,
    cached: RwLock<Option<SessionToken>>,
    acquisitions: AtomicU64,
}

impl SessionTokenProvider {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cached: RwLock::new(None),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Returns the cached token, fetching a new one if there is none.
    pub async fn acquire(&self) -> Result<SessionToken, TransportError> {
        if let Some(token) = self.cached.read().await.clone() {
            return Ok(token);
        }

        let token = self.transport.fetch_token().await?;
        let n = self.acquisitions.fetch_add(1, Ordering::Relaxed) + 1;
        *self.cached.write().await = Some(token.clone());
        info!(acquisitions = n, "session token acquired");

        Ok(token)
    }

    /// Drops the cached token so the next [`acquire`](Self::acquire) refetches.
    pub async fn invalidate(&self) {
        if self.cached.write().await.take().is_some() {
            debug!("session token invalidated");
        }
    }

    /// Number of priming round-trips that produced a token.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    pub async fn is_cached(&self) -> bool {
        self.cached.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anna_platform::{SubmitRequest, SubmitResponse, TransportFuture};
    use std::sync::Mutex;

    /// Hands out `tok-1`, `tok-2`, ... and can be told to fail.
    struct CountingTransport {
        issued: Mutex<u32>,
        fail: bool,
    }

    impl Transport for CountingTransport {
        fn fetch_token(&self) -> TransportFuture<'_, SessionToken> {
            Box::pin(async move {
                if self.fail {
                    return Err(TransportError::MissingToken { status: 500 });
                }
                let mut issued = self.issued.lock().unwrap();
                *issued += 1;
                Ok(SessionToken::new(format!("tok-{issued}")))
            })
        }

        fn submit<'a>(
            &'a self,
            _token: &'a SessionToken,
            _request: &'a SubmitRequest,
        ) -> TransportFuture<'a, SubmitResponse> {
            Box::pin(async { Err(TransportError::Other("unused".into())) })
        }
    }

    fn provider(fail: bool) -> SessionTokenProvider {
        SessionTokenProvider::new(Arc::new(CountingTransport {
            issued: Mutex::new(0),
            fail,
        }))
    }

    #[tokio::test]
    async fn acquire_is_memoized() {
        let p = provider(false);
        let a = p.acquire().await.unwrap();
        let b = p.acquire().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "tok-1");
        assert_eq!(p.acquisitions(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let p = provider(false);
        p.acquire().await.unwrap();
        p.invalidate().await;
        assert!(!p.is_cached().await);

        let fresh = p.acquire().await.unwrap();
        assert_eq!(fresh.as_str(), "tok-2");
        assert_eq!(p.acquisitions(), 2);
        assert!(p.is_cached().await);
    }

    #[tokio::test]
    async fn invalidate_without_token_is_harmless() {
        let p = provider(false);
        p.invalidate().await;
        p.invalidate().await;
        assert_eq!(p.acquire().await.unwrap().as_str(), "tok-1");
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_empty() {
        let p = provider(true);
        assert!(p.acquire().await.is_err());
        assert!(!p.is_cached().await);
        assert_eq!(p.acquisitions(), 0);
    }
}
