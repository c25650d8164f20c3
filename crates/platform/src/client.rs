//! Upload API client.
//!
//! Async HTTP client using `reqwest`. Authentication rides on the caller's
//! existing browser session cookie; each upload additionally carries a CSRF
//! token obtained through a priming request.

use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::response::SubmitResponse;
use crate::transport::{Transport, TransportError, TransportFuture};
use crate::types::{SessionToken, SubmitRequest};

pub const DEFAULT_UPLOAD_URL: &str = "https://apis.roblox.com/assets/user-auth/v1/assets";

/// Header carrying the CSRF token in both directions.
pub const CSRF_HEADER: &str = "x-csrf-token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// `reqwest`-backed [`Transport`].
pub struct HttpTransport {
    http: reqwest::Client,
    upload_url: String,
}

impl HttpTransport {
    /// Creates a transport, optionally attaching a session cookie to every request.
    pub fn new(session_cookie: Option<&str>) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = session_cookie.filter(|c| !c.is_empty()) {
            headers.insert(
                COOKIE,
                HeaderValue::from_str(&format!(".ROBLOSECURITY={cookie}"))
                    .map_err(|_| TransportError::InvalidCookie)?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
        })
    }

    /// Overrides the upload endpoint.
    pub fn with_upload_url(mut self, url: impl Into<String>) -> Self {
        self.upload_url = url.into();
        self
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    /// Posts an empty JSON body; the platform answers 403 with a fresh token header.
    async fn prime_token(&self) -> Result<SessionToken, TransportError> {
        let resp = self
            .http
            .post(&self.upload_url)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let status = resp.status().as_u16();

        let token = resp
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(SessionToken::new);

        match (status, token) {
            (403, Some(token)) => {
                debug!("CSRF token fetched");
                Ok(token)
            }
            _ => Err(TransportError::MissingToken { status }),
        }
    }

    async fn post_asset(
        &self,
        token: &SessionToken,
        request: &SubmitRequest,
    ) -> Result<SubmitResponse, TransportError> {
        let metadata = serde_json::to_string(&request.metadata())?;
        let file_part = Part::bytes(request.data.to_vec())
            .file_name(request.file_name.clone())
            .mime_str(request.content_type)?;

        let form = Form::new()
            .part("fileContent", file_part)
            .text("request", metadata);

        let resp = self
            .http
            .post(&self.upload_url)
            .header(CSRF_HEADER, token.as_str())
            .multipart(form)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        debug!(file = %request.file_name, status, "upload response received");

        Ok(SubmitResponse::from_http(status, &body))
    }
}

impl Transport for HttpTransport {
    fn fetch_token(&self) -> TransportFuture<'_, SessionToken> {
        Box::pin(self.prime_token())
    }

    fn submit<'a>(
        &'a self,
        token: &'a SessionToken,
        request: &'a SubmitRequest,
    ) -> TransportFuture<'a, SubmitResponse> {
        Box::pin(self.post_asset(token, request))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::{Category, Creator};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Starts a mock HTTP server that answers one request with the given
    /// status line, extra headers and body, and reports the raw request.
    async fn mock_server(
        status: &str,
        headers: &str,
        body: &str,
    ) -> (String, oneshot::Receiver<String>, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/assets");
        let status = status.to_string();
        let headers = headers.to_string();
        let body = body.to_string();
        let (req_tx, req_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut raw = Vec::new();
                let mut buf = vec![0u8; 8192];
                // Read until the headers and the advertised body have arrived.
                loop {
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    raw.extend_from_slice(&buf[..n]);
                    if request_complete(&raw) {
                        break;
                    }
                }
                let _ = req_tx.send(String::from_utf8_lossy(&raw).into_owned());

                let resp = format!(
                    "HTTP/1.1 {status}\r\n{headers}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, req_rx, handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(split) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..split]
            .lines()
            .find_map(|l| {
                let (k, v) = l.split_once(':')?;
                k.eq_ignore_ascii_case("content-length")
                    .then(|| v.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= split + 4 + content_length
    }

    fn sample_request() -> SubmitRequest {
        SubmitRequest {
            file_name: "cat.png".into(),
            content_type: "image/png",
            data: Arc::from(&b"\x89PNG fake"[..]),
            display_name: "cat".into(),
            description: "desc".into(),
            category: Category::TShirt,
            creator: Creator::group(55),
        }
    }

    #[tokio::test]
    async fn fetch_token_reads_csrf_header_from_403() {
        let (url, _req, handle) =
            mock_server("403 Forbidden", "x-csrf-token: tok-123\r\n", "{}").await;

        let transport = HttpTransport::new(None).unwrap().with_upload_url(url);
        let token = transport.fetch_token().await.unwrap();
        assert_eq!(token.as_str(), "tok-123");

        handle.abort();
    }

    #[tokio::test]
    async fn fetch_token_without_header_fails() {
        let (url, _req, handle) = mock_server("200 OK", "", "{}").await;

        let transport = HttpTransport::new(None).unwrap().with_upload_url(url);
        let err = transport.fetch_token().await.unwrap_err();
        assert!(matches!(err, TransportError::MissingToken { status: 200 }));

        handle.abort();
    }

    #[tokio::test]
    async fn submit_sends_token_cookie_and_multipart_parts() {
        let (url, req_rx, handle) = mock_server(
            "200 OK",
            "",
            r#"{"path":"operations/1","done":true,"response":{"assetId":"777"}}"#,
        )
        .await;

        let transport = HttpTransport::new(Some("cookie-value"))
            .unwrap()
            .with_upload_url(url);
        let token = SessionToken::new("tok-abc");
        let resp = transport.submit(&token, &sample_request()).await.unwrap();
        assert_eq!(
            resp,
            SubmitResponse::Accepted {
                remote_id: "777".into()
            }
        );

        let raw = req_rx.await.unwrap().to_lowercase();
        assert!(raw.contains("x-csrf-token: tok-abc"));
        assert!(raw.contains(".roblosecurity=cookie-value"));
        assert!(raw.contains("name=\"filecontent\"; filename=\"cat.png\""));
        assert!(raw.contains("name=\"request\""));
        assert!(raw.contains("\"groupid\":55"));
        assert!(raw.contains("\"assettype\":\"tshirt\""));

        handle.abort();
    }

    #[tokio::test]
    async fn submit_maps_error_status_to_rejected() {
        let (url, _req, handle) = mock_server(
            "400 Bad Request",
            "",
            r#"{"code":"INVALID_ARGUMENT","message":"Asset name and description is fully moderated."}"#,
        )
        .await;

        let transport = HttpTransport::new(None).unwrap().with_upload_url(url);
        let token = SessionToken::new("t");
        let resp = transport.submit(&token, &sample_request()).await.unwrap();
        match resp {
            SubmitResponse::Rejected {
                status, message, ..
            } => {
                assert_eq!(status, 400);
                assert!(message.contains("moderated"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        handle.abort();
    }

    #[test]
    fn invalid_cookie_is_rejected() {
        let result = HttpTransport::new(Some("bad\ncookie"));
        assert!(matches!(result, Err(TransportError::InvalidCookie)));
    }

    #[test]
    fn default_upload_url() {
        let transport = HttpTransport::new(None).unwrap();
        assert_eq!(transport.upload_url(), DEFAULT_UPLOAD_URL);
    }
}
