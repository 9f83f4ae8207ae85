//! HTTP transport collaborator.
//!
//! Adapters never talk to the network directly; they hand a
//! [`TransportRequest`] to a [`Transport`] and get back either a successful
//! response body or a [`TransportError`]. That seam keeps the parsing and
//! classification logic testable offline, and it is the only place the HTTP
//! stack appears.
//!
//! The core issues exactly one call per request: no retries, no backoff, no
//! caching. A non-success status is a transport error that *retains the
//! response body*, because several carriers put their error document in it.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use thiserror::Error;
use tracing::trace;
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

/// Default per-lookup timeout, used by every carrier that specifies one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One outbound carrier call.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method ("GET", "POST").
    pub method: String,
    /// Fully built request URL.
    pub url: String,
    /// Request headers, in insertion order.
    pub headers: Vec<(String, String)>,
    /// Request body, for POSTed payloads.
    pub body: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl TransportRequest {
    /// Creates a GET request with the default timeout.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Creates a POST request with the default timeout.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    fn new(method: &str, url: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Builder method to add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Builder method to set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Builder method to override the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A successful (2xx) carrier response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

/// A failed carrier call.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The server answered, but with a non-success status. The body is kept:
    /// carriers put their error documents in it.
    #[error("carrier returned HTTP {status}")]
    Status { status: u16, body: String },
    /// The request produced no response at all (DNS, connect, timeout).
    #[error("no response from carrier: {message}")]
    Io { message: String },
}

impl TransportError {
    /// Returns the response body, when one was received and is non-empty.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } if !body.is_empty() => Some(body),
            _ => None,
        }
    }
}

/// The outbound-call abstraction adapters are built against.
pub trait Transport: Send + Sync {
    /// Executes one request, returning the raw response body on success.
    fn execute(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'_, Result<TransportResponse, TransportError>>;
}

/// Builds a Basic authorization header value.
pub(crate) fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Production [`Transport`] backed by `reqwest`.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a new HTTP transport.
    pub fn new() -> ProviderResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ProviderError::network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn execute(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'_, Result<TransportResponse, TransportError>> {
        Box::pin(async move {
            let url = Url::parse(&request.url).map_err(|e| TransportError::Io {
                message: format!("invalid url: {e}"),
            })?;
            let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
                TransportError::Io {
                    message: format!("invalid HTTP method: {}", request.method),
                }
            })?;

            let mut builder = self.client.request(method, url).timeout(request.timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            trace!(method = %request.method, url = %request.url, "sending request");

            let response = builder.send().await.map_err(|e| TransportError::Io {
                message: e.to_string(),
            })?;

            let status = response.status();
            let body = response.text().await.map_err(|e| TransportError::Io {
                message: e.to_string(),
            })?;

            if status.is_success() {
                Ok(TransportResponse {
                    status: status.as_u16(),
                    body,
                })
            } else {
                Err(TransportError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Canned-response transport for exercising adapters offline.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    pub(crate) struct StubTransport {
        responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        requests: Mutex<Vec<TransportRequest>>,
    }

    impl StubTransport {
        /// A stub that answers every request with the given 200 body.
        pub(crate) fn replying(body: &str) -> Self {
            Self::with_results(vec![Ok(TransportResponse {
                status: 200,
                body: body.to_string(),
            })])
        }

        /// A stub that fails every request without a response body.
        pub(crate) fn unreachable(message: &str) -> Self {
            Self::with_results(vec![Err(TransportError::Io {
                message: message.to_string(),
            })])
        }

        /// A stub that fails every request with a non-2xx status and body.
        pub(crate) fn rejecting(status: u16, body: &str) -> Self {
            Self::with_results(vec![Err(TransportError::Status {
                status,
                body: body.to_string(),
            })])
        }

        pub(crate) fn with_results(
            results: Vec<Result<TransportResponse, TransportError>>,
        ) -> Self {
            Self {
                responses: Mutex::new(results.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub(crate) fn last_request(&self) -> Option<TransportRequest> {
            self.requests.lock().unwrap().last().cloned()
        }
    }

    impl Transport for StubTransport {
        fn execute(
            &self,
            request: TransportRequest,
        ) -> BoxFuture<'_, Result<TransportResponse, TransportError>> {
            self.requests.lock().unwrap().push(request);
            let result = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                // A drained queue means the test under-provisioned responses.
                .unwrap_or_else(|| {
                    Err(TransportError::Io {
                        message: "no canned response".to_string(),
                    })
                });
            Box::pin(async move { result })
        }
    }
}
