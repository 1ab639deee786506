//! Blocking byte transports.
//!
//! [`HttpTransport`] performs a single HTTP(S) GET per call with an explicit
//! timeout, redirect limit and response size cap. [`MemoryTransport`] serves
//! pre-staged payloads and records what was requested.

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::security::{SecurityError, validate_url};

/// Default timeout for a whole request, body included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum number of redirects.
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

/// Default maximum response size (50 MB).
pub const DEFAULT_MAX_SIZE: u64 = 50 * 1024 * 1024;

/// Error type for transport fetches.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The URL could not be parsed.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The URL was rejected by the host policy.
    #[error("Security error: {0}")]
    Security(#[from] SecurityError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-success HTTP status.
    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: StatusCode },

    /// The request did not complete in time.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Too many redirects.
    #[error("Too many redirects")]
    RedirectLimitExceeded,

    /// Response exceeds the configured size limit.
    #[error("Response too large: {size} bytes exceeds maximum of {max} bytes")]
    ResponseTooLarge { size: u64, max: u64 },

    /// The body transfer failed part way.
    #[error("Transfer interrupted: {0}")]
    Interrupted(#[source] std::io::Error),

    /// Failed to build the HTTP client.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// Connection or protocol failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl TransportError {
    /// Whether a later attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Interrupted(_) => true,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Network(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Fetches the full body behind a URL.
///
/// Implementations make exactly one attempt per call and block until the
/// body is complete or the attempt fails.
pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        (**self).fetch(url)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        (**self).fetch(url)
    }
}

/// HTTP(S) transport backed by a blocking `reqwest` client.
///
/// The client is built on the first fetch and reused afterwards. Fetches must
/// run outside an async runtime.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    timeout: Duration,
    allow_local: bool,
    max_redirects: u32,
    max_size: u64,
    client: OnceLock<reqwest::blocking::Client>,
}

/// Builder for [`HttpTransport`].
#[derive(Debug)]
pub struct HttpTransportBuilder {
    timeout: Duration,
    allow_local: bool,
    max_redirects: u32,
    max_size: u64,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl HttpTransport {
    /// Create a new builder for HttpTransport.
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder {
            timeout: DEFAULT_TIMEOUT,
            allow_local: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, TransportError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = self.build_client()?;
        Ok(self.client.get_or_init(|| client))
    }

    fn build_client(&self) -> Result<reqwest::blocking::Client, TransportError> {
        let allow_local = self.allow_local;
        let max_redirects = self.max_redirects as usize;

        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > max_redirects {
                attempt.error("too many redirects")
            } else if let Err(e) = validate_url(attempt.url(), allow_local) {
                attempt.error(e)
            } else {
                attempt.follow()
            }
        });

        reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .redirect(policy)
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))
    }

    fn read_body(
        &self,
        url: &str,
        response: reqwest::blocking::Response,
    ) -> Result<Vec<u8>, TransportError> {
        if let Some(len) = response.content_length() {
            if len > self.max_size {
                return Err(TransportError::ResponseTooLarge {
                    size: len,
                    max: self.max_size,
                });
            }
        }

        let mut body = Vec::new();
        response
            .take(self.max_size.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::TimedOut => TransportError::Timeout(url.to_string()),
                _ => TransportError::Interrupted(e),
            })?;

        if body.len() as u64 > self.max_size {
            return Err(TransportError::ResponseTooLarge {
                size: body.len() as u64,
                max: self.max_size,
            });
        }

        Ok(body)
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        validate_url(&parsed, self.allow_local)?;

        debug!("GET {}", url);
        let response = self
            .client()?
            .get(parsed)
            .send()
            .map_err(|e| map_send_error(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let body = self.read_body(url, response)?;
        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

fn map_send_error(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_redirect() {
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            if let Some(security) = inner.downcast_ref::<SecurityError>() {
                return TransportError::Security(security.clone());
            }
            source = inner.source();
        }
        return TransportError::RedirectLimitExceeded;
    }
    if err.is_timeout() {
        return TransportError::Timeout(url.to_string());
    }
    TransportError::Network(err)
}

impl HttpTransportBuilder {
    /// Set timeout for the whole request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allow fetching from loopback and private network addresses.
    pub fn allow_local(mut self, allow: bool) -> Self {
        self.allow_local = allow;
        self
    }

    /// Set maximum number of redirects.
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    /// Set maximum accepted body size in bytes.
    pub fn max_size(mut self, max: u64) -> Self {
        self.max_size = max;
        self
    }

    pub fn build(self) -> HttpTransport {
        HttpTransport {
            timeout: self.timeout,
            allow_local: self.allow_local,
            max_redirects: self.max_redirects,
            max_size: self.max_size,
            client: OnceLock::new(),
        }
    }
}

/// In-memory transport serving pre-staged payloads.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    payloads: RwLock<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`MemoryTransport::insert`].
    pub fn with(self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.insert(url, body);
        self
    }

    /// Serves `body` for `url`, replacing any earlier payload.
    pub fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.payloads.write().insert(url.into(), body.into());
    }

    /// Stops serving `url`.
    pub fn remove(&self, url: &str) -> Option<Vec<u8>> {
        self.payloads.write().remove(url)
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl Transport for MemoryTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.requests.lock().push(url.to_string());
        self.payloads
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fetch_blocking(
        transport: HttpTransport,
        url: String,
    ) -> Result<Vec<u8>, TransportError> {
        tokio::task::spawn_blocking(move || transport.fetch(&url))
            .await
            .expect("fetch task panicked")
    }

    #[test]
    fn builder_default_values() {
        let transport = HttpTransport::builder().build();

        assert_eq!(transport.timeout, Duration::from_secs(10));
        assert!(transport.allow_local);
        assert_eq!(transport.max_redirects, 10);
        assert_eq!(transport.max_size, 50 * 1024 * 1024);
    }

    #[test]
    fn builder_custom_values() {
        let transport = HttpTransport::builder()
            .timeout(Duration::from_secs(30))
            .allow_local(false)
            .max_redirects(5)
            .max_size(1024)
            .build();

        assert_eq!(transport.timeout(), Duration::from_secs(30));
        assert!(!transport.allow_local);
        assert_eq!(transport.max_redirects, 5);
        assert_eq!(transport.max_size(), 1024);
    }

    #[test]
    fn memory_transport_serves_and_records() {
        let transport = MemoryTransport::new().with("http://h/m.py", "x = 1\n");

        assert_eq!(transport.fetch("http://h/m.py").unwrap(), b"x = 1\n");
        assert!(matches!(
            transport.fetch("http://h/missing.py"),
            Err(TransportError::NotFound(url)) if url == "http://h/missing.py"
        ));
        assert_eq!(
            transport.requests(),
            vec!["http://h/m.py".to_string(), "http://h/missing.py".to_string()]
        );
    }

    #[test]
    fn invalid_url_is_rejected_before_any_request() {
        let result = HttpTransport::default().fetch("not a url");
        assert!(matches!(result, Err(TransportError::InvalidUrl { .. })));
    }

    #[test]
    fn transient_classification() {
        assert!(TransportError::Timeout("u".into()).is_transient());
        assert!(
            TransportError::HttpStatus {
                url: "u".into(),
                status: StatusCode::BAD_GATEWAY
            }
            .is_transient()
        );
        assert!(!TransportError::NotFound("u".into()).is_transient());
        assert!(!TransportError::RedirectLimitExceeded.is_transient());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/client.gen.py"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x = 1\n"))
            .mount(&server)
            .await;

        let body = fetch_blocking(
            HttpTransport::default(),
            format!("{}/client.gen.py", server.uri()),
        )
        .await
        .unwrap();

        assert_eq!(body, b"x = 1\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/client.gen.py"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = fetch_blocking(
            HttpTransport::default(),
            format!("{}/client.gen.py", server.uri()),
        )
        .await;

        assert!(matches!(result, Err(TransportError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/client.gen.py"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = fetch_blocking(
            HttpTransport::default(),
            format!("{}/client.gen.py", server.uri()),
        )
        .await;

        match result {
            Err(TransportError::HttpStatus { status, .. }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("Expected HttpStatus 500, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/large.py"))
            .respond_with(ResponseTemplate::new(200).set_body_string("A".repeat(20)))
            .mount(&server)
            .await;

        let transport = HttpTransport::builder().max_size(10).build();
        let result = fetch_blocking(transport, format!("{}/large.py", server.uri())).await;

        match result {
            Err(TransportError::ResponseTooLarge { size, max }) => {
                assert_eq!(size, 20);
                assert_eq!(max, 10);
            }
            other => panic!("Expected ResponseTooLarge, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_with_unbounded_size_returns_full_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/m.py"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x = 1\n"))
            .mount(&server)
            .await;

        let transport = HttpTransport::builder().max_size(u64::MAX).build();
        let body = fetch_blocking(transport, format!("{}/m.py", server.uri()))
            .await
            .unwrap();

        assert_eq!(body, b"x = 1\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_is_built_once_and_reused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/m.py"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x = 1\n"))
            .expect(2)
            .mount(&server)
            .await;
        let url = format!("{}/m.py", server.uri());

        let transport = HttpTransport::default();
        assert!(transport.client.get().is_none());

        tokio::task::spawn_blocking(move || {
            transport.fetch(&url).unwrap();
            let first = transport.client.get().unwrap() as *const _;
            transport.fetch(&url).unwrap();
            let second = transport.client.get().unwrap() as *const _;
            assert_eq!(first, second);
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.py"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("x = 1\n")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::builder()
            .timeout(Duration::from_millis(200))
            .build();
        let result = fetch_blocking(transport, format!("{}/slow.py", server.uri())).await;

        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest.py"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/v2.py", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2.py"))
            .respond_with(ResponseTemplate::new(200).set_body_string("version = 2\n"))
            .mount(&server)
            .await;

        let body = fetch_blocking(
            HttpTransport::default(),
            format!("{}/latest.py", server.uri()),
        )
        .await
        .unwrap();

        assert_eq!(body, b"version = 2\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn redirect_loop_hits_the_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("Location", format!("{}/loop", server.uri()).as_str()),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::builder().max_redirects(3).build();
        let result = fetch_blocking(transport, format!("{}/loop", server.uri())).await;

        assert!(matches!(result, Err(TransportError::RedirectLimitExceeded)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_hosts_denied_when_disabled() {
        let server = MockServer::start().await;

        let transport = HttpTransport::builder().allow_local(false).build();
        let result = fetch_blocking(transport, format!("{}/client.gen.py", server.uri())).await;

        assert!(matches!(
            result,
            Err(TransportError::Security(SecurityError::LoopbackDenied(_)))
        ));
    }
}
