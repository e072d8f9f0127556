//! Transport seam and the reqwest-backed transport.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method};
use std::time::Duration;
use tracing::debug;

use crate::request::CachePolicy;
use crate::{RequestDescriptor, Response, Result, SessionConfig, SessionError, TransportErrorKind};

/// A fully resolved request, ready for one physical exchange.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute target URL with query parameters applied.
    pub url: url::Url,
    /// Headers, including any decoration.
    pub headers: HeaderMap,
    /// Body of a plain fetch. Uploads carry their body separately.
    pub body: Option<Bytes>,
    /// Timeout of this exchange.
    pub timeout: Duration,
    /// Requested cache behaviour.
    pub cache_policy: CachePolicy,
    /// Whether the transport may follow redirects.
    pub allow_redirects: bool,
}

impl PreparedRequest {
    /// Prepare `request` for sending to `url`.
    ///
    /// The request's own timeout wins over `default_timeout`.
    pub fn new(request: &RequestDescriptor, url: url::Url, default_timeout: Duration) -> Self {
        Self {
            method: request.method().clone(),
            url,
            headers: request.header_map().clone(),
            body: request.body_bytes().cloned(),
            timeout: request.get_timeout().unwrap_or(default_timeout),
            cache_policy: request.get_cache_policy(),
            allow_redirects: request.redirects_allowed(),
        }
    }

    /// Get a header value. Lookup is case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Performs physical HTTP exchanges.
///
/// Errors returned from either method must be [`SessionError::Transport`];
/// any HTTP status, including 4xx and 5xx, is a successful exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and read the whole response.
    async fn fetch(&self, request: PreparedRequest) -> Result<Response>;

    /// Upload `body` with the request and read the whole response.
    async fn upload(&self, request: PreparedRequest, body: Bytes) -> Result<Response>;
}

/// Transport backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    following: reqwest::Client,
    not_following: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the underlying clients from the session configuration.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let following = Self::client_builder(config)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| SessionError::Config(e.to_string()))?;
        let not_following = Self::client_builder(config)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| SessionError::Config(e.to_string()))?;

        Ok(Self {
            following,
            not_following,
        })
    }

    fn client_builder(config: &SessionConfig) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .gzip(config.gzip)
            .brotli(config.brotli)
    }

    async fn execute(&self, request: PreparedRequest, body: Option<Bytes>) -> Result<Response> {
        let client = if request.allow_redirects {
            &self.following
        } else {
            &self.not_following
        };

        let mut headers = request.headers;
        if let Some(directive) = request.cache_policy.cache_control()
            && !headers.contains_key(http::header::CACHE_CONTROL)
        {
            headers.insert(
                http::header::CACHE_CONTROL,
                HeaderValue::from_static(directive),
            );
        }

        let bytes_sent = body.as_ref().map(|b| b.len() as u64).unwrap_or(0);
        let mut builder = client
            .request(request.method, request.url)
            .headers(headers)
            .timeout(request.timeout);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        debug!(status = %response.status(), "Received HTTP response");

        Response::from_reqwest(response, bytes_sent)
            .await
            .map_err(map_reqwest_error)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, mut request: PreparedRequest) -> Result<Response> {
        let body = request.body.take();
        self.execute(request, body).await
    }

    async fn upload(&self, mut request: PreparedRequest, body: Bytes) -> Result<Response> {
        request.body = None;
        self.execute(request, Some(body)).await
    }
}

/// Classify a reqwest error.
fn map_reqwest_error(error: reqwest::Error) -> SessionError {
    let kind = if error.is_timeout() {
        TransportErrorKind::TimedOut
    } else if error.is_connect() {
        TransportErrorKind::CannotConnectToHost
    } else if is_connection_lost(&error) {
        TransportErrorKind::NetworkConnectionLost
    } else {
        TransportErrorKind::Other
    };
    SessionError::transport(kind, error.to_string())
}

fn is_connection_lost(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(error);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>()
            && matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            )
        {
            return true;
        }
        source = err.source();
    }
    false
}
