//! HTTP response wrapper.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;

use crate::{Result, SessionError};

/// Response produced by one physical exchange.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    url: Option<url::Url>,
    bytes_sent: u64,
    bytes_received: u64,
}

impl Response {
    /// Create an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            url: None,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Create a response from a reqwest response, reading the whole body.
    pub(crate) async fn from_reqwest(
        response: reqwest::Response,
        bytes_sent: u64,
    ) -> std::result::Result<Self, reqwest::Error> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;
        let bytes_received = body.len() as u64;

        Ok(Self {
            status,
            headers,
            body,
            url: Some(url),
            bytes_sent,
            bytes_received,
        })
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set the body. Also sets the received byte count.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.bytes_received = self.body.len() as u64;
        self
    }

    /// Set the URL the response was received from.
    pub fn with_url(mut self, url: url::Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Set the number of request bytes the transport sent.
    pub fn with_bytes_sent(mut self, bytes_sent: u64) -> Self {
        self.bytes_sent = bytes_sent;
        self
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Check if the response is a redirect (3xx).
    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection()
    }

    /// Check for a client or server error status (4xx or 5xx).
    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value. Lookup is case-insensitive.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the response URL, if known.
    pub fn url(&self) -> Option<&url::Url> {
        self.url.as_ref()
    }

    /// Get the response body as bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response and return the body as bytes.
    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Request bytes sent by the transport for this exchange.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Response body bytes received for this exchange.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Get the response body as text.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| SessionError::Json(e.to_string()))
    }

    /// Parse the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| SessionError::Json(e.to_string()))
    }

    /// Turn a 4xx/5xx response into a [`SessionError::Server`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_error() {
            Err(SessionError::Server {
                status: self.status.as_u16(),
                response: Box::new(self),
            })
        } else {
            Ok(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = Response::new(StatusCode::UNAUTHORIZED)
            .with_header("WWW-Authenticate", "Bearer realm=\"x\"");

        assert_eq!(response.header("www-authenticate"), Some("Bearer realm=\"x\""));
        assert_eq!(response.header("Www-Authenticate"), Some("Bearer realm=\"x\""));
    }

    #[test]
    fn test_json_body() {
        let response = Response::new(StatusCode::OK).with_body(r#"{"records":[]}"#);
        let value: serde_json::Value = response.json().unwrap();

        assert_eq!(value["records"], serde_json::json!([]));
        assert_eq!(response.bytes_received(), 14);
    }

    #[test]
    fn test_error_for_status() {
        assert!(Response::new(StatusCode::OK).error_for_status().is_ok());

        let err = Response::new(StatusCode::BAD_GATEWAY)
            .error_for_status()
            .unwrap_err();
        assert_eq!(err.status_code(), Some(502));
    }

    #[test]
    fn test_redirect() {
        assert!(Response::new(StatusCode::FOUND).is_redirect());
        assert!(!Response::new(StatusCode::FOUND).is_error());
    }
}
