//! Request descriptor.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::time::Duration;

use crate::{Result, SessionError};

/// Cache behaviour requested for an exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Let the transport apply standard HTTP caching rules.
    #[default]
    UseProtocolCachePolicy,
    /// Always go to the origin.
    ReloadIgnoringLocalCacheData,
    /// Prefer cached data of any age, load otherwise.
    ReturnCacheDataElseLoad,
    /// Only use cached data.
    ReturnCacheDataDontLoad,
}

impl CachePolicy {
    /// `Cache-Control` directive that expresses this policy, if any.
    pub fn cache_control(&self) -> Option<&'static str> {
        match self {
            Self::UseProtocolCachePolicy => None,
            Self::ReloadIgnoringLocalCacheData => Some("no-cache"),
            Self::ReturnCacheDataElseLoad => Some("max-stale"),
            Self::ReturnCacheDataDontLoad => Some("only-if-cached"),
        }
    }
}

/// Description of one logical request.
///
/// The session never mutates a descriptor handed to it; decoration and
/// reauthorization always work on copies.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Option<Bytes>,
    cache_policy: CachePolicy,
    timeout: Option<Duration>,
    allow_redirects: bool,
}

impl RequestDescriptor {
    /// Create a new descriptor.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            cache_policy: CachePolicy::default(),
            timeout: None,
            allow_redirects: true,
        }
    }

    /// Create a GET descriptor.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a POST descriptor.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Create a PUT descriptor.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Create a PATCH descriptor.
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    /// Create a DELETE descriptor.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Create a HEAD descriptor.
    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::HEAD, url)
    }

    /// Add a header, replacing any previous value under the same name.
    ///
    /// Invalid names or values are logged and skipped.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.set_header(name.as_ref(), value.as_ref());
        self
    }

    /// Add multiple headers to the request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add multiple query parameters.
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.query.push((k.into(), v.into()));
        }
        self
    }

    /// Set the request body as raw bytes.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the request body as text.
    ///
    /// `Content-Type: text/plain` is added unless a content type is already set.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        if !self.headers.contains_key(http::header::CONTENT_TYPE) {
            self.headers.insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain"),
            );
        }
        self.body = Some(Bytes::from(text.into()));
        self
    }

    /// Set the request body as JSON.
    pub fn json<T: Serialize>(mut self, json: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(json).map_err(|e| SessionError::Json(e.to_string()))?;
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    /// Set the cache policy.
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Set a custom timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Allow or forbid following redirects.
    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }

    pub(crate) fn set_header(&mut self, name: &str, value: &str) {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Skipping invalid request header"),
        }
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL as supplied, before resolution.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request headers.
    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value. Lookup is case-insensitive.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Query parameters to append on resolution.
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    /// Request body.
    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Cache policy.
    pub fn get_cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    /// Per-request timeout, if set.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether the transport may follow redirects.
    pub fn redirects_allowed(&self) -> bool {
        self.allow_redirects
    }

    /// Resolve the target into an absolute URL with query parameters appended.
    ///
    /// A URL without an `http://` or `https://` scheme is treated as relative
    /// to `app_route` when one is given.
    pub fn resolve_url(&self, app_route: Option<&str>) -> Result<url::Url> {
        let is_absolute = self.url.contains("http://") || self.url.contains("https://");
        let target = match app_route {
            Some(route) if !is_absolute => format!("{}{}", route, self.url),
            _ => self.url.clone(),
        };

        let mut url = url::Url::parse(&target).map_err(|e| {
            SessionError::MalformedUrl(format!(
                "The supplied resource url is not a valid url: {} ({})",
                target, e
            ))
        })?;

        if !self.query.is_empty() {
            if url.cannot_be_a_base() {
                return Err(SessionError::MalformedUrl(format!(
                    "Failed to append the query parameters to the resource url: {}",
                    target
                )));
            }
            let mut query_pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                query_pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_url_uses_app_route() {
        let request = RequestDescriptor::get("/images");
        let url = request
            .resolve_url(Some("https://bluepic.example.com"))
            .unwrap();

        assert_eq!(url.as_str(), "https://bluepic.example.com/images");
    }

    #[test]
    fn test_absolute_url_ignores_app_route() {
        let request = RequestDescriptor::get("http://other.example.com/tags");
        let url = request
            .resolve_url(Some("https://bluepic.example.com"))
            .unwrap();

        assert_eq!(url.host_str(), Some("other.example.com"));
    }

    #[test]
    fn test_query_parameters_are_encoded() {
        let request = RequestDescriptor::get("https://bluepic.example.com/images?limit=5")
            .query("tag", "sunset beach");
        let url = request.resolve_url(None).unwrap();

        assert_eq!(url.query(), Some("limit=5&tag=sunset+beach"));
    }

    #[test]
    fn test_malformed_url() {
        let err = RequestDescriptor::get("not a url").resolve_url(None).unwrap_err();
        assert!(matches!(err, SessionError::MalformedUrl(_)));
    }

    #[test]
    fn test_query_on_opaque_url_is_malformed() {
        let err = RequestDescriptor::get("mailto:someone@example.com")
            .query("a", "b")
            .resolve_url(None)
            .unwrap_err();
        assert!(matches!(err, SessionError::MalformedUrl(_)));
    }

    #[test]
    fn test_text_keeps_existing_content_type() {
        let request = RequestDescriptor::post("/users")
            .header("Content-Type", "application/xml")
            .text("<user/>");
        assert_eq!(request.header_value("content-type"), Some("application/xml"));

        let request = RequestDescriptor::post("/users").text("hello");
        assert_eq!(request.header_value("content-type"), Some("text/plain"));
        assert_eq!(request.body_bytes().map(|b| b.len()), Some(5));
    }

    #[test]
    fn test_defaults() {
        let request = RequestDescriptor::get("/images");
        assert!(request.redirects_allowed());
        assert_eq!(request.get_cache_policy(), CachePolicy::UseProtocolCachePolicy);
        assert!(request.get_timeout().is_none());
        assert_eq!(
            CachePolicy::ReloadIgnoringLocalCacheData.cache_control(),
            Some("no-cache")
        );
    }
}
