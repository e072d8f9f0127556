//! Authorization state and providers.

use async_trait::async_trait;
use base64::Engine;
use http::{Method, StatusCode};
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::transport::{PreparedRequest, Transport};
use crate::{RequestDescriptor, Result, SessionError};

/// Shared credential cache.
///
/// Many requests read the cached header concurrently; only a successful
/// authorization exchange replaces it. The value is swapped as a whole, so a
/// reader sees either the old or the new header.
#[derive(Debug, Default)]
pub struct AuthorizationState {
    header: RwLock<Option<Arc<str>>>,
}

impl AuthorizationState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state holding the given `Authorization` header value.
    pub fn with_header(header: impl Into<String>) -> Self {
        let state = Self::new();
        state.set_header(header);
        state
    }

    /// The cached `Authorization` header value, if any.
    pub fn cached_header(&self) -> Option<Arc<str>> {
        self.header.read().clone()
    }

    /// Replace the cached header.
    pub fn set_header(&self, header: impl Into<String>) {
        let header: Arc<str> = Arc::from(header.into());
        *self.header.write() = Some(header);
    }

    /// Drop the cached header.
    pub fn clear(&self) {
        *self.header.write() = None;
    }
}

/// Performs the authorization exchange that refreshes an [`AuthorizationState`].
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// Obtain or refresh the credential and store it in `state`.
    ///
    /// Returns the status of the exchange. The session treats anything other
    /// than a 2xx status, or an error, as a failed authorization.
    async fn obtain_authorization(&self, state: &AuthorizationState) -> Result<StatusCode>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// Client-credentials authorizer against an OAuth2-style token endpoint.
///
/// The token request goes straight to the transport and is never decorated:
/// it carries only its own Basic credentials, never the cached `Authorization`
/// header or a tracking id, and can never trigger another challenge cycle.
pub struct TokenEndpointAuthorizer {
    token_url: String,
    client_id: String,
    client_secret: String,
    timeout: Duration,
    transport: Arc<dyn Transport>,
}

impl TokenEndpointAuthorizer {
    /// Create an authorizer for the given token endpoint.
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout: Duration::from_secs(20),
            transport,
        }
    }

    /// Set the timeout of the token exchange.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn token_request(&self) -> Result<RequestDescriptor> {
        let form = serde_urlencoded::to_string([("grant_type", "client_credentials")])
            .map_err(|e| SessionError::Json(e.to_string()))?;
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.client_id, self.client_secret));

        Ok(RequestDescriptor::new(Method::POST, self.token_url.clone())
            .header("Authorization", format!("Basic {}", credentials))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(form)
            .timeout(self.timeout))
    }
}

#[async_trait]
impl AuthorizationProvider for TokenEndpointAuthorizer {
    async fn obtain_authorization(&self, state: &AuthorizationState) -> Result<StatusCode> {
        let request = self.token_request()?;
        let url = request.resolve_url(None)?;
        let prepared = PreparedRequest::new(&request, url, self.timeout);

        debug!(url = %self.token_url, "Requesting access token");
        let response = self.transport.fetch(prepared).await?;

        if !response.is_success() {
            warn!(status = %response.status(), "Token endpoint rejected authorization");
            return Ok(response.status());
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| SessionError::Authorization(format!("invalid token response: {}", e)))?;
        let scheme = token.token_type.unwrap_or_else(|| "Bearer".to_string());
        state.set_header(format!("{} {}", scheme, token.access_token));

        Ok(response.status())
    }
}
