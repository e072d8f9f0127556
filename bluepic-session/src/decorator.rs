//! Request decoration with authorization and tracking headers.

use std::sync::Arc;
use uuid::Uuid;

use crate::{AuthorizationState, RequestDescriptor};

/// Header carrying the per-exchange tracking identifier.
pub const TRACKING_ID_HEADER: &str = "x-wl-analytics-tracking-id";

/// Header carrying the application's analytics metadata.
pub const ANALYTICS_METADATA_HEADER: &str = "x-mfp-analytics-metadata";

/// Adds authorization and analytics headers to outgoing requests.
#[derive(Debug, Clone)]
pub struct RequestDecorator {
    state: Arc<AuthorizationState>,
    analytics_metadata: Option<String>,
}

impl RequestDecorator {
    /// Create a decorator reading credentials from `state`.
    pub fn new(state: Arc<AuthorizationState>) -> Self {
        Self {
            state,
            analytics_metadata: None,
        }
    }

    /// Set the analytics metadata header value.
    pub fn with_analytics_metadata(mut self, metadata: Option<String>) -> Self {
        self.analytics_metadata = metadata;
        self
    }

    /// The shared authorization state.
    pub fn state(&self) -> &Arc<AuthorizationState> {
        &self.state
    }

    /// Return a decorated copy of `request`.
    ///
    /// With `precondition` false the copy is returned untouched: requests that
    /// belong to an authorization exchange must not carry the cached
    /// credential. Otherwise the cached `Authorization` header (if any), a
    /// fresh tracking id and the analytics metadata (if any) are set.
    pub fn decorate(&self, request: &RequestDescriptor, precondition: bool) -> RequestDescriptor {
        let mut decorated = request.clone();
        if !precondition {
            return decorated;
        }

        if let Some(header) = self.state.cached_header() {
            decorated.set_header(http::header::AUTHORIZATION.as_str(), &header);
        }

        decorated.set_header(TRACKING_ID_HEADER, &Uuid::new_v4().to_string());
        if let Some(metadata) = &self.analytics_metadata {
            decorated.set_header(ANALYTICS_METADATA_HEADER, metadata);
        }

        decorated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decorator_with_credential() -> RequestDecorator {
        RequestDecorator::new(Arc::new(AuthorizationState::with_header("Bearer abc")))
    }

    #[test]
    fn test_decorate_adds_headers() {
        let decorator =
            decorator_with_credential().with_analytics_metadata(Some("{\"os\":\"ios\"}".into()));
        let request = RequestDescriptor::get("/images");

        let decorated = decorator.decorate(&request, true);

        assert_eq!(decorated.header_value("authorization"), Some("Bearer abc"));
        assert!(decorated.header_value(TRACKING_ID_HEADER).is_some());
        assert_eq!(
            decorated.header_value(ANALYTICS_METADATA_HEADER),
            Some("{\"os\":\"ios\"}")
        );
        assert!(request.header_map().is_empty());
    }

    #[test]
    fn test_authorization_exchange_is_not_decorated() {
        let decorator = decorator_with_credential();
        let request = RequestDescriptor::post("/oauth/token");

        let decorated = decorator.decorate(&request, false);

        assert!(decorated.header_value("authorization").is_none());
        assert!(decorated.header_value(TRACKING_ID_HEADER).is_none());
    }

    #[test]
    fn test_missing_credential_skips_authorization() {
        let decorator = RequestDecorator::new(Arc::new(AuthorizationState::new()));
        let decorated = decorator.decorate(&RequestDescriptor::get("/images"), true);

        assert!(decorated.header_value("authorization").is_none());
        assert!(decorated.header_value(ANALYTICS_METADATA_HEADER).is_none());
        assert!(decorated.header_value(TRACKING_ID_HEADER).is_some());
    }

    #[test]
    fn test_each_decoration_gets_fresh_tracking_id() {
        let decorator = decorator_with_credential();
        let request = RequestDescriptor::get("/images");

        let first = decorator.decorate(&request, true);
        let second = decorator.decorate(&request, true);

        assert_ne!(
            first.header_value(TRACKING_ID_HEADER),
            second.header_value(TRACKING_ID_HEADER)
        );
        assert_eq!(second.header_map().len(), 2);
    }
}
