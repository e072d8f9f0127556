//! Authorization challenge detection.

use crate::Response;

/// Scheme token a challenge must start with.
pub const BEARER_SCHEME: &str = "bearer";

/// Default realm marker of the protected backend.
pub const DEFAULT_AUTH_REALM: &str = "\"appid_default\"";

/// Check whether a status code and `WWW-Authenticate` value form a challenge.
///
/// The status must be 401 or 403, and the lower-cased header must start with
/// the bearer scheme and contain the lower-cased realm marker.
pub fn is_authorization_required(status: u16, header: Option<&str>, realm: &str) -> bool {
    let Some(header) = header else {
        return false;
    };
    if status != 401 && status != 403 {
        return false;
    }

    let header = header.to_lowercase();
    header.starts_with(BEARER_SCHEME) && header.contains(&realm.to_lowercase())
}

/// Check whether a response is a challenge from the protected backend.
pub fn is_challenge(response: &Response, realm: &str) -> bool {
    is_authorization_required(
        response.status().as_u16(),
        response.header(http::header::WWW_AUTHENTICATE),
        realm,
    )
}
