// Caller identity taken from the `x-user-id` header.
//
// There is no authentication: the id is an opaque key chosen by the client.
// A `userId` in the request body takes precedence over the header.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

pub const USER_ID_HEADER: &str = "x-user-id";

/// Optional user id extractor. Never rejects.
#[derive(Debug, Clone, Default)]
pub struct HeaderUser(pub Option<String>);

impl<S> FromRequestParts<S> for HeaderUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Ok(HeaderUser(user))
    }
}

impl HeaderUser {
    /// Resolve the effective user: body value first, then the header.
    pub fn resolve(&self, body_user: Option<&str>) -> Option<String> {
        body_user
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| self.0.clone())
    }
}
