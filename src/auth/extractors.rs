use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use super::jwt::JwtKeys;
use crate::users::error::UserError;

/// Pulls the token out of an `Authorization` value of the form `Bearer <token>`.
///
/// Shared by the HTTP extractor and the gRPC metadata check so both surfaces
/// reject the same malformed headers.
pub fn bearer_token(header: &str) -> Option<&str> {
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

/// Authenticates a raw `Authorization` value and returns the user id.
pub fn authenticate(keys: &JwtKeys, header: Option<&str>) -> Result<Uuid, UserError> {
    let header = header.ok_or(UserError::Unauthorized)?;
    let token = bearer_token(header).ok_or(UserError::Unauthorized)?;
    match keys.verify(token) {
        Ok(claims) => Ok(claims.sub),
        Err(e) => {
            warn!(error = %e, "invalid or expired token");
            Err(UserError::Unauthorized)
        }
    }
}

/// Extracts and validates the bearer JWT, returning the caller's user id.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = UserError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        authenticate(&keys, header).map(AuthUser)
    }
}
