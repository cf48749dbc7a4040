//! Caller identity as forwarded by the upstream authentication proxy.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use lms_core::model::{Caller, Role, UserId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Already-authenticated caller. Rejects with 401 when either header is
/// missing or unreadable.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &'static str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ApiError::unauthenticated(format!("missing {name} header")))
        };

        let user_id = header(USER_ID_HEADER)?
            .parse::<UserId>()
            .map_err(|err| ApiError::unauthenticated(err.to_string()))?;
        let role = header(USER_ROLE_HEADER)?
            .parse::<Role>()
            .map_err(|err| ApiError::unauthenticated(err.to_string()))?;
        Ok(Self(Caller::new(user_id, role)))
    }
}
