// Caller identity.
//
// Session handling lives in front of this service; by the time a request
// arrives the gateway has put the authenticated user's id in `x-user-id`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use valeris_core::db::Database;
use valeris_core::models::Role;

use crate::error::{ApiError, ApiResult};

pub const USER_HEADER: &str = "x-user-id";

/// The authenticated user. Rejects with 401 when the header is missing,
/// empty or not valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_HEADER} header")))
    }
}

/// 403 unless the user has an admin profile.
pub fn require_admin(db: &Database, user: &UserId) -> ApiResult<()> {
    match db.get_profile(user.as_str())? {
        Some(profile) if profile.role == Role::Admin => Ok(()),
        _ => Err(ApiError::Forbidden("admin access required".to_string())),
    }
}
