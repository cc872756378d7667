//! Route handlers and shared helpers.
//!
//! Handlers stay thin: extract, call the orchestrator, map the outcome.
//! Every protocol error becomes exactly one `{ "error": CODE }` body; no
//! internal detail ever reaches a response.

pub mod health;
pub mod me;
pub mod session;
pub mod twofactor;
pub mod users;

use crate::auth::{AuthService, Error};
use crate::users::User;
use axum::{
    Json,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: &'static str,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidUsername | Error::AlreadyExists | Error::BadRequest | Error::Crypto(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if matches!(self, Error::Unknown) {
            error!("request failed with an internal error");
        }
        (status, Json(ErrorBody { error: self.code() })).into_response()
    }
}

/// Pulls the token out of `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolves the bearer access token to its live user, or `Unauthorized`.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    auth: &AuthService,
) -> Result<User, Error> {
    let token = bearer_token(headers).ok_or(Error::Unauthorized)?;
    auth.authenticate(token).await
}
