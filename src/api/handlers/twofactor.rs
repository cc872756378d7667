//! Two-factor enrollment and lifecycle endpoints.

use super::require_auth;
use crate::auth::AuthService;
use crate::users::UserProfile;
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct TwoFactorSecretResponse {
    /// otpauth:// provisioning URI, typically rendered as a QR code. Shown
    /// once; only the sealed secret is persisted.
    pub uri: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TwoFactorCodeRequest {
    pub code: String,
}

#[utoipa::path(
    post,
    path = "/v1/2fa/secret",
    responses(
        (status = 200, description = "Enrollment started", body = TwoFactorSecretResponse),
        (status = 401, description = "Missing or invalid access token"),
    ),
    security(("bearer" = [])),
    tag = "2fa"
)]
pub async fn generate_secret(
    headers: HeaderMap,
    auth: Extension<AuthService>,
) -> impl IntoResponse {
    let user = match require_auth(&headers, &auth).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };
    match auth.enroll_two_factor(&user).await {
        Ok(uri) => (StatusCode::OK, Json(TwoFactorSecretResponse { uri })).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/2fa/enable",
    request_body = TwoFactorCodeRequest,
    responses(
        (status = 200, description = "2FA enabled", body = UserProfile),
        (status = 401, description = "Missing or invalid access token"),
        (status = 403, description = "Wrong code"),
    ),
    security(("bearer" = [])),
    tag = "2fa"
)]
pub async fn enable(
    headers: HeaderMap,
    auth: Extension<AuthService>,
    Json(payload): Json<TwoFactorCodeRequest>,
) -> impl IntoResponse {
    let user = match require_auth(&headers, &auth).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };
    match auth.enable_two_factor(&user, &payload.code).await {
        Ok(updated) => (StatusCode::OK, Json(updated.to_profile())).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/2fa/disable",
    request_body = TwoFactorCodeRequest,
    responses(
        (status = 200, description = "2FA disabled", body = UserProfile),
        (status = 401, description = "Missing or invalid access token"),
        (status = 403, description = "Wrong code"),
    ),
    security(("bearer" = [])),
    tag = "2fa"
)]
pub async fn disable(
    headers: HeaderMap,
    auth: Extension<AuthService>,
    Json(payload): Json<TwoFactorCodeRequest>,
) -> impl IntoResponse {
    let user = match require_auth(&headers, &auth).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };
    match auth.disable_two_factor(&user, &payload.code).await {
        Ok(updated) => (StatusCode::OK, Json(updated.to_profile())).into_response(),
        Err(err) => err.into_response(),
    }
}
