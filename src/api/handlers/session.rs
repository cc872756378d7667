//! Signin, step-up, refresh, and device-wide revocation endpoints.

use super::require_auth;
use crate::auth::{AuthService, SigninOutcome, TokenPair};
use crate::users::UserProfile;
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SigninRequest {
    pub username: String,
    /// The challenge plaintext the client recovered with its private key.
    pub signin_challenge: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            id: pair.id,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorPendingResponse {
    pub id: String,
    /// Only good for completing the 2FA step before it expires.
    pub temp_token: String,
    pub two_factor_required: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyTwoFactorRequest {
    pub code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[utoipa::path(
    post,
    path = "/v1/sign-in",
    request_body = SigninRequest,
    responses(
        (status = 200, description = "Token pair, or a temp token when 2FA is pending", body = TokenResponse),
        (status = 400, description = "Unknown user"),
        (status = 403, description = "Challenge mismatch"),
    ),
    tag = "auth"
)]
pub async fn signin(
    auth: Extension<AuthService>,
    Json(payload): Json<SigninRequest>,
) -> impl IntoResponse {
    match auth
        .signin(&payload.username, &payload.signin_challenge)
        .await
    {
        Ok(SigninOutcome::Tokens(pair)) => {
            (StatusCode::OK, Json(TokenResponse::from(pair))).into_response()
        }
        Ok(SigninOutcome::TwoFactorPending { id, temp_token }) => (
            StatusCode::OK,
            Json(TwoFactorPendingResponse {
                id,
                temp_token,
                two_factor_required: true,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/sign-in/2fa",
    request_body = VerifyTwoFactorRequest,
    responses(
        (status = 200, description = "Step-up complete, full token pair", body = TokenResponse),
        (status = 401, description = "Missing, invalid, or expired temp token"),
        (status = 403, description = "Wrong code; the temp token may be retried"),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn verify_two_factor(
    headers: HeaderMap,
    auth: Extension<AuthService>,
    Json(payload): Json<VerifyTwoFactorRequest>,
) -> impl IntoResponse {
    let Some(temp_token) = super::bearer_token(&headers) else {
        return crate::auth::Error::Unauthorized.into_response();
    };
    match auth.verify_two_factor(temp_token, &payload.code).await {
        Ok(pair) => (StatusCode::OK, Json(TokenResponse::from(pair))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/sign-in/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Fresh token pair", body = TokenResponse),
        (status = 401, description = "Invalid, expired, or revoked refresh token"),
    ),
    tag = "auth"
)]
pub async fn refresh(
    auth: Extension<AuthService>,
    Json(payload): Json<RefreshRequest>,
) -> impl IntoResponse {
    match auth.refresh(&payload.refresh_token).await {
        Ok(pair) => (StatusCode::OK, Json(TokenResponse::from(pair))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/log-out-all",
    responses(
        (status = 200, description = "Watermark moved; every earlier token is dead", body = UserProfile),
        (status = 401, description = "Missing or invalid access token"),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout_all(headers: HeaderMap, auth: Extension<AuthService>) -> impl IntoResponse {
    let user = match require_auth(&headers, &auth).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };
    match auth.logout_everywhere(&user.id).await {
        Ok(user) => (StatusCode::OK, Json(user.to_profile())).into_response(),
        Err(err) => err.into_response(),
    }
}
