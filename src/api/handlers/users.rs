//! Public account endpoints: signup and profile/challenge retrieval.

use crate::auth::AuthService;
use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub username: String,
    pub public_key: String,
    /// Private key blob, encrypted client-side. The server stores it opaque.
    pub encrypted_private_key: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignupResponse {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfileResponse {
    pub id: String,
    pub public_key: String,
    pub encrypted_private_key: String,
    /// The current signin challenge, encrypted under the user's public key.
    pub encrypted_challenge: String,
}

#[utoipa::path(
    post,
    path = "/v1/sign-up",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created", body = SignupResponse),
        (status = 400, description = "Invalid username, unusable public key, or username taken"),
    ),
    tag = "auth"
)]
pub async fn signup(
    auth: Extension<AuthService>,
    Json(payload): Json<SignupRequest>,
) -> impl IntoResponse {
    match auth
        .signup(
            &payload.username,
            &payload.public_key,
            &payload.encrypted_private_key,
        )
        .await
    {
        Ok(user) => (
            StatusCode::OK,
            Json(SignupResponse {
                id: user.id,
                username: user.username,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/me-public/{username}",
    params(("username" = String, Path, description = "Account username")),
    responses(
        (status = 200, description = "Public profile with encrypted challenge", body = PublicProfileResponse),
        (status = 404, description = "Unknown username"),
    ),
    tag = "auth"
)]
pub async fn me_public(
    auth: Extension<AuthService>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    match auth.public_profile(&username).await {
        Ok(profile) => (
            StatusCode::OK,
            Json(PublicProfileResponse {
                id: profile.id,
                public_key: profile.public_key,
                encrypted_private_key: profile.encrypted_private_key,
                encrypted_challenge: profile.encrypted_challenge,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
