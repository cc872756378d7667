//! Authenticated self-service endpoints.

use super::require_auth;
use crate::api::ApiConfig;
use crate::auth::AuthService;
use crate::users::UserProfile;
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[serde(flatten)]
    pub profile: UserProfile,
    /// The service's own public key, when configured, so clients can
    /// encrypt payloads addressed to the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_public_key: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCredentialRequest {
    pub encrypted_private_key: String,
    /// Fresh proof of possession: the current challenge plaintext.
    pub signin_challenge: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteAccountResponse {
    pub id: String,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Authenticated user profile", body = MeResponse),
        (status = 401, description = "Missing, invalid, or revoked access token"),
    ),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn get_me(
    headers: HeaderMap,
    auth: Extension<AuthService>,
    config: Extension<Arc<ApiConfig>>,
) -> impl IntoResponse {
    match require_auth(&headers, &auth).await {
        Ok(user) => (
            StatusCode::OK,
            Json(MeResponse {
                profile: user.to_profile(),
                backend_public_key: config.backend_public_key.clone(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/me/password",
    request_body = ChangeCredentialRequest,
    responses(
        (status = 200, description = "Credential rotated; all other sessions revoked", body = UserProfile),
        (status = 401, description = "Missing or invalid access token"),
        (status = 403, description = "Challenge mismatch"),
    ),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn change_credential(
    headers: HeaderMap,
    auth: Extension<AuthService>,
    Json(payload): Json<ChangeCredentialRequest>,
) -> impl IntoResponse {
    let user = match require_auth(&headers, &auth).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };
    match auth
        .change_credential(
            &user.id,
            &payload.encrypted_private_key,
            &payload.signin_challenge,
        )
        .await
    {
        Ok(updated) => (StatusCode::OK, Json(updated.to_profile())).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/me",
    responses(
        (status = 200, description = "Account and lookup record removed", body = DeleteAccountResponse),
        (status = 401, description = "Missing or invalid access token"),
    ),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn delete_me(headers: HeaderMap, auth: Extension<AuthService>) -> impl IntoResponse {
    let user = match require_auth(&headers, &auth).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };
    match auth.delete_account(&user.id).await {
        Ok(()) => (StatusCode::OK, Json(DeleteAccountResponse { id: user.id })).into_response(),
        Err(err) => err.into_response(),
    }
}
