use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::{api::guards::AuthenticatedPrincipal, warden::Warden};

#[derive(ToSchema, Deserialize, Debug)]
pub struct RefreshRequest {
    refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct LogoutRequest {
    refresh_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Me {
    pub subject: String,
    pub authorities: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[utoipa::path(
    post,
    path= "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses (
        (status = 200, description = "New access token", body = AccessTokenResponse),
        (status = 400, description = "Missing payload"),
        (status = 401, description = "Refresh token is unknown, expired or revoked"),
    ),
    tag = "auth",
)]
// axum handler for refresh
pub async fn refresh(
    warden: Extension<Arc<Warden>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let request: RefreshRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
        }
    };

    match warden.refresh_access_token(&request.refresh_token).await {
        Some(access_token) => (
            StatusCode::OK,
            Json(AccessTokenResponse {
                access_token,
                token_type: "Bearer".to_string(),
                expires_in: warden.access_ttl().as_secs(),
            }),
        )
            .into_response(),
        None => (StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string()).into_response(),
    }
}

#[utoipa::path(
    post,
    path= "/v1/auth/logout",
    request_body(content = LogoutRequest, description = "Refresh token to revoke alongside the access token"),
    responses (
        (status = 204, description = "Tokens revoked"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 503, description = "Revocation could not be stored"),
    ),
    security(("bearer" = [])),
    tag = "auth",
)]
// axum handler for logout
pub async fn logout(
    warden: Extension<Arc<Warden>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
    payload: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(payload)| payload).unwrap_or_default();

    if let Err(err) = warden.revoke_access_token(&principal.token).await {
        error!("Failed to revoke access token: {err}");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Failed to revoke token".to_string(),
        )
            .into_response();
    }

    if let Some(refresh_token) = request.refresh_token.as_deref() {
        match warden.validate_refresh_token(refresh_token).await {
            Some(owner) if owner == principal.subject => {
                if let Err(err) = warden.revoke_refresh_token(refresh_token).await {
                    error!("Failed to revoke refresh token: {err}");
                    return (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "Failed to revoke token".to_string(),
                    )
                        .into_response();
                }
            }
            Some(_) => {
                warn!(subject = %principal.subject, "refusing to revoke another principal's refresh token");
            }
            None => {}
        }
    }

    info!(subject = %principal.subject, "logged out");
    StatusCode::NO_CONTENT.into_response()
}

#[utoipa::path(
    get,
    path= "/v1/auth/me",
    responses (
        (status = 200, description = "Authenticated principal", body = Me),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("bearer" = [])),
    tag = "auth",
)]
// axum handler for me
pub async fn me(Extension(principal): Extension<AuthenticatedPrincipal>) -> impl IntoResponse {
    Json(Me {
        subject: principal.subject,
        authorities: principal.authorities,
        expires_at: principal.expires_at,
    })
}
