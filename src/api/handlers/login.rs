use async_trait::async_trait;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

use crate::{
    api::guards::ClientIp,
    warden::{TokenPair, Warden},
};

/// Outcome of checking a username and password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verification {
    Accepted { authorities: Vec<String> },
    Rejected,
}

/// Checks credentials on behalf of the login route. Warden never stores passwords.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, username: &str, password: &str) -> Verification;
}

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[utoipa::path(
    post,
    path= "/v1/auth/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Credentials accepted", body = TokenPair),
        (status = 400, description = "Missing or blank credentials"),
        (status = 401, description = "Credentials rejected"),
        (status = 429, description = "Source address is throttled"),
    ),
    tag = "auth",
)]
// axum handler for login
#[instrument(skip(warden, verifier, payload))]
pub async fn login(
    warden: Extension<Arc<Warden>>,
    verifier: Extension<Arc<dyn CredentialVerifier>>,
    client_ip: Option<Extension<ClientIp>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
        }
    };

    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing credentials".to_string()).into_response();
    }

    let ip = client_ip.map(|Extension(ClientIp(ip))| ip);

    match verifier.verify(username, &request.password).await {
        Verification::Accepted { authorities } => {
            if let Some(ip) = ip.as_deref() {
                warden.record_login(ip, username, true).await;
            }
            match warden.issue_token_pair(username, &authorities).await {
                Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
                Err(err) => {
                    error!("Failed to issue token pair: {err}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to issue tokens".to_string(),
                    )
                        .into_response()
                }
            }
        }
        Verification::Rejected => {
            if let Some(ip) = ip.as_deref() {
                warden.record_login(ip, username, false).await;
                let delay = warden.login_backoff(ip).await;
                if !delay.is_zero() {
                    debug!(ip, delay_seconds = delay.as_secs(), "delaying failed login");
                    tokio::time::sleep(delay).await;
                }
            }
            (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()).into_response()
        }
    }
}
