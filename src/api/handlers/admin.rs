//! Operator endpoints for inspecting and overriding the per-address state.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::{
    api::guards::canonical_ip,
    error::StoreError,
    throttle::{IpStatistics, ListEntry},
    warden::Warden,
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct IpDetails {
    pub statistics: IpStatistics,
    pub blacklist: Option<ListEntry>,
    pub whitelist: Option<ListEntry>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct BlacklistRequest {
    reason: String,
    /// Defaults to the configured blacklist duration; zero or less never expires.
    duration_minutes: Option<i64>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct WhitelistRequest {
    reason: String,
}

fn parse_ip(ip: &str) -> Result<String, Response> {
    canonical_ip(ip)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Invalid IP address".to_string()).into_response())
}

fn store_unavailable(err: &StoreError) -> Response {
    error!("Admin operation failed: {err}");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "Store unavailable".to_string(),
    )
        .into_response()
}

fn removed(found: Result<bool, StoreError>) -> Response {
    match found {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "Not found".to_string()).into_response(),
        Err(err) => store_unavailable(&err),
    }
}

fn reason_or_reject(reason: &str) -> Result<&str, Response> {
    let reason = reason.trim();
    if reason.is_empty() {
        Err((StatusCode::BAD_REQUEST, "Missing reason".to_string()).into_response())
    } else {
        Ok(reason)
    }
}

#[utoipa::path(
    get,
    path= "/v1/admin/ips/{ip}",
    params(("ip" = String, Path, description = "Source address")),
    responses (
        (status = 200, description = "Statistics and list entries", body = IpDetails),
        (status = 400, description = "Invalid IP address"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not an administrator"),
        (status = 503, description = "Store unavailable"),
    ),
    security(("bearer" = [])),
    tag = "admin",
)]
pub async fn ip_details(warden: Extension<Arc<Warden>>, Path(ip): Path<String>) -> Response {
    let ip = match parse_ip(&ip) {
        Ok(ip) => ip,
        Err(response) => return response,
    };

    let blacklist = match warden.lists().blacklist_entry(&ip).await {
        Ok(entry) => entry,
        Err(err) => return store_unavailable(&err),
    };
    let whitelist = match warden.lists().whitelist_entry(&ip).await {
        Ok(entry) => entry,
        Err(err) => return store_unavailable(&err),
    };

    Json(IpDetails {
        statistics: warden.statistics(&ip).await,
        blacklist,
        whitelist,
    })
    .into_response()
}

#[utoipa::path(
    put,
    path= "/v1/admin/ips/{ip}/blacklist",
    params(("ip" = String, Path, description = "Source address")),
    request_body = BlacklistRequest,
    responses (
        (status = 204, description = "Address blacklisted"),
        (status = 400, description = "Invalid IP address or missing reason"),
        (status = 503, description = "Store unavailable"),
    ),
    security(("bearer" = [])),
    tag = "admin",
)]
pub async fn add_to_blacklist(
    warden: Extension<Arc<Warden>>,
    Path(ip): Path<String>,
    payload: Option<Json<BlacklistRequest>>,
) -> Response {
    let ip = match parse_ip(&ip) {
        Ok(ip) => ip,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let reason = match reason_or_reject(&request.reason) {
        Ok(reason) => reason,
        Err(response) => return response,
    };

    let minutes = request
        .duration_minutes
        .unwrap_or(warden.policy().blacklist_duration_minutes);
    match warden.lists().blacklist(&ip, reason, minutes).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => store_unavailable(&err),
    }
}

#[utoipa::path(
    delete,
    path= "/v1/admin/ips/{ip}/blacklist",
    params(("ip" = String, Path, description = "Source address")),
    responses (
        (status = 204, description = "Entry removed"),
        (status = 404, description = "Address was not blacklisted"),
        (status = 503, description = "Store unavailable"),
    ),
    security(("bearer" = [])),
    tag = "admin",
)]
pub async fn remove_from_blacklist(
    warden: Extension<Arc<Warden>>,
    Path(ip): Path<String>,
) -> Response {
    match parse_ip(&ip) {
        Ok(ip) => removed(warden.lists().remove_from_blacklist(&ip).await),
        Err(response) => response,
    }
}

#[utoipa::path(
    put,
    path= "/v1/admin/ips/{ip}/whitelist",
    params(("ip" = String, Path, description = "Source address")),
    request_body = WhitelistRequest,
    responses (
        (status = 204, description = "Address whitelisted"),
        (status = 400, description = "Invalid IP address or missing reason"),
        (status = 503, description = "Store unavailable"),
    ),
    security(("bearer" = [])),
    tag = "admin",
)]
pub async fn add_to_whitelist(
    warden: Extension<Arc<Warden>>,
    Path(ip): Path<String>,
    payload: Option<Json<WhitelistRequest>>,
) -> Response {
    let ip = match parse_ip(&ip) {
        Ok(ip) => ip,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let reason = match reason_or_reject(&request.reason) {
        Ok(reason) => reason,
        Err(response) => return response,
    };

    match warden.lists().whitelist(&ip, reason).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => store_unavailable(&err),
    }
}

#[utoipa::path(
    delete,
    path= "/v1/admin/ips/{ip}/whitelist",
    params(("ip" = String, Path, description = "Source address")),
    responses (
        (status = 204, description = "Entry removed"),
        (status = 404, description = "Address was not whitelisted"),
        (status = 503, description = "Store unavailable"),
    ),
    security(("bearer" = [])),
    tag = "admin",
)]
pub async fn remove_from_whitelist(
    warden: Extension<Arc<Warden>>,
    Path(ip): Path<String>,
) -> Response {
    match parse_ip(&ip) {
        Ok(ip) => removed(warden.lists().remove_from_whitelist(&ip).await),
        Err(response) => response,
    }
}

#[utoipa::path(
    delete,
    path= "/v1/admin/ips/{ip}/threat",
    params(("ip" = String, Path, description = "Source address")),
    responses (
        (status = 204, description = "Threat score cleared"),
        (status = 404, description = "Address had no threat score"),
        (status = 503, description = "Store unavailable"),
    ),
    security(("bearer" = [])),
    tag = "admin",
)]
pub async fn clear_threat(warden: Extension<Arc<Warden>>, Path(ip): Path<String>) -> Response {
    let ip = match parse_ip(&ip) {
        Ok(ip) => ip,
        Err(response) => return response,
    };
    let result = warden.threat().clear(&ip).await;
    if matches!(result, Ok(true)) {
        info!(ip = %ip, "threat score cleared");
    }
    removed(result)
}
