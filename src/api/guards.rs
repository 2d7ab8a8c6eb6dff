//! Request guards shared by the routes.
//!
//! - [`throttle`] runs on every request and asks [`Warden::allow`] before the
//!   handler is reached.
//! - [`require_bearer`] authenticates `Authorization: Bearer <token>` and exposes
//!   the caller as an [`AuthenticatedPrincipal`] extension.
//! - [`require_admin`] additionally demands the `ROLE_ADMIN` authority.

use axum::{
    extract::{ConnectInfo, Request},
    http::{header::AUTHORIZATION, header::USER_AGENT, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use chrono::{DateTime, Utc};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use tracing::{debug, warn};

use crate::{api::ROLE_ADMIN, token::TokenRejection, warden::Warden};

/// Source address the request was attributed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// Caller identified by a valid access token.
#[derive(Clone, Debug)]
pub struct AuthenticatedPrincipal {
    pub subject: String,
    pub authorities: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub token: String,
}

impl AuthenticatedPrincipal {
    #[must_use]
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.iter().any(|granted| granted == authority)
    }
}

/// Text form used for every per-address key: IPv4-mapped IPv6 collapses to IPv4 and
/// IPv6 is written compressed and lowercase.
#[must_use]
pub fn canonical_ip(raw: &str) -> Option<String> {
    raw.trim()
        .parse::<IpAddr>()
        .ok()
        .map(|addr| addr.to_canonical().to_string())
}

/// First entry of `X-Forwarded-For`, then `X-Real-IP`. Values that are not an address
/// are ignored.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(canonical_ip);
    if forwarded.is_some() {
        return forwarded;
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(canonical_ip)
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn throttle(
    Extension(warden): Extension<Arc<Warden>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr.ip().to_canonical());
    let forwarded = if warden.policy().trusts_forwarded_headers(peer) {
        extract_client_ip(request.headers())
    } else {
        debug!(peer = ?peer, "ignoring forwarded headers from untrusted peer");
        None
    };
    let ip = forwarded.or_else(|| peer.map(|peer| peer.to_string()));

    let Some(ip) = ip else {
        debug!("no client address, skipping throttle");
        return next.run(request).await;
    };

    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok());

    if !warden.allow(&ip, user_agent).await {
        debug!(ip = %ip, "request refused");
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    request.extensions_mut().insert(ClientIp(ip));
    next.run(request).await
}

pub async fn require_bearer(
    Extension(warden): Extension<Arc<Warden>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()).map(str::to_string) else {
        return (StatusCode::UNAUTHORIZED, "Missing bearer token".to_string()).into_response();
    };

    let claims = match warden.inspect_access_token(&token).await {
        Ok(claims) => claims,
        Err(TokenRejection::StoreUnavailable) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                "Token validation unavailable".to_string(),
            )
                .into_response();
        }
        Err(rejection) => {
            debug!("bearer token rejected: {rejection}");
            return (StatusCode::UNAUTHORIZED, "Invalid token".to_string()).into_response();
        }
    };

    let Some(expires_at) = DateTime::<Utc>::from_timestamp(claims.exp, 0) else {
        return (StatusCode::UNAUTHORIZED, "Invalid token".to_string()).into_response();
    };

    request.extensions_mut().insert(AuthenticatedPrincipal {
        subject: claims.sub,
        authorities: claims.authorities,
        expires_at,
        token,
    });
    next.run(request).await
}

pub async fn require_admin(
    principal: Option<Extension<AuthenticatedPrincipal>>,
    request: Request,
    next: Next,
) -> Response {
    match principal {
        Some(Extension(principal)) if principal.has_authority(ROLE_ADMIN) => {
            next.run(request).await
        }
        Some(Extension(principal)) => {
            warn!(subject = %principal.subject, "admin route refused");
            (StatusCode::FORBIDDEN, "Forbidden".to_string()).into_response()
        }
        None => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" "));
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn client_ip_is_canonical() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("2001:DB8:0::1"));
        assert_eq!(extract_client_ip(&headers), Some("2001:db8::1".to_string()));

        headers.insert("x-forwarded-for", HeaderValue::from_static("::ffff:192.0.2.1"));
        assert_eq!(extract_client_ip(&headers), Some("192.0.2.1".to_string()));

        headers.insert("x-forwarded-for", HeaderValue::from_static("unknown, 1.2.3.4"));
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));

        assert_eq!(canonical_ip(" 10.0.0.1 "), Some("10.0.0.1".to_string()));
        assert_eq!(canonical_ip("example.com"), None);
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn authority_lookup() {
        let principal = AuthenticatedPrincipal {
            subject: "alice".to_string(),
            authorities: vec!["ROLE_USER".to_string(), ROLE_ADMIN.to_string()],
            expires_at: Utc::now(),
            token: String::new(),
        };
        assert!(principal.has_authority(ROLE_ADMIN));
        assert!(!principal.has_authority("ROLE_OTHER"));
    }
}
