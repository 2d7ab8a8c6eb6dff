use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{delete, get, post, put},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

use crate::warden::Warden;

pub mod handlers;
pub mod guards;
mod openapi;

pub use self::handlers::login::{CredentialVerifier, Verification};
pub use self::guards::{canonical_ip, AuthenticatedPrincipal, ClientIp};
pub use self::openapi::openapi;

pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

/// Build the application router.
///
/// The login route is only mounted when a credential verifier is supplied.
#[must_use]
pub fn router(warden: Arc<Warden>, verifier: Option<Arc<dyn CredentialVerifier>>) -> Router {
    let admin = Router::new()
        .route("/v1/admin/ips/:ip", get(handlers::admin::ip_details))
        .route(
            "/v1/admin/ips/:ip/blacklist",
            put(handlers::admin::add_to_blacklist).delete(handlers::admin::remove_from_blacklist),
        )
        .route(
            "/v1/admin/ips/:ip/whitelist",
            put(handlers::admin::add_to_whitelist).delete(handlers::admin::remove_from_whitelist),
        )
        .route("/v1/admin/ips/:ip/threat", delete(handlers::admin::clear_threat))
        .route_layer(middleware::from_fn(guards::require_admin));

    let authenticated = Router::new()
        .route("/v1/auth/logout", post(handlers::tokens::logout))
        .route("/v1/auth/me", get(handlers::tokens::me))
        .merge(admin)
        .route_layer(middleware::from_fn(guards::require_bearer));

    let mut app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/openapi.json", get(handlers::health::openapi_json))
        .route("/v1/auth/refresh", post(handlers::tokens::refresh))
        .merge(authenticated);

    if let Some(verifier) = verifier {
        app = app.route(
            "/v1/auth/login",
            post(handlers::login::login).layer(Extension(verifier)),
        );
    }

    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(warden))
            .layer(middleware::from_fn(guards::throttle)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn new(
    port: u16,
    warden: Arc<Warden>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
) -> Result<()> {
    let app = router(warden, verifier);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
