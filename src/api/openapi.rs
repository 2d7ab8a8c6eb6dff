use crate::api::handlers::{admin, health, login, tokens};
use utoipa::{
    openapi::{
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
        Components, Contact, InfoBuilder, License,
    },
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::openapi_json,
        login::login,
        tokens::refresh,
        tokens::logout,
        tokens::me,
        admin::ip_details,
        admin::add_to_blacklist,
        admin::remove_from_blacklist,
        admin::add_to_whitelist,
        admin::remove_from_whitelist,
        admin::clear_threat,
    ),
    components(schemas(
        health::Health,
        login::LoginRequest,
        tokens::RefreshRequest,
        tokens::AccessTokenResponse,
        tokens::LogoutRequest,
        tokens::Me,
        admin::IpDetails,
        admin::BlacklistRequest,
        admin::WhitelistRequest,
        crate::warden::TokenPair,
        crate::throttle::IpStatistics,
        crate::throttle::ListEntry,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Service status"),
        (name = "auth", description = "Login and token lifecycle"),
        (name = "admin", description = "Per-address throttle state"),
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Components::new);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// `OpenAPI` document served at `/openapi.json`.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info = cargo_info();
    doc
}

fn cargo_info() -> utoipa::openapi::Info {
    // Use Cargo.toml metadata instead of the utoipa crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();
    info
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        (
            Some(name).filter(|name| !name.is_empty()),
            Some(email).filter(|email| !email.is_empty()),
        )
    } else {
        (Some(author.trim()).filter(|name| !name.is_empty()), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_uses_cargo_metadata() {
        let doc = openapi();
        assert_eq!(doc.info.title, "warden");
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));
        let contact = doc.info.contact.as_ref();
        assert_eq!(
            contact.and_then(|contact| contact.email.as_deref()),
            Some("team@warden.dev")
        );
        assert_eq!(
            doc.info.license.as_ref().map(|license| license.name.as_str()),
            Some("BSD-3-Clause")
        );
    }

    #[test]
    fn document_lists_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/openapi.json",
            "/v1/auth/login",
            "/v1/auth/refresh",
            "/v1/auth/logout",
            "/v1/auth/me",
            "/v1/admin/ips/{ip}",
            "/v1/admin/ips/{ip}/blacklist",
            "/v1/admin/ips/{ip}/whitelist",
            "/v1/admin/ips/{ip}/threat",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let schemes = doc
            .components
            .as_ref()
            .map(|components| components.security_schemes.contains_key("bearer"));
        assert_eq!(schemes, Some(true));
    }

    #[test]
    fn authors_are_split_into_name_and_email() {
        assert_eq!(
            parse_author("Team Warden <team@warden.dev>"),
            (Some("Team Warden"), Some("team@warden.dev"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
        assert_eq!(parse_author("<a@b.c>"), (None, Some("a@b.c")));
    }
}
