use anyhow::{bail, Context};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

use crate::token::TokenConfig;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_ISSUER: &str = "jwt-issuer";
pub const ARG_JWT_AUDIENCE: &str = "jwt-audience";
pub const ARG_ACCESS_TOKEN_TTL_SECONDS: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL_SECONDS: &str = "refresh-token-ttl-seconds";

/// Build the token configuration from matches.
///
/// # Errors
/// Returns an error if the signing secret is missing or too short, or a lifetime is zero.
pub fn parse(matches: &ArgMatches) -> anyhow::Result<TokenConfig> {
    let secret = match matches.get_one::<String>(ARG_JWT_SECRET) {
        Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
        _ => bail!("missing required argument: --{ARG_JWT_SECRET}"),
    };

    let seconds = |id: &str| {
        matches
            .get_one::<u64>(id)
            .copied()
            .map(Duration::from_secs)
    };

    let mut config = TokenConfig::new(secret);
    if let Some(issuer) = matches.get_one::<String>(ARG_JWT_ISSUER) {
        config = config.with_issuer(issuer.clone());
    }
    if let Some(audience) = matches.get_one::<String>(ARG_JWT_AUDIENCE) {
        config = config.with_audience(audience.clone());
    }
    if let Some(ttl) = seconds(ARG_ACCESS_TOKEN_TTL_SECONDS) {
        config = config.with_access_ttl(ttl);
    }
    if let Some(ttl) = seconds(ARG_REFRESH_TOKEN_TTL_SECONDS) {
        config = config.with_refresh_ttl(ttl);
    }

    config.validate().context("invalid token configuration")?;
    Ok(config)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HS256 signing secret, at least 32 bytes")
                .env("WARDEN_JWT_SECRET")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_JWT_ISSUER)
                .long(ARG_JWT_ISSUER)
                .help("Issuer claim of access tokens")
                .env("WARDEN_JWT_ISSUER")
                .global(true)
                .default_value("warden"),
        )
        .arg(
            Arg::new(ARG_JWT_AUDIENCE)
                .long(ARG_JWT_AUDIENCE)
                .help("Audience claim of access tokens")
                .env("WARDEN_JWT_AUDIENCE")
                .global(true)
                .default_value("warden-users"),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .long(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .help("Access token lifetime in seconds")
                .env("WARDEN_ACCESS_TOKEN_TTL_SECONDS")
                .global(true)
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .long(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .help("Refresh token lifetime in seconds")
                .env("WARDEN_REFRESH_TOKEN_TTL_SECONDS")
                .global(true)
                .default_value("2592000")
                .value_parser(clap::value_parser!(u64)),
        )
}
