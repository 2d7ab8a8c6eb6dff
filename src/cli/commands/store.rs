use anyhow::{bail, Context};
use clap::{builder::PossibleValuesParser, Arg, ArgMatches, Command};
use std::time::Duration;
use url::Url;

pub const ARG_STORE: &str = "store";
pub const ARG_REDIS_URL: &str = "redis-url";
pub const ARG_STORE_TIMEOUT_MS: &str = "store-timeout-ms";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Redis,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub backend: Backend,
    pub redis_url: String,
    pub timeout: Duration,
}

impl Options {
    /// Parse store arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the Redis URL is not a `redis://` or `rediss://` URL or the
    /// timeout is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let backend = match matches.get_one::<String>(ARG_STORE).map(String::as_str) {
            Some("memory") => Backend::Memory,
            _ => Backend::Redis,
        };

        let redis_url = matches
            .get_one::<String>(ARG_REDIS_URL)
            .cloned()
            .context("missing required argument: --redis-url")?;
        let parsed = Url::parse(&redis_url).context("invalid --redis-url")?;
        if !matches!(parsed.scheme(), "redis" | "rediss") {
            bail!("--redis-url must use the redis:// or rediss:// scheme");
        }

        let timeout_ms = matches
            .get_one::<u64>(ARG_STORE_TIMEOUT_MS)
            .copied()
            .unwrap_or(250);
        if timeout_ms == 0 {
            bail!("--{ARG_STORE_TIMEOUT_MS} must be greater than zero");
        }

        Ok(Self {
            backend,
            redis_url,
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_STORE)
                .long(ARG_STORE)
                .help("Backend holding counters, lists and token records")
                .env("WARDEN_STORE")
                .global(true)
                .default_value("redis")
                .value_parser(PossibleValuesParser::new(["redis", "memory"])),
        )
        .arg(
            Arg::new(ARG_REDIS_URL)
                .long(ARG_REDIS_URL)
                .help("Redis connection URL")
                .env("WARDEN_REDIS_URL")
                .global(true)
                .default_value("redis://127.0.0.1:6379"),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_MS)
                .long(ARG_STORE_TIMEOUT_MS)
                .help("Timeout for every store call in milliseconds")
                .env("WARDEN_STORE_TIMEOUT_MS")
                .global(true)
                .default_value("250")
                .value_parser(clap::value_parser!(u64)),
        )
}
