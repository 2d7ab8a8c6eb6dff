use anyhow::Context;
use clap::{builder::BoolishValueParser, Arg, ArgMatches, Command};
use std::net::IpAddr;

use crate::throttle::{ProgressiveDelay, SecurityPolicy};

pub const ARG_IP_CONTROL: &str = "ip-control";
pub const ARG_RATE_LIMIT_PER_MINUTE: &str = "ip-rate-limit-per-minute";
pub const ARG_LOGIN_ATTEMPTS_PER_HOUR: &str = "ip-login-attempts-per-hour";
pub const ARG_BLACKLIST_DURATION_MINUTES: &str = "ip-blacklist-duration-minutes";
pub const ARG_SUSPICIOUS_ACTIVITY_DETECTION: &str = "suspicious-activity-detection";
pub const ARG_SUSPICIOUS_ACTIVITY_THRESHOLD: &str = "suspicious-activity-threshold";
pub const ARG_USER_AGENT_DETECTION: &str = "user-agent-detection";
pub const ARG_PROGRESSIVE_DELAY: &str = "progressive-delay";
pub const ARG_BASE_DELAY_SECONDS: &str = "base-delay-seconds";
pub const ARG_MAX_DELAY_SECONDS: &str = "max-delay-seconds";
pub const ARG_THREAT_SCORE_THRESHOLD: &str = "threat-score-threshold";
pub const ARG_BUSINESS_HOURS_START: &str = "business-hours-start";
pub const ARG_BUSINESS_HOURS_END: &str = "business-hours-end";
pub const ARG_TRUSTED_PROXIES: &str = "trusted-proxies";

/// Build the security policy from matches.
///
/// # Errors
/// Returns an error if the resulting policy is inconsistent.
pub fn parse(matches: &ArgMatches) -> anyhow::Result<SecurityPolicy> {
    let defaults = SecurityPolicy::default();
    let flag = |id: &str, default: bool| matches.get_one::<bool>(id).copied().unwrap_or(default);
    let number = |id: &str, default: u32| matches.get_one::<u32>(id).copied().unwrap_or(default);

    let delay = ProgressiveDelay {
        enabled: flag(ARG_PROGRESSIVE_DELAY, defaults.delay.enabled),
        base_seconds: number(ARG_BASE_DELAY_SECONDS, defaults.delay.base_seconds),
        max_seconds: number(ARG_MAX_DELAY_SECONDS, defaults.delay.max_seconds),
    };

    let policy = SecurityPolicy::default()
        .with_ip_control(flag(ARG_IP_CONTROL, defaults.enable_ip_control))
        .with_rate_limit_per_minute(number(
            ARG_RATE_LIMIT_PER_MINUTE,
            defaults.rate_limit_per_minute,
        ))
        .with_login_attempts_per_hour(number(
            ARG_LOGIN_ATTEMPTS_PER_HOUR,
            defaults.login_attempts_per_hour,
        ))
        .with_blacklist_duration_minutes(
            matches
                .get_one::<i64>(ARG_BLACKLIST_DURATION_MINUTES)
                .copied()
                .unwrap_or(defaults.blacklist_duration_minutes),
        )
        .with_suspicious_activity_detection(flag(
            ARG_SUSPICIOUS_ACTIVITY_DETECTION,
            defaults.suspicious_activity_detection,
        ))
        .with_suspicious_activity_threshold(number(
            ARG_SUSPICIOUS_ACTIVITY_THRESHOLD,
            defaults.suspicious_activity_threshold,
        ))
        .with_user_agent_detection(flag(
            ARG_USER_AGENT_DETECTION,
            defaults.user_agent_detection,
        ))
        .with_delay(delay)
        .with_threat_threshold(
            matches
                .get_one::<f64>(ARG_THREAT_SCORE_THRESHOLD)
                .copied()
                .unwrap_or(defaults.threat_threshold),
        )
        .with_business_hours(
            number(ARG_BUSINESS_HOURS_START, defaults.business_hours_start),
            number(ARG_BUSINESS_HOURS_END, defaults.business_hours_end),
        )
        .with_trusted_proxies(
            matches
                .get_many::<IpAddr>(ARG_TRUSTED_PROXIES)
                .map(|values| values.copied().collect())
                .unwrap_or_default(),
        );

    policy.validate().context("invalid security policy")?;
    Ok(policy)
}

fn switch(id: &'static str, env: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .env(env)
        .default_value("true")
        .value_parser(BoolishValueParser::new())
}

fn count(id: &'static str, env: &'static str, help: &'static str, default: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .env(env)
        .default_value(default)
        .value_parser(clap::value_parser!(u32))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(switch(
            ARG_IP_CONTROL,
            "WARDEN_IP_CONTROL",
            "Enable per-address throttling and blacklisting",
        ))
        .arg(count(
            ARG_RATE_LIMIT_PER_MINUTE,
            "WARDEN_IP_RATE_LIMIT_PER_MINUTE",
            "Requests allowed per address per minute",
            "100",
        ))
        .arg(count(
            ARG_LOGIN_ATTEMPTS_PER_HOUR,
            "WARDEN_IP_LOGIN_ATTEMPTS_PER_HOUR",
            "Login attempts allowed per address per hour",
            "20",
        ))
        .arg(
            Arg::new(ARG_BLACKLIST_DURATION_MINUTES)
                .long(ARG_BLACKLIST_DURATION_MINUTES)
                .help("Automatic blacklist duration in minutes; zero or less never expires")
                .env("WARDEN_IP_BLACKLIST_DURATION_MINUTES")
                .default_value("60")
                .allow_negative_numbers(true)
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(switch(
            ARG_SUSPICIOUS_ACTIVITY_DETECTION,
            "WARDEN_SUSPICIOUS_ACTIVITY_DETECTION",
            "Run the abuse detectors",
        ))
        .arg(count(
            ARG_SUSPICIOUS_ACTIVITY_THRESHOLD,
            "WARDEN_SUSPICIOUS_ACTIVITY_THRESHOLD",
            "Distinct user agents or usernames per address before it is suspicious",
            "3",
        ))
        .arg(switch(
            ARG_USER_AGENT_DETECTION,
            "WARDEN_USER_AGENT_DETECTION",
            "Collect user agents per address",
        ))
        .arg(switch(
            ARG_PROGRESSIVE_DELAY,
            "WARDEN_PROGRESSIVE_DELAY",
            "Delay responses to repeated failed logins",
        ))
        .arg(count(
            ARG_BASE_DELAY_SECONDS,
            "WARDEN_BASE_DELAY_SECONDS",
            "Delay after the first failed login in seconds",
            "1",
        ))
        .arg(count(
            ARG_MAX_DELAY_SECONDS,
            "WARDEN_MAX_DELAY_SECONDS",
            "Upper bound of the failed login delay in seconds",
            "60",
        ))
        .arg(
            Arg::new(ARG_THREAT_SCORE_THRESHOLD)
                .long(ARG_THREAT_SCORE_THRESHOLD)
                .help("Threat score above which an address is blacklisted")
                .env("WARDEN_THREAT_SCORE_THRESHOLD")
                .default_value("1.0")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(count(
            ARG_BUSINESS_HOURS_START,
            "WARDEN_BUSINESS_HOURS_START",
            "First local hour considered business hours",
            "8",
        ))
        .arg(count(
            ARG_BUSINESS_HOURS_END,
            "WARDEN_BUSINESS_HOURS_END",
            "Last local hour considered business hours",
            "22",
        ))
        .arg(
            Arg::new(ARG_TRUSTED_PROXIES)
                .long(ARG_TRUSTED_PROXIES)
                .help("Comma-separated proxy addresses allowed to set X-Forwarded-For/X-Real-IP; empty trusts every peer")
                .env("WARDEN_TRUSTED_PROXIES")
                .value_delimiter(',')
                .num_args(1..)
                .value_parser(clap::value_parser!(IpAddr)),
        )
}
