//! Per-address throttling and abuse detection.
//!
//! Flow Overview:
//! 1) Every request passes [`RequestThrottle::record_request`]: whitelist, blacklist,
//!    then the per-minute counter. Exceeding the limit blacklists the address.
//! 2) Login outcomes are reported to [`LoginAttemptGuard::record_login_attempt`], which
//!    counts attempts and failures per hour and watches for many usernames per address.
//! 3) Detectors add weighted signals to the [`ThreatScoreAccumulator`]; an address whose
//!    score goes above the threshold is blacklisted.
//!
//! Everything here fails open: a store outage allows traffic and drops statistics.

pub mod delay;
pub mod lists;
pub mod login;
pub mod policy;
pub mod request;
pub mod stats;
pub mod threat;

pub use self::delay::ProgressiveDelay;
pub use self::lists::{IpListStore, ListEntry};
pub use self::login::LoginAttemptGuard;
pub use self::policy::{SecurityPolicy, ThreatWeights};
pub use self::request::RequestThrottle;
pub use self::stats::{IpStatistics, StatisticsReader};
pub use self::threat::{Detector, Signal, Snapshot, ThreatScoreAccumulator};
