//! Time source shared by the throttle, token services and the in-memory store.
//!
//! Window buckets and token expiry use UTC; only the off-hours detector looks at
//! the local hour of day.

use chrono::{DateTime, Duration as ChronoDuration, Local, Timelike, Utc};
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;

    /// Hour of day (0-23) in the deployment's local time zone.
    fn local_hour(&self) -> u32 {
        self.now().with_timezone(&Local).hour()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. The local hour is the UTC hour.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(delta) = ChronoDuration::from_std(by) {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner) += delta;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn local_hour(&self) -> u32 {
        self.now().hour()
    }
}
