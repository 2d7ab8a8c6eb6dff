use std::time::Duration;

use crate::error::ConfigError;

/// Exponential backoff applied after failed logins: `base * 2^(attempts-1)`, capped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressiveDelay {
    pub enabled: bool,
    pub base_seconds: u32,
    pub max_seconds: u32,
}

impl Default for ProgressiveDelay {
    fn default() -> Self {
        Self {
            enabled: true,
            base_seconds: 1,
            max_seconds: 60,
        }
    }
}

impl ProgressiveDelay {
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            base_seconds: 1,
            max_seconds: 60,
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, base_seconds: u32, max_seconds: u32) -> Self {
        self.base_seconds = base_seconds;
        self.max_seconds = max_seconds;
        self
    }

    #[must_use]
    pub fn delay_seconds(&self, attempts: u64) -> u64 {
        if !self.enabled || attempts == 0 {
            return 0;
        }
        let max = u64::from(self.max_seconds);
        let factor = u32::try_from(attempts - 1)
            .ok()
            .and_then(|shift| 1_u64.checked_shl(shift))
            .unwrap_or(u64::MAX);
        u64::from(self.base_seconds)
            .saturating_mul(factor)
            .min(max)
    }

    #[must_use]
    pub fn delay(&self, attempts: u64) -> Duration {
        Duration::from_secs(self.delay_seconds(attempts))
    }

    /// # Errors
    /// Returns an error when the cap is below the base delay.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_seconds < self.base_seconds {
            return Err(ConfigError::DelayBounds {
                base: self.base_seconds,
                max: self.max_seconds,
            });
        }
        Ok(())
    }
}
