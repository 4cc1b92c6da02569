use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("max_poll_failures must be greater than zero")]
    ZeroFailureCap,
}

/// Timing knobs for one check. Every field has a default so the whole block
/// can be left out of the config file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckTimings {
    /// Timeout for the submission request.
    pub submit_timeout_secs: u64,
    /// Timeout for each status request, independent of the submission timeout.
    pub poll_timeout_secs: u64,
    /// Delay between status requests.
    pub poll_interval_ms: u64,
    /// When to show the long-running notice, counted from the start of polling.
    pub long_running_after_secs: u64,
    /// Consecutive poll failures before the long-wait advisory is shown.
    pub max_poll_failures: u32,
}

impl Default for CheckTimings {
    fn default() -> Self {
        CheckTimings {
            submit_timeout_secs: 30,
            poll_timeout_secs: 10,
            poll_interval_ms: 2000,
            long_running_after_secs: 30,
            max_poll_failures: 5,
        }
    }
}

impl CheckTimings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.submit_timeout_secs == 0 {
            return Err(ValidationError::ZeroDuration("submit_timeout_secs"));
        }
        if self.poll_timeout_secs == 0 {
            return Err(ValidationError::ZeroDuration("poll_timeout_secs"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::ZeroDuration("poll_interval_ms"));
        }
        if self.long_running_after_secs == 0 {
            return Err(ValidationError::ZeroDuration("long_running_after_secs"));
        }
        if self.max_poll_failures == 0 {
            return Err(ValidationError::ZeroFailureCap);
        }
        Ok(())
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn long_running_after(&self) -> Duration {
        Duration::from_secs(self.long_running_after_secs)
    }
}
