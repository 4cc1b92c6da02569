//! Mutable record of one in-flight check.
//!
//! Transitions only move toward a terminal status. Every mutator is a no-op
//! once the session is terminal and reports whether it changed anything, so
//! it can be used directly with `watch::Sender::send_if_modified`.

use crate::protocol::{CheckResult, ProgressUpdate};
use std::collections::VecDeque;
use std::time::SystemTime;

const MAX_ACTIVITY_ENTRIES: usize = 200;

pub const INITIALIZING_MESSAGE: &str = "Initializing check...";
pub const SUBMITTED_MESSAGE: &str = "Check request sent, waiting for results...";
pub const LONG_WAIT_MESSAGE: &str = "Waiting for the server. The check can take up to 5 minutes...";
pub const LONG_RUNNING_MESSAGE: &str = "The check can take up to 5 minutes. Please wait...";
pub const CANCELLED_MESSAGE: &str = "The check was cancelled";
pub const DEFAULT_ERROR_MESSAGE: &str = "An error occurred while checking the key";
const DEFAULT_DISPLAY_MESSAGE: &str = "Checking key...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckStatus {
    Idle,
    Submitting,
    Polling,
    Completed,
    Errored,
    Cancelled,
}

impl CheckStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            CheckStatus::Completed | CheckStatus::Errored | CheckStatus::Cancelled
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Idle => "idle",
            CheckStatus::Submitting => "submitting",
            CheckStatus::Polling => "polling",
            CheckStatus::Completed => "completed",
            CheckStatus::Errored => "errored",
            CheckStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub at: SystemTime,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckSession {
    pub key: String,
    pub region: Option<String>,
    pub job_id: Option<String>,
    pub status: CheckStatus,
    /// Highest progress confirmed so far, 0 to 100.
    pub progress: f64,
    pub stage: Option<String>,
    pub message: String,
    /// Consecutive poll failures since the last successful poll.
    pub retry_attempts: u32,
    pub long_running: bool,
    pub result: Option<CheckResult>,
    pub error: Option<String>,
    activity: VecDeque<ActivityEntry>,
}

impl CheckSession {
    pub fn new(key: impl Into<String>, region: Option<String>) -> Self {
        CheckSession {
            key: key.into(),
            region,
            job_id: None,
            status: CheckStatus::Idle,
            progress: 0.0,
            stage: None,
            message: String::new(),
            retry_attempts: 0,
            long_running: false,
            result: None,
            error: None,
            activity: VecDeque::new(),
        }
    }

    pub fn activity(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.activity.iter()
    }

    /// The status line to show the operator.
    pub fn display_message(&self) -> String {
        if !self.message.is_empty() {
            self.message.clone()
        } else if let Some(stage) = &self.stage {
            format!("Stage: {stage}")
        } else {
            DEFAULT_DISPLAY_MESSAGE.to_string()
        }
    }

    /// Appends to the activity log and mirrors it to tracing.
    pub(crate) fn log(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::debug!(key = %self.key, "{text}");
        if self.activity.len() == MAX_ACTIVITY_ENTRIES {
            self.activity.pop_front();
        }
        self.activity.push_back(ActivityEntry {
            at: SystemTime::now(),
            text,
        });
    }

    pub(crate) fn begin_submission(&mut self) -> bool {
        if self.status != CheckStatus::Idle {
            return false;
        }
        self.status = CheckStatus::Submitting;
        self.message = INITIALIZING_MESSAGE.to_string();
        let region = self.region.as_deref().unwrap_or("not set");
        self.log(format!("Starting check for {}, region: {region}", self.key));
        true
    }

    /// Enters polling with `job_id`. Refuses an empty identifier.
    pub(crate) fn begin_polling(&mut self, job_id: &str) -> bool {
        if self.status.is_terminal() || job_id.is_empty() {
            return false;
        }
        self.status = CheckStatus::Polling;
        self.job_id = Some(job_id.to_string());
        self.log(format!("Polling status of {job_id}"));
        true
    }

    /// Swaps the identifier being polled.
    pub(crate) fn replace_job_id(&mut self, job_id: &str) -> bool {
        if self.status != CheckStatus::Polling || job_id.is_empty() {
            return false;
        }
        self.job_id = Some(job_id.to_string());
        true
    }

    pub(crate) fn set_message(&mut self, message: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.message = message.to_string();
        true
    }

    /// Applies a non-terminal status reply. Progress never moves backwards;
    /// stage and message still update when a lower value is reported.
    pub(crate) fn apply_progress(&mut self, update: &ProgressUpdate) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.clamp(0.0, 100.0));
        }
        if let Some(stage) = &update.stage {
            self.stage = Some(stage.clone());
        }
        if let Some(message) = &update.message {
            self.message = message.clone();
        } else if let Some(stage) = &update.stage {
            self.message = format!("Stage: {stage} ({}%)", self.progress.round());
        }
        true
    }

    /// Any answered poll clears the failure streak.
    pub(crate) fn record_poll_success(&mut self) -> bool {
        if self.status != CheckStatus::Polling || self.retry_attempts == 0 {
            return false;
        }
        self.retry_attempts = 0;
        true
    }

    /// Records a failed poll. Returns `true` when the failure cap was reached,
    /// in which case the long-wait advisory is shown and the counter restarts.
    pub(crate) fn record_poll_failure(&mut self, cap: u32, reason: &str) -> bool {
        if self.status != CheckStatus::Polling {
            return false;
        }
        self.retry_attempts += 1;
        self.log(format!(
            "Status request failed (attempt {}/{cap}): {reason}",
            self.retry_attempts
        ));

        if self.retry_attempts >= cap {
            self.message = LONG_WAIT_MESSAGE.to_string();
            self.retry_attempts = 0;
            return true;
        }
        false
    }

    pub(crate) fn mark_long_running(&mut self) -> bool {
        if self.status.is_terminal() || self.long_running {
            return false;
        }
        self.long_running = true;
        self.message = LONG_RUNNING_MESSAGE.to_string();
        self.log("Long-running check notice shown");
        true
    }

    /// Terminal transition carrying a result. `status` must be `Completed` or
    /// `Errored`.
    pub(crate) fn finish(&mut self, result: CheckResult, status: CheckStatus) -> bool {
        debug_assert!(matches!(status, CheckStatus::Completed | CheckStatus::Errored));
        if self.status.is_terminal() {
            return false;
        }
        self.log(format!(
            "Check finished for {}: {}",
            result.key, result.verdict
        ));
        self.status = status;
        self.progress = 100.0;
        if status == CheckStatus::Errored && !result.message.is_empty() {
            self.error = Some(result.message.clone());
        }
        self.result = Some(result);
        true
    }

    /// Terminal transition for a backend-reported failure without a result.
    pub(crate) fn fail(&mut self, error_message: Option<&str>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let error = error_message.unwrap_or(DEFAULT_ERROR_MESSAGE);
        self.log(format!("Check failed: {error}"));
        self.status = CheckStatus::Errored;
        self.error = Some(error.to_string());
        true
    }

    pub(crate) fn cancel(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.log("Check cancelled");
        self.status = CheckStatus::Cancelled;
        self.error = Some(CANCELLED_MESSAGE.to_string());
        true
    }
}
