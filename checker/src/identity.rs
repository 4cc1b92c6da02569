//! Best-effort job identifiers for when the backend does not hand one back.
//!
//! Candidates are tried in order of trust:
//!
//! 1. A `check_id` in the error body (the backend said so).
//! 2. The trailing segment of a failed status request's path.
//! 3. For a timed-out submission, `check_<key>_<stamp>` built from the key in
//!    the request body.
//! 4. `temp_check_<key>_<stamp>` built from the session key. Always available.
//!
//! Any of these may be wrong. The poll loop swaps between the two synthetic
//! forms when the backend answers `not_found`.

use crate::backend::BackendError;
use crate::key::cleaned_key;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const CHECK_PREFIX: &str = "check_";
pub const TEMP_CHECK_PREFIX: &str = "temp_check_";
// Marks identifiers the client made up.
const SYNTHETIC_MARKER: &str = "temp_";

/// Where a recovered identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    ErrorPayload,
    RequestPath,
    TimedOutRequest,
    Fallback,
}

impl IdSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            IdSource::ErrorPayload => "error_payload",
            IdSource::RequestPath => "request_path",
            IdSource::TimedOutRequest => "timed_out_request",
            IdSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredId {
    pub job_id: String,
    pub source: IdSource,
}

/// Issues synthetic identifiers with a strictly increasing millisecond stamp,
/// so two identifiers minted in the same millisecond still differ.
#[derive(Debug, Default)]
pub struct JobIdFactory {
    last_stamp: AtomicU64,
}

impl JobIdFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_stamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        let mut last = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last_stamp.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// `check_<cleaned key>_<stamp>`
    pub fn check_id(&self, key: &str) -> String {
        format!("{CHECK_PREFIX}{}_{}", cleaned_key(key), self.next_stamp())
    }

    /// `temp_check_<cleaned key>_<stamp>`
    pub fn temp_check_id(&self, key: &str) -> String {
        format!("{TEMP_CHECK_PREFIX}{}_{}", cleaned_key(key), self.next_stamp())
    }
}

/// Whether the identifier was made up by the client rather than issued by
/// the backend.
pub fn is_synthetic(job_id: &str) -> bool {
    job_id.contains(SYNTHETIC_MARKER)
}

/// Derives an identifier to poll after a failed submission.
pub fn recover_job_id(err: &BackendError, session_key: &str, ids: &JobIdFactory) -> RecoveredId {
    if let Some(job_id) = err
        .body()
        .and_then(|body| body.get("check_id"))
        .and_then(|id| id.as_str())
        .filter(|id| !id.trim().is_empty())
    {
        return RecoveredId {
            job_id: job_id.to_string(),
            source: IdSource::ErrorPayload,
        };
    }

    let request = err.request();

    if let Some(segment) = request.job_id_segment() {
        return RecoveredId {
            job_id: segment.to_string(),
            source: IdSource::RequestPath,
        };
    }

    if err.is_timeout()
        && let Some(key) = request.submitted_key()
        && !cleaned_key(key).is_empty()
    {
        return RecoveredId {
            job_id: ids.check_id(key),
            source: IdSource::TimedOutRequest,
        };
    }

    RecoveredId {
        job_id: ids.temp_check_id(session_key),
        source: IdSource::Fallback,
    }
}

/// The other synthetic naming scheme to try after a `not_found`, or `None`
/// when the identifier came from the backend and should be kept.
pub fn alternate_job_id(current: &str, session_key: &str, ids: &JobIdFactory) -> Option<String> {
    if current.starts_with(TEMP_CHECK_PREFIX) {
        Some(ids.check_id(session_key))
    } else if is_synthetic(current) {
        Some(ids.temp_check_id(session_key))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RequestEcho;
    use crate::protocol::SubmitRequest;
    use serde_json::json;
    use std::time::Duration;

    const KEY: &str = "AAAAA-BBBBB-CCCCC-DDDDD-EEEEE";

    fn submission_echo() -> RequestEcho {
        RequestEcho::submission(&SubmitRequest {
            key: KEY.into(),
            region: None,
        })
    }

    fn stamp_of<'a>(job_id: &'a str, prefix: &str) -> &'a str {
        let rest = job_id.strip_prefix(prefix).unwrap();
        let (key, stamp) = rest.rsplit_once('_').unwrap();
        assert_eq!(key, "AAAAABBBBBCCCCCDDDDDEEEEE");
        assert!(stamp.chars().all(|c| c.is_ascii_digit()), "{job_id}");
        stamp
    }

    #[test]
    fn test_error_payload_wins() {
        let err = BackendError::Status {
            status: 504,
            body: Some(json!({"check_id": "check_FROM_BACKEND_1"})),
            request: RequestEcho::poll("check_OTHER_2"),
        };
        let recovered = recover_job_id(&err, KEY, &JobIdFactory::new());
        assert_eq!(recovered.job_id, "check_FROM_BACKEND_1");
        assert_eq!(recovered.source, IdSource::ErrorPayload);
    }

    #[test]
    fn test_failed_status_request_path() {
        let err = BackendError::Transport {
            message: "connection reset".into(),
            request: RequestEcho::poll("check_OTHER_2"),
        };
        let recovered = recover_job_id(&err, KEY, &JobIdFactory::new());
        assert_eq!(recovered.job_id, "check_OTHER_2");
        assert_eq!(recovered.source, IdSource::RequestPath);
    }

    #[test]
    fn test_timed_out_submission() {
        let err = BackendError::Timeout {
            after: Duration::from_secs(30),
            request: submission_echo(),
        };
        let recovered = recover_job_id(&err, "ignored", &JobIdFactory::new());
        assert_eq!(recovered.source, IdSource::TimedOutRequest);
        stamp_of(&recovered.job_id, CHECK_PREFIX);
    }

    #[test]
    fn test_fallback() {
        let err = BackendError::Status {
            status: 500,
            body: Some(json!({"detail": "boom"})),
            request: submission_echo(),
        };
        let recovered = recover_job_id(&err, KEY, &JobIdFactory::new());
        assert_eq!(recovered.source, IdSource::Fallback);
        stamp_of(&recovered.job_id, TEMP_CHECK_PREFIX);
        assert!(is_synthetic(&recovered.job_id));
    }

    #[test]
    fn test_stamps_never_collide() {
        let ids = JobIdFactory::new();
        let mut stamps: Vec<u64> = (0..100)
            .map(|_| stamp_of(&ids.check_id(KEY), CHECK_PREFIX).parse().unwrap())
            .collect();
        let len = stamps.len();
        stamps.dedup();
        assert_eq!(stamps.len(), len);
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_alternate_job_id() {
        let ids = JobIdFactory::new();

        let next = alternate_job_id("temp_check_X_1", KEY, &ids).unwrap();
        stamp_of(&next, CHECK_PREFIX);
        assert!(!is_synthetic(&next));

        let next = alternate_job_id("check_temp_X_1", KEY, &ids).unwrap();
        stamp_of(&next, TEMP_CHECK_PREFIX);

        assert_eq!(alternate_job_id("check_X_1", KEY, &ids), None);
        assert_eq!(alternate_job_id("6f1c2a", KEY, &ids), None);
    }
}
