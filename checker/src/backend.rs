use crate::protocol::SubmitRequest;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub const SUBMIT_PATH: &str = "keys/check";
pub const STATUS_PATH: &str = "keys/status";

/// What was sent when a request failed. Identity recovery reads the path and
/// the body to guess which job the backend may have started.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEcho {
    pub path: String,
    pub body: Option<Value>,
}

impl RequestEcho {
    pub fn submission(request: &SubmitRequest) -> Self {
        RequestEcho {
            path: format!("/{SUBMIT_PATH}"),
            body: serde_json::to_value(request).ok(),
        }
    }

    pub fn poll(job_id: &str) -> Self {
        RequestEcho {
            path: format!("/{STATUS_PATH}/{job_id}"),
            body: None,
        }
    }

    /// Trailing identifier segment if this was a status request.
    pub fn job_id_segment(&self) -> Option<&str> {
        let marker = format!("/{STATUS_PATH}/");
        let (_, rest) = self.path.split_once(&marker)?;
        rest.rsplit('/').next().filter(|segment| !segment.is_empty())
    }

    /// The `key` field of the request body, if there was one.
    pub fn submitted_key(&self) -> Option<&str> {
        self.body.as_ref()?.get("key")?.as_str()
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum BackendError {
    #[error("request to {} timed out after {after:?}", .request.path)]
    Timeout {
        after: Duration,
        request: RequestEcho,
    },
    #[error("request to {} failed with status {status}", .request.path)]
    Status {
        status: u16,
        body: Option<Value>,
        request: RequestEcho,
    },
    #[error("request to {} failed: {message}", .request.path)]
    Transport {
        message: String,
        request: RequestEcho,
    },
}

impl BackendError {
    pub fn request(&self) -> &RequestEcho {
        match self {
            BackendError::Timeout { request, .. }
            | BackendError::Status { request, .. }
            | BackendError::Transport { request, .. } => request,
        }
    }

    /// Decoded JSON error body, when the backend sent one.
    pub fn body(&self) -> Option<&Value> {
        match self {
            BackendError::Status { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::Timeout { .. })
    }
}

/// The two calls the orchestrator makes. Replies are returned as raw JSON and
/// classified by `protocol`.
#[async_trait]
pub trait CheckBackend: Send + Sync {
    async fn submit_check(&self, request: &SubmitRequest) -> Result<Value, BackendError>;

    async fn poll_status(&self, job_id: &str) -> Result<Value, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_echo() {
        let echo = RequestEcho::submission(&SubmitRequest {
            key: "AAAAA-BBBBB".into(),
            region: Some("US".into()),
        });
        assert_eq!(echo.path, "/keys/check");
        assert_eq!(echo.body, Some(json!({"key": "AAAAA-BBBBB", "region": "US"})));
        assert_eq!(echo.submitted_key(), Some("AAAAA-BBBBB"));
        assert_eq!(echo.job_id_segment(), None);

        let echo = RequestEcho::poll("check_ABC_1");
        assert_eq!(echo.job_id_segment(), Some("check_ABC_1"));
        assert_eq!(echo.submitted_key(), None);

        let echo = RequestEcho {
            path: "/api/keys/status/".into(),
            body: None,
        };
        assert_eq!(echo.job_id_segment(), None);
    }

    #[test]
    fn test_error_accessors() {
        let err = BackendError::Status {
            status: 500,
            body: Some(json!({"check_id": "check_A_1"})),
            request: RequestEcho::poll("x"),
        };
        assert_eq!(err.body(), Some(&json!({"check_id": "check_A_1"})));
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "request to /keys/status/x failed with status 500");

        let err = BackendError::Timeout {
            after: Duration::from_secs(30),
            request: RequestEcho::poll("x"),
        };
        assert!(err.is_timeout());
        assert_eq!(err.body(), None);
    }
}
