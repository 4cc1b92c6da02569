//! Wire types for the key validation backend.
//!
//! Replies are decoded into tagged variants in a fixed priority order rather
//! than sniffed field by field at each call site:
//!
//! - Submission replies: [`SubmitReply::DefiniteOutcome`], then
//!   [`SubmitReply::JobAccepted`], then [`SubmitReply::Unrecognized`].
//! - Status replies: [`PollUpdate::Finished`], [`PollUpdate::Failed`],
//!   [`PollUpdate::NotFound`], otherwise [`PollUpdate::InProgress`].
//!
//! # Submission reply
//!
//! ```json
//! {
//!   "key": "AAAAA-BBBBB-CCCCC-DDDDD-EEEEE",
//!   "status": "valid",
//!   "error_message": null,
//!   "check_id": "check_AAAAABBBBBCCCCCDDDDDEEEEE_1718000000_42"
//! }
//! ```
//!
//! # Status reply
//!
//! ```json
//! {
//!   "status": "in_progress",
//!   "stage": "login",
//!   "progress": 30,
//!   "message": "Signing in",
//!   "error_message": null,
//!   "result": null
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of the submission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub key: String,
    pub region: Option<String>,
}

/// The backend's judgement on a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Success,
    Used,
    Disabled,
    Invalid,
    RegionError,
    Error,
    Pending,
    Other(String),
}

/// Rendering hint for a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Warning,
    Danger,
    Info,
    Secondary,
}

impl Verdict {
    pub fn parse(status: &str) -> Self {
        match status {
            "valid" => Verdict::Valid,
            "success" => Verdict::Success,
            "used" => Verdict::Used,
            "disabled" => Verdict::Disabled,
            "invalid" => Verdict::Invalid,
            "region_error" => Verdict::RegionError,
            "error" => Verdict::Error,
            "pending" => Verdict::Pending,
            other => Verdict::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Verdict::Valid => "valid",
            Verdict::Success => "success",
            Verdict::Used => "used",
            Verdict::Disabled => "disabled",
            Verdict::Invalid => "invalid",
            Verdict::RegionError => "region_error",
            Verdict::Error => "error",
            Verdict::Pending => "pending",
            Verdict::Other(other) => other,
        }
    }

    /// Whether this verdict ends a check when it arrives on a submission
    /// reply. `pending` and unknown statuses do not.
    pub fn is_definitive(&self) -> bool {
        !matches!(self, Verdict::Pending | Verdict::Other(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Verdict::Error)
    }

    pub fn label(&self) -> &str {
        match self {
            Verdict::Valid | Verdict::Success => "Valid",
            Verdict::Used => "Used",
            Verdict::Disabled => "Disabled",
            Verdict::Invalid => "Invalid",
            Verdict::RegionError => "Region error",
            Verdict::Error => "Error",
            Verdict::Pending => "Pending",
            Verdict::Other(other) if other.is_empty() => "Unknown status",
            Verdict::Other(other) => other,
        }
    }

    pub fn tone(&self) -> Tone {
        match self {
            Verdict::Valid | Verdict::Success => Tone::Success,
            Verdict::Used | Verdict::Disabled => Tone::Warning,
            Verdict::Invalid => Tone::Danger,
            Verdict::RegionError => Tone::Info,
            Verdict::Error | Verdict::Pending | Verdict::Other(_) => Tone::Secondary,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized outcome of a finished check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub key: String,
    pub verdict: Verdict,
    pub message: String,
}

/// Loosely typed outcome fields, shared by submission replies, error bodies
/// and the `result` object of a finished status reply.
#[derive(Debug, Clone, Default, PartialEq)]
struct OutcomeFields {
    key: Option<String>,
    status: Option<String>,
    is_valid: Option<bool>,
    message: Option<String>,
    error_message: Option<String>,
    check_id: Option<String>,
}

/// Reads a string field, dropping it when it has any other type.
fn str_field(value: &Value, name: &str) -> Option<String> {
    value.get(name).and_then(Value::as_str).map(str::to_string)
}

impl OutcomeFields {
    fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        Some(OutcomeFields {
            key: str_field(value, "key"),
            status: str_field(value, "status"),
            is_valid: value.get("is_valid").and_then(Value::as_bool),
            message: str_field(value, "message"),
            error_message: str_field(value, "error_message"),
            check_id: str_field(value, "check_id"),
        })
    }

    fn verdict(&self) -> Option<Verdict> {
        match (&self.status, self.is_valid) {
            (Some(status), _) => Some(Verdict::parse(status)),
            (None, Some(true)) => Some(Verdict::Valid),
            (None, Some(false)) => Some(Verdict::Invalid),
            (None, None) => None,
        }
    }

    fn definitive_verdict(&self) -> Option<Verdict> {
        let from_status = self
            .status
            .as_deref()
            .map(Verdict::parse)
            .filter(Verdict::is_definitive);

        from_status.or_else(|| match self.is_valid {
            Some(true) => Some(Verdict::Valid),
            Some(false) => Some(Verdict::Invalid),
            None => None,
        })
    }

    fn into_result(self, verdict: Verdict, fallback_key: &str) -> CheckResult {
        CheckResult {
            key: self
                .key
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| fallback_key.to_string()),
            verdict,
            message: self.message.or(self.error_message).unwrap_or_default(),
        }
    }
}

/// Classified submission reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitReply {
    /// The backend already knows the answer. No polling needed.
    DefiniteOutcome(CheckResult),
    /// The backend accepted the job and told us what to poll.
    JobAccepted { job_id: String },
    /// Nothing usable. The caller falls back to identity recovery.
    Unrecognized,
}

impl SubmitReply {
    /// Decodes a submission reply or an error body. `submitted_key` fills in
    /// the result's key when the backend does not echo it.
    pub fn decode(body: &Value, submitted_key: &str) -> Self {
        let Some(fields) = OutcomeFields::from_value(body) else {
            return SubmitReply::Unrecognized;
        };

        if let Some(verdict) = fields.definitive_verdict() {
            return SubmitReply::DefiniteOutcome(fields.into_result(verdict, submitted_key));
        }

        match fields.check_id {
            Some(job_id) if !job_id.trim().is_empty() => SubmitReply::JobAccepted { job_id },
            _ => SubmitReply::Unrecognized,
        }
    }
}

/// Progress fields of a status reply. All optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub progress: Option<f64>,
    pub stage: Option<String>,
    pub message: Option<String>,
}

/// Classified status reply.
#[derive(Debug, Clone, PartialEq)]
pub enum PollUpdate {
    /// `completed`/`success` with a result payload.
    Finished {
        progress: ProgressUpdate,
        result: CheckResult,
    },
    /// `error`, with the backend's explanation if it gave one.
    Failed {
        progress: ProgressUpdate,
        error_message: Option<String>,
    },
    /// The backend does not know the identifier.
    NotFound,
    /// Anything else, including `completed` without a result.
    InProgress(ProgressUpdate),
}

impl PollUpdate {
    pub fn decode(body: &Value, session_key: &str) -> Self {
        // Status is read on its own so a mistyped sibling field cannot hide
        // a terminal reply.
        let status = body.get("status").and_then(Value::as_str);

        let progress = ProgressUpdate {
            progress: body
                .get("progress")
                .and_then(Value::as_f64)
                .filter(|p| p.is_finite()),
            stage: str_field(body, "stage").filter(|s| !s.is_empty()),
            message: str_field(body, "message").filter(|m| !m.is_empty()),
        };

        match status {
            Some("completed") | Some("success") => {
                let finished = body.get("result").and_then(OutcomeFields::from_value);
                match finished {
                    Some(fields) => {
                        // A result without any status of its own is still a finished check.
                        let verdict = fields
                            .verdict()
                            .unwrap_or_else(|| Verdict::Other(String::new()));
                        PollUpdate::Finished {
                            progress,
                            result: fields.into_result(verdict, session_key),
                        }
                    }
                    None => PollUpdate::InProgress(progress),
                }
            }
            Some("error") => PollUpdate::Failed {
                progress,
                error_message: str_field(body, "error_message").filter(|m| !m.is_empty()),
            },
            Some("not_found") => PollUpdate::NotFound,
            _ => PollUpdate::InProgress(progress),
        }
    }
}
