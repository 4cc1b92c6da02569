use crate::backend::{BackendError, CheckBackend, RequestEcho};
use crate::protocol::SubmitRequest;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

pub const KEY: &str = "AAAAA-BBBBB-CCCCC-DDDDD-EEEEE";

#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(u16, Option<Value>),
    Transport(&'static str),
}

/// One scripted answer, delivered after `delay`.
#[derive(Debug, Clone)]
pub struct Step {
    pub delay: Duration,
    pub reply: Reply,
}

impl Step {
    pub fn json(body: Value) -> Self {
        Step {
            delay: Duration::ZERO,
            reply: Reply::Json(body),
        }
    }

    pub fn status(status: u16, body: Option<Value>) -> Self {
        Step {
            delay: Duration::ZERO,
            reply: Reply::Status(status, body),
        }
    }

    pub fn transport(message: &'static str) -> Self {
        Step {
            delay: Duration::ZERO,
            reply: Reply::Transport(message),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Submit(SubmitRequest),
    Poll(String),
}

/// Replays queued replies. Polls past the end of the script answer
/// `in_progress`.
#[derive(Default)]
pub struct ScriptedBackend {
    submits: Mutex<VecDeque<Step>>,
    polls: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<(Instant, Call)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit(self, step: Step) -> Self {
        self.submits.lock().push_back(step);
        self
    }

    pub fn on_poll(self, step: Step) -> Self {
        self.polls.lock().push_back(step);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(_, call)| call.clone()).collect()
    }

    pub fn poll_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|(_, call)| match call {
                Call::Poll(id) => Some(id.clone()),
                Call::Submit(_) => None,
            })
            .collect()
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, call)| matches!(call, Call::Poll(_)))
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn poll_count(&self) -> usize {
        self.poll_ids().len()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push((Instant::now(), call));
    }
}

async fn play(step: Step, request: RequestEcho) -> Result<Value, BackendError> {
    if !step.delay.is_zero() {
        tokio::time::sleep(step.delay).await;
    }
    match step.reply {
        Reply::Json(body) => Ok(body),
        Reply::Status(status, body) => Err(BackendError::Status {
            status,
            body,
            request,
        }),
        Reply::Transport(message) => Err(BackendError::Transport {
            message: message.to_string(),
            request,
        }),
    }
}

#[async_trait]
impl CheckBackend for ScriptedBackend {
    async fn submit_check(&self, request: &SubmitRequest) -> Result<Value, BackendError> {
        self.record(Call::Submit(request.clone()));
        let step = self
            .submits
            .lock()
            .pop_front()
            .unwrap_or_else(|| Step::json(json!({})));
        play(step, RequestEcho::submission(request)).await
    }

    async fn poll_status(&self, job_id: &str) -> Result<Value, BackendError> {
        self.record(Call::Poll(job_id.to_string()));
        let step = self
            .polls
            .lock()
            .pop_front()
            .unwrap_or_else(|| Step::json(json!({"status": "in_progress"})));
        play(step, RequestEcho::poll(job_id)).await
    }
}
