//! Owner of the current check.
//!
//! A check runs as one spawned task that submits and then polls. The
//! controller keeps the task handle, an `active` flag and the watch channel
//! the session is published on. Releasing a session clears the flag before
//! aborting the task, and every write checks the flag, so nothing a released
//! task does can reach the published state.

use crate::backend::CheckBackend;
use crate::config::CheckTimings;
use crate::identity::JobIdFactory;
use crate::key::{ProductKey, normalize_region};
use crate::metrics_defs::{CHECK_DURATION, CHECK_FINISHED};
use crate::poll_loop;
use crate::protocol::SubmitRequest;
use crate::session::{CheckSession, CheckStatus};
use crate::submission::{self, Submission};
use shared::{counter, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Error, Debug, PartialEq)]
pub enum CheckError {
    #[error("enter a key to check")]
    EmptyKey,

    #[error("checks must be started from within a tokio runtime")]
    NoRuntime,
}

/// What a running check task needs. Shared by submission and polling.
pub(crate) struct SessionContext {
    pub(crate) backend: Arc<dyn CheckBackend>,
    pub(crate) timings: CheckTimings,
    pub(crate) ids: Arc<JobIdFactory>,
    pub(crate) key: String,
    state: Arc<watch::Sender<CheckSession>>,
    active: Arc<AtomicBool>,
    started: Instant,
}

impl SessionContext {
    /// Applies `f` to the session unless it has been released. Subscribers
    /// are only notified when `f` reports a change.
    pub(crate) fn update(&self, f: impl FnOnce(&mut CheckSession) -> bool) -> bool {
        self.state
            .send_if_modified(|session| self.active.load(Ordering::Acquire) && f(session))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn record_finished(&self, status: CheckStatus) {
        record_finished(&self.key, status, self.started);
    }
}

fn record_finished(key: &str, status: CheckStatus, started: Instant) {
    let elapsed = started.elapsed();
    counter!(CHECK_FINISHED, "status" => status.as_str()).increment(1);
    histogram!(CHECK_DURATION, "status" => status.as_str()).record(elapsed.as_secs_f64());
    tracing::info!(key, status = status.as_str(), elapsed = ?elapsed, "check finished");
}

struct ActiveCheck {
    state: Arc<watch::Sender<CheckSession>>,
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    started: Instant,
}

/// Runs one check at a time against a backend.
pub struct CheckController {
    backend: Arc<dyn CheckBackend>,
    timings: CheckTimings,
    ids: Arc<JobIdFactory>,
    current: Option<ActiveCheck>,
}

impl CheckController {
    pub fn new(backend: Arc<dyn CheckBackend>, timings: CheckTimings) -> Self {
        CheckController {
            backend,
            timings,
            ids: Arc::new(JobIdFactory::new()),
            current: None,
        }
    }

    /// Starts checking `key`, releasing any check already running. Returns a
    /// receiver that observes every change to the new session.
    pub fn start(
        &mut self,
        key: &str,
        region: Option<&str>,
    ) -> Result<watch::Receiver<CheckSession>, CheckError> {
        let key = ProductKey::parse(key).ok_or(CheckError::EmptyKey)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| CheckError::NoRuntime)?;

        self.release("superseded by a new check");

        if !key.is_well_formed() {
            tracing::warn!(key = %key, "key does not look like a retail product key, checking anyway");
        }
        let region = region.and_then(normalize_region);

        let (tx, rx) = watch::channel(CheckSession::new(key.as_str(), region.clone()));
        let state = Arc::new(tx);
        let active = Arc::new(AtomicBool::new(true));
        let started = Instant::now();

        let ctx = SessionContext {
            backend: self.backend.clone(),
            timings: self.timings.clone(),
            ids: self.ids.clone(),
            key: key.to_string(),
            state: state.clone(),
            active: active.clone(),
            started,
        };
        let request = SubmitRequest {
            key: key.to_string(),
            region,
        };

        tracing::info!(key = %key, region = ?request.region, "starting check");
        let task = runtime.spawn(drive(ctx, request));

        self.current = Some(ActiveCheck {
            state,
            active,
            task: Some(task),
            started,
        });
        Ok(rx)
    }

    /// Latest state of the current session, including a released one.
    pub fn session(&self) -> Option<CheckSession> {
        self.current
            .as_ref()
            .map(|check| check.state.borrow().clone())
    }

    pub fn subscribe(&self) -> Option<watch::Receiver<CheckSession>> {
        self.current.as_ref().map(|check| check.state.subscribe())
    }

    /// Whether a check task is still submitting or polling.
    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .and_then(|check| check.task.as_ref())
            .is_some_and(|task| !task.is_finished())
    }

    /// Stops the current check. A session that has not finished is marked
    /// cancelled and no further requests are issued for it.
    pub fn cancel(&mut self) {
        self.release("cancelled");
    }

    /// Tears down the current check. Safe to call any number of times.
    pub fn dispose(&mut self) {
        self.release("disposed");
    }

    fn release(&mut self, reason: &'static str) {
        let Some(check) = self.current.as_mut() else {
            return;
        };
        let Some(task) = check.task.take() else {
            return;
        };

        check.active.store(false, Ordering::Release);
        let cancelled = check.state.send_if_modified(CheckSession::cancel);
        task.abort();

        if cancelled {
            let key = check.state.borrow().key.clone();
            tracing::info!(key = %key, reason, "check released before it finished");
            record_finished(&key, CheckStatus::Cancelled, check.started);
        }
    }
}

impl Drop for CheckController {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn drive(ctx: SessionContext, request: SubmitRequest) {
    if let Submission::Poll(job_id) = submission::submit(&ctx, request).await {
        poll_loop::run(&ctx, job_id).await;
    }
}

/// Waits until the session reaches a terminal status and returns it. Returns
/// `None` if the session was dropped before it finished.
pub async fn settled(updates: &mut watch::Receiver<CheckSession>) -> Option<CheckSession> {
    updates
        .wait_for(|session| session.status.is_terminal())
        .await
        .ok()
        .map(|session| session.clone())
}
