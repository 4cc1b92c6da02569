//! Status polling for an accepted check.
//!
//! At most one status request is in flight. The first request goes out
//! immediately, later ones follow the poll interval once the previous request
//! has settled. The long-running notice fires at most once. Every timer lives
//! on this task's stack, so returning or being aborted clears them all.

use crate::backend::{BackendError, RequestEcho};
use crate::controller::SessionContext;
use crate::identity::alternate_job_id;
use crate::metrics_defs::{CHECK_LONG_RUNNING, POLL_FAILURE, POLL_ID_SWAPPED, POLL_REQUEST};
use crate::protocol::PollUpdate;
use crate::session::{CheckSession, CheckStatus};
use serde_json::Value;
use shared::counter;
use std::future::Future;
use std::pin::Pin;
use tokio::time::{MissedTickBehavior, interval, sleep, timeout};

type PollFuture = Pin<Box<dyn Future<Output = Result<Value, BackendError>> + Send>>;

enum Step {
    Continue,
    Done,
}

pub(crate) async fn run(ctx: &SessionContext, job_id: String) {
    if !ctx.update(|s| s.begin_polling(&job_id)) {
        return;
    }
    let mut job_id = job_id;

    let mut ticker = interval(ctx.timings.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let long_running = sleep(ctx.timings.long_running_after());
    tokio::pin!(long_running);
    let mut long_running_armed = true;

    let mut in_flight: Option<PollFuture> = None;

    loop {
        tokio::select! {
            _ = ticker.tick(), if in_flight.is_none() => {
                counter!(POLL_REQUEST).increment(1);
                tracing::debug!(job_id = %job_id, "requesting check status");
                in_flight = Some(start_poll(ctx, &job_id));
            }
            reply = settle(&mut in_flight), if in_flight.is_some() => {
                in_flight = None;
                let step = match reply {
                    Ok(body) => handle_reply(ctx, &body, &mut job_id),
                    Err(err) => {
                        handle_failure(ctx, &err);
                        Step::Continue
                    }
                };
                if let Step::Done = step {
                    break;
                }
            }
            () = &mut long_running, if long_running_armed => {
                long_running_armed = false;
                if ctx.update(CheckSession::mark_long_running) {
                    counter!(CHECK_LONG_RUNNING).increment(1);
                    tracing::info!(job_id = %job_id, "check is taking longer than usual");
                }
            }
        }

        if !ctx.is_active() {
            break;
        }
    }

    tracing::debug!(job_id = %job_id, "stopped polling");
}

fn start_poll(ctx: &SessionContext, job_id: &str) -> PollFuture {
    let backend = ctx.backend.clone();
    let job_id = job_id.to_string();
    let limit = ctx.timings.poll_timeout();

    Box::pin(async move {
        timeout(limit, backend.poll_status(&job_id))
            .await
            .unwrap_or_else(|_| {
                Err(BackendError::Timeout {
                    after: limit,
                    request: RequestEcho::poll(&job_id),
                })
            })
    })
}

// Resolves with the in-flight request. Dropping this future leaves the
// request in place for the next loop iteration.
async fn settle(in_flight: &mut Option<PollFuture>) -> Result<Value, BackendError> {
    match in_flight {
        Some(request) => request.await,
        None => std::future::pending().await,
    }
}

fn handle_reply(ctx: &SessionContext, body: &Value, job_id: &mut String) -> Step {
    ctx.update(CheckSession::record_poll_success);

    match PollUpdate::decode(body, &ctx.key) {
        PollUpdate::Finished { progress, result } => {
            tracing::info!(job_id = %job_id, verdict = %result.verdict, "check completed");
            let finished = ctx.update(|s| {
                s.apply_progress(&progress);
                s.finish(result, CheckStatus::Completed)
            });
            if finished {
                ctx.record_finished(CheckStatus::Completed);
            }
            Step::Done
        }
        PollUpdate::Failed {
            progress,
            error_message,
        } => {
            tracing::info!(job_id = %job_id, error = ?error_message, "check failed on the backend");
            let finished = ctx.update(|s| {
                s.apply_progress(&progress);
                s.fail(error_message.as_deref())
            });
            if finished {
                ctx.record_finished(CheckStatus::Errored);
            }
            Step::Done
        }
        PollUpdate::NotFound => {
            match alternate_job_id(job_id, &ctx.key, &ctx.ids) {
                Some(next) => {
                    counter!(POLL_ID_SWAPPED).increment(1);
                    tracing::warn!(from = %job_id, to = %next, "check id not found, trying the other naming scheme");
                    ctx.update(|s| {
                        s.log(format!("Check id {job_id} not found, switching to {next}"));
                        s.replace_job_id(&next)
                    });
                    *job_id = next;
                }
                None => tracing::debug!(job_id = %job_id, "check id not found yet"),
            }
            Step::Continue
        }
        PollUpdate::InProgress(progress) => {
            ctx.update(|s| s.apply_progress(&progress));
            Step::Continue
        }
    }
}

fn handle_failure(ctx: &SessionContext, err: &BackendError) {
    counter!(POLL_FAILURE).increment(1);
    tracing::warn!(error = %err, "status request failed");

    let cap = ctx.timings.max_poll_failures;
    let mut advisory = false;
    ctx.update(|s| {
        if s.status != CheckStatus::Polling {
            return false;
        }
        advisory = s.record_poll_failure(cap, &err.to_string());
        true
    });

    if advisory {
        tracing::warn!(failures = cap, "status requests keep failing, still polling");
    }
}
