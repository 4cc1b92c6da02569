use crate::backend::{BackendError, RequestEcho};
use crate::controller::SessionContext;
use crate::identity::recover_job_id;
use crate::metrics_defs::{CHECK_IMMEDIATE_RESULT, CHECK_SUBMIT_FAILED, CHECK_SUBMITTED};
use crate::protocol::{CheckResult, SubmitReply, SubmitRequest};
use crate::session::{CheckSession, CheckStatus, SUBMITTED_MESSAGE};
use shared::counter;
use tokio::time::timeout;

/// Where the session goes after the submission call.
#[derive(Debug, PartialEq)]
pub(crate) enum Submission {
    /// Terminal already, nothing to poll.
    Settled,
    Poll(String),
}

/// Sends the check request and classifies whatever comes back. A failed
/// submission still yields an identifier to poll, because the backend may
/// have started the job before the connection broke.
pub(crate) async fn submit(ctx: &SessionContext, request: SubmitRequest) -> Submission {
    if !ctx.update(CheckSession::begin_submission) {
        return Submission::Settled;
    }
    counter!(CHECK_SUBMITTED).increment(1);

    let limit = ctx.timings.submit_timeout();
    let reply = timeout(limit, ctx.backend.submit_check(&request))
        .await
        .unwrap_or_else(|_| {
            Err(BackendError::Timeout {
                after: limit,
                request: RequestEcho::submission(&request),
            })
        });

    match reply {
        Ok(body) => match SubmitReply::decode(&body, &request.key) {
            SubmitReply::DefiniteOutcome(result) => settle(ctx, result),
            SubmitReply::JobAccepted { job_id } => {
                tracing::info!(key = %request.key, job_id = %job_id, "check accepted");
                ctx.update(|s| s.set_message(SUBMITTED_MESSAGE));
                Submission::Poll(job_id)
            }
            SubmitReply::Unrecognized => {
                let job_id = ctx.ids.temp_check_id(&request.key);
                tracing::warn!(key = %request.key, job_id = %job_id, "check accepted without an id");
                ctx.update(|s| {
                    s.log(format!("No check id in the reply, using {job_id}"));
                    s.set_message(SUBMITTED_MESSAGE)
                });
                Submission::Poll(job_id)
            }
        },
        Err(err) => {
            // An error body can still carry the verdict.
            if let Some(body) = err.body()
                && let SubmitReply::DefiniteOutcome(result) = SubmitReply::decode(body, &request.key)
            {
                return settle(ctx, result);
            }

            let recovered = recover_job_id(&err, &request.key, &ctx.ids);
            counter!(CHECK_SUBMIT_FAILED, "source" => recovered.source.as_str()).increment(1);
            tracing::warn!(
                key = %request.key,
                error = %err,
                job_id = %recovered.job_id,
                source = recovered.source.as_str(),
                "check submission failed, polling a recovered id"
            );
            ctx.update(|s| {
                s.log(format!("Submission failed: {err}"));
                s.log(format!(
                    "Polling {} ({})",
                    recovered.job_id,
                    recovered.source.as_str()
                ));
                s.set_message(SUBMITTED_MESSAGE)
            });
            Submission::Poll(recovered.job_id)
        }
    }
}

fn settle(ctx: &SessionContext, result: CheckResult) -> Submission {
    let status = if result.verdict.is_error() {
        CheckStatus::Errored
    } else {
        CheckStatus::Completed
    };
    tracing::info!(key = %result.key, verdict = %result.verdict, "check answered on submission");
    counter!(CHECK_IMMEDIATE_RESULT).increment(1);
    if ctx.update(|s| s.finish(result, status)) {
        ctx.record_finished(status);
    }
    Submission::Settled
}
