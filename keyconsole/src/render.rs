//! Plain-text rendering of a check session for the terminal.

use checker::{CheckSession, CheckStatus, Tone};

const BAR_WIDTH: usize = 20;

fn bar(progress: f64) -> String {
    let filled = ((progress.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

/// One line describing where a running check is.
pub fn progress_line(session: &CheckSession) -> String {
    let mut line = format!(
        "{} {:>3}% {}",
        bar(session.progress),
        session.progress.round(),
        session.display_message()
    );
    if let Some(job_id) = &session.job_id {
        line.push_str(&format!(" ({job_id})"));
    }
    line
}

fn tone_marker(tone: Tone) -> &'static str {
    match tone {
        Tone::Success => "OK",
        Tone::Warning => "WARN",
        Tone::Danger => "FAIL",
        Tone::Info => "INFO",
        Tone::Secondary => "--",
    }
}

/// Final report for a session that reached a terminal status.
pub fn summary(session: &CheckSession) -> String {
    match (&session.status, &session.result) {
        (CheckStatus::Completed | CheckStatus::Errored, Some(result)) => {
            let mut out = format!(
                "{:<4} {}: {}",
                tone_marker(result.verdict.tone()),
                result.key,
                result.verdict.label()
            );
            if !result.message.is_empty() {
                out.push_str(&format!(" ({})", result.message));
            }
            out
        }
        (CheckStatus::Cancelled, _) => format!("--   {}: cancelled", session.key),
        _ => format!(
            "FAIL {}: {}",
            session.key,
            session.error.as_deref().unwrap_or("check did not finish")
        ),
    }
}

/// Whether the process should exit non-zero for this session.
pub fn is_failure(session: &CheckSession) -> bool {
    session.status != CheckStatus::Completed
}
