//! Client-side orchestration of product key checks.
//!
//! A check is submitted once and then polled until the backend reports a
//! terminal outcome, the operator cancels it, or the owner releases it. The
//! backend may not return a job identifier at all, so [`identity`] derives
//! one from whatever the failed request left behind.

pub mod backend;
pub mod config;
pub mod controller;
pub mod http_backend;
pub mod identity;
pub mod key;
pub mod metrics_defs;
pub mod protocol;
pub mod session;

mod poll_loop;
mod submission;

#[cfg(test)]
mod testutils;

pub use backend::{BackendError, CheckBackend};
pub use config::CheckTimings;
pub use controller::{CheckController, CheckError, settled};
pub use http_backend::HttpCheckBackend;
pub use key::{ProductKey, format_key};
pub use protocol::{CheckResult, Tone, Verdict};
pub use session::{CheckSession, CheckStatus};
