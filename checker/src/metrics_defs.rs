//! Metrics definitions for the checker.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CHECK_SUBMITTED: MetricDef = MetricDef {
    name: "check.submitted",
    metric_type: MetricType::Counter,
    description: "Number of key checks submitted to the backend",
};

pub const CHECK_SUBMIT_FAILED: MetricDef = MetricDef {
    name: "check.submit.failed",
    metric_type: MetricType::Counter,
    description: "Submissions that failed in transport and fell back to identity recovery, tagged by id source",
};

pub const CHECK_IMMEDIATE_RESULT: MetricDef = MetricDef {
    name: "check.immediate_result",
    metric_type: MetricType::Counter,
    description: "Checks answered by the submission call without polling",
};

pub const POLL_REQUEST: MetricDef = MetricDef {
    name: "check.poll.request",
    metric_type: MetricType::Counter,
    description: "Status requests issued",
};

pub const POLL_FAILURE: MetricDef = MetricDef {
    name: "check.poll.failure",
    metric_type: MetricType::Counter,
    description: "Status requests that failed in transport or timed out",
};

pub const POLL_ID_SWAPPED: MetricDef = MetricDef {
    name: "check.poll.id_swapped",
    metric_type: MetricType::Counter,
    description: "Synthetic identifiers replaced after a not_found reply",
};

pub const CHECK_LONG_RUNNING: MetricDef = MetricDef {
    name: "check.long_running",
    metric_type: MetricType::Counter,
    description: "Checks that crossed the long-running threshold",
};

pub const CHECK_FINISHED: MetricDef = MetricDef {
    name: "check.finished",
    metric_type: MetricType::Counter,
    description: "Checks that reached a terminal status, tagged by status",
};

pub const CHECK_DURATION: MetricDef = MetricDef {
    name: "check.duration",
    metric_type: MetricType::Histogram,
    description: "Seconds from submission to a terminal status",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CHECK_SUBMITTED,
    CHECK_SUBMIT_FAILED,
    CHECK_IMMEDIATE_RESULT,
    POLL_REQUEST,
    POLL_FAILURE,
    POLL_ID_SWAPPED,
    CHECK_LONG_RUNNING,
    CHECK_FINISHED,
    CHECK_DURATION,
];
