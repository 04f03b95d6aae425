//! Metrics helpers for the router.
//!
//! Thin wrappers over the `metrics` crate macros. No exporter is embedded;
//! the application installs whichever recorder it likes and the calls below
//! are no-ops until it does.
//!
//! Provided metrics:
//! * `fieldroute_requests_total` (counter; labels `method`, `status`)
//! * `fieldroute_request_duration_seconds` (histogram; label `method`)
//! * `fieldroute_cleanup_failures_total` (counter)
//!
//! [`RequestTimer`] records the duration on `Drop`, so early returns are
//! measured too.
use std::time::{Duration, Instant};

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

pub const FIELDROUTE_REQUESTS_TOTAL: &str = "fieldroute_requests_total";
pub const FIELDROUTE_REQUEST_DURATION_SECONDS: &str = "fieldroute_request_duration_seconds";
pub const FIELDROUTE_CLEANUP_FAILURES_TOTAL: &str = "fieldroute_cleanup_failures_total";

static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        FIELDROUTE_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of requests answered by the router."
    );
    describe_histogram!(
        FIELDROUTE_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of requests answered by the router."
    );
    describe_counter!(
        FIELDROUTE_CLEANUP_FAILURES_TOTAL,
        Unit::Count,
        "Request cleanups that returned an error or panicked."
    );
});

/// Register metric descriptions with the installed recorder (idempotent).
pub fn init_metrics() {
    Lazy::force(&DESCRIPTIONS);
    tracing::debug!("router metrics described");
}

pub fn increment_request_total(method: &str, status: u16) {
    counter!(
        FIELDROUTE_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_request_duration(method: &str, duration: Duration) {
    histogram!(FIELDROUTE_REQUEST_DURATION_SECONDS, "method" => method.to_string())
        .record(duration.as_secs_f64());
}

pub fn increment_cleanup_failures() {
    counter!(FIELDROUTE_CLEANUP_FAILURES_TOTAL).increment(1);
}

/// RAII helper measuring request duration.
pub struct RequestTimer {
    start: Instant,
    method: String,
}

impl RequestTimer {
    pub fn new(method: &str) -> Self {
        Self {
            start: Instant::now(),
            method: method.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.method, self.start.elapsed());
    }
}
