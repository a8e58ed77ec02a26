//! Lightweight metrics helpers for the director.
//!
//! This module exposes a small set of convenience functions wrapping the
//! `metrics` crate macros. It intentionally avoids embedding a concrete
//! exporter (the application can initialize any compatible recorder
//! externally) while still documenting and describing the director-specific
//! metric names.
//!
//! Provided metrics (labels vary by family):
//! * `director_requests_total` (counter; labels: kind, outcome)
//! * `director_rate_limited_total` (counter)
//! * `director_backend_health_status` (gauge per backend)
//! * `director_registered_backends` (gauge)
//! * `director_poll_cycles_total` (counter)
use metrics::{Unit, counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::Lazy;

pub const DIRECTOR_REQUESTS_TOTAL: &str = "director_requests_total";
pub const DIRECTOR_RATE_LIMITED_TOTAL: &str = "director_rate_limited_total";
pub const DIRECTOR_BACKEND_HEALTH_STATUS: &str = "director_backend_health_status";
pub const DIRECTOR_REGISTERED_BACKENDS: &str = "director_registered_backends";
pub const DIRECTOR_POLL_CYCLES_TOTAL: &str = "director_poll_cycles_total";

/// One-time registration of metric descriptions.
static DESCRIBED: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        DIRECTOR_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of content requests routed, by kind and outcome."
    );
    describe_counter!(
        DIRECTOR_RATE_LIMITED_TOTAL,
        Unit::Count,
        "Total number of requests rejected by the sliding-window rate limiter."
    );
    describe_gauge!(
        DIRECTOR_BACKEND_HEALTH_STATUS,
        "Health status of individual backends (1 for healthy, 0 for unhealthy)."
    );
    describe_gauge!(
        DIRECTOR_REGISTERED_BACKENDS,
        "Number of backends currently present in the registry."
    );
    describe_counter!(
        DIRECTOR_POLL_CYCLES_TOTAL,
        Unit::Count,
        "Total number of completed health-polling cycles."
    );
});

/// Count a routed content request and its outcome.
pub fn increment_request_total(kind: &str, outcome: &str) {
    Lazy::force(&DESCRIBED);
    counter!(
        DIRECTOR_REQUESTS_TOTAL,
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Count a rate-limited rejection.
pub fn increment_rate_limited() {
    Lazy::force(&DESCRIBED);
    counter!(DIRECTOR_RATE_LIMITED_TOTAL).increment(1);
}

/// Set (and record) the health status gauge for a backend.
pub fn set_backend_health_status(backend: &str, is_healthy: bool) {
    Lazy::force(&DESCRIBED);
    let health_value = if is_healthy { 1.0 } else { 0.0 };
    gauge!(DIRECTOR_BACKEND_HEALTH_STATUS, "backend" => backend.to_string()).set(health_value);
}

/// Set the registry-size gauge.
pub fn set_registered_backends(count: usize) {
    Lazy::force(&DESCRIBED);
    gauge!(DIRECTOR_REGISTERED_BACKENDS).set(count as f64);
}

/// Count a completed polling cycle.
pub fn increment_poll_cycles() {
    Lazy::force(&DESCRIBED);
    counter!(DIRECTOR_POLL_CYCLES_TOTAL).increment(1);
}
