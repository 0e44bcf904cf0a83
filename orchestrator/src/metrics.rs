use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};
use std::sync::LazyLock;

static REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "cascade_requests_total",
        "Cascade requests by outcome",
        &["outcome"]
    )
    .expect("cascade_requests_total registers once")
});

static THEME_RESULTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "cascade_theme_results_total",
        "Per-theme slots by final status",
        &["status"]
    )
    .expect("cascade_theme_results_total registers once")
});

static RATE_LIMIT_DECISIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "cascade_rate_limit_decisions_total",
        "Token bucket decisions",
        &["allowed"]
    )
    .expect("cascade_rate_limit_decisions_total registers once")
});

static UPSTREAM_RETRIES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "cascade_upstream_retries_total",
        "Retried upstream calls by dependency",
        &["dependency"]
    )
    .expect("cascade_upstream_retries_total registers once")
});

static REQUEST_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "cascade_request_duration_seconds",
        "Wall time of a full cascade"
    )
    .expect("cascade_request_duration_seconds registers once")
});

pub fn record_request(outcome: &str, seconds: f64) {
    REQUESTS.with_label_values(&[outcome]).inc();
    REQUEST_DURATION.observe(seconds);
}

pub fn record_theme_status(status: &str) {
    THEME_RESULTS.with_label_values(&[status]).inc();
}

pub fn record_rate_limit_decision(allowed: bool) {
    let label = if allowed { "true" } else { "false" };
    RATE_LIMIT_DECISIONS.with_label_values(&[label]).inc();
}

pub fn record_retry(dependency: &str) {
    UPSTREAM_RETRIES.with_label_values(&[dependency]).inc();
}

/// Render the default registry in the Prometheus text format.
pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}
