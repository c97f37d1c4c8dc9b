use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Adapter Metrics
    pub static ref API_HANDLER_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "api_handler_outcomes_total",
        "Adapted handler invocations by outcome",
        &["outcome"]  // outcome: written, failed, deferred
    )
    .unwrap();

    pub static ref API_FAILURES_ROUTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "api_failures_routed_total",
        "Failures routed to status-code error handling",
        &["status", "served_by"]  // served_by: handler, default, handler_failed
    )
    .unwrap();

    pub static ref PRE_HOOK_PANICS_TOTAL: IntCounter = register_int_counter!(
        "api_pre_hook_panics_total",
        "Internal error pre-hook invocations that panicked"
    )
    .unwrap();
}

/// Initialize all metrics (called on startup)
pub fn init_metrics() {
    // Force lazy_static initialization
    lazy_static::initialize(&HTTP_REQUESTS_TOTAL);
    lazy_static::initialize(&HTTP_REQUEST_DURATION_SECONDS);
    lazy_static::initialize(&API_HANDLER_OUTCOMES_TOTAL);
    lazy_static::initialize(&API_FAILURES_ROUTED_TOTAL);
    lazy_static::initialize(&PRE_HOOK_PANICS_TOTAL);
}
