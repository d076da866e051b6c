use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder.
///
/// Fails when a recorder is already installed for this process.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    init_metric_descriptions();

    Ok(handle)
}

/// Recorder that is not installed globally; used when `/metrics` is disabled and in tests
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "funnel_requests_total",
        "Funnel analysis requests by outcome"
    );
    describe_counter!(
        "funnel_cache_lookups_total",
        "Analysis cache lookups by result"
    );
    describe_counter!(
        "funnel_provider_tokens_total",
        "Tokens consumed by provider calls"
    );
    describe_histogram!(
        "funnel_provider_duration_seconds",
        "Provider call duration in seconds"
    );
    describe_counter!(
        "funnel_errors_total",
        "Pipeline errors by type"
    );
    describe_gauge!(
        "funnel_analyzer_info",
        "Service version information"
    );

    gauge!("funnel_analyzer_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a finished request; `outcome` is `hit`, `miss` or an error type
pub fn record_request(outcome: &str, status: u16) {
    counter!(
        "funnel_requests_total",
        "outcome" => outcome.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Record a cache lookup
pub fn record_cache_lookup(hit: bool) {
    counter!(
        "funnel_cache_lookups_total",
        "result" => if hit { "hit" } else { "miss" },
    )
    .increment(1);
}

/// Record tokens
pub fn record_tokens(provider: &str, model: &str, token_type: &str, count: u64) {
    counter!(
        "funnel_provider_tokens_total",
        "provider" => provider.to_string(),
        "model" => model.to_string(),
        "type" => token_type.to_string(),
    )
    .increment(count);
}

/// Record provider call duration
pub fn record_provider_duration(provider: &str, model: &str, success: bool, duration: Duration) {
    histogram!(
        "funnel_provider_duration_seconds",
        "provider" => provider.to_string(),
        "model" => model.to_string(),
        "success" => success.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record an error
pub fn record_error(error_type: &str) {
    counter!(
        "funnel_errors_total",
        "error_type" => error_type.to_string(),
    )
    .increment(1);
}
