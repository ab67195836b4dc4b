use std::sync::LazyLock;

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};

pub static AGENT_STEPS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "trip_agent_steps_total",
        "Agent steps executed, by role and outcome",
        &["role", "outcome"]
    )
    .expect("metric definition is valid and registered once")
});

pub static AGENT_STEP_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "trip_agent_step_seconds",
        "Wall-clock time per agent step",
        &["role"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 80.0]
    )
    .expect("metric definition is valid and registered once")
});

pub static DESTINATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "trip_destinations_total",
        "Destinations processed by batch runs, by final status",
        &["status"]
    )
    .expect("metric definition is valid and registered once")
});

pub static TOOL_CALLS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "trip_tool_calls_total",
        "Tool adapter calls, by tool and data source",
        &["tool", "source"]
    )
    .expect("metric definition is valid and registered once")
});

pub static TELEMETRY_DEGRADED: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "trip_telemetry_degraded",
        "1 when telemetry has fallen back to the local log"
    )
    .expect("metric definition is valid and registered once")
});

pub fn record_tool_call(tool: &str, is_mock: bool) {
    let source = if is_mock { "mock" } else { "live" };
    TOOL_CALLS.with_label_values(&[tool, source]).inc();
}

/// Text exposition of the default registry.
pub fn render() -> Result<(String, String), prometheus::Error> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    let body = String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(e.to_string()))?;
    Ok((body, encoder.format_type().to_string()))
}
