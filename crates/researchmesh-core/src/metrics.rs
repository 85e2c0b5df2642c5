use anyhow::Result;
use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct ResearchMetrics {
    runs: Counter<u64>,
    run_duration_ms: Histogram<f64>,
    tool_calls: Counter<u64>,
}

static METRICS: OnceCell<ResearchMetrics> = OnceCell::new();

fn handles() -> &'static ResearchMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("researchmesh.team");
        ResearchMetrics {
            runs: meter
                .u64_counter("research_runs_total")
                .with_description("Team runs by outcome")
                .init(),
            run_duration_ms: meter
                .f64_histogram("research_run_duration_ms")
                .with_description("Team run wall time in milliseconds")
                .init(),
            tool_calls: meter
                .u64_counter("tool_calls_total")
                .with_description("Tool invocations by toolkit, function and status")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) -> Result<()> {
    if std::env::var("RESEARCHMESH_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "RESEARCHMESH_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export run metrics."
        );
    }
    Ok(())
}

/// Record a finished team run (no-op if no provider installed).
pub fn record_run(status: &str, duration_ms: u64, members: usize) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("status", status.to_string()),
        KeyValue::new("members", members as i64),
    ];

    metrics.runs.add(1, &attrs);
    metrics.run_duration_ms.record(duration_ms as f64, &attrs);
}

pub fn record_tool_call(toolkit: &str, function: &str, status: &'static str) {
    handles().tool_calls.add(
        1,
        &[
            KeyValue::new("toolkit", toolkit.to_string()),
            KeyValue::new("function", function.to_string()),
            KeyValue::new("status", status),
        ],
    );
}
