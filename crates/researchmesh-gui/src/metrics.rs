use anyhow::Result;
use tracing::info;

pub fn init_telemetry(endpoint: &str) -> Result<()> {
    info!(
        target = "telemetry.gui",
        endpoint,
        "OpenTelemetry endpoint configured; forward tracing spans via collector-side subscriber"
    );
    researchmesh_core::metrics::init_metrics_from_env("researchmesh-gui")
}

pub fn credential_updated(session_id: &str, present: bool) {
    info!(
        target = "telemetry.gui",
        session_id,
        present,
        event = "credential_updated"
    );
}

pub fn run_started(session_id: &str, running: usize, available_permits: usize) {
    info!(
        target = "telemetry.gui",
        session_id,
        running_runs = running,
        available_permits,
        event = "run_started"
    );
}

pub fn run_completed(session_id: &str, members: usize, total_tokens: u64, elapsed_ms: u64) {
    info!(
        target = "telemetry.gui",
        session_id,
        members,
        total_tokens,
        elapsed_ms,
        event = "run_completed"
    );
}

pub fn run_failed(session_id: &str, kind: &str, error: &str, elapsed_ms: u64) {
    info!(
        target = "telemetry.gui",
        session_id,
        kind,
        error,
        elapsed_ms,
        event = "run_failed"
    );
}
