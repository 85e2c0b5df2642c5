use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt};

use crate::ResearchMeshError;

static TELEMETRY_GUARD: OnceLock<()> = OnceLock::new();

/// Subscriber settings shared by the binaries.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    pub env_filter: Option<String>,
    pub with_ansi: bool,
    /// Lowers the default filter to `debug` for the researchmesh crates.
    pub debug: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            env_filter: None,
            with_ansi: true,
            debug: false,
        }
    }
}

/// Install the global tracing subscriber. Later calls are no-ops.
pub fn init_telemetry(options: TelemetryOptions) -> Result<(), ResearchMeshError> {
    if TELEMETRY_GUARD.get().is_some() {
        return Ok(());
    }

    let env_filter = options
        .env_filter
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| default_filter(options.debug));

    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_ansi(options.with_ansi)
        .try_init()
        .map_err(|err| {
            ResearchMeshError::InvalidConfiguration(format!("telemetry init failed: {err}"))
        })?;

    TELEMETRY_GUARD.get_or_init(|| ());
    Ok(())
}

fn default_filter(debug: bool) -> String {
    if debug {
        "info,researchmesh_core=debug,researchmesh_gui=debug,researchmesh_cli=debug".to_string()
    } else {
        "info".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_filter_targets_workspace_crates() {
        assert_eq!(default_filter(false), "info");
        assert!(default_filter(true).contains("researchmesh_core=debug"));
    }
}
