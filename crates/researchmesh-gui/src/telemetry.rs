use crate::{config::AppConfig, metrics};
use anyhow::Result;
use tracing::warn;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt};

pub fn init_tracing(config: &AppConfig) -> Result<()> {
    let default_directive = if config.debug {
        "info,researchmesh_core=debug,researchmesh_gui=debug,tower_http=debug"
    } else {
        "info"
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer();
    let subscriber = Registry::default().with(env_filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(endpoint) = config.otel_endpoint.as_deref() {
        metrics::init_telemetry(endpoint)?;
        warn!(
            target = "telemetry.gui",
            endpoint,
            "RESEARCHMESH_OTEL_ENDPOINT set; attach an OTLP collector to forward spans and run metrics"
        );
    }

    Ok(())
}
