use anyhow::{Result, bail};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: String,
    pub max_concurrency: usize,
    /// Optional TOML file for the research team (`RESEARCHMESH_CONFIG`).
    pub config_path: Option<PathBuf>,
    pub otel_endpoint: Option<String>,
    pub debug: bool,
    /// Idle time after which a browser session's credential is forgotten.
    pub session_idle: Duration,
}

impl AppConfig {
    const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:8501";
    const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(60 * 60);

    pub fn from_env() -> Result<Self> {
        let listen_addr = env::var("RESEARCHMESH_LISTEN_ADDR")
            .unwrap_or_else(|_| Self::DEFAULT_LISTEN_ADDR.to_string());

        let max_concurrency = env::var("RESEARCHMESH_MAX_CONCURRENCY")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|nz| nz.get())
                    .unwrap_or(4)
            });

        let config_path = non_empty_var("RESEARCHMESH_CONFIG").map(PathBuf::from);
        if let Some(path) = &config_path
            && !path.is_file()
        {
            bail!(
                "RESEARCHMESH_CONFIG points at {}, which is not a readable file",
                path.display()
            );
        }

        let otel_endpoint = non_empty_var("RESEARCHMESH_OTEL_ENDPOINT");

        let debug = env::var("RESEARCHMESH_DEBUG")
            .ok()
            .and_then(|value| parse_bool(&value))
            .unwrap_or(false);

        let session_idle = env::var("RESEARCHMESH_SESSION_IDLE_SECS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or(Self::DEFAULT_SESSION_IDLE);

        Ok(Self {
            listen_addr,
            max_concurrency,
            config_path,
            otel_endpoint,
            debug,
            session_idle,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::DEFAULT_LISTEN_ADDR.to_string(),
            max_concurrency: 4,
            config_path: None,
            otel_endpoint: None,
            debug: false,
            session_idle: Self::DEFAULT_SESSION_IDLE,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
