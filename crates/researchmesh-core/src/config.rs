use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::ResearchMeshError;

const DEFAULT_CONFIG_PATH: &str = "researchmesh.toml";
const CONFIG_PATH_ENV: &str = "RESEARCHMESH_CONFIG";

/// Top-level configuration structure. Every section is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub team: TeamConfig,
    pub tools: ToolsConfig,
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument (must exist).
    /// 2. `RESEARCHMESH_CONFIG` environment variable (must exist).
    /// 3. `researchmesh.toml` in the current working directory, if present.
    /// 4. Built-in defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Config, ResearchMeshError> {
        let config = match resolve_path(path) {
            Some(candidate) => Self::load_file(&candidate)?,
            None => Config::default(),
        };

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Config, ResearchMeshError> {
        let config: Config = toml::from_str(raw)
            .map_err(|err| ResearchMeshError::InvalidConfiguration(err.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Config, ResearchMeshError> {
        let raw = fs::read_to_string(path)
            .map_err(|err| ResearchMeshError::config_io(path.to_path_buf(), err))?;
        toml::from_str(&raw).map_err(|err| ResearchMeshError::InvalidConfiguration(err.to_string()))
    }

    fn validate(config: &Config) -> Result<(), ResearchMeshError> {
        if config.llm.model.trim().is_empty() {
            return Err(ResearchMeshError::InvalidConfiguration(
                "llm.model must name a chat model".into(),
            ));
        }

        if config.team.max_tool_rounds == 0 {
            return Err(ResearchMeshError::InvalidConfiguration(
                "team.max_tool_rounds must be at least 1".into(),
            ));
        }

        if config.tools.request_timeout_secs == 0 || config.llm.request_timeout_secs == Some(0) {
            return Err(ResearchMeshError::InvalidConfiguration(
                "request_timeout_secs must be at least 1".into(),
            ));
        }

        for (key, url) in [
            ("llm.base_url", &config.llm.base_url),
            ("tools.hackernews_base_url", &config.tools.hackernews_base_url),
            ("tools.duckduckgo_url", &config.tools.duckduckgo_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ResearchMeshError::InvalidConfiguration(format!(
                    "{key} must be an http(s) URL, got `{url}`"
                )));
            }
        }

        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = path {
        return Some(path);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV)
        && !from_env.trim().is_empty()
    {
        return Some(PathBuf::from(from_env));
    }

    let default = Path::new(DEFAULT_CONFIG_PATH);
    default.is_file().then(|| default.to_path_buf())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    /// No timeout unless set; a run waits for the backend.
    pub request_timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamConfig {
    pub max_tool_rounds: u8,
    pub markdown: bool,
    pub debug_mode: bool,
    pub show_members_responses: bool,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 6,
            markdown: true,
            debug_mode: false,
            show_members_responses: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub hackernews_base_url: String,
    pub duckduckgo_url: String,
    pub default_max_results: usize,
    pub article_max_chars: usize,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            hackernews_base_url: "https://hacker-news.firebaseio.com/v0".to_string(),
            duckduckgo_url: "https://html.duckduckgo.com/html/".to_string(),
            default_max_results: 5,
            article_max_chars: 5_000,
            request_timeout_secs: 20,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string(),
        }
    }
}
